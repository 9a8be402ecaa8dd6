use std::io::Cursor;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tiny_http::{Header, Request, Response, Server};
use url::Url;

use crate::auth::error::FlowError;

const CLOSE_WINDOW_HTML: &str =
    r#"<html><body><script type="text/javascript">window.close()</script></body></html>"#;
const NOT_FOUND_HTML: &str = "<html><body><h1>Not Found</h1></body></html>";

// Granularity at which a blocked wait notices cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

// Upper bound on how long teardown waits for the listening socket to close.
const PORT_RELEASE_TIMEOUT: Duration = Duration::from_secs(2);
const PORT_RELEASE_POLL: Duration = Duration::from_millis(5);

/// What the first callback request resolved to.
#[derive(Debug)]
pub enum CallbackOutcome {
    Code(String),
    Failure(FlowError),
}

impl CallbackOutcome {
    pub fn into_result(self) -> Result<String, FlowError> {
        match self {
            CallbackOutcome::Code(code) => Ok(code),
            CallbackOutcome::Failure(err) => Err(err),
        }
    }
}

/// Per-flow HTTP listener that waits for the authorization server redirect.
///
/// The server owns its own route table and socket. Dropping it stops the
/// request thread and only returns once the port can be bound again,
/// whatever state the flow ended in.
pub struct CallbackServer {
    port: u16,
    server: Option<Arc<Server>>,
    shutdown_flag: Arc<AtomicBool>,
    outcome_rx: Receiver<CallbackOutcome>,
    server_handle: Option<thread::JoinHandle<()>>,
}

impl CallbackServer {
    /// Binds `0.0.0.0:port` and starts serving `callback_path` on a dedicated thread.
    pub fn start(port: u16, callback_path: &str, expected_state: &str) -> Result<Self, FlowError> {
        if port == 0 {
            return Err(FlowError::ServerBind {
                port,
                reason: "port must be between 1 and 65535".to_string(),
            });
        }

        let server = Server::http(("0.0.0.0", port)).map_err(|e| FlowError::ServerBind {
            port,
            reason: e.to_string(),
        })?;
        let server = Arc::new(server);
        let shutdown_flag = Arc::new(AtomicBool::new(false));

        // A single slot is enough: at most one outcome is ever sent.
        let (outcome_tx, outcome_rx) = mpsc::sync_channel(1);

        let server_clone = server.clone();
        let shutdown_flag_clone = shutdown_flag.clone();
        let callback_path = callback_path.to_string();
        let expected_state = expected_state.to_string();

        let server_handle = thread::spawn(move || {
            serve_callback(
                &server_clone,
                &shutdown_flag_clone,
                &callback_path,
                &expected_state,
                outcome_tx,
            )
        });

        log::debug!("Callback server listening on 0.0.0.0:{}", port);

        Ok(Self {
            port,
            server: Some(server),
            shutdown_flag,
            outcome_rx,
            server_handle: Some(server_handle),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Blocks until the first callback resolves, `timeout` elapses or `cancel` is raised.
    ///
    /// The server is torn down before this returns. A timeout too large to be
    /// represented as a deadline waits without one.
    pub fn wait_for_outcome(
        self,
        timeout: Option<Duration>,
        cancel: Option<&AtomicBool>,
    ) -> CallbackOutcome {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t).map(|at| (at, t)));

        loop {
            // A callback that already arrived is taken over a raised cancel flag.
            match self.outcome_rx.try_recv() {
                Ok(outcome) => return outcome,
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    return CallbackOutcome::Failure(FlowError::ServerStopped)
                }
            }

            if cancel.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                log::info!("Authorization flow cancelled");
                return CallbackOutcome::Failure(FlowError::Cancelled);
            }

            let wait = match deadline {
                Some((at, timeout)) => {
                    let now = Instant::now();
                    if now >= at {
                        log::warn!("No callback received within {:?}", timeout);
                        return CallbackOutcome::Failure(FlowError::Timeout(timeout));
                    }
                    (at - now).min(POLL_INTERVAL)
                }
                None => POLL_INTERVAL,
            };

            match self.outcome_rx.recv_timeout(wait) {
                Ok(outcome) => return outcome,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return CallbackOutcome::Failure(FlowError::ServerStopped)
                }
            }
        }
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        let Some(server) = self.server.take() else {
            return;
        };

        shutdown(&self.shutdown_flag, &server);
        if let Some(handle) = self.server_handle.take() {
            if handle.join().is_err() {
                log::error!("Callback server thread panicked");
            }
        }

        // Last reference: tiny_http signals its accept thread, which closes the socket.
        drop(server);
        wait_for_port_release(self.port);
        log::debug!("Callback server on port {} stopped", self.port);
    }
}

/// Returns once `0.0.0.0:port` can be bound, or after [`PORT_RELEASE_TIMEOUT`].
fn wait_for_port_release(port: u16) {
    let deadline = Instant::now() + PORT_RELEASE_TIMEOUT;
    loop {
        match TcpListener::bind(("0.0.0.0", port)) {
            Ok(_) => return,
            Err(e) if Instant::now() >= deadline => {
                log::warn!("Port {} still in use after callback server shutdown: {}", port, e);
                return;
            }
            Err(_) => thread::sleep(PORT_RELEASE_POLL),
        }
    }
}

fn shutdown(shutdown_flag: &AtomicBool, server: &Server) {
    shutdown_flag.store(true, Ordering::SeqCst);
    server.unblock();
}

fn serve_callback(
    server: &Server,
    shutdown_flag: &AtomicBool,
    callback_path: &str,
    expected_state: &str,
    outcome_tx: SyncSender<CallbackOutcome>,
) {
    for request in server.incoming_requests() {
        if shutdown_flag.load(Ordering::SeqCst) {
            break;
        }

        if handle_request(request, callback_path, expected_state, &outcome_tx) {
            break;
        }
    }
}

/// Answers one request. Returns `true` once a callback has been resolved.
///
/// The outcome is sent before the response is written.
fn handle_request(
    request: Request,
    callback_path: &str,
    expected_state: &str,
    outcome_tx: &SyncSender<CallbackOutcome>,
) -> bool {
    let full_url = match Url::parse(&format!("http://localhost{}", request.url())) {
        Ok(url) => url,
        Err(e) => {
            log::warn!("Ignoring unparseable request url '{}': {}", request.url(), e);
            let _ = request.respond(html_response(NOT_FOUND_HTML, 400));
            return false;
        }
    };

    if full_url.path() != callback_path {
        log::debug!("Ignoring request to {}", full_url.path());
        let _ = request.respond(html_response(NOT_FOUND_HTML, 404));
        return false;
    }

    let outcome = evaluate_callback(&full_url, expected_state);
    if outcome_tx.send(outcome).is_err() {
        log::debug!("Callback arrived after the wait ended");
    }

    if let Err(e) = request.respond(html_response(CLOSE_WINDOW_HTML, 200)) {
        log::warn!("Failed to answer callback request: {}", e);
    }

    true
}

/// Decides what a callback URL means for the flow.
///
/// The byte-exact state check runs before anything else is looked at.
pub fn evaluate_callback(url: &Url, expected_state: &str) -> CallbackOutcome {
    let param = |name: &str| {
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default()
    };

    let actual_state = param("state");
    if actual_state != expected_state {
        return CallbackOutcome::Failure(FlowError::StateMismatch {
            expected: expected_state.to_string(),
            actual: actual_state,
        });
    }

    let error_code = param("error");
    let error_description = param("error_description");
    if !error_code.is_empty() || !error_description.is_empty() {
        return CallbackOutcome::Failure(FlowError::AuthServer {
            code: error_code,
            description: error_description,
        });
    }

    let code = param("code");
    if code.is_empty() {
        return CallbackOutcome::Failure(FlowError::MissingCode {
            url: url.to_string(),
        });
    }

    CallbackOutcome::Code(code)
}

fn html_response(body: &str, status: u16) -> Response<Cursor<Vec<u8>>> {
    let response = Response::from_string(body).with_status_code(status);
    match Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..]) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}
