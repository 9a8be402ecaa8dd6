use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::auth::error::FlowError;
use crate::auth::oauth_server::CallbackServer;
use crate::auth::token_data::TokenResponse;
use crate::auth::token_exchange::exchange_code_for_tokens;

pub const DEFAULT_CALLBACK_PORT: u16 = 9876;
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

// Keys the authorize URL builder owns; caller values for them are replaced.
const AUTHORIZE_PARAMS: [&str; 5] = ["client_id", "redirect_uri", "scope", "response_type", "state"];

/// Everything needed to run one authorization code flow.
#[derive(Clone)]
pub struct FlowInput {
    pub authorize_uri: String,
    pub token_uri: String,
    /// Must be allow-listed by the authorization server; its path is the callback route.
    pub redirect_uri: String,
    pub client_id: String,
    pub client_secret: String,
    /// Space-delimited, passed through untouched.
    pub scope: String,
    pub state: String,
}

impl fmt::Debug for FlowInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowInput")
            .field("authorize_uri", &self.authorize_uri)
            .field("token_uri", &self.token_uri)
            .field("redirect_uri", &self.redirect_uri)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scope", &self.scope)
            .field("state", &self.state)
            .finish()
    }
}

/// Sends the user to the authorize URL.
///
/// There is no error channel: if opening fails the user can still navigate manually.
pub trait BrowserOpener {
    fn open(&self, url: &str);
}

impl<F> BrowserOpener for F
where
    F: Fn(&str),
{
    fn open(&self, url: &str) {
        self(url)
    }
}

/// Opens the platform default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserOpener for SystemBrowser {
    fn open(&self, url: &str) {
        if let Err(e) = webbrowser::open(url) {
            log::warn!("Failed to open browser ({}), open this URL manually: {}", e, url);
        }
    }
}

pub struct FlowOptions {
    pub callback_port: u16,
    /// `None` waits for the callback forever.
    pub callback_timeout: Option<Duration>,
    /// Raising this flag aborts a pending wait with [`FlowError::Cancelled`].
    /// It is checked once more before the token request; the request itself
    /// is not interrupted.
    pub cancel_flag: Option<Arc<AtomicBool>>,
    pub open_browser: Box<dyn BrowserOpener>,
}

impl FlowOptions {
    pub fn new(callback_port: u16) -> Self {
        Self {
            callback_port,
            callback_timeout: Some(DEFAULT_CALLBACK_TIMEOUT),
            cancel_flag: None,
            open_browser: Box::new(SystemBrowser),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.callback_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    #[must_use]
    pub fn with_browser(mut self, browser: impl BrowserOpener + 'static) -> Self {
        self.open_browser = Box::new(browser);
        self
    }
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self::new(DEFAULT_CALLBACK_PORT)
    }
}

/// Builds the URL the user is sent to.
///
/// Extra query parameters already on `authorize_uri` are kept; the five flow
/// parameters always carry exactly the values from `input`.
pub fn build_authorize_url(input: &FlowInput) -> Result<String, FlowError> {
    let mut authorize_url = Url::parse(&input.authorize_uri).map_err(|source| FlowError::InvalidUri {
        name: "authorize",
        uri: input.authorize_uri.clone(),
        source,
    })?;

    let preserved: Vec<(String, String)> = authorize_url
        .query_pairs()
        .filter(|(key, _)| !AUTHORIZE_PARAMS.iter().any(|param| key == param))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    authorize_url
        .query_pairs_mut()
        .clear()
        .extend_pairs(preserved.iter())
        .append_pair("client_id", &input.client_id)
        .append_pair("redirect_uri", &input.redirect_uri)
        .append_pair("scope", &input.scope)
        .append_pair("response_type", "code")
        .append_pair("state", &input.state);

    Ok(authorize_url.into())
}

/// Path component of the redirect URI, which is the only route the callback server answers.
fn callback_path(redirect_uri: &str) -> Result<String, FlowError> {
    let url = Url::parse(redirect_uri).map_err(|source| FlowError::InvalidUri {
        name: "redirect",
        uri: redirect_uri.to_string(),
        source,
    })?;
    Ok(url.path().to_string())
}

/// Runs a complete authorization code flow:
/// - bind a local server on the redirect path
/// - open the browser on the authorize URL
/// - wait for the first callback and validate it
/// - exchange the code for tokens
///
/// Nothing is retried. The callback server is gone by the time the token
/// request is sent, so the port is free again on every exit path.
pub fn run_authorization_code(input: &FlowInput, opts: &FlowOptions) -> Result<TokenResponse, FlowError> {
    let authorize_url = build_authorize_url(input)?;
    let callback_path = callback_path(&input.redirect_uri)?;

    let server = CallbackServer::start(opts.callback_port, &callback_path, &input.state)?;
    log::info!(
        "Waiting for the authorization callback on port {} at {}",
        server.port(),
        callback_path
    );

    opts.open_browser.open(&authorize_url);

    let code = server
        .wait_for_outcome(opts.callback_timeout, opts.cancel_flag.as_deref())
        .into_result()?;
    log::debug!("Received authorization code {}", code);

    if opts
        .cancel_flag
        .as_deref()
        .is_some_and(|flag| flag.load(Ordering::SeqCst))
    {
        log::info!("Authorization flow cancelled before the token exchange");
        return Err(FlowError::Cancelled);
    }

    exchange_code_for_tokens(input, &code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_input(authorize_uri: &str) -> FlowInput {
        FlowInput {
            authorize_uri: authorize_uri.to_string(),
            token_uri: "https://auth.example.com/oauth/token".to_string(),
            redirect_uri: "http://localhost:9876/oauth/callback".to_string(),
            client_id: "my-client".to_string(),
            client_secret: "s3cret".to_string(),
            scope: "openid profile email".to_string(),
            state: "xyzSTATE".to_string(),
        }
    }

    fn values_of(url: &Url, key: &str) -> Vec<String> {
        url.query_pairs()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
            .collect()
    }

    #[test]
    fn test_authorize_url_carries_flow_parameters() {
        let input = sample_input("https://auth.example.com/oauth/authorize");
        let url = Url::parse(&build_authorize_url(&input).unwrap()).unwrap();

        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("auth.example.com"));
        assert_eq!(url.path(), "/oauth/authorize");

        assert_eq!(values_of(&url, "client_id"), vec!["my-client"]);
        assert_eq!(
            values_of(&url, "redirect_uri"),
            vec!["http://localhost:9876/oauth/callback"]
        );
        assert_eq!(values_of(&url, "scope"), vec!["openid profile email"]);
        assert_eq!(values_of(&url, "response_type"), vec!["code"]);
        assert_eq!(values_of(&url, "state"), vec!["xyzSTATE"]);
    }

    #[test]
    fn test_authorize_url_overrides_and_preserves_query() {
        let input = sample_input(
            "https://auth.example.com/authorize?audience=api&state=old&client_id=old&response_type=token",
        );
        let url = Url::parse(&build_authorize_url(&input).unwrap()).unwrap();

        let pairs: HashMap<String, Vec<String>> =
            url.query_pairs().fold(HashMap::new(), |mut acc, (k, v)| {
                acc.entry(k.into_owned()).or_default().push(v.into_owned());
                acc
            });

        assert_eq!(pairs["audience"], vec!["api"]);
        assert_eq!(pairs["state"], vec!["xyzSTATE"]);
        assert_eq!(pairs["client_id"], vec!["my-client"]);
        assert_eq!(pairs["response_type"], vec!["code"]);
    }

    #[test]
    fn test_invalid_authorize_uri() {
        let input = sample_input("not a url");
        assert!(matches!(
            build_authorize_url(&input),
            Err(FlowError::InvalidUri {
                name: "authorize",
                ..
            })
        ));
    }

    #[test]
    fn test_callback_path_comes_from_redirect_uri() {
        assert_eq!(
            callback_path("http://localhost:9876/oauth/callback").unwrap(),
            "/oauth/callback"
        );
        assert_eq!(callback_path("http://127.0.0.1:8080").unwrap(), "/");
        assert!(matches!(
            callback_path("/relative"),
            Err(FlowError::InvalidUri { name: "redirect", .. })
        ));
    }

    #[test]
    fn test_debug_redacts_client_secret() {
        let input = sample_input("https://auth.example.com/authorize");
        let debug = format!("{:?}", input);
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_invalid_uri_fails_before_browser_opens() {
        let opened = Arc::new(AtomicBool::new(false));
        let opened_clone = opened.clone();
        let opts = FlowOptions::new(DEFAULT_CALLBACK_PORT).with_browser(move |_: &str| {
            opened_clone.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        let input = sample_input("::::");
        assert!(run_authorization_code(&input, &opts).is_err());
        assert!(!opened.load(std::sync::atomic::Ordering::SeqCst));
    }
}
