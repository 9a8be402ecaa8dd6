use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Stderr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;

use crate::auth::{
    generate_state, run_authorization_code, FlowInput, FlowOptions, SystemBrowser, TokenResponse,
};
use crate::cache::{load_cache, save_cache, AuthorizeCache};
use crate::cli::AuthorizeArgs;
use crate::console::{PromptReader, ReadOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    RawJson,
    AccessToken,
    IdToken,
}

impl OutputMode {
    pub fn from_args(args: &AuthorizeArgs) -> Self {
        if args.only_access_token {
            OutputMode::AccessToken
        } else if args.only_id_token {
            OutputMode::IdToken
        } else {
            OutputMode::RawJson
        }
    }
}

/// Runs the `authorize` command and returns what should be printed on stdout.
pub fn run_authorize(config_dir: &Path, args: &AuthorizeArgs) -> Result<String> {
    let mode = OutputMode::from_args(args);
    let input = collect_input(config_dir, args)?;
    log::debug!("Starting authorization code flow with {:?}", input);

    let timeout = match args.timeout {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    let mut opts = FlowOptions::new(args.http_port)
        .with_timeout(timeout)
        .with_cancel_flag(install_cancel_handler()?);
    if args.no_browser {
        opts = opts.with_browser(print_url);
    } else {
        opts = opts.with_browser(SystemBrowser);
    }

    let tokens = run_authorization_code(&input, &opts)?;
    render_output(&tokens, mode)
}

pub fn render_output(tokens: &TokenResponse, mode: OutputMode) -> Result<String> {
    match mode {
        OutputMode::AccessToken => Ok(tokens.access_token.clone()),
        OutputMode::IdToken => tokens.id_token.clone().ok_or_else(|| {
            anyhow!(
                "can't get the 'id_token' field from response: {}",
                Value::Object(tokens.raw_response.clone())
            )
        }),
        OutputMode::RawJson => serde_json::to_string_pretty(&tokens.raw_response)
            .context("can't format json response"),
    }
}

pub fn version_info() -> String {
    let mut info = format!("oauth2 version {}", env!("CARGO_PKG_VERSION"));
    if let Some(commit) = option_env!("OAUTH2_CLI_GIT_COMMIT") {
        info.push_str(&format!(", commit {}", commit));
    }
    if let Some(date) = option_env!("OAUTH2_CLI_BUILD_DATE") {
        info.push_str(&format!(", built {}", date));
    }
    info
}

/// Expands a leading `~` to the home directory.
pub fn expand_config_dir(raw: &str) -> Result<PathBuf> {
    if raw.is_empty() {
        let home = dirs::home_dir().context("Could not find home directory")?;
        return Ok(home.join(".config").join("oauth2"));
    }

    match raw.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => {
            let home = dirs::home_dir().context("Could not find home directory")?;
            Ok(home.join(rest.trim_start_matches('/')))
        }
        _ => Ok(PathBuf::from(raw)),
    }
}

fn print_url(url: &str) {
    eprintln!("Open the following URL in your browser to continue:\n\n    {}\n", url);
}

// Ctrl-C only aborts the callback wait; prompts before it keep the default behaviour.
/// First Ctrl-C raises the flag the flow polls. A second one exits at once,
/// which is the only way out of a token request in flight.
fn install_cancel_handler() -> Result<Arc<AtomicBool>> {
    let cancel_flag = Arc::new(AtomicBool::new(false));
    let flag = cancel_flag.clone();
    ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
    })
    .context("can't install Ctrl-C handler")?;
    Ok(cancel_flag)
}

/// Opens `/dev/tty` the first time a value actually has to be asked.
struct TtyPrompts {
    reader: Option<PromptReader<BufReader<File>, Stderr>>,
}

impl TtyPrompts {
    fn new() -> Self {
        Self { reader: None }
    }

    fn ask(&mut self, opts: &ReadOptions<'_>) -> Result<String> {
        let reader = match self.reader.take() {
            Some(reader) => reader,
            None => {
                let tty = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open("/dev/tty")
                    .context("can't open /dev/tty")?;
                PromptReader::new(BufReader::new(tty), io::stderr())
            }
        };
        let reader = self.reader.insert(reader);

        reader
            .read_with_options(opts)
            .with_context(|| format!("can't read {}", opts.prompt))
    }
}

/// Flag value if given, otherwise the tty answer.
fn resolve(flag: &Option<String>, prompts: &mut TtyPrompts, opts: ReadOptions<'_>) -> Result<String> {
    match flag {
        Some(value) => Ok(value.clone()),
        None => prompts.ask(&opts),
    }
}

fn remember(config_dir: &Path, cache: &AuthorizeCache) {
    if let Err(e) = save_cache(config_dir, cache) {
        log::warn!("Failed to save cache: {:#}", e);
    }
}

fn collect_input(config_dir: &Path, args: &AuthorizeArgs) -> Result<FlowInput> {
    let mut cache = load_cache(config_dir).unwrap_or_else(|e| {
        log::warn!("Ignoring cache: {:#}", anyhow::Error::from(e));
        AuthorizeCache::default()
    });

    let stdin_secret = if args.client_secret_stdin {
        let mut data = String::new();
        io::stdin()
            .read_to_string(&mut data)
            .context("can't read clientSecret from STDIN")?;
        Some(data.trim().to_string())
    } else {
        None
    };

    let mut prompts = TtyPrompts::new();

    cache.authorize_uri = resolve(
        &args.authorize_uri,
        &mut prompts,
        ReadOptions {
            prompt: "Authorize URI",
            default_value: &cache.authorize_uri,
            required: true,
        },
    )?;
    remember(config_dir, &cache);

    cache.token_uri = resolve(
        &args.token_uri,
        &mut prompts,
        ReadOptions {
            prompt: "Token URI",
            default_value: &cache.token_uri,
            required: true,
        },
    )?;
    remember(config_dir, &cache);

    let default_redirect_uri = format!("http://localhost:{}/oauth/callback", args.http_port);
    let redirect_uri = resolve(
        &args.redirect_uri,
        &mut prompts,
        ReadOptions {
            prompt: "Redirect URI",
            default_value: &default_redirect_uri,
            required: true,
        },
    )?;

    cache.client_id = resolve(
        &args.client_id,
        &mut prompts,
        ReadOptions {
            prompt: "Client ID",
            default_value: &cache.client_id,
            required: true,
        },
    )?;
    remember(config_dir, &cache);

    let client_secret = match stdin_secret {
        Some(secret) => secret,
        None => prompts.ask(&ReadOptions {
            prompt: "Client Secret",
            ..ReadOptions::default()
        })?,
    };

    cache.scope = resolve(
        &args.scope,
        &mut prompts,
        ReadOptions {
            prompt: "Scope",
            default_value: &cache.scope,
            required: true,
        },
    )?;
    remember(config_dir, &cache);

    let mut state = resolve(
        &args.state,
        &mut prompts,
        ReadOptions {
            prompt: "State",
            ..ReadOptions::default()
        },
    )?;
    if state.is_empty() {
        state = generate_state();
    }

    Ok(FlowInput {
        authorize_uri: cache.authorize_uri,
        token_uri: cache.token_uri,
        redirect_uri,
        client_id: cache.client_id,
        client_secret,
        scope: cache.scope,
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_tokens(id_token: Option<&str>) -> TokenResponse {
        let mut raw = json!({"access_token": "T1", "extra": "E1"});
        if let Some(id_token) = id_token {
            raw["id_token"] = json!(id_token);
        }
        TokenResponse {
            access_token: "T1".to_string(),
            id_token: id_token.map(|s| s.to_string()),
            raw_response: raw.as_object().unwrap().clone(),
        }
    }

    #[test]
    fn test_render_access_token_only() {
        let out = render_output(&sample_tokens(None), OutputMode::AccessToken).unwrap();
        assert_eq!(out, "T1");
    }

    #[test]
    fn test_render_id_token_only() {
        let out = render_output(&sample_tokens(Some("I1")), OutputMode::IdToken).unwrap();
        assert_eq!(out, "I1");
    }

    #[test]
    fn test_missing_id_token_is_an_error() {
        let err = render_output(&sample_tokens(None), OutputMode::IdToken).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("id_token"));
        assert!(message.contains("\"extra\":\"E1\""));
    }

    #[test]
    fn test_render_raw_json_is_pretty() {
        let out = render_output(&sample_tokens(Some("I1")), OutputMode::RawJson).unwrap();
        assert!(out.contains("\n  \"extra\": \"E1\""));

        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["id_token"], "I1");
    }

    #[test]
    fn test_flags_skip_prompts() {
        let dir = tempfile::tempdir().unwrap();
        let args = AuthorizeArgs {
            http_port: 9876,
            client_secret_stdin: false,
            only_access_token: false,
            only_id_token: false,
            timeout: 300,
            no_browser: true,
            authorize_uri: Some("https://auth.example.com/authorize".to_string()),
            token_uri: Some("https://auth.example.com/token".to_string()),
            redirect_uri: None,
            client_id: Some("my-client".to_string()),
            scope: Some("openid".to_string()),
            state: Some("fixed".to_string()),
        };

        let mut prompts = TtyPrompts::new();
        let value = resolve(
            &args.client_id,
            &mut prompts,
            ReadOptions {
                prompt: "Client ID",
                ..ReadOptions::default()
            },
        )
        .unwrap();
        assert_eq!(value, "my-client");
        assert!(prompts.reader.is_none());

        let cache = AuthorizeCache {
            client_id: value,
            ..AuthorizeCache::default()
        };
        remember(dir.path(), &cache);
        assert_eq!(load_cache(dir.path()).unwrap().client_id, "my-client");
    }

    #[test]
    fn test_output_mode_from_args() {
        let mut args = crate::cli::AuthorizeArgs {
            http_port: 9876,
            client_secret_stdin: false,
            only_access_token: true,
            only_id_token: false,
            timeout: 0,
            no_browser: false,
            authorize_uri: None,
            token_uri: None,
            redirect_uri: None,
            client_id: None,
            scope: None,
            state: None,
        };
        assert_eq!(OutputMode::from_args(&args), OutputMode::AccessToken);

        args.only_access_token = false;
        args.only_id_token = true;
        assert_eq!(OutputMode::from_args(&args), OutputMode::IdToken);

        args.only_id_token = false;
        assert_eq!(OutputMode::from_args(&args), OutputMode::RawJson);
    }

    #[test]
    fn test_expand_config_dir() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(
            expand_config_dir("~/.config/oauth2").unwrap(),
            home.join(".config/oauth2")
        );
        assert_eq!(expand_config_dir("~").unwrap(), home.join(""));
        assert_eq!(
            expand_config_dir("/etc/oauth2").unwrap(),
            PathBuf::from("/etc/oauth2")
        );
        assert_eq!(
            expand_config_dir("~other/x").unwrap(),
            PathBuf::from("~other/x")
        );
    }

    #[test]
    fn test_version_info() {
        assert!(version_info().starts_with(&format!("oauth2 version {}", env!("CARGO_PKG_VERSION"))));
    }
}
