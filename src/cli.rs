use clap::{Args, Parser, Subcommand};

use crate::auth::DEFAULT_CALLBACK_PORT;

pub const DEFAULT_CONFIG_DIR: &str = "~/.config/oauth2";

const AUTHORIZE_ABOUT: &str = "\
This command handles the whole classical authorization code flow:

- it reads the expected values (client_id, scope, ...) from the tty and keeps a cache
  of the non sensitive values so they don't have to be typed every time
- it opens the browser with the right authorize parameters
- it spawns an HTTP server to receive the callback code
- it exchanges the authorization code for a token
- it outputs to STDOUT either:
    - the full token response as JSON
    - the access token value
    - the id token value

Don't forget to add the callback URL to the allowed callback URLs of your application.";

/// Handle OAuth 2 flows
#[derive(Parser, Debug)]
#[command(name = "oauth2", version)]
pub struct Cli {
    /// Path to the folder where caching and conf will be stored
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_DIR)]
    pub config: String,

    /// Log debug information to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Handles a full authorization code flow
    #[command(long_about = AUTHORIZE_ABOUT)]
    Authorize(AuthorizeArgs),
    /// Displays the current command line version
    Version,
}

#[derive(Args, Debug, Clone)]
pub struct AuthorizeArgs {
    /// Port used to bind the callback http server
    #[arg(long, default_value_t = DEFAULT_CALLBACK_PORT, value_parser = clap::value_parser!(u16).range(1..))]
    pub http_port: u16,

    /// Read the client secret from STDIN instead of asking for it
    #[arg(long)]
    pub client_secret_stdin: bool,

    /// Output only the access token
    #[arg(long = "only-accesstoken", conflicts_with = "only_id_token")]
    pub only_access_token: bool,

    /// Output only the id token
    #[arg(long = "only-idtoken")]
    pub only_id_token: bool,

    /// Seconds to wait for the browser callback, 0 waits forever
    #[arg(long, default_value_t = 300)]
    pub timeout: u64,

    /// Print the authorize URL instead of opening a browser
    #[arg(long)]
    pub no_browser: bool,

    #[arg(long)]
    pub authorize_uri: Option<String>,

    #[arg(long)]
    pub token_uri: Option<String>,

    #[arg(long)]
    pub redirect_uri: Option<String>,

    #[arg(long)]
    pub client_id: Option<String>,

    #[arg(long)]
    pub scope: Option<String>,

    /// State to send; a random one is generated when left empty
    #[arg(long)]
    pub state: Option<String>,
}
