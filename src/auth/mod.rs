pub mod authorize;
pub mod error;
pub mod oauth_server;
pub mod state;
pub mod token_data;
pub mod token_exchange;

pub use authorize::{
    build_authorize_url, run_authorization_code, BrowserOpener, FlowInput, FlowOptions,
    SystemBrowser, DEFAULT_CALLBACK_PORT, DEFAULT_CALLBACK_TIMEOUT,
};
pub use error::FlowError;
pub use oauth_server::{CallbackOutcome, CallbackServer};
pub use state::generate_state;
pub use token_data::TokenResponse;
