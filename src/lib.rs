//! Run OAuth 2 authorization code flows from a terminal.
//!
//! [`auth::run_authorization_code`] is the core: it sends the user to the
//! authorize endpoint, catches the redirect on a local HTTP server and trades
//! the code for tokens. The other modules are the command line around it.

pub mod auth;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod console;
