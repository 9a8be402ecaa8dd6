use std::time::Duration;

use thiserror::Error;

/// Everything that can stop an authorization code flow before a token is returned.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("can't parse {name} uri '{uri}'")]
    InvalidUri {
        name: &'static str,
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("can't start callback server on port {port}: {reason}")]
    ServerBind { port: u16, reason: String },

    #[error("invalid state. expected:{expected}; got:{actual}")]
    StateMismatch { expected: String, actual: String },

    #[error("oauth server returned an error. code:{code}; description: {description}")]
    AuthServer { code: String, description: String },

    #[error("code is not part of the parameters. url:{url}")]
    MissingCode { url: String },

    #[error("no callback received within {0:?}")]
    Timeout(Duration),

    #[error("authorization flow cancelled")]
    Cancelled,

    #[error("callback server stopped before receiving a callback")]
    ServerStopped,

    #[error("can't build request to the '{uri}' endpoint: {reason}")]
    RequestBuild { uri: String, reason: String },

    #[error("can't send request to the '{uri}' endpoint with code '{code}'")]
    Network {
        uri: String,
        code: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected http status from the '{uri}' endpoint with code '{code}'. expected:200; got:{status}; body: {body}")]
    UnexpectedStatus {
        uri: String,
        code: String,
        status: u16,
        body: String,
    },

    #[error("can't decode successful response from the '{uri}' endpoint with code '{code}'. body: {body}")]
    Decode {
        uri: String,
        code: String,
        body: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing '{field}' from json response. body: {body}")]
    MissingField { field: &'static str, body: String },
}
