use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use url::Url;

use crate::auth::authorize::FlowInput;
use crate::auth::error::FlowError;
use crate::auth::token_data::{parse_token_response, TokenError, TokenResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Trades an authorization code for tokens at `input.token_uri`.
///
/// The client credentials are sent twice: in the form body and as HTTP Basic
/// auth. Authorization servers disagree on which one they read.
pub fn exchange_code_for_tokens(input: &FlowInput, code: &str) -> Result<TokenResponse, FlowError> {
    let request_build_error = |reason: String| FlowError::RequestBuild {
        uri: input.token_uri.clone(),
        reason,
    };

    let token_url = Url::parse(&input.token_uri).map_err(|e| request_build_error(e.to_string()))?;

    let client = Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| request_build_error(e.to_string()))?;

    let params = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", input.redirect_uri.as_str()),
        ("client_id", input.client_id.as_str()),
        ("client_secret", input.client_secret.as_str()),
    ];

    let request = client
        .post(token_url)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .basic_auth(&input.client_id, Some(&input.client_secret))
        .form(&params)
        .build()
        .map_err(|e| request_build_error(e.to_string()))?;

    log::debug!("Exchanging authorization code at {}", input.token_uri);

    let network_error = |source: reqwest::Error| FlowError::Network {
        uri: input.token_uri.clone(),
        code: code.to_string(),
        source,
    };

    let response = client.execute(request).map_err(network_error)?;
    let status = response.status();
    let body = response.text().map_err(network_error)?;

    if status != StatusCode::OK {
        log::warn!("Token endpoint answered with status {}", status);
        return Err(FlowError::UnexpectedStatus {
            uri: input.token_uri.clone(),
            code: code.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    match parse_token_response(&body) {
        Ok(tokens) => Ok(tokens),
        Err(TokenError::Json(source)) => Err(FlowError::Decode {
            uri: input.token_uri.clone(),
            code: code.to_string(),
            body,
            source,
        }),
        Err(TokenError::MissingField(field)) => Err(FlowError::MissingField { field, body }),
    }
}
