use serde_json::{Map, Value};
use thiserror::Error;

/// Successful outcome of an authorization code flow.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,

    /// Only set when the server returned a string-typed `id_token`.
    pub id_token: Option<String>,

    /// The full decoded JSON object, unknown fields included.
    pub raw_response: Map<String, Value>,
}

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Missing '{0}' field")]
    MissingField(&'static str),
}

/// Decodes a token endpoint body into a [`TokenResponse`].
///
/// The body must be a JSON object with a string `access_token`. Any other
/// shape for `id_token` is treated as if it were absent.
pub fn parse_token_response(body: &str) -> Result<TokenResponse, TokenError> {
    let raw_response: Map<String, Value> = serde_json::from_str(body)?;

    let access_token = raw_response
        .get("access_token")
        .and_then(|v| v.as_str())
        .ok_or(TokenError::MissingField("access_token"))?
        .to_string();

    let id_token = raw_response
        .get("id_token")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    Ok(TokenResponse {
        access_token,
        id_token,
        raw_response,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_response() {
        let body = r#"{"access_token":"T1","id_token":"I1","extra":"E1"}"#;

        let tokens = parse_token_response(body).unwrap();
        assert_eq!(tokens.access_token, "T1");
        assert_eq!(tokens.id_token.as_deref(), Some("I1"));
        assert_eq!(
            tokens.raw_response.get("extra"),
            Some(&Value::String("E1".to_string()))
        );
    }

    #[test]
    fn test_missing_access_token() {
        let err = parse_token_response(r#"{"id_token":"I1"}"#).unwrap_err();
        assert!(matches!(err, TokenError::MissingField("access_token")));
    }

    #[test]
    fn test_access_token_must_be_a_string() {
        let err = parse_token_response(r#"{"access_token":42}"#).unwrap_err();
        assert!(matches!(err, TokenError::MissingField("access_token")));
    }

    #[test]
    fn test_non_string_id_token_is_ignored() {
        let tokens = parse_token_response(r#"{"access_token":"T1","id_token":{"a":1}}"#).unwrap();
        assert_eq!(tokens.id_token, None);

        let tokens = parse_token_response(r#"{"access_token":"T1","id_token":null}"#).unwrap();
        assert_eq!(tokens.id_token, None);
    }

    #[test]
    fn test_body_must_be_a_json_object() {
        assert!(matches!(
            parse_token_response("not json"),
            Err(TokenError::Json(_))
        ));
        assert!(matches!(
            parse_token_response(r#"["access_token"]"#),
            Err(TokenError::Json(_))
        ));
    }
}
