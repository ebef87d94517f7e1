//! Upstream API Request Client
//!
//! Authenticated JSON request/response wrapper shared by every provider.
//!
//! ## Response contract
//! - Transport failure: the client error, unchanged
//! - Body that is not JSON: `InvalidResponseFormat` carrying the raw body
//! - JSON with an `error` field: `Upstream` with the HTTP status as code
//! - Anything else: the parsed JSON

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;

use crate::constants::network::{DEFAULT_GET_TIMEOUT_SECS, DEFAULT_POST_TIMEOUT_SECS};
use crate::types::{QuillError, Result};

const FALLBACK_ERROR_MESSAGE: &str = "An error occurred";

// =============================================================================
// Credentials
// =============================================================================

/// How a provider authenticates. Secrets never appear in `Debug` output.
#[derive(Clone)]
pub enum Credentials {
    Bearer(SecretString),
    Basic {
        username: String,
        password: SecretString,
    },
    /// Key passed in a provider-specific header (`api-key`, `x-goog-api-key`)
    Header { name: String, value: SecretString },
    None,
}

impl Credentials {
    pub fn bearer(key: impl Into<String>) -> Self {
        Self::Bearer(SecretString::from(key.into()))
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Header {
            name: name.into(),
            value: SecretString::from(value.into()),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer([REDACTED])"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::Header { name, .. } => f
                .debug_struct("Header")
                .field("name", name)
                .field("value", &"[REDACTED]")
                .finish(),
            Self::None => f.write_str("None"),
        }
    }
}

// =============================================================================
// Request Options
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json(body: Value) -> Self {
        Self {
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

// =============================================================================
// Api Request
// =============================================================================

/// Request client bound to one set of credentials and a feature scope label
pub struct ApiRequest {
    client: reqwest::Client,
    credentials: Credentials,
    feature: String,
    post_timeout: Duration,
    get_timeout: Duration,
}

impl std::fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRequest")
            .field("credentials", &self.credentials)
            .field("feature", &self.feature)
            .field("post_timeout", &self.post_timeout)
            .field("get_timeout", &self.get_timeout)
            .finish()
    }
}

impl ApiRequest {
    pub fn new(client: reqwest::Client, credentials: Credentials, feature: impl Into<String>) -> Self {
        Self {
            client,
            credentials,
            feature: feature.into(),
            post_timeout: Duration::from_secs(DEFAULT_POST_TIMEOUT_SECS),
            get_timeout: Duration::from_secs(DEFAULT_GET_TIMEOUT_SECS),
        }
    }

    pub fn with_timeouts(mut self, post: Duration, get: Duration) -> Self {
        self.post_timeout = post;
        self.get_timeout = get;
        self
    }

    pub fn feature(&self) -> &str {
        &self.feature
    }

    /// Add `Authorization` and `Content-Type` unless the caller already set
    /// them. Header names compare case-insensitively; calling this twice
    /// yields the same header list.
    pub fn prepare_headers(&self, headers: &mut Vec<(String, String)>) {
        if let Credentials::Bearer(key) = &self.credentials
            && !has_header(headers, "authorization")
        {
            headers.push((
                "Authorization".to_string(),
                format!("Bearer {}", key.expose_secret()),
            ));
        }

        if let Credentials::Header { name, value } = &self.credentials
            && !has_header(headers, name)
        {
            headers.push((name.clone(), value.expose_secret().to_string()));
        }

        if !has_header(headers, "content-type") {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
    }

    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<Value> {
        let timeout = options.timeout.unwrap_or(self.get_timeout);
        self.send(reqwest::Method::GET, url, options, timeout).await
    }

    pub async fn post(&self, url: &str, options: RequestOptions) -> Result<Value> {
        let timeout = options.timeout.unwrap_or(self.post_timeout);
        self.send(reqwest::Method::POST, url, options, timeout).await
    }

    async fn send(
        &self,
        method: reqwest::Method,
        url: &str,
        options: RequestOptions,
        timeout: Duration,
    ) -> Result<Value> {
        let RequestOptions {
            mut headers,
            query,
            body,
            ..
        } = options;
        self.prepare_headers(&mut headers);

        debug!(
            feature = %self.feature,
            %method,
            url,
            "Sending upstream request"
        );

        let mut builder = self.client.request(method, url).timeout(timeout);
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        if let Credentials::Basic { username, password } = &self.credentials
            && !has_header(&headers, "authorization")
        {
            builder = builder.basic_auth(username, Some(password.expose_secret()));
        }
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            builder = builder.body(serde_json::to_vec(&body)?);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        debug!(feature = %self.feature, status, bytes = text.len(), "Received upstream response");
        interpret_response(status, &text)
    }
}

/// Map a raw upstream response onto the uniform result contract
pub fn interpret_response(status: u16, body: &str) -> Result<Value> {
    let json: Value =
        serde_json::from_str(body).map_err(|e| QuillError::InvalidResponseFormat {
            reason: e.to_string(),
            body: body.to_string(),
        })?;

    match json.get("error").filter(|error| !is_blank(error)) {
        Some(error) => {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .or_else(|| error.as_str())
                .unwrap_or(FALLBACK_ERROR_MESSAGE);
            Err(QuillError::upstream(status, message))
        }
        None => Ok(json),
    }
}

/// Blank `error` fields (`null`, `false`, `0`, `""`, `"0"`, `[]`, `{}`) mark success
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(credentials: Credentials) -> ApiRequest {
        ApiRequest::new(reqwest::Client::new(), credentials, "feature_title_generation")
    }

    #[test]
    fn test_interpret_success() {
        let value = interpret_response(200, r#"{"choices": []}"#).unwrap();
        assert_eq!(value, json!({"choices": []}));
    }

    #[test]
    fn test_interpret_blank_error_is_success() {
        for body in [
            r#"{"error": null, "choices": []}"#,
            r#"{"error": "", "choices": []}"#,
            r#"{"error": {}, "choices": []}"#,
            r#"{"error": false, "choices": []}"#,
        ] {
            let value = interpret_response(200, body).unwrap();
            assert_eq!(value["choices"], json!([]), "body {body}");
        }
    }

    #[test]
    fn test_interpret_error_message() {
        let err = interpret_response(401, r#"{"error":{"message":"bad key"}}"#).unwrap_err();
        match err {
            QuillError::Upstream { code, message } => {
                assert_eq!(code, 401);
                assert_eq!(message, "bad key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_interpret_error_string() {
        let err = interpret_response(400, r#"{"error":"Model not found"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Model not found");
        assert_eq!(err.code(), "400");
    }

    #[test]
    fn test_interpret_error_without_message() {
        let err = interpret_response(500, r#"{"error":{"type":"server"}}"#).unwrap_err();
        assert_eq!(err.to_string(), "An error occurred");
    }

    #[test]
    fn test_interpret_invalid_json_keeps_body() {
        let err = interpret_response(502, "<html>Bad Gateway</html>").unwrap_err();
        match err {
            QuillError::InvalidResponseFormat { body, .. } => {
                assert_eq!(body, "<html>Bad Gateway</html>");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_prepare_headers_idempotent() {
        let req = request(Credentials::bearer("sk-test"));
        let mut headers = Vec::new();
        req.prepare_headers(&mut headers);
        let first = headers.clone();
        req.prepare_headers(&mut headers);

        assert_eq!(headers, first);
        assert_eq!(headers.len(), 2);
        assert!(headers.contains(&("Authorization".to_string(), "Bearer sk-test".to_string())));
    }

    #[test]
    fn test_prepare_headers_respects_caller_values() {
        let req = request(Credentials::bearer("sk-test"));
        let mut headers = vec![
            ("authorization".to_string(), "Bearer other".to_string()),
            ("content-type".to_string(), "text/plain".to_string()),
        ];
        req.prepare_headers(&mut headers);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].1, "Bearer other");
    }

    #[test]
    fn test_prepare_headers_custom_key_header() {
        let req = request(Credentials::header("api-key", "azure-secret"));
        let mut headers = Vec::new();
        req.prepare_headers(&mut headers);
        assert!(headers.contains(&("api-key".to_string(), "azure-secret".to_string())));
        assert!(!has_header(&headers, "authorization"));
    }

    #[test]
    fn test_credentials_debug_redacted() {
        let debug = format!("{:?}", Credentials::basic("apikey", "hunter2"));
        assert!(debug.contains("apikey"));
        assert!(!debug.contains("hunter2"));
        let debug = format!("{:?}", Credentials::bearer("sk-live"));
        assert!(!debug.contains("sk-live"));
    }
}
