//! Latest-response diagnostics cache.
//!
//! Each provider route stores its most recent upstream outcome under
//! `<namespace>_<provider>_<route>_latest_response` for 30 days. Writes are
//! best effort: a failing store never fails the route.

use std::time::Duration;

use serde_json::{Value, json};
use tracing::warn;

use crate::ai::provider::{ProviderId, Route};
use crate::constants::diagnostics::{LATEST_RESPONSE_TTL_SECS, NAMESPACE};
use crate::storage::TransientStore;
use crate::types::{QuillError, Result};

pub fn latest_response_key(provider: ProviderId, route: &Route) -> String {
    format!(
        "{}_{}_{}_latest_response",
        NAMESPACE,
        provider.as_str(),
        route.diagnostics_slug()
    )
}

/// Store an upstream outcome. Errors are kept as `{"error": {code, message}}`.
pub fn record(
    store: &dyn TransientStore,
    provider: ProviderId,
    route: &Route,
    outcome: std::result::Result<&Value, &QuillError>,
) {
    let value = match outcome {
        Ok(response) => response.clone(),
        Err(err) => json!({ "error": { "code": err.code(), "message": err.to_string() } }),
    };

    let key = latest_response_key(provider, route);
    if let Err(e) = store.set_transient(
        &key,
        &value,
        Duration::from_secs(LATEST_RESPONSE_TTL_SECS),
    ) {
        warn!(key = %key, error = %e, "Failed to store latest response");
    }
}

pub fn latest(store: &dyn TransientStore, provider: ProviderId, route: &Route) -> Result<Option<Value>> {
    store.get_transient(&latest_response_key(provider, route))
}

/// Render a cached response for a debug table
pub fn format_latest_response(data: Option<&Value>) -> String {
    let Some(data) = data.filter(|v| !is_blank(v)) else {
        return "N/A".to_string();
    };

    if let Some(message) = data
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
    {
        return message.to_string();
    }

    data.to_string().replace(",\"", ", \"")
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(_) => false,
    }
}

/// Formatted latest response for a provider route, "N/A" when unavailable
pub fn formatted_latest(store: &dyn TransientStore, provider: ProviderId, route: &Route) -> String {
    match latest(store, provider, route) {
        Ok(value) => format_latest_response(value.as_ref()),
        Err(e) => {
            warn!(error = %e, "Failed to read latest response");
            format_latest_response(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_key_format() {
        assert_eq!(
            latest_response_key(ProviderId::XaiGrok, &Route::Title),
            "quillmind_xai_grok_title_generation_latest_response"
        );
        assert_eq!(
            latest_response_key(ProviderId::OpenaiDalle, &Route::GenerateImage),
            "quillmind_openai_dalle_image_generation_latest_response"
        );
    }

    #[test]
    fn test_record_success_and_error() {
        let store = MemoryStore::new();
        let response = json!({"choices": [{"message": {"content": "Hi"}}], "id": "x"});

        record(&store, ProviderId::XaiGrok, &Route::Title, Ok(&response));
        assert_eq!(
            latest(&store, ProviderId::XaiGrok, &Route::Title).unwrap(),
            Some(response)
        );

        let err = QuillError::upstream(401, "bad key");
        record(&store, ProviderId::XaiGrok, &Route::Title, Err(&err));
        assert_eq!(
            formatted_latest(&store, ProviderId::XaiGrok, &Route::Title),
            "bad key"
        );
    }

    #[test]
    fn test_format_latest_response() {
        assert_eq!(format_latest_response(None), "N/A");
        assert_eq!(format_latest_response(Some(&json!({}))), "N/A");
        assert_eq!(
            format_latest_response(Some(&json!({"a": 1, "b": 2}))),
            r#"{"a":1, "b":2}"#
        );
    }
}
