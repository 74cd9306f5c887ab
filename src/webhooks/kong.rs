//! Kong request-log events.
//!
//! Each POSTed event counts as one occurrence. The payload only supplies
//! tags; the single field is a constant `value = 1`.

use crate::metric::{FieldValue, Metric};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

/// Measurement name for Kong webhook events.
pub const MEASUREMENT: &str = "kong_webhooks";

/// Typed view of a Kong log event. Unknown keys are ignored and missing
/// keys decode as empty strings.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RequestEvent {
    pub upstream_uri: String,
    pub request: Request,
    pub response: Response,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Request {
    pub uri: String,
    pub method: String,
    pub headers: Headers,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Headers {
    #[serde(rename = "x-consumer-username")]
    pub consumer_username: String,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Response {
    #[serde(deserialize_with = "string_or_number")]
    pub status: String,
    #[serde(deserialize_with = "string_or_number")]
    pub size: String,
}

/// Kong sends `status` as a number and `size` as a string depending on
/// version and plugin; accept both and keep the text form.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

impl RequestEvent {
    /// Decode a request body. Fails only on structurally invalid JSON.
    pub fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    pub fn tags(&self) -> HashMap<String, String> {
        HashMap::from([
            ("upstream_uri".to_string(), self.upstream_uri.clone()),
            ("request_uri".to_string(), self.request.uri.clone()),
            ("request_method".to_string(), self.request.method.clone()),
            (
                "client".to_string(),
                self.request.headers.consumer_username.clone(),
            ),
            ("response_status".to_string(), self.response.status.clone()),
            ("response_size".to_string(), self.response.size.clone()),
        ])
    }

    pub fn fields(&self) -> HashMap<String, FieldValue> {
        HashMap::from([("value".to_string(), FieldValue::Int(1))])
    }

    pub fn to_metric(&self, timestamp: DateTime<Utc>) -> Metric {
        Metric::new(MEASUREMENT, self.tags(), self.fields(), timestamp)
    }
}
