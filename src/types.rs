use serde::Deserialize;
use serde_json::Value;

use crate::{PortalError, Result};

/// Body of a successful `/health` response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HealthReport {
    pub status: String,
    pub message: Option<String>,
    pub timestamp: Option<String>,
    pub database: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct UnreadCount {
    pub count: u64,
}

/// Catalogs and settings every portal screen depends on.
#[derive(Clone, Debug, PartialEq)]
pub struct BasicData {
    pub companies: Vec<Value>,
    pub categories: Vec<Value>,
    pub site_settings: Value,
    pub user_stats: Value,
}

impl BasicData {
    pub(crate) fn from_parts(
        companies: Result<Vec<Value>>,
        categories: Result<Vec<Value>>,
        site_settings: Result<Value>,
        user_stats: Result<Value>,
    ) -> Result<Self> {
        Ok(Self {
            companies: companies?,
            categories: categories?,
            site_settings: site_settings?,
            user_stats: user_stats?,
        })
    }
}

/// Unwraps a list endpoint body, which must be a JSON array.
pub(crate) fn expect_array(value: Value, what: &str) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(PortalError::Malformed(format!(
            "expected {what} to be an array, got {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
