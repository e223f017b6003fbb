// src/blacklist.rs

//! Interpretation of MXToolbox blacklist payloads.
//!
//! The key manager hands back the payload untouched; this module decides whether a
//! target is listed and on which lists.

use crate::key_manager::KeyManager;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const UNKNOWN_BLACKLIST: &str = "Unknown Blacklist";

/// Error text attached to a target whose lookup failed inside a batch.
pub const DEGRADED_ERROR: &str = "Failed to check this IP";

/// Reads a field as `T`, or `None` when it is null or of another type.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

/// Reads a list of entries; anything other than an array is an empty list, and an
/// element that is not an object reads as an entry with no fields.
fn lenient_entries<'de, D>(deserializer: D) -> std::result::Result<Vec<BlacklistEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| BlacklistEntry::deserialize(item).unwrap_or_default())
            .collect(),
        _ => Vec::new(),
    };
    Ok(entries)
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|n| !n.is_empty())
}

/// One list entry in a lookup payload. Only the fields used for classification.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct BlacklistEntry {
    #[serde(deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub hostname: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub is_error: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub status: Option<String>,
    #[serde(rename = "IsBlackListed", deserialize_with = "lenient")]
    pub is_blacklisted: Option<bool>,
}

impl BlacklistEntry {
    fn display_name(&self) -> String {
        non_empty(&self.name)
            .or_else(|| non_empty(&self.hostname))
            .unwrap_or(UNKNOWN_BLACKLIST)
            .to_string()
    }

    fn flagged_blacklisted(&self) -> bool {
        self.is_blacklisted.unwrap_or(false)
    }

    fn reports_error(&self) -> bool {
        self.is_error.unwrap_or(false) || self.status.as_deref() == Some("Error")
    }
}

/// Lenient view of a blacklist lookup payload. Unknown fields are ignored and each
/// collection is read independently of its siblings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct BlacklistResponse {
    #[serde(deserialize_with = "lenient")]
    pub command_type: Option<String>,
    #[serde(deserialize_with = "lenient_entries")]
    pub information: Vec<BlacklistEntry>,
    #[serde(deserialize_with = "lenient_entries")]
    pub failed: Vec<BlacklistEntry>,
    #[serde(deserialize_with = "lenient_entries")]
    pub passed: Vec<BlacklistEntry>,
}

impl BlacklistResponse {
    /// Parses the raw payload; a payload that is not an object reads as empty.
    pub fn from_value(payload: &Value) -> Self {
        match serde_json::from_value(payload.clone()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Unexpected blacklist payload shape; treating as empty");
                Self::default()
            }
        }
    }

    /// Names of the lists reporting the target, in payload order.
    pub fn listings(&self) -> Vec<String> {
        let information = self
            .information
            .iter()
            .filter(|e| e.reports_error() || e.flagged_blacklisted());
        let passed = self.passed.iter().filter(|e| e.flagged_blacklisted());

        information
            .chain(self.failed.iter())
            .chain(passed)
            .map(BlacklistEntry::display_name)
            .collect()
    }
}

/// Per-target answer returned to callers.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistVerdict {
    pub ip: String,
    pub is_blacklisted: bool,
    pub blacklists: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BlacklistVerdict {
    /// Verdict for a target whose lookup failed.
    pub fn degraded(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            is_blacklisted: false,
            blacklists: Vec::new(),
            error: Some(DEGRADED_ERROR.to_string()),
        }
    }
}

/// Classifies a raw lookup payload for `ip`. Pure: same payload, same verdict.
pub fn classify(ip: &str, payload: &Value) -> BlacklistVerdict {
    let response = BlacklistResponse::from_value(payload);
    let blacklists = response.listings();
    debug!(
        ip,
        clean = response.passed.len(),
        listed = blacklists.len(),
        "Classified blacklist payload"
    );
    BlacklistVerdict {
        ip: ip.to_string(),
        is_blacklisted: !blacklists.is_empty(),
        blacklists,
        error: None,
    }
}

/// Checks `ips` one after another, pausing `delay` between lookups.
///
/// A failed lookup yields a degraded verdict for that target; the batch always runs
/// to completion.
pub async fn check_batch(manager: &KeyManager, ips: &[String], delay: Duration) -> Vec<BlacklistVerdict> {
    let mut results = Vec::with_capacity(ips.len());
    for (position, ip) in ips.iter().enumerate() {
        if position > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let verdict = match manager.request(ip).await {
            Ok(outcome) => classify(ip, &outcome.data),
            Err(e) => {
                warn!(ip = %ip, error = %e, transient = e.is_transient(), "Blacklist lookup failed");
                BlacklistVerdict::degraded(ip.as_str())
            }
        };
        results.push(verdict);
    }
    results
}
