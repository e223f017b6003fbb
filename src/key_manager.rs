// src/key_manager.rs

use crate::config::{key_preview, AppConfig, RotationConfig};
use crate::error::{AppError, Result};
use crate::handlers::{Action, ResponseProcessor};
use crate::upstream::{self, Endpoints};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::Client;
use secrecy::SecretString;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// One configured API key and its usage bookkeeping.
#[derive(Debug)]
struct CredentialSlot {
    secret: SecretString,
    preview: String,
    request_count: u32,
    last_used_at: Option<DateTime<Utc>>,
    blocked: bool,
    blocked_until: Option<DateTime<Utc>>,
}

impl CredentialSlot {
    fn new(secret: SecretString, preview: String) -> Self {
        Self {
            secret,
            preview,
            request_count: 0,
            last_used_at: None,
            blocked: false,
            blocked_until: None,
        }
    }

    fn under_quota(&self, max_requests: u32) -> bool {
        !self.blocked && self.request_count < max_requests
    }

    fn block_expired(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until.map_or(true, |until| now > until)
    }
}

/// Slots plus the rotation cursor. Always accessed under the manager's mutex.
#[derive(Debug)]
struct SlotTable {
    slots: Vec<CredentialSlot>,
    cursor: usize,
}

impl SlotTable {
    fn new(slots: Vec<CredentialSlot>) -> Self {
        Self { slots, cursor: 0 }
    }

    /// Clears every block whose cool-down has passed. An expired block restores the
    /// key's full quota.
    fn release_expired_blocks(&mut self, now: DateTime<Utc>) {
        for slot in self.slots.iter_mut().filter(|s| s.blocked) {
            if slot.block_expired(now) {
                slot.blocked = false;
                slot.request_count = 0;
                info!(api_key.preview = %slot.preview, "Unblocked API key");
            }
        }
    }

    /// Picks the slot for the next call.
    ///
    /// Scans circularly from the cursor for a key under quota and leaves the cursor on
    /// it, so one key serves consecutive calls until it is exhausted. When every
    /// unblocked key is over quota, the least recently used one is returned anyway.
    fn select(&mut self, now: DateTime<Utc>, max_requests: u32) -> Result<usize> {
        if self.slots.is_empty() {
            return Err(AppError::NoCredentialsConfigured);
        }
        self.release_expired_blocks(now);

        let len = self.slots.len();
        let under_quota = (0..len)
            .map(|offset| (self.cursor + offset) % len)
            .find(|&index| self.slots[index].under_quota(max_requests));
        if let Some(index) = under_quota {
            self.cursor = index;
            return Ok(index);
        }

        // min_by_key keeps the first minimum, so ties go to the lowest index.
        // `None` (never used) sorts before any timestamp.
        let fallback = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.blocked)
            .min_by_key(|(_, slot)| slot.last_used_at)
            .map(|(index, _)| index);

        match fallback {
            Some(index) => {
                warn!(
                    api_key.preview = %self.slots[index].preview,
                    request_count = self.slots[index].request_count,
                    max_requests,
                    "All available keys are over quota; using least recently used key"
                );
                Ok(index)
            }
            None => Err(AppError::AllCredentialsExhausted),
        }
    }

    fn record_usage(&mut self, index: usize, now: DateTime<Utc>) {
        let slot = &mut self.slots[index];
        slot.request_count += 1;
        slot.last_used_at = Some(now);
    }

    fn block(&mut self, index: usize, until: DateTime<Utc>) {
        let slot = &mut self.slots[index];
        slot.blocked = true;
        slot.blocked_until = Some(until);
    }

    fn available(&self, now: DateTime<Utc>, max_requests: u32) -> usize {
        self.slots
            .iter()
            .filter(|s| s.under_quota(max_requests) && s.block_expired(now))
            .count()
    }
}

/// Quota and cool-down rules applied by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_requests_per_key: u32,
    pub block_duration: Duration,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        (&RotationConfig::default()).into()
    }
}

impl From<&RotationConfig> for RotationPolicy {
    fn from(config: &RotationConfig) -> Self {
        Self {
            max_requests_per_key: config.max_requests_per_key,
            block_duration: Duration::from_secs(config.block_duration_secs),
        }
    }
}

/// Result of a successful lookup: the untouched upstream payload and the preview of
/// the key that served it.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LookupOutcome {
    pub data: Value,
    pub used_key_preview: String,
}

/// Read-only view of one slot for dashboards and logs.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeySnapshot {
    pub key_preview: String,
    pub request_count: u32,
    pub last_used: Option<DateTime<Utc>>,
    pub is_blocked: bool,
    pub block_until: Option<DateTime<Utc>>,
}

/// Rotates MXToolbox API keys across lookups.
///
/// Slots are fixed at construction. Selection, usage recording and blocking each run
/// atomically under one mutex; the lock is never held across an upstream call, so
/// lookups themselves proceed concurrently.
pub struct KeyManager {
    table: Mutex<SlotTable>,
    policy: RotationPolicy,
    block_duration: chrono::Duration,
    client: Client,
    endpoints: Endpoints,
    processor: ResponseProcessor,
}

impl KeyManager {
    /// Builds a manager from configuration, creating its own HTTP client.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = upstream::build_http_client(config)?;
        Ok(Self::new(
            config.api_keys.clone(),
            (&config.rotation).into(),
            client,
            Endpoints::new(config.upstream.endpoints.clone()),
        ))
    }

    #[instrument(skip_all, fields(total_keys = api_keys.len(), max_requests = policy.max_requests_per_key), name = "key_manager_init")]
    pub fn new(
        api_keys: Vec<String>,
        policy: RotationPolicy,
        client: Client,
        endpoints: Endpoints,
    ) -> Self {
        let slots = api_keys
            .into_iter()
            .map(|key| {
                let preview = key_preview(&key);
                CredentialSlot::new(SecretString::new(key), preview)
            })
            .collect::<Vec<_>>();
        info!("Loaded {} MXToolbox API keys", slots.len());

        let block_duration = chrono::Duration::from_std(policy.block_duration)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));

        Self {
            table: Mutex::new(SlotTable::new(slots)),
            policy,
            block_duration,
            client,
            endpoints,
            processor: ResponseProcessor::default(),
        }
    }

    /// Looks up `target` with the next usable key, trying each endpoint variant in turn.
    ///
    /// The chosen key's usage is recorded once per call, after the first HTTP attempt.
    /// A 429 blocks the key for the cool-down and moves on to the next variant; 401 and
    /// 403 end the call at once. A failed call is never retried with a different key;
    /// that choice is left to the caller.
    #[instrument(level = "debug", skip(self), fields(api_key.preview = tracing::field::Empty))]
    pub async fn request(&self, target: &str) -> Result<LookupOutcome> {
        let (index, secret, preview) = {
            let mut table = self.table.lock();
            let index = table.select(Utc::now(), self.policy.max_requests_per_key)?;
            let slot = &table.slots[index];
            (index, slot.secret.clone(), slot.preview.clone())
        };
        tracing::Span::current().record("api_key.preview", preview.as_str());

        let mut last_error: Option<AppError> = None;
        let mut usage_recorded = false;

        for url in self.endpoints.urls_for(target) {
            debug!(api_key.preview = %preview, endpoint = %url, "Using API key for lookup");

            let sent = upstream::lookup_request(&self.client, &url, &secret)
                .send()
                .await;

            if !usage_recorded {
                self.table.lock().record_usage(index, Utc::now());
                usage_recorded = true;
            }

            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    error!(api_key.preview = %preview, endpoint = %url, error = %e, "Error with endpoint");
                    last_error = Some(AppError::Upstream(e));
                    continue;
                }
            };

            let status = response.status();
            match self.processor.decide(status) {
                Action::Accept => match response.json::<Value>().await {
                    Ok(data) => {
                        info!(api_key.preview = %preview, "Lookup succeeded");
                        return Ok(LookupOutcome {
                            data,
                            used_key_preview: preview,
                        });
                    }
                    Err(e) => {
                        error!(api_key.preview = %preview, endpoint = %url, error = %e, "Upstream returned an unreadable body");
                        last_error = Some(AppError::ResponseBody(e.to_string()));
                    }
                },
                Action::BlockKeyAndTryNext => {
                    let until = Utc::now() + self.block_duration;
                    self.table.lock().block(index, until);
                    warn!(api_key.preview = %preview, blocked_until = %until, "API key rate limited, blocking temporarily");
                    last_error = Some(AppError::RateLimited {
                        key_preview: preview.clone(),
                    });
                }
                Action::AbortInvalidCredential => {
                    return Err(AppError::InvalidCredential { key_preview: preview });
                }
                Action::AbortInsufficientPermission => {
                    return Err(AppError::InsufficientPermission { key_preview: preview });
                }
                Action::TryNextEndpoint => {
                    let body = response.text().await.unwrap_or_default();
                    error!(
                        api_key.preview = %preview,
                        endpoint = %url,
                        http.status_code = status.as_u16(),
                        body = %body,
                        "Upstream API error, trying next endpoint"
                    );
                }
            }
        }

        Err(last_error.unwrap_or(AppError::AllEndpointsFailed))
    }

    /// Snapshot of every slot, in configuration order. Never exposes full keys.
    pub fn get_statistics(&self) -> Vec<KeySnapshot> {
        let table = self.table.lock();
        table
            .slots
            .iter()
            .map(|slot| KeySnapshot {
                key_preview: slot.preview.clone(),
                request_count: slot.request_count,
                last_used: slot.last_used_at,
                is_blocked: slot.blocked,
                block_until: if slot.blocked { slot.blocked_until } else { None },
            })
            .collect()
    }

    pub fn get_total_keys(&self) -> usize {
        self.table.lock().slots.len()
    }

    /// Keys that would be selectable under quota right now. Unlike `request`, this
    /// does not clear expired blocks.
    pub fn get_available_keys(&self) -> usize {
        self.table
            .lock()
            .available(Utc::now(), self.policy.max_requests_per_key)
    }

    pub fn max_requests_per_key(&self) -> u32 {
        self.policy.max_requests_per_key
    }

    pub fn block_duration(&self) -> Duration {
        self.policy.block_duration
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub(crate) fn processor(&self) -> &ResponseProcessor {
        &self.processor
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("total_keys", &self.get_total_keys())
            .field("policy", &self.policy)
            .field("endpoints", &self.endpoints.len())
            .finish()
    }
}
