//! Chat orchestration: key selection, limit checks, provider invocation,
//! and the single fallback attempt.
//!
//! One attempt is resolve limits → check-and-reserve → decrypt → invoke.
//! The same sequence runs at most twice: once for the selected key and, when
//! selection was automatic and the provider call failed, once more against
//! the best remaining key. An explicit key id never falls back — the caller
//! asked for that key's behavior, and substituting another key's answer
//! would corrupt side-by-side comparisons.

use std::sync::Arc;

use tracing::{debug, warn};

use super::selector;
use super::usage::UsageRecorder;
use crate::crypto::SecretCodec;
use crate::error::ApiError;
use crate::limits::{self, Admission, LimitKind, RateWindowTracker};
use crate::providers::{AdapterRegistry, ChatOutput, ChatTurn, ProviderKind};
use crate::store::{ApiKeyRecord, UserStore, epoch_millis};

/// One chat request as received from the route layer, already validated
#[derive(Debug, Clone)]
pub struct ChatCommand {
    pub message: String,
    pub key_id: Option<String>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct ChatReply {
    pub response: String,
    pub provider: ProviderKind,
    pub model: String,
    pub key_name: String,
    pub tokens_used: u64,
}

pub struct ChatDispatcher {
    store: Arc<UserStore>,
    tracker: Arc<RateWindowTracker>,
    adapters: Arc<AdapterRegistry>,
    codec: Arc<SecretCodec>,
    recorder: UsageRecorder,
}

impl ChatDispatcher {
    pub fn new(
        store: Arc<UserStore>,
        tracker: Arc<RateWindowTracker>,
        adapters: Arc<AdapterRegistry>,
        codec: Arc<SecretCodec>,
    ) -> Self {
        let recorder = UsageRecorder::new(store.clone());
        Self {
            store,
            tracker,
            adapters,
            codec,
            recorder,
        }
    }

    pub async fn dispatch(&self, user_id: &str, command: &ChatCommand) -> Result<ChatReply, ApiError> {
        let user = self.store.get(user_id).await.ok_or(ApiError::NoApiKeys)?;
        if user.api_keys.is_empty() {
            return Err(ApiError::NoApiKeys);
        }

        let active: Vec<ApiKeyRecord> = user
            .api_keys
            .iter()
            .filter(|k| k.is_active)
            .cloned()
            .collect();
        if active.is_empty() {
            return Err(ApiError::NoActiveKeys);
        }

        // Crude pre-call estimate; the provider-reported count feeds stats
        // only, never the limiter.
        let estimated_tokens = (command.message.chars().count() as u64).div_ceil(4);
        let turn = ChatTurn {
            message: command.message.clone(),
            system_prompt: command.system_prompt.clone(),
            temperature: command.temperature,
        };

        let selected = selector::select(&active, command.key_id.as_deref())
            .map_err(|_| ApiError::InvalidKey)?;

        match self.attempt(user_id, selected, &turn, estimated_tokens).await {
            Ok(output) => {
                self.record_success(user_id, selected, &output).await;
                Ok(reply(selected, output))
            }
            Err(primary_error) => {
                if command.key_id.is_none()
                    && primary_error.is_fallback_eligible()
                    && active.len() > 1
                {
                    let remaining: Vec<ApiKeyRecord> = active
                        .iter()
                        .filter(|k| k.id != selected.id)
                        .cloned()
                        .collect();
                    // Non-empty by the len() > 1 check above
                    if let Ok(fallback) = selector::select(&remaining, None) {
                        debug!(
                            user_id,
                            primary = %selected.id,
                            fallback = %fallback.id,
                            "provider call failed, retrying once against fallback key"
                        );
                        match self.attempt(user_id, fallback, &turn, estimated_tokens).await {
                            Ok(output) => {
                                self.record_success(user_id, fallback, &output).await;
                                return Ok(reply(fallback, output));
                            }
                            Err(fallback_error) => {
                                // The fallback's own provider failure is the
                                // more specific story; a throttled or
                                // undecryptable fallback keeps the primary
                                // error. Either way the originally selected
                                // key takes the error mark.
                                self.recorder.record(user_id, &selected.id, 0, 1).await;
                                let terminal = if matches!(fallback_error, ApiError::Provider { .. })
                                {
                                    fallback_error
                                } else {
                                    primary_error
                                };
                                return Err(terminal);
                            }
                        }
                    }
                }

                if primary_error.is_key_scoped() {
                    self.recorder.record(user_id, &selected.id, 0, 1).await;
                }
                Err(primary_error)
            }
        }
    }

    /// One attempt against one key: limits, admission, decryption, provider.
    async fn attempt(
        &self,
        user_id: &str,
        key: &ApiKeyRecord,
        turn: &ChatTurn,
        estimated_tokens: u64,
    ) -> Result<ChatOutput, ApiError> {
        let effective = limits::resolve(key.provider, &key.model, &key.rate_limit_overrides);

        let admission = self.tracker.check_and_reserve(
            user_id,
            key.provider,
            &key.model,
            &effective,
            estimated_tokens,
            epoch_millis(),
        );
        if let Admission::Limited {
            kind,
            retry_after_secs,
        } = admission
        {
            return Err(ApiError::RateLimited {
                kind,
                message: throttle_message(kind, key, &effective),
                retry_after: retry_after_secs,
            });
        }

        let secret = self.codec.decrypt(&key.encrypted_key).map_err(|e| {
            warn!(key_id = %key.id, "failed to decrypt stored API key: {e}");
            ApiError::Decryption {
                provider: key.provider,
                key_name: key.name.clone(),
                key_id: key.id.clone(),
            }
        })?;

        let adapter =
            self.adapters
                .get(key.provider)
                .ok_or_else(|| ApiError::Provider {
                    provider: key.provider,
                    key_name: key.name.clone(),
                    key_id: key.id.clone(),
                    message: format!(
                        "Support for {} is not enabled on this server.",
                        key.provider.display_name()
                    ),
                })?;

        adapter
            .send_chat(&secret, &key.model, turn)
            .await
            .map_err(|e| ApiError::Provider {
                provider: key.provider,
                key_name: key.name.clone(),
                key_id: key.id.clone(),
                message: e.message,
            })
    }

    async fn record_success(&self, user_id: &str, key: &ApiKeyRecord, output: &ChatOutput) {
        self.recorder
            .record(user_id, &key.id, output.tokens_used, 0)
            .await;
    }
}

fn reply(key: &ApiKeyRecord, output: ChatOutput) -> ChatReply {
    ChatReply {
        response: output.text,
        provider: key.provider,
        model: key.model.clone(),
        key_name: key.name.clone(),
        tokens_used: output.tokens_used,
    }
}

fn throttle_message(kind: LimitKind, key: &ApiKeyRecord, limits: &limits::EffectiveLimits) -> String {
    let scope = format!("{}/{}", key.provider, key.model);
    match kind {
        LimitKind::DailyRequests => format!(
            "Daily limit exceeded for {scope}. Maximum {} requests per day.",
            limits.requests_per_day.unwrap_or_default()
        ),
        LimitKind::MinuteRequests => format!(
            "Rate limit exceeded for {scope}. Maximum {} requests per minute.",
            limits.requests_per_minute.unwrap_or_default()
        ),
        LimitKind::MinuteTokens => format!(
            "Token limit exceeded for {scope}. Maximum {} tokens per minute.",
            limits.tokens_per_minute.unwrap_or_default()
        ),
    }
}
