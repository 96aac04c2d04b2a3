//! Tool-Support Override Cache: tracks, per model id, whether a
//! model supports tool calls, combining a static profile default with a
//! runtime override learned from an error, a user prompt, or an
//! auto-detection probe.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use ccme_settings::types::ToolSupportSettings;

use crate::constants::TOOL_SUPPORT_AUTO_DETECT_TIMEOUT_MS;

/// Where a runtime override came from, which determines whether it expires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverrideSource {
    /// The user explicitly answered a prompt; holds until cleared.
    UserConfirmed,
    /// Learned this session (error detection or auto-probe); expires after
    /// `sessionTtlSec`.
    Session { expires_at_ms: i64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Override {
    supports_tools: bool,
    source: OverrideSource,
}

impl Override {
    fn is_live(&self, now_ms: i64) -> bool {
        match self.source {
            OverrideSource::UserConfirmed => true,
            OverrideSource::Session { expires_at_ms } => now_ms < expires_at_ms,
        }
    }
}

/// Error surface a probe implementation can fail with.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("tool-support probe timed out")]
    Timeout,
    #[error("tool-support probe failed: {0}")]
    Failed(String),
}

/// A minimal-schema tool-call probe sent to the model to auto-detect support.
#[async_trait]
pub trait ToolSupportProbe: Send + Sync {
    async fn probe(&self, model_id: &str) -> Result<(), ProbeError>;
}

/// Recognizable error shapes that indicate a provider rejected a request
/// because it doesn't support tool calls.
const UNSUPPORTED_ERROR_PATTERNS: &[&str] = &[
    "tool_use is not supported",
    "tools are not supported",
    "function calling is not supported",
    "does not support tools",
    "does not support function calling",
];

/// Match an error message/code pair against known tool-unsupported shapes.
#[must_use]
pub fn is_tool_unsupported_error(message: &str, code: Option<&str>) -> bool {
    if code == Some("TOOL_UNSUPPORTED") {
        return true;
    }
    let lower = message.to_lowercase();
    UNSUPPORTED_ERROR_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// Per-model-id override store plus prompt debounce bookkeeping.
pub struct ToolSupportCache {
    settings: ToolSupportSettings,
    overrides: Mutex<HashMap<String, Override>>,
    last_prompted_ms: Mutex<HashMap<String, i64>>,
}

impl ToolSupportCache {
    #[must_use]
    pub fn new(settings: ToolSupportSettings) -> Self {
        Self {
            settings,
            overrides: Mutex::new(HashMap::new()),
            last_prompted_ms: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve whether `model_id` supports tools: live runtime override,
    /// else the static profile flag, else `false`.
    #[must_use]
    pub fn resolve(&self, model_id: &str, static_profile_flag: Option<bool>, now_ms: i64) -> bool {
        let overrides = self.overrides.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(entry) = overrides.get(model_id) {
            if entry.is_live(now_ms) {
                return entry.supports_tools;
            }
        }
        static_profile_flag.unwrap_or(false)
    }

    /// Record a permanent override from an explicit user answer.
    pub fn set_user_confirmed(&self, model_id: &str, supports_tools: bool) {
        self.overrides
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(
                model_id.to_string(),
                Override {
                    supports_tools,
                    source: OverrideSource::UserConfirmed,
                },
            );
    }

    /// Record a session-scoped override that expires after `sessionTtlSec`.
    pub fn set_session_override(&self, model_id: &str, supports_tools: bool, now_ms: i64) {
        let expires_at_ms = now_ms + (self.settings.session_ttl_sec as i64) * 1000;
        self.overrides
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(
                model_id.to_string(),
                Override {
                    supports_tools,
                    source: OverrideSource::Session { expires_at_ms },
                },
            );
    }

    /// Whether to prompt the user for `model_id` right now: no
    /// `user_confirmed` override already in place, and no prompt issued in
    /// the last `promptDebounceSec`.
    pub fn should_prompt(&self, model_id: &str, now_ms: i64) -> bool {
        let has_user_confirmed = self
            .overrides
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(model_id)
            .is_some_and(|o| o.source == OverrideSource::UserConfirmed);
        if has_user_confirmed {
            return false;
        }
        let last_prompted = self.last_prompted_ms.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match last_prompted.get(model_id) {
            Some(&last) => now_ms - last >= (self.settings.prompt_debounce_sec as i64) * 1000,
            None => true,
        }
    }

    /// Mark that a prompt was just issued for `model_id`.
    pub fn record_prompt(&self, model_id: &str, now_ms: i64) {
        self.last_prompted_ms
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(model_id.to_string(), now_ms);
    }

    /// Run an auto-detection probe under the fixed timeout. Success records
    /// a permanent positive override; failure or timeout records a
    /// session-scoped negative override.
    pub async fn auto_detect(&self, model_id: &str, probe: &dyn ToolSupportProbe, now_ms: i64) {
        let outcome = timeout(
            Duration::from_millis(TOOL_SUPPORT_AUTO_DETECT_TIMEOUT_MS),
            probe.probe(model_id),
        )
        .await;
        match outcome {
            Ok(Ok(())) => self.set_user_confirmed(model_id, true),
            Ok(Err(_)) | Err(_) => self.set_session_override(model_id, false, now_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ToolSupportSettings {
        ToolSupportSettings {
            session_ttl_sec: 3_600,
            prompt_debounce_sec: 60,
        }
    }

    #[test]
    fn defaults_to_false_with_no_override_or_profile_flag() {
        let cache = ToolSupportCache::new(settings());
        assert!(!cache.resolve("model-a", None, 0));
    }

    #[test]
    fn falls_back_to_static_profile_flag() {
        let cache = ToolSupportCache::new(settings());
        assert!(cache.resolve("model-a", Some(true), 0));
    }

    #[test]
    fn runtime_override_beats_static_profile_flag() {
        let cache = ToolSupportCache::new(settings());
        cache.set_user_confirmed("model-a", false);
        assert!(!cache.resolve("model-a", Some(true), 0));
    }

    #[test]
    fn session_override_expires_after_ttl() {
        let cache = ToolSupportCache::new(settings());
        cache.set_session_override("model-a", true, 1_000);
        assert!(cache.resolve("model-a", None, 1_000));
        assert!(cache.resolve("model-a", None, 1_000 + 3_600_000 - 1));
        assert!(!cache.resolve("model-a", None, 1_000 + 3_600_000 + 1));
    }

    #[test]
    fn user_confirmed_override_never_expires() {
        let cache = ToolSupportCache::new(settings());
        cache.set_user_confirmed("model-a", true);
        assert!(cache.resolve("model-a", None, i64::MAX - 1));
    }

    #[test]
    fn should_prompt_is_debounced() {
        let cache = ToolSupportCache::new(settings());
        assert!(cache.should_prompt("model-a", 0));
        cache.record_prompt("model-a", 0);
        assert!(!cache.should_prompt("model-a", 59_000));
        assert!(cache.should_prompt("model-a", 60_000));
    }

    #[test]
    fn should_prompt_is_false_once_user_confirmed() {
        let cache = ToolSupportCache::new(settings());
        cache.set_user_confirmed("model-a", false);
        assert!(!cache.should_prompt("model-a", 0));
    }

    #[test]
    fn error_detection_matches_known_patterns_and_explicit_code() {
        assert!(is_tool_unsupported_error("Tool use is not supported for this model", None));
        assert!(is_tool_unsupported_error("boom", Some("TOOL_UNSUPPORTED")));
        assert!(!is_tool_unsupported_error("rate limited", Some("RATE_LIMIT")));
    }

    struct SucceedingProbe;
    #[async_trait]
    impl ToolSupportProbe for SucceedingProbe {
        async fn probe(&self, _model_id: &str) -> Result<(), ProbeError> {
            Ok(())
        }
    }

    struct FailingProbe;
    #[async_trait]
    impl ToolSupportProbe for FailingProbe {
        async fn probe(&self, _model_id: &str) -> Result<(), ProbeError> {
            Err(ProbeError::Failed("nope".to_string()))
        }
    }

    #[tokio::test]
    async fn auto_detect_success_yields_permanent_positive_override() {
        let cache = ToolSupportCache::new(settings());
        cache.auto_detect("model-a", &SucceedingProbe, 0).await;
        assert!(cache.resolve("model-a", None, i64::MAX - 1));
    }

    #[tokio::test]
    async fn auto_detect_failure_yields_session_negative_override() {
        let cache = ToolSupportCache::new(settings());
        cache.auto_detect("model-a", &FailingProbe, 0).await;
        assert!(!cache.resolve("model-a", Some(true), 0));
        assert!(cache.resolve("model-a", Some(true), 3_600_001));
    }
}
