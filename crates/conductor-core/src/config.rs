//! Runtime tunables for the router, supervisor, tool executor, and LLM
//! circuit breaker, read from the environment the same way
//! `conductor_db::config::DbConfig` reads `CONDUCTOR_DATABASE_URL`.

use std::env;
use std::time::Duration;

/// Process-wide runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// How long an agent instance may go without a heartbeat before the
    /// supervisor marks it ERROR and reassigns its in-flight task.
    pub heartbeat_timeout: Duration,
    /// How often the supervisor sweeps for stale instances.
    pub supervisor_sweep_interval: Duration,
    /// Default timeout applied to a tool call when the tool definition
    /// doesn't specify one.
    pub default_tool_timeout: Duration,
    /// Consecutive LLM provider failures before the circuit breaker opens.
    pub circuit_breaker_failure_threshold: u32,
    /// How long the circuit breaker stays open before probing half-open.
    pub circuit_breaker_cooldown: Duration,
    /// Whether agents without `allow_text_tool_call_fallback` explicitly
    /// set may still fall back to the plain-text tool-call parser.
    pub text_tool_call_fallback_default: bool,
}

impl RuntimeConfig {
    pub const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_SUPERVISOR_SWEEP_SECS: u64 = 5;
    pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_CIRCUIT_BREAKER_FAILURE_THRESHOLD: u32 = 5;
    pub const DEFAULT_CIRCUIT_BREAKER_COOLDOWN_SECS: u64 = 30;

    /// Build a config from the environment, falling back to the
    /// compile-time defaults above for anything unset or unparseable.
    pub fn from_env() -> Self {
        Self {
            heartbeat_timeout: env_secs("CONDUCTOR_HEARTBEAT_TIMEOUT_SECS", Self::DEFAULT_HEARTBEAT_TIMEOUT_SECS),
            supervisor_sweep_interval: env_secs(
                "CONDUCTOR_SUPERVISOR_SWEEP_SECS",
                Self::DEFAULT_SUPERVISOR_SWEEP_SECS,
            ),
            default_tool_timeout: env_secs("CONDUCTOR_TOOL_TIMEOUT_SECS", Self::DEFAULT_TOOL_TIMEOUT_SECS),
            circuit_breaker_failure_threshold: env::var("CONDUCTOR_CIRCUIT_BREAKER_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(Self::DEFAULT_CIRCUIT_BREAKER_FAILURE_THRESHOLD),
            circuit_breaker_cooldown: env_secs(
                "CONDUCTOR_CIRCUIT_BREAKER_COOLDOWN_SECS",
                Self::DEFAULT_CIRCUIT_BREAKER_COOLDOWN_SECS,
            ),
            text_tool_call_fallback_default: env::var("CONDUCTOR_TEXT_TOOL_CALL_FALLBACK_DEFAULT")
                .ok()
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(Self::DEFAULT_HEARTBEAT_TIMEOUT_SECS),
            supervisor_sweep_interval: Duration::from_secs(Self::DEFAULT_SUPERVISOR_SWEEP_SECS),
            default_tool_timeout: Duration::from_secs(Self::DEFAULT_TOOL_TIMEOUT_SECS),
            circuit_breaker_failure_threshold: Self::DEFAULT_CIRCUIT_BREAKER_FAILURE_THRESHOLD,
            circuit_breaker_cooldown: Duration::from_secs(Self::DEFAULT_CIRCUIT_BREAKER_COOLDOWN_SECS),
            text_tool_call_fallback_default: false,
        }
    }
}

fn env_secs(var: &str, default_secs: u64) -> Duration {
    let secs = env::var(var).ok().and_then(|v| v.parse().ok()).unwrap_or(default_secs);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.heartbeat_timeout, Duration::from_secs(30));
        assert_eq!(cfg.supervisor_sweep_interval, Duration::from_secs(5));
        assert_eq!(cfg.default_tool_timeout, Duration::from_secs(30));
        assert_eq!(cfg.circuit_breaker_failure_threshold, 5);
        assert_eq!(cfg.circuit_breaker_cooldown, Duration::from_secs(30));
        assert!(!cfg.text_tool_call_fallback_default);
    }

    #[test]
    fn env_secs_falls_back_on_missing_var() {
        // SAFETY: test-only env read of a variable this test doesn't set.
        unsafe { env::remove_var("CONDUCTOR_DOES_NOT_EXIST") };
        assert_eq!(env_secs("CONDUCTOR_DOES_NOT_EXIST", 42), Duration::from_secs(42));
    }
}
