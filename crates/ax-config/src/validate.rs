//! Post-load validation pass.
//!
//! Validation never fails the load; it returns human-readable warnings the
//! CLI prints at startup. Hard errors (bad YAML, unknown enum values) are
//! caught at parse time.

use crate::types::Config;

const KNOWN_LLM: &[&str] = &["claude", "openai-compat"];
const KNOWN_SANDBOX: &[&str] = &["subprocess", "seatbelt", "nsjail", "docker"];
const KNOWN_AUDIT: &[&str] = &["jsonl", "memory"];
const KNOWN_STORE: &[&str] = &["file", "memory"];

/// Check a configuration for suspicious values.
#[must_use]
pub fn validate(config: &Config) -> Vec<String> {
    let mut warnings = Vec::new();

    if !KNOWN_LLM.contains(&config.providers.llm.as_str()) {
        warnings.push(format!("unknown llm provider: {}", config.providers.llm));
    }
    if !KNOWN_SANDBOX.contains(&config.providers.sandbox.as_str()) {
        warnings.push(format!(
            "unknown sandbox backend: {}",
            config.providers.sandbox
        ));
    }
    if !KNOWN_AUDIT.contains(&config.providers.audit.as_str()) {
        warnings.push(format!("unknown audit sink: {}", config.providers.audit));
    }
    if !KNOWN_STORE.contains(&config.providers.memory.as_str()) {
        warnings.push(format!("unknown memory store: {}", config.providers.memory));
    }
    if !KNOWN_STORE.contains(&config.providers.scheduler.as_str()) {
        warnings.push(format!(
            "unknown scheduler store: {}",
            config.providers.scheduler
        ));
    }

    if config.scheduler.active_hours_start > 23 {
        warnings.push(format!(
            "scheduler.active_hours_start out of range: {}",
            config.scheduler.active_hours_start
        ));
    }
    if config.scheduler.active_hours_end > 24 {
        warnings.push(format!(
            "scheduler.active_hours_end out of range: {}",
            config.scheduler.active_hours_end
        ));
    }

    if config.sandbox.timeout_secs == 0 {
        warnings.push("sandbox.timeout_secs is 0; agents will be killed immediately".to_string());
    }

    if config.model.context_window <= config.model.max_tokens {
        warnings.push("model.context_window is not larger than model.max_tokens".to_string());
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_clean() {
        assert!(validate(&Config::default()).is_empty());
    }

    #[test]
    fn test_unknown_provider_warns() {
        let mut config = Config::default();
        config.providers.llm = "gemini".to_string();
        config.providers.sandbox = "vmware".to_string();
        let warnings = validate(&config);
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_zero_timeout_warns() {
        let mut config = Config::default();
        config.sandbox.timeout_secs = 0;
        assert_eq!(validate(&config).len(), 1);
    }
}
