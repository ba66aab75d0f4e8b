//! Secret masking
//!
//! Values of environment variables carrying the `GW_` prefix are treated as
//! secrets: any occurrence in rendered output is replaced with `[masked]`.
//! Masking applies to display only, never to payloads sent to the API.

use serde_json::Value;

pub const ENV_PREFIX: &str = "GW_";
pub const MASKED: &str = "[masked]";

#[derive(Debug, Clone, Default)]
pub struct Masker {
    secrets: Vec<String>,
}

impl Masker {
    /// Collect secrets from `GW_`-prefixed environment variables.
    pub fn from_env() -> Self {
        let secrets = std::env::vars()
            .filter(|(name, value)| name.starts_with(ENV_PREFIX) && !value.is_empty())
            .map(|(_, value)| value)
            .collect();
        Self { secrets }
    }

    /// A masker that masks nothing (`--no-mask-values`).
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_secrets(secrets: Vec<String>) -> Self {
        Self {
            secrets: secrets.into_iter().filter(|s| !s.is_empty()).collect(),
        }
    }

    pub fn mask_str(&self, text: &str) -> String {
        let mut masked = text.to_string();
        for secret in &self.secrets {
            if masked.contains(secret.as_str()) {
                masked = masked.replace(secret.as_str(), MASKED);
            }
        }
        masked
    }

    /// Recursively mask every string in a JSON value.
    pub fn mask_value(&self, value: &Value) -> Value {
        if self.secrets.is_empty() {
            return value.clone();
        }
        match value {
            Value::String(s) => Value::String(self.mask_str(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.mask_value(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.mask_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_masks_secret_substring() {
        let masker = Masker::with_secrets(vec!["hunter2".to_string()]);
        assert_eq!(masker.mask_str("key=hunter2;"), "key=[masked];");
    }

    #[test]
    fn test_masks_nested_json() {
        let masker = Masker::with_secrets(vec!["hunter2".to_string()]);
        let value = json!({"config": {"password": "hunter2", "port": 443}});
        assert_eq!(
            masker.mask_value(&value),
            json!({"config": {"password": "[masked]", "port": 443}})
        );
    }

    #[test]
    fn test_disabled_masker_is_identity() {
        let masker = Masker::disabled();
        assert_eq!(masker.mask_str("hunter2"), "hunter2");
    }
}
