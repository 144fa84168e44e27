use crate::errors::EngineError;
use crate::message::Role;

/// Configuration for a conversation engine.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EngineConfig {
    /// Upper bound on a single tool call's accumulated argument text.
    #[serde(default = "default_max_argument_bytes")]
    pub max_argument_bytes: usize,
    /// Number of diagnostics retained; older ones are dropped first.
    #[serde(default = "default_max_diagnostics")]
    pub max_diagnostics: usize,
    /// Bounded capacity of the outbound signal channel.
    #[serde(default = "default_outbound_buffer_capacity")]
    pub outbound_buffer_capacity: usize,
    /// Role given to messages created implicitly by a content chunk.
    #[serde(default)]
    pub implicit_message_role: Role,
}

const fn default_max_argument_bytes() -> usize {
    1_048_576
}

const fn default_max_diagnostics() -> usize {
    256
}

const fn default_outbound_buffer_capacity() -> usize {
    128
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_argument_bytes: default_max_argument_bytes(),
            max_diagnostics: default_max_diagnostics(),
            outbound_buffer_capacity: default_outbound_buffer_capacity(),
            implicit_message_role: Role::Assistant,
        }
    }
}

impl EngineConfig {
    /// Builds a config from defaults overridden by environment variables:
    ///
    /// - `CHATSTREAM_MAX_ARGUMENT_BYTES`
    /// - `CHATSTREAM_MAX_DIAGNOSTICS`
    /// - `CHATSTREAM_OUTBOUND_BUFFER`
    pub fn from_env() -> Result<Self, EngineError> {
        let mut config = Self::default();
        if let Some(value) = read_usize("CHATSTREAM_MAX_ARGUMENT_BYTES")? {
            config.max_argument_bytes = value;
        }
        if let Some(value) = read_usize("CHATSTREAM_MAX_DIAGNOSTICS")? {
            config.max_diagnostics = value;
        }
        if let Some(value) = read_usize("CHATSTREAM_OUTBOUND_BUFFER")? {
            config.outbound_buffer_capacity = value;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn max_argument_bytes(mut self, bytes: usize) -> Self {
        self.max_argument_bytes = bytes;
        self
    }

    pub fn max_diagnostics(mut self, count: usize) -> Self {
        self.max_diagnostics = count;
        self
    }

    pub fn outbound_buffer_capacity(mut self, capacity: usize) -> Self {
        self.outbound_buffer_capacity = capacity;
        self
    }

    pub fn implicit_message_role(mut self, role: Role) -> Self {
        self.implicit_message_role = role;
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.outbound_buffer_capacity == 0 {
            return Err(EngineError::Validation(
                "outbound_buffer_capacity must be greater than 0".into(),
            ));
        }
        if self.max_argument_bytes == 0 {
            return Err(EngineError::Validation(
                "max_argument_bytes must be greater than 0".into(),
            ));
        }
        if self.max_diagnostics == 0 {
            return Err(EngineError::Validation(
                "max_diagnostics must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn read_usize(key: &str) -> Result<Option<usize>, EngineError> {
    match std::env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| EngineError::Validation(format!("invalid {key}={raw}: {e}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let config = EngineConfig::default();
        assert_eq!(config.max_argument_bytes, 1_048_576);
        assert_eq!(config.max_diagnostics, 256);
        assert_eq!(config.outbound_buffer_capacity, 128);
        assert_eq!(config.implicit_message_role, Role::Assistant);
    }

    #[test]
    fn zero_outbound_capacity_is_rejected() {
        let err = EngineConfig::default()
            .outbound_buffer_capacity(0)
            .validate()
            .expect_err("zero capacity");
        assert!(matches!(err, EngineError::Validation(msg) if msg.contains("outbound")));
    }

    #[test]
    fn zero_diagnostic_capacity_is_rejected() {
        let err = EngineConfig::default()
            .max_diagnostics(0)
            .validate()
            .expect_err("zero diagnostics");
        assert!(matches!(err, EngineError::Validation(msg) if msg.contains("max_diagnostics")));
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"max_diagnostics": 8}"#).expect("config");
        assert_eq!(config.max_diagnostics, 8);
        assert_eq!(config.outbound_buffer_capacity, 128);
    }
}
