use serde::{Deserialize, Serialize};

/// Depth of the local undo stack.
pub const DEFAULT_UNDO_DEPTH: usize = 50;
/// Upper bound on auto-resolution passes.
pub const DEFAULT_MAX_PASSES: usize = 5;
/// Sealed sessions kept in the durable resolution log.
pub const DEFAULT_MAX_SESSIONS: usize = 10;
/// Slot the resolution log is stored under.
pub const HISTORY_SLOT_KEY: &str = "resolution_history";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HistoryConfig {
    pub slot_key: String,
    pub max_sessions: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            slot_key: HISTORY_SLOT_KEY.to_string(),
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub undo_depth: usize,
    pub max_resolution_passes: usize,
    pub history: HistoryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            undo_depth: DEFAULT_UNDO_DEPTH,
            max_resolution_passes: DEFAULT_MAX_PASSES,
            history: HistoryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() -> Result<(), serde_json::Error> {
        let config: EngineConfig = serde_json::from_str(r#"{"undoDepth": 3}"#)?;
        assert_eq!(config.undo_depth, 3);
        assert_eq!(config.max_resolution_passes, DEFAULT_MAX_PASSES);
        assert_eq!(config.history, HistoryConfig::default());

        let config: EngineConfig = serde_json::from_str(r#"{"history": {"maxSessions": 2}}"#)?;
        assert_eq!(config.history.max_sessions, 2);
        assert_eq!(config.history.slot_key, HISTORY_SLOT_KEY);
        Ok(())
    }
}
