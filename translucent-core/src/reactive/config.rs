//! Context Configuration

use serde::{Deserialize, Serialize};

/// Construction options for a [`Context`](super::Context).
///
/// Deserializable so that a host can keep these next to the rest of its
/// settings:
///
/// ```rust
/// use translucent_core::ContextConfig;
///
/// let config: ContextConfig = serde_json::from_str(r#"{"safe": false}"#).unwrap();
/// assert!(!config.safe);
/// assert_eq!(config.memo_capacity, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Enable fingerprint integrity checking.
    pub safe: bool,

    /// Maximum number of cached results per memoized expression. The oldest
    /// entry is evicted first. `None` keeps every entry.
    pub memo_capacity: Option<usize>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            safe: true,
            memo_capacity: None,
        }
    }
}

impl ContextConfig {
    /// Toggle safe mode.
    pub fn safe(mut self, safe: bool) -> Self {
        self.safe = safe;
        self
    }

    /// Bound the memoization cache of every expression.
    pub fn memo_capacity(mut self, capacity: Option<usize>) -> Self {
        self.memo_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_safe_and_unbounded() {
        let config = ContextConfig::default();
        assert!(config.safe);
        assert_eq!(config.memo_capacity, None);
    }

    #[test]
    fn builder_overrides() {
        let config = ContextConfig::default().safe(false).memo_capacity(Some(8));
        assert!(!config.safe);
        assert_eq!(config.memo_capacity, Some(8));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let config: ContextConfig = serde_json::from_str(r#"{"memo_capacity": 2}"#).unwrap();
        assert!(config.safe);
        assert_eq!(config.memo_capacity, Some(2));
    }
}
