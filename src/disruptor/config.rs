//! Disruptor configuration
//!
//! Settings live in a hierarchical tree (a `serde_json::Value`) under a dotted path, e.g.
//! `feeds.cme`, so several disruptors can be configured side by side:
//!
//! ```json
//! { "feeds": { "cme": { "max_msg_size": 1500, "ring_size_exponent": 12, "wait_strategy": "yield" } } }
//! ```

use crate::disruptor::{DisruptorError, Result, MAX_RING_SIZE_EXPONENT};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-disruptor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisruptorConfig {
    /// Maximum bytes per slot for bounded payloads
    pub max_msg_size: u32,
    /// Ring capacity is `2^ring_size_exponent`
    pub ring_size_exponent: u32,
    /// `busy_spin`, `yield` or `block`; required
    pub wait_strategy: Option<String>,
    /// Optional core per stage, in pipeline order
    pub consumer_cores: Vec<usize>,
    /// Dotted path this config was read from, used in error messages
    #[serde(skip)]
    pub path: Option<String>,
}

impl Default for DisruptorConfig {
    fn default() -> Self {
        Self {
            max_msg_size: 4096,
            ring_size_exponent: 10,
            wait_strategy: None,
            consumer_cores: Vec::new(),
            path: None,
        }
    }
}

impl DisruptorConfig {
    /// Defaults with the given wait strategy
    pub fn with_wait_strategy(kind: WaitStrategyKind) -> Self {
        Self {
            wait_strategy: Some(kind.as_str().to_string()),
            ..Self::default()
        }
    }

    /// Read the config found at `path` in `tree`
    ///
    /// A missing node yields the defaults (and, later, a missing-wait-strategy error).
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidConfig` if a key is present with the wrong type.
    pub fn from_tree(tree: &serde_json::Value, path: &str) -> Result<Self> {
        let node = path
            .split('.')
            .filter(|key| !key.is_empty())
            .try_fold(tree, |node, key| node.get(key));

        let mut config = match node {
            Some(node) => Self::deserialize(node).map_err(|e| DisruptorError::InvalidConfig {
                path: path.to_string(),
                reason: e.to_string(),
            })?,
            None => {
                tracing::debug!(path, "no disruptor config found, using defaults");
                Self::default()
            }
        };
        config.path = Some(path.to_string());
        Ok(config)
    }

    /// Ring capacity, `2^ring_size_exponent`
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidRingSizeExponent` above [`MAX_RING_SIZE_EXPONENT`].
    pub fn capacity(&self) -> Result<usize> {
        if self.ring_size_exponent > MAX_RING_SIZE_EXPONENT {
            return Err(DisruptorError::InvalidRingSizeExponent(self.ring_size_exponent));
        }
        Ok(1usize << self.ring_size_exponent)
    }

    /// The selected wait strategy
    ///
    /// # Errors
    /// `MissingWaitStrategy` or `UnknownWaitStrategy`, naming `<path>.wait_strategy`;
    /// `fallback_path` is used when the config was not read from a tree.
    pub fn wait_strategy_kind(&self, fallback_path: &str) -> Result<WaitStrategyKind> {
        let path = self.path.as_deref().unwrap_or(fallback_path);
        match self.wait_strategy.as_deref() {
            None | Some("") => Err(DisruptorError::MissingWaitStrategy {
                path: path.to_string(),
            }),
            Some(value) => value
                .parse()
                .map_err(|UnknownWaitStrategy(value)| DisruptorError::UnknownWaitStrategy {
                    path: path.to_string(),
                    value,
                }),
        }
    }
}

/// The three wait strategies selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStrategyKind {
    BusySpin,
    Yield,
    Block,
}

impl WaitStrategyKind {
    /// The configuration tag: `busy_spin`, `yield` or `block`
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BusySpin => "busy_spin",
            Self::Yield => "yield",
            Self::Block => "block",
        }
    }
}

impl fmt::Display for WaitStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised wait strategy tag
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown wait strategy '{0}'")]
pub struct UnknownWaitStrategy(pub String);

impl FromStr for WaitStrategyKind {
    type Err = UnknownWaitStrategy;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "busy_spin" => Ok(Self::BusySpin),
            "yield" => Ok(Self::Yield),
            "block" => Ok(Self::Block),
            other => Err(UnknownWaitStrategy(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = DisruptorConfig::default();
        assert_eq!(config.max_msg_size, 4096);
        assert_eq!(config.ring_size_exponent, 10);
        assert_eq!(config.capacity().unwrap(), 1024);
        assert!(config.wait_strategy.is_none());
    }

    #[test]
    fn test_from_tree_reads_nested_path() {
        let tree = json!({
            "feeds": {
                "cme": {
                    "max_msg_size": 1500,
                    "ring_size_exponent": 4,
                    "wait_strategy": "block",
                    "consumer_cores": [0]
                }
            }
        });
        let config = DisruptorConfig::from_tree(&tree, "feeds.cme").unwrap();
        assert_eq!(config.max_msg_size, 1500);
        assert_eq!(config.capacity().unwrap(), 16);
        assert_eq!(config.consumer_cores, vec![0]);
        assert_eq!(config.wait_strategy_kind("unused").unwrap(), WaitStrategyKind::Block);
    }

    #[test]
    fn test_missing_node_uses_defaults_but_needs_wait_strategy() {
        let config = DisruptorConfig::from_tree(&json!({}), "feeds.absent").unwrap();
        assert_eq!(config.max_msg_size, 4096);
        let err = config.wait_strategy_kind("ignored").unwrap_err();
        assert!(err.to_string().contains("feeds.absent.wait_strategy"));
    }

    #[test]
    fn test_unknown_wait_strategy_names_path_and_value() {
        let tree = json!({ "d": { "wait_strategy": "bogus" } });
        let config = DisruptorConfig::from_tree(&tree, "d").unwrap();
        let err = config.wait_strategy_kind("d").unwrap_err();
        assert!(matches!(
            &err,
            DisruptorError::UnknownWaitStrategy { path, value } if path == "d" && value == "bogus"
        ));
    }

    #[test]
    fn test_wrong_type_is_invalid_config() {
        let tree = json!({ "d": { "max_msg_size": "big" } });
        assert!(matches!(
            DisruptorConfig::from_tree(&tree, "d"),
            Err(DisruptorError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_oversized_exponent_is_rejected() {
        let config = DisruptorConfig {
            ring_size_exponent: 31,
            ..DisruptorConfig::default()
        };
        assert!(matches!(
            config.capacity(),
            Err(DisruptorError::InvalidRingSizeExponent(31))
        ));
    }

    #[test]
    fn test_wait_strategy_tags_parse() {
        for kind in [
            WaitStrategyKind::BusySpin,
            WaitStrategyKind::Yield,
            WaitStrategyKind::Block,
        ] {
            assert_eq!(kind.as_str().parse::<WaitStrategyKind>().unwrap(), kind);
        }
        assert!("Yield".parse::<WaitStrategyKind>().is_err());
    }
}
