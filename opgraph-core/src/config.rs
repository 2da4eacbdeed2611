//! Linker Configuration
//!
//! Knobs that control how linkers allocate and recycle storage and how
//! strictly input containers validate assigned values.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Environment variable that overrides [`LinkerConfig::allow_gc`].
pub const ALLOW_GC_ENV: &str = "OPGRAPH_ALLOW_GC";

/// Configuration shared by the linkers in [`crate::link`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerConfig {
    /// Free intermediate storage as soon as its last consumer has run.
    pub allow_gc: bool,

    /// Input containers reject values that need any conversion.
    pub strict_inputs: bool,

    /// Whether input containers may downcast (e.g. float64 -> float32).
    /// `None` leaves the decision to the type.
    pub allow_downcast: Option<bool>,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            allow_gc: true,
            strict_inputs: false,
            allow_downcast: None,
        }
    }
}

impl LinkerConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Default configuration with `allow_gc` taken from `OPGRAPH_ALLOW_GC`
    /// when it is set to a recognisable boolean.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(ALLOW_GC_ENV) {
            match parse_flag(&raw) {
                Some(flag) => config.allow_gc = flag,
                None => tracing::warn!(value = %raw, "ignoring unrecognised {}", ALLOW_GC_ENV),
            }
        }
        config
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
