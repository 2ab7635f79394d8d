//! Configuration
//!
//! Driver-level knobs, loaded from:
//! - `weaver.toml` (optional, in the working directory)
//! - Environment variables (`WEAVER_` prefix)
//!
//! ```toml
//! # weaver.toml
//! verbosity = 2
//! output_dir = "build/weaver"
//! ```
//!
//! Environment overrides:
//! ```bash
//! WEAVER_VERBOSITY=3
//! WEAVER_OUTPUT_DIR=/tmp/weave
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeaverConfig {
    /// Diagnostic verbosity, 0..3. Levels 2 and up write DOT dumps.
    #[serde(default)]
    pub verbosity: u8,

    /// Directory all output documents are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Force DOT emission on or off regardless of verbosity
    #[serde(default)]
    pub emit_dot: Option<bool>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for WeaverConfig {
    fn default() -> Self {
        WeaverConfig {
            verbosity: 0,
            output_dir: default_output_dir(),
            emit_dot: None,
        }
    }
}

impl WeaverConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(WeaverConfig::default()))
            .merge(Toml::file("weaver.toml"))
            .merge(Env::prefixed("WEAVER_"))
            .extract()
    }

    /// Whether DOT dumps should be written
    pub fn dot_enabled(&self) -> bool {
        self.emit_dot.unwrap_or(self.verbosity >= 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_quiet() {
        let config = WeaverConfig::default();
        assert_eq!(config.verbosity, 0);
        assert!(!config.dot_enabled());
    }

    #[test]
    fn emit_dot_overrides_verbosity() {
        let config = WeaverConfig {
            verbosity: 0,
            emit_dot: Some(true),
            ..WeaverConfig::default()
        };
        assert!(config.dot_enabled());
    }
}
