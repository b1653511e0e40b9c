//! Top-level run configuration, serializable to/from the TOML format
//! (spec §1's ambient config surface). Mirrors `experiment_config.hpp`'s
//! `ExperimentConfig`: one struct carrying every threshold, path, and
//! strategy choice a training/parsing run needs, loadable from a file
//! or built programmatically with [`Config::default`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::em::{EmConfig, EmMode};
use crate::error::{Result, ShrgError};
use crate::parser::{ParseConfig, ParserStrategy};

/// Top-level configuration for a parse or training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// EM convergence threshold, `tau` in spec §4.5.
    pub convergence_threshold: f64,
    pub max_iter: usize,
    pub timeout_s: u64,
    pub output_dir: PathBuf,
    pub pool_capacity: usize,
    pub em_mode: EmMode,
    pub parser_strategy: ParserStrategy,
    pub root_arity: usize,
    pub profiling: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            convergence_threshold: 1e-4,
            max_iter: 100,
            timeout_s: 30,
            output_dir: PathBuf::from("."),
            pool_capacity: 1 << 20,
            em_mode: EmMode::Soft,
            parser_strategy: ParserStrategy::TreeIndexV2,
            root_arity: 0,
            profiling: false,
        }
    }
}

impl Config {
    /// Loads a config from a TOML file, falling back to
    /// [`Config::default`] values for any field the file omits.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ShrgError::from(e).with_context(format!("reading config {}", path.display()))
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Config> {
        toml::from_str(text).map_err(|e| ShrgError::ParseFormat {
            location: "config file".to_string(),
            reason: e.to_string(),
        })
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ShrgError::ParseFormat {
            location: "config serialisation".to_string(),
            reason: e.to_string(),
        })
    }

    /// Derives the parser's own [`ParseConfig`] from this run config.
    pub fn parse_config(&self) -> ParseConfig {
        ParseConfig {
            strategy: self.parser_strategy,
            pool_capacity: self.pool_capacity,
            root_arity: self.root_arity,
        }
    }

    /// Derives an [`EmConfig`] from this run config.
    pub fn em_config(&self) -> EmConfig {
        EmConfig {
            mode: self.em_mode,
            max_iter: self.max_iter,
            tau: self.convergence_threshold,
            timeout: Duration::from_secs(self.timeout_s),
            parse_config: self.parse_config(),
            profiling: self.profiling,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = Config::default();
        let text = config.to_toml_string().unwrap();
        let parsed = Config::load_from_str(&text).unwrap();
        assert_eq!(parsed.max_iter, config.max_iter);
        assert_eq!(parsed.parser_strategy, config.parser_strategy);
    }

    #[test]
    fn partial_toml_fills_remaining_fields_from_defaults() {
        let parsed = Config::load_from_str("max_iter = 5\n").unwrap();
        assert_eq!(parsed.max_iter, 5);
        assert_eq!(parsed.pool_capacity, Config::default().pool_capacity);
    }

    #[test]
    fn malformed_toml_is_a_parse_format_error() {
        let err = Config::load_from_str("not valid toml = = =").unwrap_err();
        assert!(matches!(err, ShrgError::ParseFormat { .. }));
    }
}
