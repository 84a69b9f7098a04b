//! Engine configuration.
//!
//! Loaded in layers, highest priority last:
//!
//! 1. Default values
//! 2. Configuration file (TOML)
//! 3. Environment variables (`BOVW_*`, e.g. `BOVW_VOCABULARY_SIZE=1000`)

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::*;

/// How document frequencies are turned into IDF weights.
///
/// Both variants are finite and non-negative for every document frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdfSmoothing {
    /// `ln((N + 1) / (df + 1))`. A word present in every image gets weight 0.
    #[default]
    Additive,
    /// `ln((N + 1) / (df + 1)) + 1`. Common words are down-weighted but never dropped.
    AdditivePlusOne,
}

impl IdfSmoothing {
    /// IDF of a word seen in `df` of `n` images.
    pub fn idf(self, n: usize, df: usize) -> f32 {
        let base = ((n as f64 + 1.) / (df as f64 + 1.)).ln().max(0.);
        let idf = match self {
            Self::Additive => base,
            Self::AdditivePlusOne => base + 1.,
        };
        idf as f32
    }
}

/// Parameters of training, indexing and querying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of visual words K. Fixed at training time.
    pub vocabulary_size: usize,
    /// Descriptor dimension every input set must have.
    pub descriptor_dim: usize,
    /// Max descriptors drawn per image for vocabulary training.
    pub sample_cap: usize,
    /// Samples per mini-batch k-means step.
    pub batch_size: usize,
    /// k-means iteration budget.
    pub max_iterations: usize,
    /// Mini-batch k-means stops once no center moves further than this (squared distance).
    pub tolerance: f32,
    /// Length of a ranked result.
    pub top_k: usize,
    /// IDF smoothing rule.
    pub idf_smoothing: IdfSmoothing,
    /// RNG seed for sampling and clustering. `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vocabulary_size: 700,
            descriptor_dim: SIFT_DIM,
            sample_cap: 200,
            batch_size: 2000,
            max_iterations: 100,
            tolerance: 1e-4,
            top_k: 10,
            idf_smoothing: IdfSmoothing::Additive,
            seed: None,
        }
    }
}

impl Config {
    /// Defaults, overridden by the TOML file at `path` (if given) and then by `BOVW_*` variables.
    pub fn load(path: Option<&Path>) -> BowResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            if !path.exists() {
                return Err(BowErr::InvalidConfig(format!(
                    "configuration file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }
        Self::extract(figment.merge(Env::prefixed("BOVW_")))
    }

    /// Defaults overridden by a TOML document.
    pub fn from_toml_str(toml: &str) -> BowResult<Self> {
        Self::extract(
            Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(toml)),
        )
    }

    fn extract(figment: Figment) -> BowResult<Self> {
        let config: Config = figment
            .extract()
            .map_err(|e| BowErr::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BowResult<()> {
        let positive = [
            ("vocabulary_size", self.vocabulary_size),
            ("descriptor_dim", self.descriptor_dim),
            ("sample_cap", self.sample_cap),
            ("batch_size", self.batch_size),
            ("top_k", self.top_k),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(BowErr::InvalidConfig(format!("{key} must be greater than 0")));
            }
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.) {
            return Err(BowErr::InvalidConfig(
                "tolerance must be finite and non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_reference_setup() {
        let config = Config::default();
        assert_eq!(config.vocabulary_size, 700);
        assert_eq!(config.sample_cap, 200);
        assert_eq!(config.top_k, 10);
        assert_eq!(config.descriptor_dim, 128);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = Config::from_toml_str(
            r#"
            vocabulary_size = 64
            top_k = 5
            idf_smoothing = "additive_plus_one"
            seed = 9
            "#,
        )
        .unwrap();
        assert_eq!(config.vocabulary_size, 64);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.idf_smoothing, IdfSmoothing::AdditivePlusOne);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.batch_size, 2000);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "descriptor_dim = 32").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.descriptor_dim, 32);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            Config::from_toml_str("top_k = 0"),
            Err(BowErr::InvalidConfig(_))
        ));
        assert!(matches!(
            Config::from_toml_str("vocabulary_size = \"many\""),
            Err(BowErr::InvalidConfig(_))
        ));
        assert!(Config::load(Some(Path::new("/nonexistent/bovw.toml"))).is_err());
    }

    #[test]
    fn idf_rules() {
        let ln2 = 2f32.ln();
        assert!((IdfSmoothing::Additive.idf(3, 1) - ln2).abs() < 1e-6);
        assert_eq!(IdfSmoothing::Additive.idf(3, 3), 0.);
        assert!((IdfSmoothing::AdditivePlusOne.idf(3, 3) - 1.).abs() < 1e-6);
        assert!((IdfSmoothing::Additive.idf(3, 0) - 4f32.ln()).abs() < 1e-6);
    }
}
