//! Configuration file support for cvdsim.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/cvdsim/config.toml`.
//! Every section is optional; missing keys fall back to the defaults below.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Simulation configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub smoking: SmokingConfig,

    #[serde(default)]
    pub chd: ChdConfig,

    #[serde(default)]
    pub sudden_cardiac_arrest: SuddenCardiacArrestConfig,

    #[serde(default)]
    pub stroke: StrokeConfig,
}

/// Output location for traces and snapshots
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Smoking initiation, decided once at age 16
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SmokingConfig {
    #[serde(default = "default_smoking_probability")]
    pub initiation_probability: f64,
}

impl Default for SmokingConfig {
    fn default() -> Self {
        Self {
            initiation_probability: default_smoking_probability(),
        }
    }
}

/// Cardiac events for entities with coronary heart disease
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChdConfig {
    /// Annual risk of a coronary attack, `[male, female]`
    #[serde(default = "default_coronary_attack_risk")]
    pub coronary_attack_risk: [f64; 2],

    /// Share of coronary attacks that are myocardial infarctions (rest: arrests)
    #[serde(default = "default_mi_proportion")]
    pub mi_proportion: f64,

    /// Probability of surviving a coronary attack
    #[serde(default = "default_survive")]
    pub survive: f64,

    /// Probability that a bystander is present; triples survival
    #[serde(default = "default_bystander")]
    pub bystander: f64,
}

impl Default for ChdConfig {
    fn default() -> Self {
        Self {
            coronary_attack_risk: default_coronary_attack_risk(),
            mi_proportion: default_mi_proportion(),
            survive: default_survive(),
            bystander: default_bystander(),
        }
    }
}

/// Unprovoked sudden cardiac arrest in entities without CHD
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SuddenCardiacArrestConfig {
    /// Annual risk
    #[serde(default = "default_sca_risk")]
    pub risk: f64,

    /// Probability of dying from the arrest (before the bystander effect)
    #[serde(default = "default_sca_death")]
    pub death: f64,
}

impl Default for SuddenCardiacArrestConfig {
    fn default() -> Self {
        Self {
            risk: default_sca_risk(),
            death: default_sca_death(),
        }
    }
}

/// Stroke parameters outside the Framingham tables
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StrokeConfig {
    /// 10-year base rate for ages 20-39, `[male, female]`
    #[serde(default = "default_rate_20_39")]
    pub rate_20_39: [f64; 2],

    /// 10-year base rate for ages 40-54, `[male, female]`
    #[serde(default = "default_rate_40_54")]
    pub rate_40_54: [f64; 2],

    /// Probability that a stroke is fatal
    #[serde(default = "default_stroke_death")]
    pub death: f64,
}

impl Default for StrokeConfig {
    fn default() -> Self {
        Self {
            rate_20_39: default_rate_20_39(),
            rate_40_54: default_rate_40_54(),
            death: default_stroke_death(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cvdsim")
}

fn default_smoking_probability() -> f64 {
    0.181
}

fn default_coronary_attack_risk() -> [f64; 2] {
    [0.042, 0.015]
}

fn default_mi_proportion() -> f64 {
    0.8
}

fn default_survive() -> f64 {
    0.095
}

fn default_bystander() -> f64 {
    0.466
}

fn default_sca_risk() -> f64 {
    0.00076
}

fn default_sca_death() -> f64 {
    0.95
}

fn default_rate_20_39() -> [f64; 2] {
    [0.002, 0.007]
}

fn default_rate_40_54() -> [f64; 2] {
    [0.019, 0.022]
}

fn default_stroke_death() -> f64 {
    0.15
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cvdsim")
            .join("config.toml")
    }

    /// Check that every probability parameter lies in [0, 1]
    pub fn validate(&self) -> Result<()> {
        let [attack_m, attack_f] = self.chd.coronary_attack_risk;
        let [young_m, young_f] = self.stroke.rate_20_39;
        let [middle_m, middle_f] = self.stroke.rate_40_54;

        let checks = [
            ("smoking.initiation_probability", self.smoking.initiation_probability),
            ("chd.coronary_attack_risk[M]", attack_m),
            ("chd.coronary_attack_risk[F]", attack_f),
            ("chd.mi_proportion", self.chd.mi_proportion),
            ("chd.survive", self.chd.survive),
            ("chd.bystander", self.chd.bystander),
            ("sudden_cardiac_arrest.risk", self.sudden_cardiac_arrest.risk),
            ("sudden_cardiac_arrest.death", self.sudden_cardiac_arrest.death),
            ("stroke.rate_20_39[M]", young_m),
            ("stroke.rate_20_39[F]", young_f),
            ("stroke.rate_40_54[M]", middle_m),
            ("stroke.rate_40_54[F]", middle_f),
            ("stroke.death", self.stroke.death),
        ];

        let bad: Vec<String> = checks
            .iter()
            .filter(|(_, value)| !(0.0..=1.0).contains(value))
            .map(|(name, value)| format!("{} = {} is not a probability", name, value))
            .collect();

        if bad.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(bad.join("; ")))
        }
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
