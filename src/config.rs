use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::netlist::AliasHints;
use crate::params::{ParamKey, PulsePreset, SimulationParameters};

pub const DEFAULT_CONFIG_PATH: &str = "spicewave.toml";
pub const DEFAULT_CREDENTIAL_PATH: &str = ".spicewave/session.json";

/// Per call-class deadlines, in seconds.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub verify_secs: u64,
    pub analyze_secs: u64,
    pub simulate_secs: u64,
    pub legacy_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            verify_secs: 15,
            analyze_secs: 15,
            simulate_secs: 30,
            legacy_secs: 20,
        }
    }
}

impl Timeouts {
    #[inline]
    pub fn verify(&self) -> Duration {
        Duration::from_secs(self.verify_secs)
    }
    #[inline]
    pub fn analyze(&self) -> Duration {
        Duration::from_secs(self.analyze_secs)
    }
    #[inline]
    pub fn simulate(&self) -> Duration {
        Duration::from_secs(self.simulate_secs)
    }
    #[inline]
    pub fn legacy(&self) -> Duration {
        Duration::from_secs(self.legacy_secs)
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Backend base URL. Without one the client runs offline.
    pub base_url: Option<String>,
    pub timeouts: Timeouts,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub credential_path: PathBuf,
    /// Skip token verification, as on a local development host.
    pub trusted: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credential_path: PathBuf::from(DEFAULT_CREDENTIAL_PATH),
            trusted: false,
        }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api: ApiConfig,
    pub session: SessionConfig,
    /// Name of the pulse preset applied at startup.
    pub preset: Option<String>,
    /// Overrides for individual simulation parameters, keyed by name.
    pub params: BTreeMap<String, String>,
    pub hints: AliasHints,
}

impl ClientConfig {
    /// Initial parameters: defaults, then the preset, then explicit overrides.
    pub fn initial_params(&self) -> Result<(SimulationParameters, &'static PulsePreset)> {
        let mut params = SimulationParameters::default();
        let preset = match &self.preset {
            Some(name) => PulsePreset::by_name(name)?,
            None => PulsePreset::standard(),
        };
        params.apply_preset(preset);
        for (key, value) in &self.params {
            let key = key.parse::<ParamKey>().map_err(|_| Error::InvalidParameter {
                key: key.clone(),
                value: value.clone(),
                reason: "unknown parameter",
            })?;
            params.set(key, value.clone());
        }
        Ok((params, preset))
    }
}

pub fn parse_client_config(path: impl AsRef<Path>) -> Result<ClientConfig> {
    let contents = fs::read_to_string(path)?;
    let data = toml::from_str(&contents)?;
    Ok(data)
}

/// Like [`parse_client_config`], but a missing file yields the defaults.
pub fn load_client_config(path: impl AsRef<Path>) -> Result<ClientConfig> {
    let path = path.as_ref();
    if path.exists() {
        parse_client_config(path)
    } else {
        Ok(ClientConfig::default())
    }
}
