//! Backend endpoints and their payloads.

use std::collections::BTreeMap;

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::netlist::{AliasHints, Subcircuit};
use crate::params::NumericParams;
use crate::pins::{DriveDescriptor, RoleClassification};
use crate::request::CancelToken;
use crate::waveform::SimulationResult;

pub mod http;

pub use http::HttpClient;

/// Nodes probed by the legacy demo testbench.
pub const LEGACY_NODES: [&str; 2] = ["a", "y"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzeRequest {
    pub netlist: String,
    pub hints: AliasHints,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub subckts: Vec<Subcircuit>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadedSimulateRequest {
    pub netlist: String,
    pub subckt: Subcircuit,
    pub plot_nodes: Vec<ArcStr>,
    pub params: NumericParams,
    pub roles: RoleClassification,
    pub pin_drives: BTreeMap<ArcStr, DriveDescriptor>,
    pub hints: AliasHints,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacySimulateRequest {
    pub params: NumericParams,
    pub nodes: Vec<String>,
}

impl LegacySimulateRequest {
    pub fn new(params: NumericParams) -> Self {
        Self {
            params,
            nodes: LEGACY_NODES.iter().map(|n| n.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    #[serde(default)]
    pub ngspice: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
}

/// The simulation service.
pub trait SimulationBackend {
    fn analyze(&self, req: &AnalyzeRequest) -> Result<AnalyzeResponse>;

    fn simulate_uploaded(
        &self,
        req: &UploadedSimulateRequest,
        cancel: &CancelToken,
    ) -> Result<SimulationResult>;

    fn simulate(&self, req: &LegacySimulateRequest, cancel: &CancelToken)
        -> Result<SimulationResult>;

    fn health(&self) -> Result<HealthResponse>;
}

/// The authentication service.
pub trait AuthApi {
    /// Exchanges or validates `token`.
    fn verify_token(&self, token: &str) -> Result<TokenResponse>;

    /// Obtains a fresh credential using the session cookie.
    fn refresh(&self) -> Result<TokenResponse>;
}
