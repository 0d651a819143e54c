//! Per-pin role and drive configuration.
//!
//! Every mutation returns a new [`PinConfigMap`]. Records are shared between
//! versions and never modified in place.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use arcstr::ArcStr;
use log::debug;
use serde::{Deserialize, Serialize};

pub mod drive;

pub use drive::DriveDescriptor;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinRole {
    Input,
    Output,
    Vdd,
    Vss,
}

impl PinRole {
    #[inline]
    pub fn is_supply(&self) -> bool {
        matches!(self, PinRole::Vdd | PinRole::Vss)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PinRole::Input => "input",
            PinRole::Output => "output",
            PinRole::Vdd => "vdd",
            PinRole::Vss => "vss",
        }
    }
}

impl Display for PinRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PinRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "input" | "in" => Ok(PinRole::Input),
            "output" | "out" => Ok(PinRole::Output),
            "vdd" => Ok(PinRole::Vdd),
            "vss" | "gnd" => Ok(PinRole::Vss),
            _ => Err(format!("unknown pin role {s:?}")),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DriveKind {
    #[default]
    Dc,
    Pulse,
}

impl FromStr for DriveKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DC" => Ok(DriveKind::Dc),
            "PULSE" => Ok(DriveKind::Pulse),
            _ => Err(format!("unknown drive kind {s:?}")),
        }
    }
}

/// Per-pin drive parameter names.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveParam {
    Dc,
    V1,
    V2,
    Td,
    Tr,
    Tf,
    Pw,
    Per,
}

impl DriveParam {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriveParam::Dc => "dc",
            DriveParam::V1 => "v1",
            DriveParam::V2 => "v2",
            DriveParam::Td => "td",
            DriveParam::Tr => "tr",
            DriveParam::Tf => "tf",
            DriveParam::Pw => "pw",
            DriveParam::Per => "per",
        }
    }
}

impl FromStr for DriveParam {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "dc" => DriveParam::Dc,
            "v1" => DriveParam::V1,
            "v2" => DriveParam::V2,
            "td" => DriveParam::Td,
            "tr" => DriveParam::Tr,
            "tf" => DriveParam::Tf,
            "pw" => DriveParam::Pw,
            "per" => DriveParam::Per,
            _ => return Err(format!("unknown drive parameter {s:?}")),
        })
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PinConfig {
    pub role: PinRole,
    /// Only set for input pins.
    pub drive: Option<DriveKind>,
    pub params: BTreeMap<DriveParam, String>,
}

impl PinConfig {
    fn input(drive: DriveKind, params: BTreeMap<DriveParam, String>) -> Self {
        Self {
            role: PinRole::Input,
            drive: Some(drive),
            params,
        }
    }

    /// The per-pin override for `key`, if one was entered.
    pub fn param(&self, key: DriveParam) -> Option<&str> {
        self.params
            .get(&key)
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PinConfigMap {
    pins: BTreeMap<ArcStr, Arc<PinConfig>>,
}

impl PinConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, pin: &str) -> Option<&PinConfig> {
        self.pins.get(pin).map(|c| c.as_ref())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ArcStr, &PinConfig)> {
        self.pins.iter().map(|(k, v)| (k, v.as_ref()))
    }

    fn with(&self, pin: &ArcStr, config: PinConfig) -> Self {
        let mut pins = self.pins.clone();
        pins.insert(pin.clone(), Arc::new(config));
        Self { pins }
    }

    #[must_use]
    pub fn set_role(&self, pin: impl Into<ArcStr>, role: PinRole) -> Self {
        let pin = pin.into();
        let config = match role {
            PinRole::Input => {
                let prev = self.get(&pin);
                PinConfig::input(
                    prev.and_then(|c| c.drive).unwrap_or_default(),
                    prev.map(|c| c.params.clone()).unwrap_or_default(),
                )
            }
            role => PinConfig {
                role,
                drive: None,
                params: BTreeMap::new(),
            },
        };
        self.with(&pin, config)
    }

    #[must_use]
    pub fn set_drive_kind(&self, pin: impl Into<ArcStr>, kind: DriveKind) -> Self {
        let pin = pin.into();
        match self.get(&pin) {
            None => self.with(&pin, PinConfig::input(kind, BTreeMap::new())),
            Some(c) if c.role == PinRole::Input => {
                self.with(&pin, PinConfig::input(kind, c.params.clone()))
            }
            Some(c) => {
                debug!("ignoring drive kind for {} pin {pin}", c.role);
                self.clone()
            }
        }
    }

    #[must_use]
    pub fn set_parameter(
        &self,
        pin: impl Into<ArcStr>,
        key: DriveParam,
        value: impl Into<String>,
    ) -> Self {
        let pin = pin.into();
        match self.get(&pin) {
            None => {
                let params = BTreeMap::from([(key, value.into())]);
                self.with(&pin, PinConfig::input(DriveKind::Dc, params))
            }
            Some(c) if c.role == PinRole::Input => {
                let mut params = c.params.clone();
                params.insert(key, value.into());
                self.with(&pin, PinConfig::input(c.drive.unwrap_or_default(), params))
            }
            Some(c) => {
                debug!("ignoring drive parameter {} for {} pin {pin}", key.as_str(), c.role);
                self.clone()
            }
        }
    }

    /// Configured pins holding `role`, in `pin_order`.
    fn pins_with_role<'a>(
        &'a self,
        pin_order: &'a [ArcStr],
        role: PinRole,
    ) -> impl Iterator<Item = &'a ArcStr> + 'a {
        pin_order
            .iter()
            .filter(move |p| self.get(p).map(|c| c.role) == Some(role))
    }

    /// Derives supply, output and input pins.
    ///
    /// Pins are scanned in `pin_order`; when several pins claim vdd or vss the
    /// first one wins. [`PinConfigMap::role_conflicts`] reports such cases.
    pub fn classify_roles(&self, pin_order: &[ArcStr]) -> RoleClassification {
        let vdd = self
            .pins_with_role(pin_order, PinRole::Vdd)
            .next()
            .cloned()
            .unwrap_or_else(|| arcstr::literal!("VDD"));
        let vss = self
            .pins_with_role(pin_order, PinRole::Vss)
            .next()
            .cloned()
            .unwrap_or_else(|| arcstr::literal!("0"));
        let mut outputs = self
            .pins_with_role(pin_order, PinRole::Output)
            .cloned()
            .collect::<Vec<_>>();
        if outputs.is_empty() {
            let fallback = pin_order
                .iter()
                .find(|p| **p != vdd && **p != vss)
                .cloned()
                .unwrap_or_else(|| arcstr::literal!("Y"));
            outputs.push(fallback);
        }
        let inputs = self
            .pins_with_role(pin_order, PinRole::Input)
            .cloned()
            .collect();

        RoleClassification {
            vdd,
            vss,
            outputs,
            inputs,
        }
    }

    /// Supply roles claimed by more than one pin.
    pub fn role_conflicts(&self, pin_order: &[ArcStr]) -> Vec<RoleConflict> {
        [PinRole::Vdd, PinRole::Vss]
            .into_iter()
            .filter_map(|role| {
                let pins = self.pins_with_role(pin_order, role).cloned().collect::<Vec<_>>();
                (pins.len() > 1).then_some(RoleConflict { role, pins })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RoleConflict {
    pub role: PinRole,
    /// All claiming pins; the first is the one used.
    pub pins: Vec<ArcStr>,
}

impl Display for RoleConflict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let pins = self.pins.iter().map(|p| p.as_str()).collect::<Vec<_>>();
        write!(
            f,
            "pins {} are all marked {}; using {}",
            pins.join(", "),
            self.role,
            pins[0]
        )
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct RoleClassification {
    pub vdd: ArcStr,
    pub vss: ArcStr,
    pub outputs: Vec<ArcStr>,
    pub inputs: Vec<ArcStr>,
}
