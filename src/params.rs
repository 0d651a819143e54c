//! Global simulation parameters.
//!
//! Values are held as strings while they are being edited and only become
//! numbers through [`SimulationParameters::validate`], right before a request
//! is assembled.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParamKey {
    Vdd,
    Cload,
    Tstep,
    Tstop,
    Temp,
    Tr,
    Tf,
    Pw,
    Per,
}

impl ParamKey {
    pub const ALL: [ParamKey; 9] = [
        ParamKey::Vdd,
        ParamKey::Cload,
        ParamKey::Tstep,
        ParamKey::Tstop,
        ParamKey::Temp,
        ParamKey::Tr,
        ParamKey::Tf,
        ParamKey::Pw,
        ParamKey::Per,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKey::Vdd => "VDD",
            ParamKey::Cload => "CLOAD",
            ParamKey::Tstep => "TSTEP",
            ParamKey::Tstop => "TSTOP",
            ParamKey::Temp => "TEMP",
            ParamKey::Tr => "TR",
            ParamKey::Tf => "TF",
            ParamKey::Pw => "PW",
            ParamKey::Per => "PER",
        }
    }

    /// Keys that must be strictly greater than zero.
    fn must_be_positive(&self) -> bool {
        matches!(self, ParamKey::Tstop | ParamKey::Tstep | ParamKey::Per)
    }

    /// Temperature is the only quantity allowed below zero.
    fn may_be_negative(&self) -> bool {
        matches!(self, ParamKey::Temp)
    }
}

impl Display for ParamKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ParamKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ParamKey::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown parameter {s:?}"))
    }
}

/// A named bundle of pulse timing defaults.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PulsePreset {
    pub name: &'static str,
    pub tr: &'static str,
    pub tf: &'static str,
    pub pw: &'static str,
    pub per: &'static str,
}

pub const PULSE_PRESETS: [PulsePreset; 4] = [
    PulsePreset {
        name: "Standard",
        tr: "1e-11",
        tf: "1e-11",
        pw: "5e-10",
        per: "1e-9",
    },
    PulsePreset {
        name: "Slow IO",
        tr: "5e-11",
        tf: "5e-11",
        pw: "1e-9",
        per: "2e-9",
    },
    PulsePreset {
        name: "Fast IO",
        tr: "5e-12",
        tf: "5e-12",
        pw: "2.5e-10",
        per: "5e-10",
    },
    PulsePreset {
        name: "Ultra",
        tr: "1e-12",
        tf: "1e-12",
        pw: "1e-10",
        per: "2e-10",
    },
];

impl PulsePreset {
    #[inline]
    pub fn standard() -> &'static PulsePreset {
        &PULSE_PRESETS[0]
    }

    /// Looks up a preset by name, ignoring case.
    pub fn by_name(name: &str) -> Result<&'static PulsePreset> {
        PULSE_PRESETS
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| Error::UnknownPreset(name.to_string()))
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParameters {
    #[serde(rename = "VDD")]
    pub vdd: String,
    #[serde(rename = "CLOAD")]
    pub cload: String,
    #[serde(rename = "TSTEP")]
    pub tstep: String,
    #[serde(rename = "TSTOP")]
    pub tstop: String,
    #[serde(rename = "TEMP")]
    pub temp: String,
    #[serde(rename = "TR")]
    pub tr: String,
    #[serde(rename = "TF")]
    pub tf: String,
    #[serde(rename = "PW")]
    pub pw: String,
    #[serde(rename = "PER")]
    pub per: String,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        let preset = PulsePreset::standard();
        Self {
            vdd: "1.2".to_string(),
            cload: "5e-15".to_string(),
            tstep: "1e-12".to_string(),
            tstop: "3e-9".to_string(),
            temp: "25".to_string(),
            tr: preset.tr.to_string(),
            tf: preset.tf.to_string(),
            pw: preset.pw.to_string(),
            per: preset.per.to_string(),
        }
    }
}

impl SimulationParameters {
    pub fn get(&self, key: ParamKey) -> &str {
        match key {
            ParamKey::Vdd => &self.vdd,
            ParamKey::Cload => &self.cload,
            ParamKey::Tstep => &self.tstep,
            ParamKey::Tstop => &self.tstop,
            ParamKey::Temp => &self.temp,
            ParamKey::Tr => &self.tr,
            ParamKey::Tf => &self.tf,
            ParamKey::Pw => &self.pw,
            ParamKey::Per => &self.per,
        }
    }

    fn slot(&mut self, key: ParamKey) -> &mut String {
        match key {
            ParamKey::Vdd => &mut self.vdd,
            ParamKey::Cload => &mut self.cload,
            ParamKey::Tstep => &mut self.tstep,
            ParamKey::Tstop => &mut self.tstop,
            ParamKey::Temp => &mut self.temp,
            ParamKey::Tr => &mut self.tr,
            ParamKey::Tf => &mut self.tf,
            ParamKey::Pw => &mut self.pw,
            ParamKey::Per => &mut self.per,
        }
    }

    /// Stores `value` verbatim. Returns `true` if the stored text changed.
    pub fn set(&mut self, key: ParamKey, value: impl Into<String>) -> bool {
        let value = value.into();
        let slot = self.slot(key);
        if *slot == value {
            return false;
        }
        *slot = value;
        true
    }

    /// Overwrites the pulse timing fields with those of `preset`.
    pub fn apply_preset(&mut self, preset: &PulsePreset) -> bool {
        let mut changed = self.set(ParamKey::Tr, preset.tr);
        changed |= self.set(ParamKey::Tf, preset.tf);
        changed |= self.set(ParamKey::Pw, preset.pw);
        changed |= self.set(ParamKey::Per, preset.per);
        changed
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamKey, &str)> + '_ {
        ParamKey::ALL.into_iter().map(move |k| (k, self.get(k)))
    }

    /// Parses every field, rejecting values the backend must never see.
    pub fn validate(&self) -> Result<NumericParams> {
        let num = |key: ParamKey| parse_param(key, self.get(key));
        Ok(NumericParams {
            vdd: num(ParamKey::Vdd)?,
            cload: num(ParamKey::Cload)?,
            tstep: num(ParamKey::Tstep)?,
            tstop: num(ParamKey::Tstop)?,
            temp: num(ParamKey::Temp)?,
            tr: num(ParamKey::Tr)?,
            tf: num(ParamKey::Tf)?,
            pw: num(ParamKey::Pw)?,
            per: num(ParamKey::Per)?,
        })
    }
}

fn parse_param(key: ParamKey, value: &str) -> Result<f64> {
    let x = value
        .trim()
        .parse::<f64>()
        .map_err(|_| Error::invalid_param(key, value, "not a number"))?;
    if !x.is_finite() {
        return Err(Error::invalid_param(key, value, "must be finite"));
    }
    if x < 0.0 && !key.may_be_negative() {
        return Err(Error::invalid_param(key, value, "must not be negative"));
    }
    if x <= 0.0 && key.must_be_positive() {
        return Err(Error::invalid_param(key, value, "must be greater than zero"));
    }
    Ok(x)
}

/// Validated numeric form of [`SimulationParameters`], as sent on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericParams {
    #[serde(rename = "VDD")]
    pub vdd: f64,
    #[serde(rename = "CLOAD")]
    pub cload: f64,
    #[serde(rename = "TSTEP")]
    pub tstep: f64,
    #[serde(rename = "TSTOP")]
    pub tstop: f64,
    #[serde(rename = "TEMP")]
    pub temp: f64,
    #[serde(rename = "TR")]
    pub tr: f64,
    #[serde(rename = "TF")]
    pub tf: f64,
    #[serde(rename = "PW")]
    pub pw: f64,
    #[serde(rename = "PER")]
    pub per: f64,
}

impl NumericParams {
    /// Non-fatal inconsistencies the backend silently corrects.
    pub fn advisories(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.per < self.pw {
            out.push(format!(
                "pulse period {} is shorter than pulse width {}",
                self.per, self.pw
            ));
        }
        // Relative slack so that e.g. 3e-9 against 1e-9 does not trip on rounding.
        if self.tstop < 3.0 * self.per * (1.0 - 1e-9) {
            out.push(format!(
                "stop time {} covers fewer than three pulse periods ({})",
                self.tstop, self.per
            ));
        }
        out
    }
}
