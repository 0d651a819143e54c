use std::collections::BTreeMap;

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};

use super::{DriveKind, DriveParam, PinConfigMap, PinRole};
use crate::error::{Error, Result};
use crate::params::SimulationParameters;

/// Stimulus description for one input pin, as forwarded to the backend.
///
/// Values stay textual; see [`DriveDescriptor::validate`].
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DriveDescriptor {
    Pulse {
        v1: String,
        v2: String,
        td: String,
        tr: String,
        tf: String,
        pw: String,
        per: String,
    },
    Dc {
        dc: String,
    },
}

impl DriveDescriptor {
    fn fields(&self) -> Vec<(DriveParam, &str)> {
        match self {
            DriveDescriptor::Pulse {
                v1,
                v2,
                td,
                tr,
                tf,
                pw,
                per,
            } => vec![
                (DriveParam::V1, v1.as_str()),
                (DriveParam::V2, v2.as_str()),
                (DriveParam::Td, td.as_str()),
                (DriveParam::Tr, tr.as_str()),
                (DriveParam::Tf, tf.as_str()),
                (DriveParam::Pw, pw.as_str()),
                (DriveParam::Per, per.as_str()),
            ],
            DriveDescriptor::Dc { dc } => vec![(DriveParam::Dc, dc.as_str())],
        }
    }

    /// Checks that every field is a finite number. Voltages may be negative,
    /// timings may not.
    pub fn validate(&self, pin: &str) -> Result<()> {
        for (key, value) in self.fields() {
            let bad = |reason| Error::InvalidParameter {
                key: format!("{pin}.{}", key.as_str()),
                value: value.to_string(),
                reason,
            };
            let x = value
                .trim()
                .parse::<f64>()
                .map_err(|_| bad("not a number"))?;
            if !x.is_finite() {
                return Err(bad("must be finite"));
            }
            let is_voltage = matches!(key, DriveParam::Dc | DriveParam::V1 | DriveParam::V2);
            if !is_voltage && x < 0.0 {
                return Err(bad("must not be negative"));
            }
        }
        Ok(())
    }
}

impl PinConfigMap {
    /// Derives a drive for every input pin.
    ///
    /// Pulse fields left blank fall back to the global parameters.
    pub fn build_drive_descriptors(
        &self,
        params: &SimulationParameters,
    ) -> BTreeMap<ArcStr, DriveDescriptor> {
        self.iter()
            .filter(|(_, c)| c.role == PinRole::Input)
            .map(|(pin, c)| {
                let or = |key, default: &str| c.param(key).unwrap_or(default).to_string();
                let drive = match c.drive.unwrap_or_default() {
                    DriveKind::Pulse => DriveDescriptor::Pulse {
                        v1: or(DriveParam::V1, "0"),
                        v2: or(DriveParam::V2, &params.vdd),
                        td: or(DriveParam::Td, "0"),
                        tr: or(DriveParam::Tr, &params.tr),
                        tf: or(DriveParam::Tf, &params.tf),
                        pw: or(DriveParam::Pw, &params.pw),
                        per: or(DriveParam::Per, &params.per),
                    },
                    DriveKind::Dc => DriveDescriptor::Dc {
                        dc: or(DriveParam::Dc, "0"),
                    },
                };
                (pin.clone(), drive)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamKey;

    #[test]
    fn pulse_without_overrides_uses_globals() {
        let mut params = SimulationParameters::default();
        params.set(ParamKey::Vdd, "1.8");
        let cfg = PinConfigMap::new().set_drive_kind("A", DriveKind::Pulse);
        let drives = cfg.build_drive_descriptors(&params);
        assert_eq!(
            drives["A"],
            DriveDescriptor::Pulse {
                v1: "0".into(),
                v2: "1.8".into(),
                td: "0".into(),
                tr: params.tr.clone(),
                tf: params.tf.clone(),
                pw: params.pw.clone(),
                per: params.per.clone(),
            }
        );
    }

    #[test]
    fn overrides_take_precedence_and_blanks_fall_back() {
        let params = SimulationParameters::default();
        let cfg = PinConfigMap::new()
            .set_drive_kind("A", DriveKind::Pulse)
            .set_parameter("A", DriveParam::Td, "1e-10")
            .set_parameter("A", DriveParam::Per, " ");
        match &cfg.build_drive_descriptors(&params)["A"] {
            DriveDescriptor::Pulse { td, per, .. } => {
                assert_eq!(td, "1e-10");
                assert_eq!(per, &params.per);
            }
            other => panic!("expected pulse drive, got {other:?}"),
        }
    }

    #[test]
    fn dc_and_non_inputs() {
        let params = SimulationParameters::default();
        let cfg = PinConfigMap::new()
            .set_role("A", PinRole::Input)
            .set_parameter("B", DriveParam::Dc, "0.9")
            .set_role("Y", PinRole::Output)
            .set_role("VDD", PinRole::Vdd);
        let drives = cfg.build_drive_descriptors(&params);
        assert_eq!(drives.len(), 2);
        assert_eq!(drives["A"], DriveDescriptor::Dc { dc: "0".into() });
        assert_eq!(drives["B"], DriveDescriptor::Dc { dc: "0.9".into() });
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(DriveDescriptor::Dc { dc: "0.5".into() }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "dc", "dc": "0.5"}));
    }

    #[test]
    fn validation_catches_malformed_strings() {
        let ok = DriveDescriptor::Dc { dc: "-0.2".into() };
        assert!(ok.validate("A").is_ok());

        let params = SimulationParameters::default();
        let cfg = PinConfigMap::new()
            .set_drive_kind("A", DriveKind::Pulse)
            .set_parameter("A", DriveParam::Tr, "fast");
        let drives = cfg.build_drive_descriptors(&params);
        match drives["A"].validate("A") {
            Err(Error::InvalidParameter { key, .. }) => assert_eq!(key, "A.tr"),
            other => panic!("expected invalid parameter, got {other:?}"),
        }
    }
}
