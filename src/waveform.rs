use std::collections::BTreeMap;
use std::fmt::Display;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_dir: Option<String>,
    /// Set when the data came from the local fallback generator.
    #[serde(default)]
    pub dummy: bool,
    /// Why a degraded result was produced instead of a real one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Transient simulation output: a shared time axis and one trace per label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub time: Vec<f64>,
    pub waveforms: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    pub meta: ResultMeta,
}

/// A borrowed view of one trace.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Trace<'a> {
    pub name: &'a str,
    pub t: &'a [f64],
    pub y: &'a [f64],
}

impl<'a> Display for Trace<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (t, y) in self.t.iter().zip(self.y.iter()) {
            writeln!(f, "{}\t{}", *t, *y)?;
        }
        Ok(())
    }
}

impl SimulationResult {
    /// Checks that every trace is aligned with the time axis.
    pub fn validate(&self) -> Result<()> {
        let n = self.time.len();
        for (name, y) in &self.waveforms {
            if y.len() != n {
                return Err(Error::MalformedResponse(format!(
                    "trace {name} has {} samples but the time axis has {n}",
                    y.len()
                )));
            }
        }
        if self.time.iter().any(|t| !t.is_finite()) {
            return Err(Error::MalformedResponse(
                "time axis contains non-finite values".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses and validates a backend response body.
    pub fn from_json(body: &str) -> Result<Self> {
        let res: Self = serde_json::from_str(body)
            .map_err(|e| Error::MalformedResponse(e.to_string()))?;
        res.validate()?;
        Ok(res)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.time.is_empty() || self.waveforms.is_empty()
    }

    #[inline]
    pub fn is_dummy(&self) -> bool {
        self.meta.dummy
    }

    pub fn traces(&self) -> impl Iterator<Item = Trace<'_>> {
        self.waveforms.iter().map(|(name, y)| Trace {
            name,
            t: &self.time,
            y,
        })
    }

    pub fn trace(&self, name: &str) -> Option<Trace<'_>> {
        self.waveforms.get_key_value(name).map(|(name, y)| Trace {
            name,
            t: &self.time,
            y,
        })
    }

    /// Writes all traces as a tab-separated table, one row per time point.
    ///
    /// Fails without writing anything if the traces are misaligned.
    pub fn save<W>(&self, w: &mut W) -> Result<()>
    where
        W: Write,
    {
        self.validate()?;
        writeln!(w, "# waveforms saved by spicewave")?;
        if self.meta.dummy {
            writeln!(w, "# synthetic data from the fallback generator")?;
        }
        if let Some(err) = &self.meta.error {
            writeln!(w, "# error: {err}")?;
        }
        write!(w, "time")?;
        for name in self.waveforms.keys() {
            write!(w, "\t{name}")?;
        }
        writeln!(w)?;
        for (i, t) in self.time.iter().enumerate() {
            write!(w, "{t}")?;
            for y in self.waveforms.values() {
                write!(w, "\t{}", y[i])?;
            }
            writeln!(w)?;
        }
        Ok(())
    }
}
