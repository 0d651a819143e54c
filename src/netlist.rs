use arcstr::ArcStr;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A subcircuit as reported by the analysis endpoint.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Subcircuit {
    pub name: ArcStr,
    /// Pins in declaration order.
    pub pins: Vec<ArcStr>,
}

impl Subcircuit {
    pub fn new(name: impl Into<ArcStr>, pins: impl IntoIterator<Item = impl Into<ArcStr>>) -> Self {
        Self {
            name: name.into(),
            pins: pins.into_iter().map(Into::into).collect(),
        }
    }

    #[inline]
    pub fn position(&self, pin: &str) -> Option<usize> {
        self.pins.iter().position(|p| p.as_str() == pin)
    }

    #[inline]
    pub fn has_pin(&self, pin: &str) -> bool {
        self.position(pin).is_some()
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SupplyHints {
    #[serde(default)]
    pub vdd: Vec<String>,
    #[serde(default)]
    pub vss: Vec<String>,
}

/// Pin name aliases the backend uses to guess supply and output pins.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AliasHints {
    pub supplies: SupplyHints,
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl Default for AliasHints {
    fn default() -> Self {
        let owned = |xs: &[&str]| xs.iter().map(|x| x.to_string()).collect();
        Self {
            supplies: SupplyHints {
                vdd: owned(&["VDD", "VCC"]),
                vss: owned(&["VSS", "GND", "0"]),
            },
            outputs: owned(&["Y", "OUT", "Z", "Q"]),
        }
    }
}

/// Pins whose voltages should be returned, kept in declaration order.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PlotNodeSelection {
    nodes: Vec<ArcStr>,
}

impl PlotNodeSelection {
    /// Builds a selection from arbitrary pins of `subckt`, dropping duplicates.
    pub fn new<S: AsRef<str>>(
        subckt: &Subcircuit,
        nodes: impl IntoIterator<Item = S>,
    ) -> Result<Self> {
        let mut indices = Vec::new();
        for node in nodes {
            let node = node.as_ref();
            let idx = subckt
                .position(node)
                .ok_or_else(|| Error::UnknownPin(ArcStr::from(node)))?;
            indices.push(idx);
        }
        Ok(Self::from_indices(subckt, indices))
    }

    /// The default selection for a freshly chosen subcircuit: its first two pins.
    pub fn first_two(subckt: &Subcircuit) -> Self {
        Self {
            nodes: subckt.pins.iter().take(2).cloned().collect(),
        }
    }

    fn from_indices(subckt: &Subcircuit, indices: impl IntoIterator<Item = usize>) -> Self {
        let nodes = indices
            .into_iter()
            .sorted()
            .dedup()
            .map(|i| subckt.pins[i].clone())
            .collect();
        Self { nodes }
    }

    /// Adds `pin` if absent, removes it if present.
    pub fn toggle(&mut self, subckt: &Subcircuit, pin: &str) -> Result<()> {
        if !subckt.has_pin(pin) {
            return Err(Error::UnknownPin(ArcStr::from(pin)));
        }
        if let Some(i) = self.nodes.iter().position(|n| n.as_str() == pin) {
            self.nodes.remove(i);
        } else {
            let indices = self
                .nodes
                .iter()
                .filter_map(|n| subckt.position(n))
                .chain(subckt.position(pin))
                .collect::<Vec<_>>();
            *self = Self::from_indices(subckt, indices);
        }
        Ok(())
    }

    #[inline]
    pub fn nodes(&self) -> &[ArcStr] {
        &self.nodes
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn contains(&self, pin: &str) -> bool {
        self.nodes.iter().any(|n| n.as_str() == pin)
    }
}
