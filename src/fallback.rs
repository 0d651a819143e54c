//! Synthetic inverter response used when no backend can be reached.

use std::collections::BTreeMap;

use crate::params::NumericParams;
use crate::waveform::{ResultMeta, SimulationResult};

/// Number of samples in every generated trace.
pub const SAMPLES: usize = 2000;

pub const INPUT_TRACE: &str = "v(a)";
pub const OUTPUT_TRACE: &str = "v(y)";

/// Smallest output time constant, in seconds.
const MIN_TAU: f64 = 1e-11;

/// Generates a pulse train on [`INPUT_TRACE`] and a first-order low-pass
/// response of its inverse on [`OUTPUT_TRACE`] over `[0, TSTOP)`.
pub fn generate(params: &NumericParams) -> SimulationResult {
    let vdd = params.vdd;
    let tau = f64::max(MIN_TAU, 2.0 * params.tr);
    let dt = params.tstop / SAMPLES as f64;
    let k = 1.0 - (-dt / tau).exp();

    let mut time = Vec::with_capacity(SAMPLES);
    let mut va = Vec::with_capacity(SAMPLES);
    let mut vy: Vec<f64> = Vec::with_capacity(SAMPLES);

    for i in 0..SAMPLES {
        let t = i as f64 * dt;
        let a = if t % params.per < params.pw { vdd } else { 0.0 };
        let target = if a > vdd / 2.0 { 0.0 } else { vdd };
        let last = vy.last().copied().unwrap_or(vdd - a);
        time.push(t);
        va.push(a);
        vy.push(last + (target - last) * k);
    }

    SimulationResult {
        time,
        waveforms: BTreeMap::from([(INPUT_TRACE.to_string(), va), (OUTPUT_TRACE.to_string(), vy)]),
        meta: ResultMeta {
            points: Some(SAMPLES),
            dummy: true,
            ..Default::default()
        },
    }
}
