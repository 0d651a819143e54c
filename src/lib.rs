//! Client for configuring, running and plotting SPICE simulations served by
//! a remote backend.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod fallback;
pub mod netlist;
pub mod orchestrator;
pub mod params;
pub mod paths;
pub mod pins;
pub mod plot;
pub mod request;
pub mod session;
pub mod waveform;

pub use error::{Error, Result};
