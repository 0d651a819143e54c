use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_PATH;
use crate::params::ParamKey;
use crate::pins::{DriveKind, DriveParam, PinRole};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about,
    help_template(
        "{before-help}{name} {version}\n{author-with-newline}{about-with-newline}\n{usage-heading} {usage}\n\n{all-args}{after-help}"
    )
)]
pub struct Args {
    /// Path to TOML configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Directory to which output files should be saved.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// URL the client was launched from. A `token` query parameter is
    /// exchanged for a session credential.
    #[arg(long)]
    pub launch_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that the backend and its simulator are reachable.
    Health,
    /// Verify the session credential and exit.
    Verify,
    /// Simulate the built-in inverter testbench.
    Demo(DemoArgs),
    /// List the subcircuits declared in a netlist.
    Analyze {
        /// SPICE netlist to upload.
        netlist: PathBuf,
    },
    /// Simulate a subcircuit of an uploaded netlist.
    Simulate(SimulateArgs),
}

#[derive(clap::Args, Debug, Default)]
pub struct ParamArgs {
    /// Pulse timing preset (Standard, Slow IO, Fast IO, Ultra).
    #[arg(long)]
    pub preset: Option<String>,

    /// Override a global parameter, e.g. `--set VDD=1.0`.
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub set: Vec<(ParamKey, String)>,
}

#[derive(clap::Args, Debug)]
pub struct DemoArgs {
    #[command(flatten)]
    pub params: ParamArgs,

    /// Apply edits in auto mode, so the run fires after the quiet period.
    #[arg(long)]
    pub auto: bool,
}

#[derive(clap::Args, Debug)]
pub struct SimulateArgs {
    /// SPICE netlist to upload.
    pub netlist: PathBuf,

    /// Subcircuit to simulate.
    #[arg(long)]
    pub subckt: String,

    /// Pins to plot. Defaults to the first two pins of the subcircuit.
    #[arg(long, value_delimiter = ',')]
    pub plot: Vec<String>,

    /// Assign a role to a pin, e.g. `--pin A=input:pulse` or `--pin VDD=vdd`.
    #[arg(long = "pin", value_name = "PIN=ROLE[:DRIVE]", value_parser = parse_pin)]
    pub pins: Vec<PinSpec>,

    /// Override a drive parameter of an input pin, e.g. `--drive A.pw=1e-10`.
    #[arg(long = "drive", value_name = "PIN.KEY=VALUE", value_parser = parse_drive)]
    pub drives: Vec<DriveOverride>,

    #[command(flatten)]
    pub params: ParamArgs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinSpec {
    pub pin: String,
    pub role: PinRole,
    pub drive: Option<DriveKind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveOverride {
    pub pin: String,
    pub key: DriveParam,
    pub value: String,
}

fn split_assignment(s: &str) -> Result<(&str, &str), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim(), v.trim()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected NAME=VALUE, got {s:?}"))
}

fn parse_param(s: &str) -> Result<(ParamKey, String), String> {
    let (key, value) = split_assignment(s)?;
    Ok((key.parse()?, value.to_string()))
}

fn parse_pin(s: &str) -> Result<PinSpec, String> {
    let (pin, spec) = split_assignment(s)?;
    let (role, drive) = match spec.split_once(':') {
        Some((role, drive)) => (role, Some(drive.parse::<DriveKind>()?)),
        None => (spec, None),
    };
    let role = role.parse::<PinRole>()?;
    if drive.is_some() && role != PinRole::Input {
        return Err(format!("only input pins take a drive, got {s:?}"));
    }
    Ok(PinSpec {
        pin: pin.to_string(),
        role,
        drive,
    })
}

fn parse_drive(s: &str) -> Result<DriveOverride, String> {
    let (target, value) = split_assignment(s)?;
    let (pin, key) = target
        .rsplit_once('.')
        .ok_or_else(|| format!("expected PIN.KEY=VALUE, got {s:?}"))?;
    Ok(DriveOverride {
        pin: pin.to_string(),
        key: key.parse()?,
        value: value.to_string(),
    })
}
