use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use log::{debug, info};

use crate::api::{HttpClient, SimulationBackend};
use crate::cli::args::{Args, Command, DemoArgs, ParamArgs, SimulateArgs};
use crate::cli::progress::{StepContext, StepKey};
use crate::config::{load_client_config, ClientConfig};
use crate::orchestrator::Orchestrator;
use crate::params::PulsePreset;
use crate::paths::{out_json, out_png, out_tsv};
use crate::plot::{plot_result, PlotParams};
use crate::session::{FileCredentialStore, LaunchContext, Session, SessionState};
use crate::waveform::SimulationResult;

pub mod args;
pub mod progress;

pub const BANNER: &str = r"
             _
  ___ _ __  (_) ___ ___ __      ____ ___   _____
 / __| '_ \ | |/ __/ _ \\ \ /\ / / _` \ \ / / _ \
 \__ \ |_) || | (_|  __/ \ V  V / (_| |\ V /  __/
 |___/ .__/ |_|\___\___|  \_/\_/ \__,_| \_/ \___|
     |_|

spicewave v0.1
";

pub fn run() -> Result<()> {
    let args = Args::parse();

    println!("{BANNER}");

    let config = load_client_config(&args.config)
        .with_context(|| format!("failed to read configuration file {:?}", &args.config))?;
    debug!("configuration: {config:?}");

    let client = match config.api.base_url.as_deref() {
        Some(url) => {
            println!("Backend: {url}");
            Some(HttpClient::new(url, config.api.timeouts)?)
        }
        None => {
            println!("{}", "No backend configured; running offline.".yellow());
            None
        }
    };
    let work_dir = args.output_dir.clone().unwrap_or_else(|| PathBuf::from("."));

    if let Command::Health = args.command {
        return health(client.as_ref());
    }

    verify_session(client.as_ref(), &config, args.launch_url.as_deref())?;

    let backend = client.as_ref().map(|c| c as &dyn SimulationBackend);
    match args.command {
        Command::Health | Command::Verify => Ok(()),
        Command::Demo(demo) => run_demo(backend, &config, &demo, &work_dir),
        Command::Analyze { netlist } => run_analyze(backend, &config, &netlist),
        Command::Simulate(sim) => run_simulate(backend, &config, &sim, &work_dir),
    }
}

fn health(client: Option<&HttpClient>) -> Result<()> {
    let client = client.ok_or_else(|| anyhow!("no backend configured"))?;
    let mut ctx = StepContext::new(&[StepKey::CheckHealth]);
    let res = ctx.check(client.health().map_err(Into::into))?;
    ctx.finish(StepKey::CheckHealth);

    let status = if res.ok {
        "ok".green().bold()
    } else {
        "unhealthy".red().bold()
    };
    println!("\nBackend status: {status}");
    if let Some(version) = res.ngspice {
        println!("Simulator: {version}");
    }
    if !res.ok {
        bail!("backend reported unhealthy");
    }
    Ok(())
}

fn verify_session(
    client: Option<&HttpClient>,
    config: &ClientConfig,
    launch_url: Option<&str>,
) -> Result<()> {
    let mut launch = match launch_url {
        Some(url) => LaunchContext::from_url(url)?,
        None => LaunchContext::default(),
    }
    .trusted(config.session.trusted);

    let Some(client) = client else {
        info!("offline mode; skipping session verification");
        return Ok(());
    };

    let mut store = FileCredentialStore::new(&config.session.credential_path);
    let mut ctx = StepContext::new(&[StepKey::VerifySession]);
    let state = Session::new()
        .resolve(client, &mut store, &mut launch)
        .clone();
    match state {
        SessionState::Verified => {
            ctx.finish(StepKey::VerifySession);
            if let Some(url) = launch.url() {
                debug!("launch url after verification: {url}");
            }
            Ok(())
        }
        SessionState::Rejected { message } => ctx.check(Err(anyhow!(message))),
        SessionState::Verifying => ctx.check(Err(anyhow!("session verification did not complete"))),
    }
}

fn apply_param_args(orch: &mut Orchestrator, args: &ParamArgs, now: Instant) -> Result<()> {
    if let Some(name) = &args.preset {
        orch.apply_preset(PulsePreset::by_name(name)?, now);
    }
    for (key, value) in &args.set {
        orch.set_param(*key, value.clone(), now);
    }
    Ok(())
}

fn check_status(orch: &Orchestrator) -> Result<()> {
    match orch.status().error() {
        Some(message) => Err(anyhow!("{message}")),
        None => Ok(()),
    }
}

fn run_demo(
    backend: Option<&dyn SimulationBackend>,
    config: &ClientConfig,
    args: &DemoArgs,
    work_dir: &Path,
) -> Result<()> {
    let mut ctx = StepContext::new(&[StepKey::Simulate, StepKey::SaveArtifacts]);
    let mut orch = ctx.check(Orchestrator::from_config(config).map_err(Into::into))?;

    orch.set_auto(args.auto);
    ctx.check(apply_param_args(&mut orch, &args.params, Instant::now()))?;
    orch.run(Instant::now());

    // In auto mode the run fires once the edits have gone quiet.
    while let Some(deadline) = orch.next_deadline() {
        thread::sleep(deadline.saturating_duration_since(Instant::now()));
        orch.poll(Instant::now());
    }
    orch.drive(backend, Instant::now());
    ctx.check(check_status(&orch))?;
    ctx.finish(StepKey::Simulate);

    let paths = ctx.check(save_artifacts(orch.result(), work_dir, "demo"))?;
    ctx.finish(StepKey::SaveArtifacts);
    report(orch.result(), &paths);
    Ok(())
}

fn analyze_netlist(
    backend: Option<&dyn SimulationBackend>,
    orch: &mut Orchestrator,
    netlist: &Path,
) -> Result<()> {
    let text = fs::read_to_string(netlist)
        .with_context(|| format!("failed to read netlist {netlist:?}"))?;
    orch.analyze(backend, text, None)?;
    Ok(())
}

fn run_analyze(
    backend: Option<&dyn SimulationBackend>,
    config: &ClientConfig,
    netlist: &Path,
) -> Result<()> {
    let mut ctx = StepContext::new(&[StepKey::AnalyzeNetlist]);
    let mut orch = ctx.check(Orchestrator::from_config(config).map_err(Into::into))?;
    ctx.check(analyze_netlist(backend, &mut orch, netlist))?;
    ctx.finish(StepKey::AnalyzeNetlist);

    println!("\nSubcircuits:");
    for subckt in orch.subckts() {
        let pins = subckt
            .pins
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        println!("\t{} {}", subckt.name.as_str().bold(), pins);
    }
    Ok(())
}

fn configure(orch: &mut Orchestrator, args: &SimulateArgs, now: Instant) -> Result<()> {
    orch.select_subckt(Some(&args.subckt))?;
    if !args.plot.is_empty() {
        orch.set_plot_nodes(&args.plot)?;
    }
    for spec in &args.pins {
        orch.set_role(&spec.pin, spec.role)?;
        if let Some(kind) = spec.drive {
            orch.set_drive_kind(&spec.pin, kind)?;
        }
    }
    for o in &args.drives {
        orch.set_pin_param(&o.pin, o.key, o.value.clone())?;
    }
    apply_param_args(orch, &args.params, now)
}

fn run_simulate(
    backend: Option<&dyn SimulationBackend>,
    config: &ClientConfig,
    args: &SimulateArgs,
    work_dir: &Path,
) -> Result<()> {
    let mut ctx = StepContext::new(&[
        StepKey::AnalyzeNetlist,
        StepKey::Simulate,
        StepKey::SaveArtifacts,
    ]);
    let mut orch = ctx.check(Orchestrator::from_config(config).map_err(Into::into))?;
    ctx.check(analyze_netlist(backend, &mut orch, &args.netlist))?;
    ctx.finish(StepKey::AnalyzeNetlist);

    let now = Instant::now();
    ctx.check(configure(&mut orch, args, now))?;
    orch.run(now);
    orch.drive(backend, now);
    ctx.check(check_status(&orch))?;
    ctx.finish(StepKey::Simulate);

    let paths = ctx.check(save_artifacts(orch.result(), work_dir, &args.subckt))?;
    ctx.finish(StepKey::SaveArtifacts);
    report(orch.result(), &paths);
    Ok(())
}

fn save_artifacts(data: &SimulationResult, work_dir: &Path, name: &str) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(work_dir)
        .with_context(|| format!("failed to create output directory {work_dir:?}"))?;

    let tsv = out_tsv(work_dir, name);
    let mut w = BufWriter::new(File::create(&tsv)?);
    data.save(&mut w)?;
    w.flush()?;

    let json = out_json(work_dir, name);
    fs::write(&json, serde_json::to_string_pretty(data)?)?;

    let png = out_png(work_dir, name);
    let params = PlotParams::builder()
        .output_path(png.clone())
        .title(format!("{name} transient response"))
        .build()?;
    plot_result(data, &params)?;

    Ok(vec![tsv, json, png])
}

fn report(data: &SimulationResult, paths: &[PathBuf]) {
    if data.is_dummy() {
        println!(
            "{}",
            "Showing synthetic fallback waveforms.".yellow().bold()
        );
    }
    if let Some(err) = &data.meta.error {
        println!("{} {err}", "Simulation failed:".red().bold());
    }
    for warning in &data.meta.warnings {
        println!("{} {warning}", "warning:".yellow());
    }
    if let Some(dir) = &data.meta.run_dir {
        println!("Backend run directory: {dir}");
    }
    println!(
        "Simulated {} traces over {} points.",
        data.waveforms.len(),
        data.time.len()
    );
    for path in paths {
        println!("Saved {path:?}");
    }
}
