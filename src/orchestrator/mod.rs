//! Simulation request orchestration.
//!
//! The [`Orchestrator`] owns all form state (parameters, netlist, chosen
//! subcircuit, plot nodes, pin configuration) together with the status and
//! result slots. Edits and explicit runs *issue* requests onto an internal
//! queue; [`Orchestrator::dispatch`] executes one against a backend and
//! commits the outcome. Each flow has its own [`RequestTracker`], so a
//! response is applied only if no newer request of the same flow has been
//! issued since.

use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::time::Instant;

use arcstr::ArcStr;
use log::{debug, info, warn};

use crate::api::{
    AnalyzeRequest, LegacySimulateRequest, SimulationBackend, UploadedSimulateRequest,
};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::fallback;
use crate::netlist::{AliasHints, PlotNodeSelection, Subcircuit};
use crate::params::{ParamKey, PulsePreset, SimulationParameters};
use crate::pins::{DriveKind, DriveParam, PinConfigMap, PinRole};
use crate::request::{RequestId, RequestTracker, Ticket};
use crate::waveform::SimulationResult;

pub mod debounce;
#[cfg(test)]
mod tests;

pub use debounce::{Debouncer, QUIET_PERIOD};

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub enum Status {
    #[default]
    Idle,
    Running {
        run: Option<RequestId>,
    },
    Error {
        run: Option<RequestId>,
        message: String,
    },
}

impl Status {
    #[inline]
    pub fn is_running(&self) -> bool {
        matches!(self, Status::Running { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Status::Error { message, .. } => Some(message),
            _ => None,
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Idle => write!(f, "idle"),
            Status::Running { .. } => write!(f, "simulating"),
            Status::Error { message, .. } => write!(f, "error: {message}"),
        }
    }
}

/// An issued request awaiting dispatch.
#[derive(Debug, Clone)]
pub enum SimulationRequest {
    Legacy(Ticket<LegacySimulateRequest>),
    Uploaded(Ticket<UploadedSimulateRequest>),
}

impl SimulationRequest {
    pub fn id(&self) -> RequestId {
        match self {
            SimulationRequest::Legacy(t) => t.id,
            SimulationRequest::Uploaded(t) => t.id,
        }
    }
}

#[derive(Debug)]
pub struct Orchestrator {
    params: SimulationParameters,
    preset: &'static PulsePreset,
    auto: bool,
    hints: AliasHints,
    netlist: Option<String>,
    subckts: Vec<Subcircuit>,
    chosen: Option<Subcircuit>,
    plot_nodes: PlotNodeSelection,
    pins: PinConfigMap,
    status: Status,
    result: SimulationResult,
    legacy: RequestTracker,
    uploaded: RequestTracker,
    debounce: Debouncer,
    queue: VecDeque<SimulationRequest>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(
            SimulationParameters::default(),
            PulsePreset::standard(),
            AliasHints::default(),
        )
    }
}

impl Orchestrator {
    pub fn new(
        params: SimulationParameters,
        preset: &'static PulsePreset,
        hints: AliasHints,
    ) -> Self {
        Self {
            params,
            preset,
            auto: false,
            hints,
            netlist: None,
            subckts: Vec::new(),
            chosen: None,
            plot_nodes: PlotNodeSelection::default(),
            pins: PinConfigMap::new(),
            status: Status::Idle,
            result: SimulationResult::default(),
            legacy: RequestTracker::new(),
            uploaded: RequestTracker::new(),
            debounce: Debouncer::default(),
            queue: VecDeque::new(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let (params, preset) = config.initial_params()?;
        Ok(Self::new(params, preset, config.hints.clone()))
    }

    #[inline]
    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }
    #[inline]
    pub fn preset(&self) -> &'static PulsePreset {
        self.preset
    }
    #[inline]
    pub fn is_auto(&self) -> bool {
        self.auto
    }
    #[inline]
    pub fn hints(&self) -> &AliasHints {
        &self.hints
    }
    #[inline]
    pub fn netlist(&self) -> Option<&str> {
        self.netlist.as_deref()
    }
    #[inline]
    pub fn subckts(&self) -> &[Subcircuit] {
        &self.subckts
    }
    #[inline]
    pub fn chosen(&self) -> Option<&Subcircuit> {
        self.chosen.as_ref()
    }
    #[inline]
    pub fn plot_nodes(&self) -> &PlotNodeSelection {
        &self.plot_nodes
    }
    #[inline]
    pub fn pins(&self) -> &PinConfigMap {
        &self.pins
    }
    #[inline]
    pub fn status(&self) -> &Status {
        &self.status
    }
    #[inline]
    pub fn result(&self) -> &SimulationResult {
        &self.result
    }

    /// Number of issued requests not yet dispatched.
    #[inline]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// When the debounced legacy run will fire, if one is scheduled.
    #[inline]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    /// Whether the uploaded flow has everything it needs to run.
    pub fn is_uploaded_ready(&self) -> bool {
        self.netlist.is_some() && self.chosen.is_some() && !self.plot_nodes.is_empty()
    }

    pub fn set_param(&mut self, key: ParamKey, value: impl Into<String>, now: Instant) {
        if self.params.set(key, value) {
            self.after_param_edit(now);
        }
    }

    pub fn apply_preset(&mut self, preset: &'static PulsePreset, now: Instant) {
        self.preset = preset;
        if self.params.apply_preset(preset) {
            self.after_param_edit(now);
        }
    }

    pub fn set_auto(&mut self, auto: bool) {
        if self.auto == auto {
            return;
        }
        self.auto = auto;
        if auto {
            self.after_form_edit();
        } else {
            self.debounce.cancel();
        }
    }

    fn after_param_edit(&mut self, now: Instant) {
        if !self.auto {
            return;
        }
        if self.chosen.is_some() {
            self.trigger_uploaded();
        } else {
            self.trigger_legacy(now);
        }
    }

    fn after_form_edit(&mut self) {
        if self.auto {
            self.trigger_uploaded();
        }
    }

    /// Explicit run: the uploaded flow once a subcircuit is chosen, the
    /// legacy demo otherwise.
    pub fn run(&mut self, now: Instant) {
        if self.chosen.is_some() {
            self.trigger_uploaded();
        } else {
            self.trigger_legacy(now);
        }
    }

    /// Starts the legacy demo run, after the quiet period in auto mode.
    ///
    /// Any in-flight demo request is superseded immediately, not when the
    /// quiet period ends.
    pub fn trigger_legacy(&mut self, now: Instant) {
        if self.auto {
            self.legacy.cancel_all();
            self.debounce.schedule(now);
        } else {
            self.issue_legacy();
        }
    }

    /// Issues the debounced legacy run if its quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) {
        if self.debounce.fire_if_due(now) {
            self.issue_legacy();
        }
    }

    fn issue_legacy(&mut self) {
        let params = match self.params.validate() {
            Ok(p) => p,
            Err(e) => {
                self.legacy.cancel_all();
                self.status = Status::Error {
                    run: None,
                    message: e.to_string(),
                };
                return;
            }
        };
        let ticket = self.legacy.issue(LegacySimulateRequest::new(params));
        info!("issuing demo simulation {}", ticket.id);
        self.status = Status::Running {
            run: Some(ticket.id),
        };
        self.queue.push_back(SimulationRequest::Legacy(ticket));
    }

    /// Starts the uploaded-netlist run. Does nothing unless a netlist, a
    /// chosen subcircuit and at least one plot node are present.
    pub fn trigger_uploaded(&mut self) {
        if !self.is_uploaded_ready() {
            debug!("uploaded simulation not ready; skipping trigger");
            return;
        }
        match self.assemble_uploaded() {
            Ok(body) => {
                let ticket = self.uploaded.issue(body);
                info!(
                    "issuing simulation {} of {}",
                    ticket.id, ticket.body.subckt.name
                );
                self.status = Status::Running {
                    run: Some(ticket.id),
                };
                self.queue.push_back(SimulationRequest::Uploaded(ticket));
            }
            Err(e) => {
                warn!("not submitting simulation: {e}");
                self.uploaded.cancel_all();
                self.status = Status::Error {
                    run: None,
                    message: e.to_string(),
                };
            }
        }
    }

    /// Builds the uploaded-flow request body from the current form state.
    pub fn assemble_uploaded(&self) -> Result<UploadedSimulateRequest> {
        let netlist = self.netlist.clone().ok_or(Error::NotConfigured)?;
        let subckt = self.chosen.clone().ok_or(Error::NoSubcktChosen)?;

        let params = self.params.validate()?;
        for advisory in params.advisories() {
            warn!("{advisory}");
        }

        for conflict in self.pins.role_conflicts(&subckt.pins) {
            warn!("{conflict}");
        }
        let roles = self.pins.classify_roles(&subckt.pins);

        let pin_drives = self.pins.build_drive_descriptors(&self.params);
        for (pin, drive) in &pin_drives {
            drive.validate(pin)?;
        }

        Ok(UploadedSimulateRequest {
            netlist,
            plot_nodes: self.plot_nodes.nodes().to_vec(),
            subckt,
            params,
            roles,
            pin_drives,
            hints: self.hints.clone(),
        })
    }

    /// Removes and returns every issued request, oldest first.
    pub fn take_requests(&mut self) -> Vec<SimulationRequest> {
        self.queue.drain(..).collect()
    }

    /// Executes `req` and commits its outcome.
    ///
    /// Without a backend the legacy flow falls back to synthetic data and the
    /// uploaded flow fails with [`Error::NotConfigured`].
    pub fn dispatch(&mut self, backend: Option<&dyn SimulationBackend>, req: SimulationRequest) {
        match req {
            SimulationRequest::Legacy(ticket) => {
                if ticket.cancel.is_cancelled() {
                    debug!("demo simulation {} superseded before dispatch", ticket.id);
                    return;
                }
                let outcome = match backend {
                    Some(b) => b.simulate(&ticket.body, &ticket.cancel),
                    None => Ok(fallback::generate(&ticket.body.params)),
                };
                self.complete_legacy(&ticket, outcome);
            }
            SimulationRequest::Uploaded(ticket) => {
                if ticket.cancel.is_cancelled() {
                    debug!("simulation {} superseded before dispatch", ticket.id);
                    return;
                }
                let outcome = match backend {
                    Some(b) => b.simulate_uploaded(&ticket.body, &ticket.cancel),
                    None => Err(Error::NotConfigured),
                };
                self.complete_uploaded(ticket.id, outcome);
            }
        }
    }

    /// Polls the debouncer and dispatches everything queued. Returns the
    /// number of requests dispatched.
    pub fn drive(&mut self, backend: Option<&dyn SimulationBackend>, now: Instant) -> usize {
        self.poll(now);
        let reqs = self.take_requests();
        let n = reqs.len();
        for req in reqs {
            self.dispatch(backend, req);
        }
        n
    }

    /// Commits a legacy-flow outcome. Failures become a fallback result
    /// annotated with the error; superseded responses are dropped.
    pub fn complete_legacy(
        &mut self,
        ticket: &Ticket<LegacySimulateRequest>,
        outcome: Result<SimulationResult>,
    ) {
        let data = match outcome {
            Ok(data) => data,
            Err(Error::Cancelled) => {
                debug!("demo simulation {} cancelled", ticket.id);
                return;
            }
            Err(e) => {
                warn!("demo simulation failed, showing fallback data: {e}");
                let mut data = fallback::generate(&ticket.body.params);
                data.meta.error = Some(e.to_string());
                data
            }
        };
        if !self.legacy.settle(ticket.id) {
            debug!("discarding stale demo result {}", ticket.id);
            return;
        }
        self.result = data;
        self.status = Status::Idle;
    }

    /// Commits an uploaded-flow outcome. Failures keep the previous result.
    pub fn complete_uploaded(&mut self, id: RequestId, outcome: Result<SimulationResult>) {
        if !self.uploaded.settle(id) {
            debug!("discarding stale simulation result {id}");
            return;
        }
        match outcome {
            Ok(data) => {
                info!(
                    "simulation {id} returned {} traces over {} points",
                    data.waveforms.len(),
                    data.time.len()
                );
                self.result = data;
                self.status = Status::Idle;
            }
            Err(e) => {
                warn!("simulation {id} failed: {e}");
                self.status = Status::Error {
                    run: Some(id),
                    message: e.to_string(),
                };
            }
        }
    }

    /// Submits `netlist` for analysis. On success the netlist and subcircuit
    /// list are replaced and all state derived from the previous ones is
    /// reset. On failure the previous netlist stays paired with its
    /// subcircuits.
    pub fn analyze(
        &mut self,
        backend: Option<&dyn SimulationBackend>,
        netlist: impl Into<String>,
        hints: Option<AliasHints>,
    ) -> Result<()> {
        let netlist = netlist.into();
        if let Some(hints) = hints {
            self.hints = hints;
        }
        self.status = Status::Running { run: None };

        let res = backend.ok_or(Error::NotConfigured).and_then(|b| {
            b.analyze(&AnalyzeRequest {
                netlist: netlist.clone(),
                hints: self.hints.clone(),
            })
        });
        match res {
            Ok(res) => {
                info!("netlist analysis found {} subcircuits", res.subckts.len());
                self.uploaded.cancel_all();
                self.netlist = Some(netlist);
                self.subckts = res.subckts;
                self.chosen = None;
                self.plot_nodes = PlotNodeSelection::default();
                self.pins = PinConfigMap::new();
                self.status = Status::Idle;
                Ok(())
            }
            Err(e) => {
                self.status = Status::Error {
                    run: None,
                    message: e.to_string(),
                };
                Err(e)
            }
        }
    }

    /// Chooses a subcircuit by name, or clears the choice with `None`.
    ///
    /// Plot nodes default to the first two pins and pin configuration is
    /// cleared.
    pub fn select_subckt(&mut self, name: Option<&str>) -> Result<()> {
        match name {
            Some(name) => {
                let subckt = self
                    .subckts
                    .iter()
                    .find(|s| s.name.as_str() == name)
                    .cloned()
                    .ok_or_else(|| Error::UnknownSubckt(name.to_string()))?;
                self.plot_nodes = PlotNodeSelection::first_two(&subckt);
                self.chosen = Some(subckt);
            }
            None => {
                self.chosen = None;
                self.plot_nodes = PlotNodeSelection::default();
            }
        }
        self.pins = PinConfigMap::new();
        self.after_form_edit();
        Ok(())
    }

    fn chosen_or_err(&self) -> Result<&Subcircuit> {
        self.chosen.as_ref().ok_or(Error::NoSubcktChosen)
    }

    pub fn set_plot_nodes<S: AsRef<str>>(&mut self, nodes: impl IntoIterator<Item = S>) -> Result<()> {
        let sel = PlotNodeSelection::new(self.chosen_or_err()?, nodes)?;
        if sel != self.plot_nodes {
            self.plot_nodes = sel;
            self.after_form_edit();
        }
        Ok(())
    }

    pub fn toggle_plot_node(&mut self, pin: &str) -> Result<()> {
        let subckt = self.chosen.as_ref().ok_or(Error::NoSubcktChosen)?;
        self.plot_nodes.toggle(subckt, pin)?;
        self.after_form_edit();
        Ok(())
    }

    /// Resolves `pin` against the chosen subcircuit.
    fn pin(&self, pin: &str) -> Result<ArcStr> {
        let subckt = self.chosen_or_err()?;
        subckt
            .pins
            .iter()
            .find(|p| p.as_str() == pin)
            .cloned()
            .ok_or_else(|| Error::UnknownPin(ArcStr::from(pin)))
    }

    fn replace_pins(&mut self, pins: PinConfigMap) {
        if pins != self.pins {
            self.pins = pins;
            self.after_form_edit();
        }
    }

    pub fn set_role(&mut self, pin: &str, role: PinRole) -> Result<()> {
        let pin = self.pin(pin)?;
        self.replace_pins(self.pins.set_role(pin, role));
        Ok(())
    }

    pub fn set_drive_kind(&mut self, pin: &str, kind: DriveKind) -> Result<()> {
        let pin = self.pin(pin)?;
        self.replace_pins(self.pins.set_drive_kind(pin, kind));
        Ok(())
    }

    pub fn set_pin_param(
        &mut self,
        pin: &str,
        key: DriveParam,
        value: impl Into<String>,
    ) -> Result<()> {
        let pin = self.pin(pin)?;
        self.replace_pins(self.pins.set_parameter(pin, key, value));
        Ok(())
    }
}
