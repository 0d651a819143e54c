use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use arcstr::ArcStr;

use super::*;
use crate::api::{AnalyzeResponse, HealthResponse};
use crate::pins::DriveDescriptor;
use crate::request::CancelToken;

#[derive(Default)]
struct MockBackend {
    subckts: Vec<Subcircuit>,
    fail_with: Option<u16>,
    legacy_calls: Cell<usize>,
    uploaded: RefCell<Vec<UploadedSimulateRequest>>,
}

impl MockBackend {
    fn with_inverter() -> Self {
        Self {
            subckts: vec![
                Subcircuit::new("INV", ["A", "Y", "VDD", "VSS"]),
                Subcircuit::new("NAND2", ["Y", "A", "B", "VDD", "VSS"]),
            ],
            ..Default::default()
        }
    }

    fn failing(status: u16) -> Self {
        Self {
            fail_with: Some(status),
            ..Self::with_inverter()
        }
    }

    fn failure(&self) -> Option<Error> {
        self.fail_with.map(|status| Error::Backend {
            status,
            message: Some("ngspice timeout".to_string()),
        })
    }
}

fn result(label: &str, value: f64) -> SimulationResult {
    SimulationResult {
        time: vec![0.0, 1e-9],
        waveforms: BTreeMap::from([(label.to_string(), vec![value, value])]),
        ..Default::default()
    }
}

impl SimulationBackend for MockBackend {
    fn analyze(&self, _req: &AnalyzeRequest) -> Result<AnalyzeResponse> {
        if self.subckts.is_empty() {
            return Err(Error::Backend {
                status: 400,
                message: Some("no .subckt found in netlist".to_string()),
            });
        }
        Ok(AnalyzeResponse {
            subckts: self.subckts.clone(),
        })
    }

    fn simulate_uploaded(
        &self,
        req: &UploadedSimulateRequest,
        _cancel: &CancelToken,
    ) -> Result<SimulationResult> {
        self.uploaded.borrow_mut().push(req.clone());
        if let Some(e) = self.failure() {
            return Err(e);
        }
        Ok(result(&format!("v({})", req.plot_nodes[0]), req.params.vdd))
    }

    fn simulate(
        &self,
        req: &LegacySimulateRequest,
        _cancel: &CancelToken,
    ) -> Result<SimulationResult> {
        self.legacy_calls.set(self.legacy_calls.get() + 1);
        if let Some(e) = self.failure() {
            return Err(e);
        }
        Ok(result("v(y)", req.params.vdd))
    }

    fn health(&self) -> Result<HealthResponse> {
        Ok(HealthResponse {
            ok: true,
            ngspice: None,
        })
    }
}

const INV_NETLIST: &str = ".subckt INV A Y VDD VSS\n.ends\n";

/// An orchestrator with the inverter netlist analyzed and chosen.
fn ready(backend: &MockBackend) -> Orchestrator {
    let mut orch = Orchestrator::default();
    orch.analyze(Some(backend), INV_NETLIST, None).unwrap();
    orch.select_subckt(Some("INV")).unwrap();
    orch
}

fn legacy_tickets(orch: &mut Orchestrator) -> Vec<Ticket<LegacySimulateRequest>> {
    orch.take_requests()
        .into_iter()
        .map(|r| match r {
            SimulationRequest::Legacy(t) => t,
            other => panic!("expected legacy request, got {other:?}"),
        })
        .collect()
}

fn uploaded_tickets(orch: &mut Orchestrator) -> Vec<Ticket<UploadedSimulateRequest>> {
    orch.take_requests()
        .into_iter()
        .map(|r| match r {
            SimulationRequest::Uploaded(t) => t,
            other => panic!("expected uploaded request, got {other:?}"),
        })
        .collect()
}

#[test]
fn offline_demo_run_uses_fallback() {
    let now = Instant::now();
    let mut orch = Orchestrator::default();
    orch.run(now);
    assert!(orch.status().is_running());
    assert_eq!(orch.drive(None, now), 1);
    assert_eq!(orch.status(), &Status::Idle);
    assert!(orch.result().is_dummy());
    assert_eq!(orch.result().time.len(), crate::fallback::SAMPLES);
}

#[test]
fn legacy_applies_only_the_latest_response() {
    let now = Instant::now();
    let mut orch = Orchestrator::default();
    orch.trigger_legacy(now);
    orch.set_param(ParamKey::Vdd, "1.0", now);
    orch.trigger_legacy(now);
    let tickets = legacy_tickets(&mut orch);
    let (a, b) = (&tickets[0], &tickets[1]);
    assert!(a.cancel.is_cancelled());
    assert_relative_eq!(b.body.params.vdd, 1.0);

    // B resolves first, then the slow A arrives.
    orch.complete_legacy(b, Ok(result("v(y)", 1.0)));
    orch.complete_legacy(a, Ok(result("v(y)", 1.2)));
    assert_eq!(orch.result().waveforms["v(y)"][0], 1.0);
    assert_eq!(orch.status(), &Status::Idle);
}

#[test]
fn legacy_discards_stale_response_arriving_first() {
    let now = Instant::now();
    let mut orch = Orchestrator::default();
    orch.trigger_legacy(now);
    orch.trigger_legacy(now);
    let tickets = legacy_tickets(&mut orch);

    orch.complete_legacy(&tickets[0], Ok(result("v(y)", 1.2)));
    assert!(orch.result().is_empty());
    assert!(orch.status().is_running());

    orch.complete_legacy(&tickets[1], Err(Error::Backend { status: 500, message: None }));
    assert!(orch.result().is_dummy());
    assert!(orch.result().meta.error.is_some());
}

#[test]
fn superseded_legacy_request_is_never_sent() {
    let now = Instant::now();
    let backend = MockBackend::default();
    let mut orch = Orchestrator::default();
    orch.trigger_legacy(now);
    orch.trigger_legacy(now);
    assert_eq!(orch.drive(Some(&backend), now), 2);
    assert_eq!(backend.legacy_calls.get(), 1);
    assert!(!orch.result().is_dummy());
}

#[test]
fn legacy_failure_degrades_to_annotated_fallback() {
    let now = Instant::now();
    let backend = MockBackend::failing(504);
    let mut orch = Orchestrator::default();
    orch.run(now);
    orch.drive(Some(&backend), now);
    assert_eq!(orch.status(), &Status::Idle);
    let res = orch.result();
    assert!(res.is_dummy());
    assert!(res.meta.error.as_deref().unwrap().contains("504"));
}

#[test]
fn legacy_cancellation_is_silent() {
    let now = Instant::now();
    let mut orch = Orchestrator::default();
    orch.trigger_legacy(now);
    let tickets = legacy_tickets(&mut orch);
    orch.complete_legacy(&tickets[0], Err(Error::Cancelled));
    assert!(orch.result().is_empty());
    assert!(orch.status().error().is_none());
}

#[test]
fn auto_legacy_is_debounced() {
    let t0 = Instant::now();
    let ms = Duration::from_millis;
    let mut orch = Orchestrator::default();
    orch.set_auto(true);
    assert_eq!(orch.pending(), 0);

    orch.set_param(ParamKey::Vdd, "1.1", t0);
    orch.set_param(ParamKey::Vdd, "1.0", t0 + ms(100));
    orch.set_param(ParamKey::Vdd, "0.9", t0 + ms(200));
    assert_eq!(orch.pending(), 0);
    assert_eq!(orch.next_deadline(), Some(t0 + ms(500)));

    orch.poll(t0 + ms(400));
    assert_eq!(orch.pending(), 0);

    orch.poll(t0 + ms(500));
    let tickets = legacy_tickets(&mut orch);
    assert_eq!(tickets.len(), 1);
    assert_relative_eq!(tickets[0].body.params.vdd, 0.9);

    orch.poll(t0 + ms(900));
    assert_eq!(orch.pending(), 0);
}

#[test]
fn auto_edit_supersedes_in_flight_demo_run() {
    let t0 = Instant::now();
    let mut orch = Orchestrator::default();
    orch.trigger_legacy(t0);
    let a = legacy_tickets(&mut orch).remove(0);

    orch.set_auto(true);
    orch.set_param(ParamKey::Vdd, "1.0", t0);
    assert!(a.cancel.is_cancelled());

    // A resolves while the quiet period is still running.
    orch.complete_legacy(&a, Ok(result("v(y)", 1.2)));
    assert!(orch.result().is_empty());

    orch.poll(t0 + QUIET_PERIOD);
    let b = legacy_tickets(&mut orch).remove(0);
    assert_relative_eq!(b.body.params.vdd, 1.0);
    orch.complete_legacy(&b, Ok(result("v(y)", 1.0)));
    assert_eq!(orch.result().waveforms["v(y)"][0], 1.0);
}

#[test]
fn turning_auto_off_cancels_pending_debounce() {
    let t0 = Instant::now();
    let mut orch = Orchestrator::default();
    orch.set_auto(true);
    orch.set_param(ParamKey::Temp, "85", t0);
    orch.set_auto(false);
    orch.poll(t0 + Duration::from_secs(1));
    assert_eq!(orch.pending(), 0);
}

#[test]
fn choosing_a_subckt_defaults_plot_nodes_and_clears_pins() {
    let backend = MockBackend::with_inverter();
    let mut orch = Orchestrator::default();
    orch.analyze(Some(&backend), INV_NETLIST, None).unwrap();
    assert_eq!(orch.subckts().len(), 2);
    assert!(orch.chosen().is_none());

    orch.select_subckt(Some("NAND2")).unwrap();
    orch.set_role("A", PinRole::Input).unwrap();
    assert!(!orch.pins().is_empty());

    orch.select_subckt(Some("INV")).unwrap();
    assert_eq!(
        orch.plot_nodes().nodes(),
        &[ArcStr::from("A"), ArcStr::from("Y")]
    );
    assert!(orch.pins().is_empty());

    assert!(matches!(
        orch.select_subckt(Some("XOR")),
        Err(Error::UnknownSubckt(_))
    ));
}

#[test]
fn analysis_resets_downstream_state() {
    let backend = MockBackend::with_inverter();
    let mut orch = ready(&backend);
    orch.set_role("Y", PinRole::Output).unwrap();

    orch.analyze(Some(&backend), INV_NETLIST, None).unwrap();
    assert!(orch.chosen().is_none());
    assert!(orch.plot_nodes().is_empty());
    assert!(orch.pins().is_empty());
    assert_eq!(orch.status(), &Status::Idle);
}

#[test]
fn failed_analysis_keeps_previous_netlist() {
    let now = Instant::now();
    let ok = MockBackend::with_inverter();
    let mut orch = ready(&ok);

    let failing = MockBackend::default();
    assert!(orch.analyze(Some(&failing), "* broken", None).is_err());
    assert_eq!(orch.netlist(), Some(INV_NETLIST));
    assert_eq!(orch.chosen().unwrap().name.as_str(), "INV");

    orch.run(now);
    let tickets = uploaded_tickets(&mut orch);
    assert_eq!(tickets[0].body.netlist, INV_NETLIST);
}

#[test]
fn analysis_failures_set_error_status() {
    let backend = MockBackend::default();
    let mut orch = Orchestrator::default();
    assert!(orch.analyze(Some(&backend), "* empty", None).is_err());
    assert!(orch.status().error().unwrap().contains("no .subckt"));

    assert!(matches!(
        orch.analyze(None, INV_NETLIST, None),
        Err(Error::NotConfigured)
    ));
}

#[test]
fn uploaded_trigger_is_a_no_op_until_ready() {
    let backend = MockBackend::with_inverter();
    let mut orch = Orchestrator::default();
    orch.trigger_uploaded();
    assert_eq!(orch.pending(), 0);

    orch.analyze(Some(&backend), INV_NETLIST, None).unwrap();
    orch.trigger_uploaded();
    assert_eq!(orch.pending(), 0);

    orch.select_subckt(Some("INV")).unwrap();
    orch.set_plot_nodes(Vec::<&str>::new()).unwrap();
    orch.trigger_uploaded();
    assert_eq!(orch.pending(), 0);
    assert_eq!(orch.status(), &Status::Idle);

    orch.toggle_plot_node("Y").unwrap();
    orch.trigger_uploaded();
    assert_eq!(orch.pending(), 1);
}

#[test]
fn auto_mode_reruns_once_per_edit() {
    let now = Instant::now();
    let backend = MockBackend::with_inverter();
    let mut orch = ready(&backend);
    assert_eq!(orch.pending(), 0);

    orch.set_auto(true);
    assert_eq!(uploaded_tickets(&mut orch).len(), 1);

    orch.set_param(ParamKey::Vdd, "1.0", now);
    let tickets = uploaded_tickets(&mut orch);
    assert_eq!(tickets.len(), 1);
    assert_relative_eq!(tickets[0].body.params.vdd, 1.0);

    orch.set_param(ParamKey::Vdd, "1.0", now);
    assert_eq!(orch.pending(), 0);

    orch.set_role("A", PinRole::Input).unwrap();
    orch.toggle_plot_node("VDD").unwrap();
    orch.apply_preset(PulsePreset::by_name("Ultra").unwrap(), now);
    assert_eq!(orch.pending(), 3);
    assert!(orch.next_deadline().is_none());
}

#[test]
fn uploaded_success_then_failure_keeps_previous_result() {
    let now = Instant::now();
    let ok = MockBackend::with_inverter();
    let mut orch = ready(&ok);
    orch.run(now);
    orch.drive(Some(&ok), now);
    assert_eq!(orch.status(), &Status::Idle);
    assert!(orch.result().waveforms.contains_key("v(A)"));

    let failing = MockBackend::failing(500);
    orch.run(now);
    orch.drive(Some(&failing), now);
    assert!(orch.status().error().unwrap().contains("ngspice timeout"));
    assert!(orch.result().waveforms.contains_key("v(A)"));
    assert_eq!(failing.uploaded.borrow().len(), 1);
}

#[test]
fn uploaded_flow_ignores_stale_responses() {
    let now = Instant::now();
    let backend = MockBackend::with_inverter();
    let mut orch = ready(&backend);
    orch.run(now);
    orch.set_param(ParamKey::Vdd, "0.8", now);
    orch.run(now);
    let tickets = uploaded_tickets(&mut orch);
    assert_eq!(tickets.len(), 2);

    orch.complete_uploaded(tickets[1].id, Ok(result("v(A)", 0.8)));
    orch.complete_uploaded(tickets[0].id, Ok(result("v(A)", 1.2)));
    assert_eq!(orch.result().waveforms["v(A)"][0], 0.8);

    orch.complete_uploaded(tickets[0].id, Err(Error::Backend { status: 500, message: None }));
    assert_eq!(orch.status(), &Status::Idle);
}

#[test]
fn uploaded_without_backend_reports_error() {
    let now = Instant::now();
    let backend = MockBackend::with_inverter();
    let mut orch = ready(&backend);
    orch.run(now);
    orch.drive(None, now);
    assert_eq!(
        orch.status().error(),
        Some(Error::NotConfigured.to_string().as_str())
    );
}

#[test]
fn invalid_demo_edit_supersedes_in_flight_run() {
    let now = Instant::now();
    let mut orch = Orchestrator::default();
    orch.trigger_legacy(now);
    let a = legacy_tickets(&mut orch).remove(0);

    orch.set_param(ParamKey::Vdd, "", now);
    orch.trigger_legacy(now);
    assert_eq!(orch.pending(), 0);
    assert!(a.cancel.is_cancelled());

    orch.complete_legacy(&a, Ok(result("v(y)", 1.2)));
    assert!(orch.status().error().unwrap().contains("VDD"));
    assert!(orch.result().is_empty());
}

#[test]
fn invalid_uploaded_edit_supersedes_in_flight_run() {
    let now = Instant::now();
    let backend = MockBackend::with_inverter();
    let mut orch = ready(&backend);
    orch.run(now);
    let a = uploaded_tickets(&mut orch).remove(0);

    orch.set_param(ParamKey::Tstep, "-1", now);
    orch.run(now);
    assert_eq!(orch.pending(), 0);
    assert!(a.cancel.is_cancelled());

    orch.complete_uploaded(a.id, Ok(result("v(A)", 1.2)));
    assert!(orch.status().error().unwrap().contains("TSTEP"));
    assert!(orch.result().is_empty());
}

#[test]
fn unparseable_parameter_blocks_submission() {
    let now = Instant::now();
    let backend = MockBackend::with_inverter();
    let mut orch = ready(&backend);
    orch.set_param(ParamKey::Tstop, "3ns", now);
    orch.run(now);
    assert_eq!(orch.pending(), 0);
    assert!(orch.status().error().unwrap().contains("TSTOP"));

    let mut demo = Orchestrator::default();
    demo.set_param(ParamKey::Vdd, "", now);
    demo.run(now);
    assert_eq!(demo.pending(), 0);
    assert!(demo.status().error().is_some());
}

#[test]
fn unparseable_drive_blocks_submission() {
    let now = Instant::now();
    let backend = MockBackend::with_inverter();
    let mut orch = ready(&backend);
    orch.set_drive_kind("A", DriveKind::Pulse).unwrap();
    orch.set_pin_param("A", DriveParam::Pw, "wide").unwrap();
    orch.run(now);
    assert_eq!(orch.pending(), 0);
    assert!(orch.status().error().unwrap().contains("A.pw"));
}

#[test]
fn request_body_reflects_form_state() {
    let backend = MockBackend::with_inverter();
    let mut orch = ready(&backend);
    orch.set_role("A", PinRole::Input).unwrap();
    orch.set_drive_kind("A", DriveKind::Pulse).unwrap();
    orch.set_role("Y", PinRole::Output).unwrap();
    orch.set_role("VDD", PinRole::Vdd).unwrap();
    orch.set_role("VSS", PinRole::Vss).unwrap();

    let body = orch.assemble_uploaded().unwrap();
    assert_eq!(body.roles.vdd.as_str(), "VDD");
    assert_eq!(body.roles.vss.as_str(), "VSS");
    assert_eq!(body.roles.outputs, vec![ArcStr::from("Y")]);
    assert_eq!(body.roles.inputs, vec![ArcStr::from("A")]);
    assert_eq!(
        body.pin_drives["A"],
        DriveDescriptor::Pulse {
            v1: "0".into(),
            v2: "1.2".into(),
            td: "0".into(),
            tr: "1e-11".into(),
            tf: "1e-11".into(),
            pw: "5e-10".into(),
            per: "1e-9".into(),
        }
    );

    let json = serde_json::to_value(&body).unwrap();
    assert_eq!(json["netlist"], INV_NETLIST);
    assert_eq!(json["subckt"]["name"], "INV");
    assert_eq!(json["plot_nodes"], serde_json::json!(["A", "Y"]));
    assert_relative_eq!(json["params"]["TSTOP"].as_f64().unwrap(), 3e-9);
    assert_eq!(json["pin_drives"]["A"]["kind"], "pulse");
    assert_eq!(json["hints"]["outputs"][0], "Y");
}

#[test]
fn pin_edits_require_a_known_pin() {
    let backend = MockBackend::with_inverter();
    let mut orch = Orchestrator::default();
    assert!(matches!(
        orch.set_role("A", PinRole::Input),
        Err(Error::NoSubcktChosen)
    ));
    orch.analyze(Some(&backend), INV_NETLIST, None).unwrap();
    orch.select_subckt(Some("INV")).unwrap();
    assert!(matches!(
        orch.set_role("B", PinRole::Input),
        Err(Error::UnknownPin(_))
    ));
    assert!(orch.toggle_plot_node("B").is_err());
}
