//! End-to-end macro execution scenarios

use macros::{
    Invocation, MacroConfig, MacroDef, MacroRunner, MemorySink, Responder, StateRegistry,
    StaticStatus, Status, Value, REPORT_PREFIX,
};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingResponder {
    infos: Mutex<Vec<String>>,
    raws: Mutex<Vec<String>>,
}

impl RecordingResponder {
    fn infos(&self) -> Vec<String> {
        self.infos.lock().unwrap().clone()
    }

    fn raws(&self) -> Vec<String> {
        self.raws.lock().unwrap().clone()
    }
}

impl Responder for RecordingResponder {
    fn info(&self, text: &str) {
        self.infos.lock().unwrap().push(text.to_string());
    }

    fn raw(&self, text: &str) {
        self.raws.lock().unwrap().push(text.to_string());
    }
}

struct Harness {
    runner: MacroRunner,
    sink: Arc<MemorySink>,
}

impl Harness {
    fn new(registry: StateRegistry) -> Self {
        let sink = Arc::new(MemorySink::new());
        Self {
            runner: MacroRunner::new(Arc::new(registry), sink.clone()),
            sink,
        }
    }

    fn run(&self, def: &MacroDef, invocation: Invocation) -> Arc<RecordingResponder> {
        let responder = Arc::new(RecordingResponder::default());
        let as_responder: Arc<dyn Responder> = responder.clone();
        self.runner.run(def, invocation, &as_responder);
        responder
    }
}

fn printer_registry() -> StateRegistry {
    let mut registry = StateRegistry::new();
    registry.register(
        "extruder",
        Arc::new(StaticStatus::new(Status::from([
            ("temperature".to_string(), Value::from(24.6)),
            ("target".to_string(), Value::from(0.0)),
        ]))),
    );
    registry.register(
        "toolhead",
        Arc::new(StaticStatus::new(Status::from([
            ("homed_axes".to_string(), Value::from("xyz")),
            (
                "position".to_string(),
                Value::Map(HashMap::from([
                    ("x".to_string(), Value::from(107.5)),
                    ("y".to_string(), Value::from(80.0)),
                    ("z".to_string(), Value::from(2.3)),
                ])),
            ),
        ]))),
    );
    registry
}

#[test]
fn macro_reads_state_and_issues_commands() {
    let harness = Harness::new(printer_registry());
    let def = MacroDef::inline(
        "park",
        r#"
            if state.toolhead.homed_axes ~= "xyz" then
                cmd.G28()
            end
            cmd.G1{Z=state.toolhead.position.z + 10, F=600}
            respond("parked")
        "#,
    );

    let responder = harness.run(&def, Invocation::default());

    assert_eq!(harness.sink.commands(), vec!["G1 F600 Z12.3"]);
    assert_eq!(responder.infos(), vec!["parked"]);
    assert!(responder.raws().is_empty());
}

#[test]
fn identical_invocations_produce_identical_output() {
    let harness = Harness::new(printer_registry());
    let def = MacroDef::inline(
        "status",
        r#"
            cmd.M117("T" .. state.extruder.temperature)
            respond(state.toolhead.position.x)
        "#,
    );

    let invocation = Invocation {
        params: HashMap::from([("TEMP".to_string(), "205".to_string())]),
        raw: "TEMP=205".to_string(),
    };

    let first = harness.run(&def, invocation.clone());
    let second = harness.run(&def, invocation);

    assert_eq!(harness.sink.commands(), vec!["M117 T24.6", "M117 T24.6"]);
    assert_eq!(first.infos(), second.infos());
    assert_eq!(first.raws(), second.raws());
}

#[test]
fn state_updates_are_visible_without_reconfiguration() {
    let provider = Arc::new(StaticStatus::new(Status::from([(
        "progress".to_string(),
        Value::from(1),
    )])));
    let mut registry = StateRegistry::new();
    registry.register("job", provider.clone());
    let harness = Harness::new(registry);

    let def = MacroDef::inline("peek", "respond(state.job.progress)");

    let responder = harness.run(&def, Invocation::default());
    assert_eq!(responder.infos(), vec!["1"]);

    // The host updates the provider; the same runner and macro observe the
    // new snapshot because nothing is cached between accesses.
    provider.set("progress", Value::from(2));

    let responder = harness.run(&def, Invocation::default());
    assert_eq!(responder.infos(), vec!["2"]);
}

#[test]
fn absent_parameter_displays_nil_without_fault() {
    let harness = Harness::new(printer_registry());
    let def = MacroDef::inline("show", "respond(params.TEMP)");

    let responder = harness.run(&def, Invocation::default());

    assert_eq!(responder.infos(), vec!["nil"]);
    assert!(responder.raws().is_empty());
}

#[test]
fn parameters_pass_through_with_raw_text() {
    let harness = Harness::new(printer_registry());
    let def = MacroDef::inline(
        "load",
        r#"
            cmd.M104{S=params.TEMP}
            respond(params.raw)
        "#,
    );

    let invocation = Invocation {
        params: HashMap::from([("TEMP".to_string(), "205".to_string())]),
        raw: "TEMP=205 EXTRA".to_string(),
    };
    let responder = harness.run(&def, invocation);

    assert_eq!(harness.sink.commands(), vec!["M104 S205"]);
    assert_eq!(responder.infos(), vec!["TEMP=205 EXTRA"]);
}

#[test]
fn fault_keeps_earlier_commands_and_never_escapes() {
    let harness = Harness::new(printer_registry());
    let def = MacroDef::inline(
        "partial",
        r#"
            cmd.G28()
            cmd.G1{Z=5}
            error("deliberate")
            cmd.M84()
        "#,
    );

    let responder = harness.run(&def, Invocation::default());

    // No rollback of already-submitted commands, nothing after the fault
    assert_eq!(harness.sink.commands(), vec!["G28", "G1 Z5"]);

    let raws = responder.raws();
    assert_eq!(raws.len(), 1);
    assert!(raws[0].contains("deliberate"));
    assert!(raws[0].lines().all(|line| line.starts_with(REPORT_PREFIX)));
}

#[test]
fn inline_syntax_error_reports_and_recommends_a_file() {
    let harness = Harness::new(printer_registry());
    let def = MacroDef::inline("broken", "cmd.G1{Z=\n");

    let responder = harness.run(&def, Invocation::default());

    let raws = responder.raws();
    assert_eq!(raws.len(), 1);
    assert!(raws[0].starts_with(REPORT_PREFIX));
    assert!(raws[0].contains("macro:BROKEN"));

    let infos = responder.infos();
    assert_eq!(infos.len(), 1);
    assert!(infos[0].contains("<b>script file</b>"));
}

#[test]
fn file_macro_picks_up_edits_between_invocations() {
    let dir = tempfile::tempdir().unwrap();
    let script_path = dir.path().join("greet.lua");
    std::fs::write(&script_path, "respond('first')").unwrap();

    let harness = Harness::new(printer_registry());
    let def = MacroDef::from_file("greet", &script_path);

    let responder = harness.run(&def, Invocation::default());
    assert_eq!(responder.infos(), vec!["first"]);

    // Edit on disk; no reconfiguration
    let mut file = std::fs::File::create(&script_path).unwrap();
    write!(file, "respond('second')").unwrap();
    drop(file);

    let responder = harness.run(&def, Invocation::default());
    assert_eq!(responder.infos(), vec!["second"]);
}

#[test]
fn config_to_execution_round_trip() {
    let kdl = r#"
        macro "heat_check" description="Warn when the hotend is cold" {
            script "if state.extruder.temperature < 170 then respond('hotend is cold', true) else cmd.G1{E=5, F=300} end"
        }

        state {
            extruder {
                temperature 24.6
            }
        }
    "#;

    let config = MacroConfig::from_string(kdl).unwrap();
    let registry = config.build_registry();
    let sink = Arc::new(MemorySink::new());
    let runner = MacroRunner::new(Arc::new(registry), sink.clone());

    let def = config.find("heat_check").unwrap();
    let responder = Arc::new(RecordingResponder::default());
    let as_responder: Arc<dyn Responder> = responder.clone();
    runner.run(def, Invocation::default(), &as_responder);

    assert!(sink.commands().is_empty());
    assert_eq!(responder.infos(), vec!["hotend is cold"]);
}

#[test]
fn respond_renders_a_proxy_as_its_snapshot() {
    let harness = Harness::new(printer_registry());
    let def = MacroDef::inline("dump", "respond(state.extruder, true)");

    let responder = harness.run(&def, Invocation::default());
    assert_eq!(responder.infos(), vec!["{target = 0, temperature = 24.6}"]);
}
