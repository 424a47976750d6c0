use std::fs;

use tempfile::tempdir;
use virial_mc::{DiscretizationMode, MoveKind, RunConfig};

#[test]
fn defaults_validate() {
    let config = RunConfig::default();
    config.validate().unwrap();
    assert_eq!(config.cycles(), 100);
    assert_eq!(config.beta(), 1.0);
    assert_eq!(config.moves.enabled(), vec![(MoveKind::Translate, 1.0)]);
    assert_eq!(config.calibration.equilibration_cycles(config.steps), 5);
    assert_eq!(config.calibration.alpha_cycles(config.steps), 2);
    assert!(config.checkpoint.reuse_alpha);
}

#[test]
fn yaml_fills_in_defaults() {
    let yaml = r#"
steps: 20000
temperature: 500.0
beads: 8
ring:
  mass: 4.0026
moves:
  ring_regrow_full:
    frequency: 1.0
    step: 0.0
    min_step: 0.0
    max_step: 0.0
overlap:
  reference_fraction: 0.3
checkpoint:
  directory: /tmp/refpref
  mode: subtract-half
  tag: _run1
seed_policy:
  master_seed: 42
"#;
    let config = RunConfig::from_yaml_str(yaml).unwrap();
    assert_eq!(config.steps, 20_000);
    assert_eq!(config.block_size, 1000);
    assert_eq!(config.beads, 8);
    assert_eq!(config.ring.partial_trials, 4);
    assert_eq!(config.overlap.reference_fraction, Some(0.3));
    assert_eq!(config.checkpoint.mode, DiscretizationMode::SubtractHalf);
    assert_eq!(config.checkpoint.tag.as_deref(), Some("_run1"));
    assert!(config.checkpoint.reuse_alpha);
    assert_eq!(config.seed_policy.master_seed, 42);
    assert_eq!(
        config.moves.enabled(),
        vec![(MoveKind::Translate, 1.0), (MoveKind::RingRegrowFull, 1.0)]
    );
    assert_eq!(config.calibration.equilibration_cycles(config.steps), 1);
}

#[test]
fn json_files_load_by_extension() {
    let dir = tempdir().unwrap();
    let mut config = RunConfig::default();
    config.steps = 5000;
    config.derivative_order = 2;
    config.histogram.enabled = true;
    let path = dir.path().join("run.json");
    fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    assert_eq!(RunConfig::load(&path).unwrap(), config);

    let yaml_path = dir.path().join("run.yaml");
    fs::write(&yaml_path, "steps: 3000\nderivative_order: 1\n").unwrap();
    let loaded = RunConfig::load(&yaml_path).unwrap();
    assert_eq!(loaded.steps, 3000);
    assert_eq!(loaded.derivative_order, 1);
}

#[test]
fn steps_must_fill_whole_macro_cycles() {
    let err = RunConfig::from_yaml_str("steps: 1500\n").unwrap_err();
    assert_eq!(err.info().code, "steps-granularity");
    assert!(err.info().hint.is_some());

    let err = RunConfig::from_yaml_str("steps: 0\n").unwrap_err();
    assert_eq!(err.info().code, "steps-granularity");
}

#[test]
fn ring_moves_need_beads() {
    let mut config = RunConfig::default();
    config.moves.ring_scale.frequency = 1.0;
    let err = config.validate().unwrap_err();
    assert_eq!(err.info().code, "ring-move-classical");
    assert_eq!(err.info().context.get("move").map(String::as_str), Some("ring-scale"));
}

#[test]
fn rings_need_a_length_scale() {
    let mut config = RunConfig::default();
    config.beads = 4;
    let err = config.validate().unwrap_err();
    assert_eq!(err.info().code, "ring-scale");

    config.ring.wavelength = Some(1.5);
    config.validate().unwrap();
}

#[test]
fn invalid_parameters_are_reported_by_code() {
    let cases: [(&str, fn(&mut RunConfig)); 10] = [
        ("block-size", |c| c.block_size = 0),
        ("temperature", |c| c.temperature = -1.0),
        ("beads", |c| c.beads = 0),
        ("no-moves", |c| c.moves.translate.frequency = 0.0),
        ("move-frequency", |c| c.moves.rotate.frequency = f64::NAN),
        ("move-step", |c| c.moves.translate.step = 20.0),
        ("reference-fraction", |c| c.overlap.reference_fraction = Some(1.0)),
        ("alpha-span", |c| c.calibration.alpha_span = 1.0),
        ("histogram", |c| {
            c.histogram.enabled = true;
            c.histogram.bins = 0;
        }),
        ("report-interval", |c| c.report_interval = 0),
    ];
    for (code, mutate) in cases {
        let mut config = RunConfig::default();
        mutate(&mut config);
        let err = config.validate().unwrap_err();
        assert_eq!(err.info().code, code);
    }
}

#[test]
fn unknown_yaml_is_a_parse_error() {
    let err = RunConfig::from_yaml_str("steps: [1, 2]\n").unwrap_err();
    assert_eq!(err.info().code, "config-parse");
}
