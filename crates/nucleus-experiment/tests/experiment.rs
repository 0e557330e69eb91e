//! Experiment runs end to end: decoding, worker pool, failure isolation,
//! output routing, and progress-log recovery.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use nucleus_core::{ContractError, ErrorKind};
use nucleus_experiment::{
    Dimension, Experiment, ExperimentBuilder, ExperimentConfig, ExperimentError, ScenarioFailure,
    ScenarioStatus,
};
use nucleus_kernel::{ClosureActor, Plugin, PluginData, PluginDataBuilder};
use nucleus_test_utils::Trace;

// ── fixtures ───────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
struct Params {
    rate: u32,
    size: u32,
}

impl PluginData for Params {
    fn to_builder(&self) -> Box<dyn PluginDataBuilder> {
        Box::new(*self)
    }
}

impl PluginDataBuilder for Params {
    fn build(&self) -> Arc<dyn PluginData> {
        Arc::new(*self)
    }
}

const FAILING_RATE: u32 = 99;
const PANICKING_RATE: u32 = 77;

/// One actor releasing `rate * 10 + size` at time 1. Rate 99 fails the
/// scenario with a contract error, rate 77 panics.
fn model() -> Plugin {
    Plugin::builder("model")
        .add_plugin_data(Params { rate: 0, size: 0 })
        .set_initializer(|ctx| {
            let params = *ctx.get_plugin_data::<Params>()?;
            ctx.add_actor(ClosureActor::new(move |ctx| {
                ctx.add_plan(1.0, move |_, ctx| match params.rate {
                    FAILING_RATE => Err(ContractError::custom("rate rejected")),
                    PANICKING_RATE => panic!("rate exploded"),
                    rate => {
                        ctx.release_output(rate * 10 + params.size);
                        Ok(())
                    }
                })
            }));
            Ok(())
        })
        .build()
}

fn rate_dimension(rates: &[u32]) -> Dimension {
    rates
        .iter()
        .fold(Dimension::builder().add_metadata("rate"), |b, &rate| {
            b.add_level(move |ctx| {
                if let Some(params) = ctx.get_plugin_data_builder::<Params>() {
                    params.rate = rate;
                }
                vec![rate.to_string()]
            })
        })
        .build()
}

fn size_dimension(sizes: &[u32]) -> Dimension {
    sizes
        .iter()
        .fold(Dimension::builder().add_metadata("size"), |b, &size| {
            b.add_level(move |ctx| {
                if let Some(params) = ctx.get_plugin_data_builder::<Params>() {
                    params.size = size;
                }
                vec![size.to_string()]
            })
        })
        .build()
}

type Outputs = Arc<Mutex<BTreeMap<usize, Vec<u32>>>>;

/// Collect every `u32` output by scenario.
fn collect_outputs(builder: ExperimentBuilder) -> (ExperimentBuilder, Outputs) {
    let outputs: Outputs = Arc::default();
    let sink = Arc::clone(&outputs);
    let builder = builder.add_experiment_context_consumer(move |ctx| {
        let sink = Arc::clone(&sink);
        ctx.subscribe_to_output::<u32, _>(move |_, scenario, value| {
            sink.lock().unwrap().entry(scenario).or_default().push(*value);
        });
    });
    (builder, outputs)
}

fn temp_log(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("nucleus-experiment-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = fs::remove_file(&path);
    path
}

// ── scenario space ─────────────────────────────────────────────

#[test]
fn three_by_four_on_two_threads_finishes_every_scenario() {
    let (builder, outputs) = collect_outputs(
        Experiment::builder()
            .add_plugin(model())
            .add_dimension(rate_dimension(&[1, 2, 3]))
            .add_dimension(size_dimension(&[0, 1, 2, 3]))
            .thread_count(2),
    );
    let experiment = builder.build().unwrap();
    assert_eq!(experiment.scenario_count(), 12);

    let summary = experiment.execute().unwrap();
    assert_eq!(summary.scenario_count(), 12);
    assert_eq!(summary.succeeded, 12);
    assert!(summary.records.iter().all(|r| r.status.is_terminal()));

    let outputs = outputs.lock().unwrap();
    for scenario in 0..12 {
        let rate = [1, 2, 3][scenario % 3];
        let size = (scenario / 3) as u32;
        assert_eq!(outputs[&scenario], vec![rate * 10 + size]);
        assert_eq!(
            summary.records[scenario].metadata,
            vec![rate.to_string(), size.to_string()]
        );
    }
}

#[test]
fn pooled_and_sequential_runs_agree() {
    let run = |threads| {
        let (builder, outputs) = collect_outputs(
            Experiment::builder()
                .add_plugin(model())
                .add_dimension(rate_dimension(&[1, 2]))
                .add_dimension(size_dimension(&[4, 5, 6]))
                .thread_count(threads),
        );
        let summary = builder.build().unwrap().execute().unwrap();
        let outputs = outputs.lock().unwrap().clone();
        (summary, outputs)
    };
    let (sequential, seq_outputs) = run(0);
    let (pooled, pool_outputs) = run(4);
    assert_eq!(sequential, pooled);
    assert_eq!(seq_outputs, pool_outputs);
}

#[test]
fn no_dimensions_runs_one_scenario_with_original_data() {
    let (builder, outputs) = collect_outputs(Experiment::builder().add_plugin(model()));
    let summary = builder.build().unwrap().execute().unwrap();
    assert_eq!(summary.scenario_count(), 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(outputs.lock().unwrap()[&0], vec![0]);
}

// ── failures ───────────────────────────────────────────────────

#[test]
fn failures_are_isolated_per_scenario() {
    let summary = Experiment::builder()
        .add_plugin(model())
        .add_dimension(rate_dimension(&[1, FAILING_RATE, PANICKING_RATE, 2]))
        .thread_count(2)
        .build()
        .unwrap()
        .execute()
        .unwrap();

    let statuses: Vec<ScenarioStatus> = summary.records.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            ScenarioStatus::Succeeded,
            ScenarioStatus::Failed,
            ScenarioStatus::Failed,
            ScenarioStatus::Succeeded,
        ]
    );
    assert!(matches!(
        &summary.records[1].failure,
        Some(ScenarioFailure::Contract(e)) if matches!(e.kind, ErrorKind::Custom { .. })
    ));
    assert_eq!(
        summary.records[2].failure,
        Some(ScenarioFailure::Panicked {
            message: "rate exploded".into()
        })
    );
    assert_eq!(summary.failed, 2);
}

#[test]
fn wrong_metadata_count_fails_only_that_scenario() {
    let dimension = Dimension::builder()
        .add_metadata("label")
        .add_level(|_| vec!["ok".into()])
        .add_level(|_| vec!["too".into(), "many".into()])
        .build();
    let summary = Experiment::builder()
        .add_plugin(model())
        .add_dimension(dimension)
        .build()
        .unwrap()
        .execute()
        .unwrap();
    assert_eq!(summary.records[0].status, ScenarioStatus::Succeeded);
    assert_eq!(
        summary.records[1].failure,
        Some(ScenarioFailure::LevelMetadata {
            dimension: 0,
            expected: 1,
            found: 2
        })
    );
}

#[test]
fn scenario_failing_its_levels_never_opens_a_simulation() {
    let dimension = Dimension::builder()
        .add_metadata("label")
        .add_level(|_| vec!["ok".into()])
        .add_level(|_| Vec::new())
        .build();
    let trace = Trace::new();
    let t = trace.clone();
    let summary = Experiment::builder()
        .add_plugin(model())
        .add_dimension(dimension)
        .add_experiment_context_consumer(move |ctx| {
            let (t_start, t_end) = (t.clone(), t.clone());
            ctx.subscribe_to_simulation_open(move |_, id| t_start.record(format!("start {id}")));
            ctx.subscribe_to_simulation_close(move |_, id, _| t_end.record(format!("end {id}")));
        })
        .build()
        .unwrap()
        .execute()
        .unwrap();
    assert_eq!(summary.records[1].status, ScenarioStatus::Failed);
    assert_eq!(trace.entries(), vec!["start 0", "end 0"]);
}

#[test]
fn halt_on_failure_returns_the_first_failure() {
    let err = Experiment::builder()
        .add_plugin(model())
        .add_dimension(rate_dimension(&[FAILING_RATE, 1]))
        .config(ExperimentConfig {
            halt_on_failure: true,
            ..ExperimentConfig::default()
        })
        .build()
        .unwrap()
        .execute()
        .unwrap_err();
    assert!(matches!(
        err,
        ExperimentError::ScenarioFailed { scenario: 0, .. }
    ));
}

// ── lifecycle ──────────────────────────────────────────────────

#[test]
fn lifecycle_callbacks_bracket_every_scenario() {
    let trace = Trace::new();
    let t = trace.clone();
    let summary = Experiment::builder()
        .add_plugin(model())
        .add_dimension(rate_dimension(&[1, 2, 3, FAILING_RATE]))
        .thread_count(3)
        .add_experiment_context_consumer(move |ctx| {
            let (t_open, t_start, t_end, t_close) = (t.clone(), t.clone(), t.clone(), t.clone());
            ctx.subscribe_to_experiment_open(move |view| {
                t_open.record(format!("open {}", view.scenario_count()));
            });
            ctx.subscribe_to_simulation_open(move |view, id| {
                assert_eq!(view.status(id), Some(ScenarioStatus::Running));
                t_start.record(format!("start {id}"));
            });
            ctx.subscribe_to_simulation_close(move |_, id, status| {
                t_end.record(format!("end {id} {status:?}"));
            });
            ctx.subscribe_to_experiment_close(move |view| {
                assert_eq!(view.experiment_metadata(), ["rate"]);
                t_close.record("close");
            });
        })
        .build()
        .unwrap()
        .execute()
        .unwrap();
    assert_eq!(summary.failed, 1);

    let entries = trace.entries();
    assert_eq!(entries.first().map(String::as_str), Some("open 4"));
    assert_eq!(entries.last().map(String::as_str), Some("close"));
    assert_eq!(entries.len(), 2 + 4 * 2);
    for id in 0..4 {
        let start = trace.position(&format!("start {id}")).unwrap();
        let status = if id == 3 { "Failed" } else { "Succeeded" };
        let end = trace.position(&format!("end {id} {status}")).unwrap();
        assert!(start < end);
    }
}

// ── progress log ───────────────────────────────────────────────

#[test]
fn resuming_skips_logged_successes_and_reruns_the_rest() {
    let path = temp_log("resume.tsv");
    let build = |resume: bool| {
        Experiment::builder()
            .add_plugin(model())
            .add_dimension(rate_dimension(&[1, FAILING_RATE, 2]))
            .progress_log(&path)
            .continue_from_progress_log(resume)
            .build()
            .unwrap()
    };

    let first = build(false).execute().unwrap();
    assert_eq!(first.succeeded, 2);
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "scenario\trate\n0\t1\n2\t2\n"
    );

    let (builder, outputs) = collect_outputs(
        Experiment::builder()
            .add_plugin(model())
            .add_dimension(rate_dimension(&[1, FAILING_RATE, 2]))
            .progress_log(&path)
            .continue_from_progress_log(true),
    );
    let second = builder.build().unwrap().execute().unwrap();
    assert_eq!(second.previously_succeeded, 2);
    assert_eq!(second.succeeded, 0);
    assert_eq!(second.records[1].status, ScenarioStatus::Failed);
    assert_eq!(second.records[2].metadata, vec!["2"]);
    assert!(outputs.lock().unwrap().is_empty());
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "scenario\trate\n0\t1\n2\t2\n"
    );

    let fresh = build(false).execute().unwrap();
    assert_eq!(fresh.previously_succeeded, 0);
}

#[test]
fn progress_log_from_other_level_values_reruns_everything() {
    let path = temp_log("levels.tsv");
    Experiment::builder()
        .add_plugin(model())
        .add_dimension(rate_dimension(&[1, 2]))
        .progress_log(&path)
        .build()
        .unwrap()
        .execute()
        .unwrap();

    let (builder, outputs) = collect_outputs(
        Experiment::builder()
            .add_plugin(model())
            .add_dimension(rate_dimension(&[5, 6]))
            .progress_log(&path)
            .continue_from_progress_log(true),
    );
    let summary = builder.build().unwrap().execute().unwrap();
    assert_eq!(summary.previously_succeeded, 0);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.records[0].metadata, vec!["5"]);
    assert_eq!(
        *outputs.lock().unwrap(),
        BTreeMap::from([(0, vec![50]), (1, vec![60])])
    );
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "scenario\trate\n0\t5\n1\t6\n"
    );
}

#[test]
fn corrupt_progress_log_reruns_everything() {
    let path = temp_log("corrupt.tsv");
    fs::write(&path, "scenario\trate\n0\t1\ngarbage\n").unwrap();
    let summary = Experiment::builder()
        .add_plugin(model())
        .add_dimension(rate_dimension(&[1, 2]))
        .progress_log(&path)
        .continue_from_progress_log(true)
        .build()
        .unwrap()
        .execute()
        .unwrap();
    assert_eq!(summary.previously_succeeded, 0);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "scenario\trate\n0\t1\n1\t2\n"
    );
}

#[test]
fn progress_log_for_other_metadata_is_ignored() {
    let path = temp_log("schema.tsv");
    fs::write(&path, "scenario\tsize\n0\t1\n").unwrap();
    let summary = Experiment::builder()
        .add_plugin(model())
        .add_dimension(rate_dimension(&[1]))
        .progress_log(&path)
        .continue_from_progress_log(true)
        .build()
        .unwrap()
        .execute()
        .unwrap();
    assert_eq!(summary.previously_succeeded, 0);
    assert_eq!(summary.succeeded, 1);
}

#[test]
fn resuming_without_a_log_path_is_a_config_error() {
    let err = Experiment::builder()
        .continue_from_progress_log(true)
        .build()
        .unwrap_err();
    assert!(matches!(err, ExperimentError::Config(_)));
}
