use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::json;
use tempfile::tempdir;
use xeda_core::rng::RngHandle;
use xeda_core::serde::from_json_slice;
use xeda_core::settings::FlowSettings;
use xeda_core::XedaError;
use xeda_flow::{Flow, FlowResults, FlowRunner, RunnerOptions, SettingsRequest};
use xeda_fmax::{
    launch, ArtifactTarget, FmaxArtifact, FmaxConfig, FmaxSearch, RunnerTrialFactory,
    Termination, Trial, TrialFactory,
};
use xeda_pool::WorkerPool;

struct SteppedFlow {
    trial: Trial,
    threshold: f64,
    delay: Duration,
    fail_delay: Duration,
    settings: FlowSettings,
    run_dir: PathBuf,
    results: FlowResults,
}

impl SteppedFlow {
    fn wns(&self) -> f64 {
        self.trial.clock_period - 1000.0 / self.threshold
    }
}

impl Flow for SteppedFlow {
    fn name(&self) -> &str {
        "synth"
    }

    fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    async fn run(&mut self) -> Result<(), XedaError> {
        let delay = if self.wns() >= 0.0 {
            self.delay
        } else {
            self.fail_delay
        };
        tokio::time::sleep(delay).await;
        Ok(())
    }

    fn parse_reports(&mut self) -> Result<(), XedaError> {
        let wns = self.wns();
        self.results.insert("success", wns >= 0.0);
        self.results.insert("wns", wns);
        self.results.insert("clock_frequency", self.trial.frequency);
        Ok(())
    }

    fn results(&self) -> &FlowResults {
        &self.results
    }
}

struct SteppedFactory {
    threshold: f64,
    delay: Duration,
    fail_delay: Duration,
}

impl SteppedFactory {
    fn uniform(threshold: f64, delay: Duration) -> Self {
        Self {
            threshold,
            delay,
            fail_delay: delay,
        }
    }
}

impl TrialFactory for SteppedFactory {
    type Flow = SteppedFlow;

    fn build(&self, trial: &Trial) -> Result<SteppedFlow, XedaError> {
        let mut settings = FlowSettings::default();
        settings
            .flow
            .insert("clock_period".into(), json!(trial.clock_period));
        Ok(SteppedFlow {
            trial: *trial,
            threshold: self.threshold,
            delay: self.delay,
            fail_delay: self.fail_delay,
            settings,
            run_dir: PathBuf::from("runs/synth"),
            results: FlowResults::new(),
        })
    }
}

fn target(dir: &Path) -> ArtifactTarget {
    ArtifactTarget {
        dir: dir.to_path_buf(),
        design: "aes".into(),
        flow: "synth".into(),
        timestamp: "2026-10-16-120000".into(),
    }
}

#[tokio::test]
async fn completed_search_writes_the_best_artifact() {
    let dir = tempdir().expect("tempdir");
    let search =
        FmaxSearch::new(FmaxConfig::default(), 4, RngHandle::from_seed(5)).expect("search");
    let factory = SteppedFactory::uniform(180.0, Duration::from_millis(1));

    let outcome = launch(
        search,
        &factory,
        WorkerPool::new(4),
        std::future::pending::<()>(),
        target(dir.path()),
    )
    .await
    .expect("launch");

    assert!(!matches!(
        outcome.termination,
        Termination::Interrupted | Termination::Failed(_)
    ));
    let path = outcome.artifact_path.expect("artifact written");
    assert_eq!(
        path.file_name().and_then(|name| name.to_str()),
        Some("fmax_aes_synth_2026-10-16-120000.json")
    );
    let written: FmaxArtifact =
        from_json_slice(&std::fs::read(&path).expect("read artifact")).expect("parse artifact");
    let artifact = outcome.artifact.expect("artifact");
    assert_eq!(written, artifact);
    assert!(artifact.frequency <= 180.0);
    assert!(artifact.results.success());
    assert_eq!(artifact.iterations, outcome.iterations);
    assert_eq!(artifact.provenance.seed, 5);
    assert_eq!(artifact.provenance.settings_hash.len(), 64);
    assert_eq!(artifact.settings.flow["clock_period"], artifact.clock_period);
}

#[tokio::test]
async fn interrupt_without_a_pass_leaves_no_artifact() {
    let dir = tempdir().expect("tempdir");
    let search =
        FmaxSearch::new(FmaxConfig::default(), 4, RngHandle::from_seed(9)).expect("search");
    let factory = SteppedFactory::uniform(180.0, Duration::from_secs(30));

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        launch(
            search,
            &factory,
            WorkerPool::new(4),
            tokio::time::sleep(Duration::from_millis(100)),
            target(dir.path()),
        ),
    )
    .await
    .expect("interrupt is honoured promptly")
    .expect("launch");

    assert_eq!(outcome.termination, Termination::Interrupted);
    assert!(outcome.artifact.is_none());
    assert!(outcome.artifact_path.is_none());
    assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 0);
}

#[tokio::test]
async fn pass_finished_before_interrupt_is_persisted() {
    let dir = tempdir().expect("tempdir");
    let search =
        FmaxSearch::new(FmaxConfig::default(), 4, RngHandle::from_seed(9)).expect("search");
    // Only the 1 MHz candidate passes; its siblings are still running when the
    // interrupt arrives.
    let factory = SteppedFactory {
        threshold: 180.0,
        delay: Duration::from_millis(10),
        fail_delay: Duration::from_secs(30),
    };

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        launch(
            search,
            &factory,
            WorkerPool::new(4),
            tokio::time::sleep(Duration::from_millis(500)),
            target(dir.path()),
        ),
    )
    .await
    .expect("interrupt is honoured promptly")
    .expect("launch");

    assert_eq!(outcome.termination, Termination::Interrupted);
    let artifact = outcome.artifact.expect("pass survives the interrupt");
    assert_eq!(artifact.frequency, 1.0);
    assert!(artifact.results.success());
    let path = outcome.artifact_path.expect("artifact written");
    let written: FmaxArtifact =
        from_json_slice(&std::fs::read(&path).expect("read artifact")).expect("parse artifact");
    assert_eq!(written, artifact);
}

#[test]
fn runner_factory_injects_the_clock_period() {
    let project = json!({
        "design": {"name": "aes"},
        "flows": {"synth": {"clock_period": 10.0, "tool": "synth-tool"}}
    });
    let resolved =
        FlowRunner::resolve_settings(&project, &SettingsRequest::default()).expect("resolve");
    let runner = FlowRunner::new(resolved, RunnerOptions::default());
    let factory = RunnerTrialFactory::new(runner, "synth").expect("factory");

    let fast = factory.build(&Trial::new(0, 250.0)).expect("build");
    let slow = factory.build(&Trial::new(1, 125.0)).expect("build");
    assert_eq!(fast.settings().flow["clock_period"], 4.0);
    assert_eq!(slow.settings().flow["clock_period"], 8.0);
    assert_ne!(fast.run_dir(), slow.run_dir());
    assert_eq!(factory.runner().settings().flow_section("synth").expect("synth")["clock_period"], 10.0);
}

#[test]
fn config_reads_flow_section_knobs() {
    let section = json!({
        "fmax_low_freq": 50,
        "fmax_high_freq": 400.0,
        "fmax_max_no_improvements": 5,
        "timeout": 120,
        "fmax_tuning": {"shrink_base": 0.5},
        "tool": "ignored"
    });
    let config = FmaxConfig::from_flow_section(section.as_object()).expect("config");
    assert_eq!(config.low_freq, 50.0);
    assert_eq!(config.high_freq, 400.0);
    assert_eq!(config.resolution, 0.09);
    assert_eq!(config.max_no_improvements, 5);
    assert_eq!(config.timeout(), Duration::from_secs(120));
    assert_eq!(config.tuning.shrink_base, 0.5);
    assert_eq!(config.tuning.headroom_resolutions, 2.3);

    let defaults = FmaxConfig::from_flow_section(None).expect("defaults");
    assert_eq!(defaults, FmaxConfig::default());

    let inverted = json!({"fmax_low_freq": 500.0, "fmax_high_freq": 100.0});
    let err = FmaxConfig::from_flow_section(inverted.as_object()).unwrap_err();
    assert!(matches!(err, XedaError::Config(_)));
}
