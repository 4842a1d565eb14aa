//! Request to release with one repair cycle

mod common;

use std::path::Path;

use common::*;
use forgeloop::runner::testing::{ScriptedHarness, failing, passing};
use forgeloop::{
    ArtifactStore, Category, EventType, IterationLog, IterationRecord, RunStatus, StageStatus,
    TerminalState,
};

fn stage_ends(events: &[forgeloop::WorkflowEvent]) -> Vec<&str> {
    events
        .iter()
        .filter(|e| e.event_type == EventType::StageEnd)
        .map(|e| e.stage_name.as_str())
        .collect()
}

#[tokio::test]
async fn test_request_to_release() {
    let fx = Fixture::new(
        |b| b,
        replies_with_repairs(1),
        ScriptedHarness::new(vec![failing(2, 2), passing(2)]),
    );
    let mut ctx = fx
        .pipeline
        .build_context("Build a calculator with add and subtract")
        .unwrap();

    let report = fx.pipeline.run(&mut ctx).await.unwrap();

    assert_eq!(report.status, RunStatus::Success, "{:?}", report.error);
    assert!(report.error.is_none());

    // One stage_end per stage, in pipeline order
    assert_eq!(
        stage_ends(&report.events),
        vec![
            "requirement_analysis",
            "architecture_design",
            "coding",
            "verification",
            "packaging"
        ]
    );
    let sequences: Vec<u64> = report.events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, (0..report.events.len() as u64).collect::<Vec<_>>());

    // Verification ended Passed on the second attempt
    let verification = ctx.result("verification").unwrap();
    assert_eq!(verification.status(), StageStatus::Success);
    assert_eq!(verification.terminal_state(), Some(TerminalState::Passed));
    let end = report
        .events
        .iter()
        .find(|e| e.event_type == EventType::StageEnd && e.stage_name == "verification")
        .unwrap();
    assert_eq!(end.payload["status"], "success");
    assert_eq!(end.payload["metadata"]["terminal_state"], "passed");

    assert_eq!(report.iterations.len(), 2);
    let first = &report.iterations[0];
    assert_eq!(first.iteration, 1);
    assert!(!first.passed);
    assert_eq!((first.stats.total, first.stats.failed), (2, 2));
    assert_eq!(first.diagnosis.as_ref().unwrap().error_type, "import-error");
    assert_eq!(first.repaired, vec!["calc.py"]);
    assert!(report.iterations[1].passed);

    // Documents, code and tests were stored under their categories, inside
    // the run's own directory
    let store = ctx.store();
    assert_eq!(
        store.root().unwrap(),
        fx.root().join("runs").join(&report.run_id)
    );
    assert!(store.exists(Category::Requirements, "requirements.md"));
    assert!(store.exists(Category::Design, "architecture.md"));
    assert_eq!(store.list(Category::Tests).unwrap(), vec!["test_calc.py"]);
    assert!(store.read(Category::Code, "calc.py").unwrap().contains("a + b"));

    // The release archive and its directory exist on disk
    let archive = report.package_path().unwrap();
    assert!(archive.ends_with(".tar.gz"));
    assert!(Path::new(archive).is_file());
    let release_dir = report.output["release_dir"].as_str().unwrap();
    assert!(Path::new(release_dir).join("calc.py").is_file());
}

#[tokio::test]
async fn test_iteration_log_replays_the_run() {
    let fx = Fixture::new(
        |b| b,
        replies_with_repairs(1),
        ScriptedHarness::new(vec![failing(2, 2), passing(2)]),
    );
    let mut ctx = fx.pipeline.build_context("Build an adder").unwrap();
    let report = fx.pipeline.run(&mut ctx).await.unwrap();

    let path = IterationLog::path_in(&fx.root().join("runs").join(&report.run_id));
    assert!(!IterationLog::path_in(&fx.root()).exists());
    let replayed: Vec<IterationRecord> = IterationLog::replay(&path).unwrap();
    assert_eq!(replayed, report.iterations);

    let lines = forgeloop::cli::render_log(&replayed);
    assert_eq!(lines[0], format!("run {}", report.run_id));
    assert!(lines.iter().any(|l| l.contains("import-error")));
    assert!(lines.last().unwrap().contains("passed (0/2 failed)"));
}

#[tokio::test]
async fn test_contexts_from_one_pipeline_are_independent() {
    // Replies for a second run that builds greet.py instead of calc.py
    let mut replies = replies_with_repairs(0);
    replies.extend(
        [
            "# Requirements\n- greet(name) says hello",
            "# Design\nModule greet.py exposes greet.",
            "=== FILE: greet.py ===\n```python\ndef greet(name):\n    return f\"hello {name}\"\n```",
            "=== FILE: test_greet.py ===\n```python\nfrom greet import greet\n\ndef test_greet():\n    assert greet(\"a\") == \"hello a\"\n```",
        ]
        .map(String::from),
    );
    let fx = Fixture::new(
        |b| b,
        replies,
        ScriptedHarness::new(vec![passing(1), passing(1)]),
    );

    let mut first = fx.pipeline.build_context("Build an adder").unwrap();
    let first_report = fx.pipeline.run(&mut first).await.unwrap();
    assert!(first_report.is_success(), "{:?}", first_report.error);

    let mut second = fx.pipeline.build_context("Build a greeter").unwrap();
    assert_ne!(first.run_id(), second.run_id());
    assert_eq!(second.iteration(), 0);
    assert!(second.events().is_empty());
    assert!(second.results().is_empty());
    assert!(second.store().list(Category::Code).unwrap().is_empty());

    let report = fx.pipeline.run(&mut second).await.unwrap();
    assert!(report.is_success(), "{:?}", report.error);

    // The second run's store, harness input and release hold only greet.py
    assert_ne!(first.store().root(), second.store().root());
    assert_eq!(second.store().list(Category::Code).unwrap(), vec!["greet.py"]);
    assert_eq!(second.store().list(Category::Tests).unwrap(), vec!["test_greet.py"]);

    let seen = fx.harness.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].code.keys().collect::<Vec<_>>(), vec!["greet.py"]);
    assert_eq!(seen[1].tests.keys().collect::<Vec<_>>(), vec!["test_greet.py"]);

    assert_eq!(report.output["files"], serde_json::json!(["greet.py"]));
    let release_dir = Path::new(report.output["release_dir"].as_str().unwrap());
    assert!(release_dir.join("greet.py").is_file());
    assert!(!release_dir.join("calc.py").exists());

    // The first run's artifacts are untouched
    assert_eq!(first.store().list(Category::Code).unwrap(), vec!["calc.py"]);
}
