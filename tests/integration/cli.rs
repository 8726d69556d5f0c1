//! The `tplsync` binary over JSON state files.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tplsync::model::{EntityId, Graph, Trigger};
use tplsync::store::MemoryStore;
use tplsync::test_utils::StoreBuilder;

/// One template linked to two hosts, with a graph and two triggers on the template.
///
/// Ids: template 1, hosts 2 and 3; graph 1, triggers 2 ("Memory high") and 3 ("CPU high").
fn write_state(dir: &TempDir) -> PathBuf {
    let mut builder = StoreBuilder::new();
    let template = builder.template("Template OS Linux");
    let h1 = builder.host("h1");
    let h2 = builder.host("h2");
    let cpu = builder.item(template, "cpu");
    let mem = builder.item(template, "mem");
    builder.link(template, h1);
    builder.link(template, h2);
    builder.graph("CPU load", &[cpu]);
    let up = builder.trigger("Memory high", &[mem]);
    let down = builder.trigger("CPU high", &[cpu]);
    builder.depend(down, up);

    let path = dir.path().join("state.json");
    builder.build().save(&path).unwrap();
    path
}

fn tplsync(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tplsync").unwrap();
    cmd.env_remove("TPLSYNC_CONFIG")
        .env_remove("RUST_LOG")
        .env("HOME", home)
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_propagate_dry_run_leaves_state_alone() {
    let dir = TempDir::new().unwrap();
    let state = write_state(&dir);

    tplsync(dir.path())
        .args(["--quiet", "propagate", "--kind", "graph", "--state"])
        .arg(&state)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"created\": 2"));

    let store = MemoryStore::load(&state).unwrap();
    assert_eq!(store.all_entities::<Graph>().len(), 1);
}

#[test]
fn test_propagate_write_saves_state() {
    let dir = TempDir::new().unwrap();
    let state = write_state(&dir);

    tplsync(dir.path())
        .args(["--quiet", "propagate", "--kind", "trigger", "--write", "--state"])
        .arg(&state)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"created\": 4"));

    let store = MemoryStore::load(&state).unwrap();
    assert_eq!(store.all_entities::<Trigger>().len(), 6);
    assert_eq!(store.dependency_edges().len(), 3);

    // nothing left to do on the saved state
    tplsync(dir.path())
        .args(["--quiet", "propagate", "--kind", "trigger", "--state"])
        .arg(&state)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"created\": 0"))
        .stdout(predicate::str::contains("\"unchanged\": 4"));
}

#[test]
fn test_sync_one_host() {
    let dir = TempDir::new().unwrap();
    let state = write_state(&dir);

    tplsync(dir.path())
        .args(["--quiet", "sync", "--kind", "graph", "--template", "1", "--host", "3", "--write"])
        .arg("--state")
        .arg(&state)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"created\": 1"));

    let store = MemoryStore::load(&state).unwrap();
    let clones: Vec<_> =
        store.all_entities::<Graph>().into_iter().filter(|graph| graph.origin_id.is_some()).collect();
    assert_eq!(clones.len(), 1);
    assert_eq!(clones[0].origin_id, Some(EntityId(1)));
}

#[test]
fn test_check_deps_reports_plan_and_cycles() {
    let dir = TempDir::new().unwrap();
    let state = write_state(&dir);

    let changes = dir.path().join("ok.json");
    std::fs::write(&changes, r#"[{"trigger_id": 3, "dependencies": []}]"#).unwrap();
    tplsync(dir.path())
        .args(["--quiet", "check-deps", "--state"])
        .arg(&state)
        .arg("--changes")
        .arg(&changes)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"delete\": [\n    1\n  ]"));

    let changes = dir.path().join("cycle.json");
    std::fs::write(&changes, r#"[{"trigger_id": 2, "dependencies": [3]}]"#).unwrap();
    tplsync(dir.path())
        .args(["--quiet", "check-deps", "--state"])
        .arg(&state)
        .arg("--changes")
        .arg(&changes)
        .assert()
        .failure()
        .stderr(predicate::str::contains("circular dependency Memory high -> CPU high -> Memory high"))
        .stderr(predicate::str::contains("Remove one of the dependencies"));
}

#[test]
fn test_missing_state_file() {
    let dir = TempDir::new().unwrap();

    tplsync(dir.path())
        .args(["--quiet", "propagate", "--kind", "graph", "--state"])
        .arg(dir.path().join("absent.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("state file exists"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let state = write_state(&dir);
    let config = dir.path().join("engine.toml");
    std::fs::write(&config, "write_batch_size = 0\n").unwrap();

    tplsync(dir.path())
        .args(["--quiet", "--config"])
        .arg(&config)
        .args(["propagate", "--kind", "graph", "--state"])
        .arg(&state)
        .assert()
        .failure()
        .stderr(predicate::str::contains("write_batch_size must be at least 1"));
}
