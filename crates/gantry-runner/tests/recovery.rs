//! Crash-recovery behavior: `init()` reconciles the durable state file
//! against live PIDs.

use std::collections::BTreeMap;

use gantry_runner::types::{RunStatus, RunnerConfig, TaskRecord};
use gantry_runner::{StartRequest, StateFile, Supervisor};

fn config(dir: &tempfile::TempDir) -> RunnerConfig {
    RunnerConfig {
        base_dir: dir.path().join("runner"),
        allowed_cwds: vec![dir.path().to_path_buf()],
        stop_timeout_ms: 2000,
        ..Default::default()
    }
}

fn record(id: &str, status: RunStatus, pid: Option<u32>, log_path: String) -> TaskRecord {
    let now = "2024-01-01T00:00:00Z".to_string();
    TaskRecord {
        id: id.to_string(),
        status,
        pid,
        command: "sleep 600".into(),
        args: Vec::new(),
        cwd: None,
        env: None,
        tags: Some(vec!["project".into(), "p1".into()]),
        project_id: Some("p1".into()),
        created_at: now.clone(),
        started_at: Some(now.clone()),
        ended_at: None,
        updated_at: now,
        exit_code: None,
        exit_signal: None,
        log_path,
        pid_path: None,
        stdin_attached: true,
    }
}

fn write_state(config: &RunnerConfig, tasks: BTreeMap<String, TaskRecord>) {
    let state = StateFile {
        version: 1,
        updated_at: "2024-01-01T00:00:00Z".into(),
        tasks,
    };
    gantry_runner::state::save_state(&config.state_path(), &state).unwrap();
}

/// A recorded `running` task whose PID is dead flips to `lost` and the
/// file is rewritten; a subsequent replace-start succeeds.
#[tokio::test]
async fn init_reconciles_dead_pid_to_lost() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let log_path = config.log_path("x").to_string_lossy().into_owned();

    // PID 999999 is assumed dead on any sane test host.
    let mut tasks = BTreeMap::new();
    tasks.insert("x".into(), record("x", RunStatus::Running, Some(999_999), log_path));
    write_state(&config, tasks);

    let sup = Supervisor::new(config.clone());
    sup.init().await.unwrap();

    let rec = sup.status("x").await.unwrap();
    assert_eq!(rec.status, RunStatus::Lost);
    assert!(rec.ended_at.is_some());
    assert!(!rec.stdin_attached);

    // The reconciliation was persisted.
    let on_disk = gantry_runner::state::load_state(&config.state_path()).unwrap();
    assert_eq!(on_disk.tasks["x"].status, RunStatus::Lost);

    // The id is reusable once the record is terminal.
    let rec = sup
        .start(StartRequest {
            id: Some("x".into()),
            command: "echo revived".into(),
            replace: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(rec.status, RunStatus::Running);
    let rec = sup.wait("x", Some(10_000)).await.unwrap();
    assert_eq!(rec.status, RunStatus::Stopped);
}

/// `init()` twice over consistent state is a no-op.
#[tokio::test]
async fn init_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    let log_path = config.log_path("x").to_string_lossy().into_owned();

    let mut tasks = BTreeMap::new();
    tasks.insert("x".into(), record("x", RunStatus::Stopped, None, log_path));
    write_state(&config, tasks);

    let sup = Supervisor::new(config.clone());
    sup.init().await.unwrap();
    let first = sup.status("x").await.unwrap();
    sup.init().await.unwrap();
    let second = sup.status("x").await.unwrap();

    assert_eq!(first.status, second.status);
    assert_eq!(first.updated_at, second.updated_at);
}

/// A recorded task whose PID is still alive stays `running` and can be
/// stopped through the orphan path.
#[tokio::test]
async fn init_keeps_live_orphans_and_stop_reaps_them() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);

    // A real process the supervisor does not manage. A reaper thread
    // collects it on death so the PID does not linger as a zombie.
    let mut child = std::process::Command::new("sleep")
        .arg("60")
        .spawn()
        .unwrap();
    let pid = child.id();
    let _reaper = std::thread::spawn(move || {
        let _ = child.wait();
    });

    let log_path = config.log_path("orphan").to_string_lossy().into_owned();
    let mut tasks = BTreeMap::new();
    tasks.insert(
        "orphan".into(),
        record("orphan", RunStatus::Running, Some(pid), log_path),
    );
    write_state(&config, tasks);

    let sup = Supervisor::new(config);
    sup.init().await.unwrap();

    let rec = sup.status("orphan").await.unwrap();
    assert_eq!(rec.status, RunStatus::Running, "live pid stays running");
    assert!(!rec.stdin_attached, "stdin never survives a restart");

    let rec = sup.stop("orphan", Some(3000)).await.unwrap();
    assert_eq!(rec.status, RunStatus::Stopped);
}
