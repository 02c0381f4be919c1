//! The process supervisor: spawns children through the shell, spools their
//! output, escalates SIGTERM to SIGKILL on stop, and reconciles orphans
//! after a gateway restart.
//!
//! All in-memory state lives behind one mutex; the durable state file is
//! rewritten (atomically) after every mutation while the mutex is held.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::errors::{Result, RunnerError};
use crate::now_iso;
use crate::state;
use crate::types::{LogSlice, LogsRequest, RunStatus, RunnerConfig, StartRequest, StateFile, TaskRecord};

/// Default tail window for `logs` when no range is given.
const DEFAULT_TAIL_BYTES: u64 = 16 * 1024;
/// Default cap on bytes returned by `logs`.
const DEFAULT_MAX_BYTES: u64 = 256 * 1024;
/// Grace period for the reaper after a SIGKILL escalation.
const KILL_GRACE: Duration = Duration::from_secs(5);
/// Poll interval for orphan processes we have no child handle for.
const ORPHAN_POLL: Duration = Duration::from_millis(100);

/// Capped append-only log file; truncated and restarted at the cap.
struct LogSink {
    file: std::fs::File,
    written: u64,
    cap: u64,
}

impl LogSink {
    fn open(path: &Path, cap: u64) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self { file, written: 0, cap })
    }

    fn append(&mut self, data: &[u8]) -> std::io::Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        if self.written + data.len() as u64 > self.cap {
            self.file.set_len(0)?;
            let _ = self.file.seek(SeekFrom::Start(0))?;
            self.written = 0;
        }
        self.file.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }
}

/// Live handle to a managed child.
struct ChildHandle {
    stdin: Option<ChildStdin>,
    exited: watch::Receiver<bool>,
    stop_requested: Arc<AtomicBool>,
    kill_escalated: Arc<AtomicBool>,
    timed_out: Arc<AtomicBool>,
}

struct Inner {
    tasks: BTreeMap<String, TaskRecord>,
    children: HashMap<String, ChildHandle>,
}

/// Supervisor for long-lived child processes with durable records.
pub struct Supervisor {
    config: RunnerConfig,
    inner: Arc<Mutex<Inner>>,
}

impl Supervisor {
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(Inner {
                tasks: BTreeMap::new(),
                children: HashMap::new(),
            })),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Reconcile durable state with reality. Idempotent.
    ///
    /// Records with a live PID stay `running` (as unmanaged orphans);
    /// non-terminal records whose PID is gone become `lost`. Stdin can
    /// never survive a restart, so `stdin_attached` resets everywhere.
    pub async fn init(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let disk = state::load_state(&self.config.state_path())?;
        let mut mutated = false;
        for (id, mut rec) in disk.tasks {
            if inner.children.contains_key(&id) {
                // A live managed child beats the disk copy.
                continue;
            }
            if rec.stdin_attached {
                rec.stdin_attached = false;
                mutated = true;
            }
            if !rec.status.is_terminal() {
                let alive = rec.pid.map(pid_alive).unwrap_or(false);
                if !alive {
                    debug!(id, pid = ?rec.pid, "reconciling dead task to lost");
                    rec.status = RunStatus::Lost;
                    rec.ended_at = Some(now_iso());
                    rec.updated_at = now_iso();
                    mutated = true;
                }
            }
            let _ = inner.tasks.insert(id, rec);
        }
        if mutated {
            persist(&self.config, &inner.tasks)?;
        }
        Ok(())
    }

    /// Spawn a supervised task.
    pub async fn start(&self, req: StartRequest) -> Result<TaskRecord> {
        if req.command.trim().is_empty() {
            return Err(RunnerError::Spawn("command required".into()));
        }
        let id = match req.id.clone() {
            Some(id) => id,
            None => short_id(),
        };
        let stop_timeout = req.stop_timeout_ms.unwrap_or(self.config.stop_timeout_ms);

        // Duplicate / replace checks and tag-victim collection.
        let mut to_stop: Vec<String> = Vec::new();
        {
            let inner = self.inner.lock().await;
            if let Some(existing) = inner.tasks.get(&id) {
                if !req.replace {
                    return Err(RunnerError::AlreadyExists(id));
                }
                if !existing.status.is_terminal() {
                    if !req.force {
                        return Err(RunnerError::StillRunning(id));
                    }
                    to_stop.push(id.clone());
                }
            }
            if req.force_by_tags {
                if let Some(tags) = &req.tags {
                    for (tid, rec) in &inner.tasks {
                        if *tid != id && !rec.status.is_terminal() && rec.shares_tag(tags) {
                            to_stop.push(tid.clone());
                        }
                    }
                }
            }
        }
        for tid in &to_stop {
            if let Err(e) = self.stop(tid, Some(stop_timeout)).await {
                warn!(id = %tid, error = %e, "pre-start stop failed");
            }
        }

        let cwd = match &req.cwd {
            Some(c) => {
                let path = PathBuf::from(c);
                if !self.config.cwd_allowed(&path) {
                    return Err(RunnerError::CwdNotAllowed(c.clone()));
                }
                Some(path)
            }
            None => None,
        };

        let full_command = if req.args.is_empty() {
            req.command.clone()
        } else {
            format!("{} {}", req.command, req.args.join(" "))
        };

        // Inherited environment minus blocked variables, plus overrides.
        let mut env: HashMap<String, String> = std::env::vars()
            .filter(|(k, _)| !self.config.blocked_env.contains(k))
            .collect();
        if let Some(overrides) = &req.env {
            env.extend(overrides.clone());
        }

        let log_path = self.config.log_path(&id);
        let sink = Arc::new(std::sync::Mutex::new(LogSink::open(
            &log_path,
            self.config.max_log_size_bytes,
        )?));

        let mut inner = self.inner.lock().await;
        let _ = inner.tasks.remove(&id);
        let _ = inner.children.remove(&id);

        let mut cmd = Command::new("bash");
        let _ = cmd
            .arg("-lc")
            .arg(&full_command)
            .env_clear()
            .envs(&env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &cwd {
            let _ = cmd.current_dir(dir);
        }
        let mut child = cmd
            .spawn()
            .map_err(|e| RunnerError::Spawn(format!("{full_command}: {e}")))?;
        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let pid_path = self.config.pid_path(&id);
        if let Some(pid) = pid {
            if let Some(parent) = pid_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&pid_path, format!("{pid}\n"))?;
        }

        let now = now_iso();
        let record = TaskRecord {
            id: id.clone(),
            status: RunStatus::Running,
            pid,
            command: req.command.clone(),
            args: req.args.clone(),
            cwd: req.cwd.clone(),
            env: req.env.clone(),
            tags: req.tags.clone(),
            project_id: req.project_id.clone(),
            created_at: now.clone(),
            started_at: Some(now.clone()),
            ended_at: None,
            updated_at: now,
            exit_code: None,
            exit_signal: None,
            log_path: log_path.to_string_lossy().into_owned(),
            pid_path: Some(pid_path.to_string_lossy().into_owned()),
            stdin_attached: stdin.is_some(),
        };
        let _ = inner.tasks.insert(id.clone(), record.clone());

        let (exited_tx, exited_rx) = watch::channel(false);
        let stop_requested = Arc::new(AtomicBool::new(false));
        let kill_escalated = Arc::new(AtomicBool::new(false));
        let timed_out = Arc::new(AtomicBool::new(false));
        let _ = inner.children.insert(
            id.clone(),
            ChildHandle {
                stdin,
                exited: exited_rx.clone(),
                stop_requested: stop_requested.clone(),
                kill_escalated: kill_escalated.clone(),
                timed_out: timed_out.clone(),
            },
        );
        persist(&self.config, &inner.tasks)?;
        drop(inner);

        // Run-timeout enforcer.
        if let Some(run_timeout_ms) = req.run_timeout_ms {
            let timed_out = timed_out.clone();
            let mut exited = exited_rx;
            let _ = tokio::spawn(async move {
                let deadline = Duration::from_millis(run_timeout_ms);
                if tokio::time::timeout(deadline, exited.wait_for(|v| *v))
                    .await
                    .is_err()
                {
                    timed_out.store(true, Ordering::SeqCst);
                    if let Some(pid) = pid {
                        terminate(pid, true);
                    }
                }
            });
        }

        let stdout_spool = stdout.map(|mut out| {
            let sink = sink.clone();
            tokio::spawn(async move { spool(&mut out, &sink).await })
        });
        let stderr_spool = stderr.map(|mut err| {
            let sink = sink.clone();
            tokio::spawn(async move { spool(&mut err, &sink).await })
        });

        // Exit watcher: the single place a managed child's record is
        // finalized. Joins the spoolers first so the log file is complete
        // before waiters wake.
        {
            let inner = self.inner.clone();
            let config = self.config.clone();
            let id = id.clone();
            let _ = tokio::spawn(async move {
                let status = child.wait().await;
                if let Some(handle) = stdout_spool {
                    let _ = handle.await;
                }
                if let Some(handle) = stderr_spool {
                    let _ = handle.await;
                }
                let mut inner = inner.lock().await;
                if let Some(rec) = inner.tasks.get_mut(&id) {
                    if !rec.status.is_terminal() {
                        finalize_record(
                            rec,
                            status.ok(),
                            stop_requested.load(Ordering::SeqCst),
                            kill_escalated.load(Ordering::SeqCst),
                            timed_out.load(Ordering::SeqCst),
                        );
                    }
                }
                let _ = inner.children.remove(&id);
                let _ = std::fs::remove_file(config.pid_path(&id));
                if let Err(e) = persist(&config, &inner.tasks) {
                    warn!(id, error = %e, "state persist failed after exit");
                }
                let _ = exited_tx.send(true);
            });
        }

        Ok(record)
    }

    /// SIGTERM, wait up to the timeout, then SIGKILL. Returns the final
    /// record.
    pub async fn stop(&self, id: &str, timeout_ms: Option<u64>) -> Result<TaskRecord> {
        let timeout = Duration::from_millis(timeout_ms.unwrap_or(self.config.stop_timeout_ms));
        let (pid, managed) = {
            let mut inner = self.inner.lock().await;
            let rec = inner
                .tasks
                .get(id)
                .cloned()
                .ok_or_else(|| RunnerError::NotFound(id.to_string()))?;
            if rec.status.is_terminal() {
                return Ok(rec);
            }
            match inner.children.get_mut(id) {
                Some(handle) => {
                    handle.stop_requested.store(true, Ordering::SeqCst);
                    handle.stdin = None;
                    (rec.pid, Some((handle.exited.clone(), handle.kill_escalated.clone())))
                }
                None => (rec.pid, None),
            }
        };

        match managed {
            Some((mut exited, kill_escalated)) => {
                if let Some(pid) = pid {
                    terminate(pid, false);
                }
                let done = tokio::time::timeout(timeout, exited.wait_for(|v| *v))
                    .await
                    .is_ok();
                if !done {
                    kill_escalated.store(true, Ordering::SeqCst);
                    if let Some(pid) = pid {
                        terminate(pid, true);
                    }
                    let _ = tokio::time::timeout(KILL_GRACE, exited.wait_for(|v| *v)).await;
                }
            }
            None => self.stop_orphan(id, pid, timeout).await?,
        }

        let inner = self.inner.lock().await;
        inner
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| RunnerError::NotFound(id.to_string()))
    }

    /// Stop path for tasks recovered from a previous gateway process: no
    /// child handle, so poll the PID instead of awaiting the reaper.
    async fn stop_orphan(&self, id: &str, pid: Option<u32>, timeout: Duration) -> Result<()> {
        let mut escalated = false;
        if let Some(pid) = pid {
            terminate(pid, false);
            let deadline = tokio::time::Instant::now() + timeout;
            while pid_alive(pid) && tokio::time::Instant::now() < deadline {
                tokio::time::sleep(ORPHAN_POLL).await;
            }
            if pid_alive(pid) {
                escalated = true;
                terminate(pid, true);
                let deadline = tokio::time::Instant::now() + KILL_GRACE;
                while pid_alive(pid) && tokio::time::Instant::now() < deadline {
                    tokio::time::sleep(ORPHAN_POLL).await;
                }
            }
        }
        let mut inner = self.inner.lock().await;
        if let Some(rec) = inner.tasks.get_mut(id) {
            if !rec.status.is_terminal() {
                let now = now_iso();
                rec.status = if escalated {
                    RunStatus::Killed
                } else {
                    RunStatus::Stopped
                };
                rec.ended_at = Some(now.clone());
                rec.updated_at = now;
                rec.stdin_attached = false;
            }
        }
        persist(&self.config, &inner.tasks)?;
        Ok(())
    }

    /// Stop (if needed) and start again with the recorded command line.
    pub async fn restart(&self, id: &str, stop_timeout_ms: Option<u64>) -> Result<TaskRecord> {
        let rec = {
            let inner = self.inner.lock().await;
            inner
                .tasks
                .get(id)
                .cloned()
                .ok_or_else(|| RunnerError::NotFound(id.to_string()))?
        };
        self.start(StartRequest {
            id: Some(rec.id),
            command: rec.command,
            args: rec.args,
            cwd: rec.cwd,
            env: rec.env,
            tags: rec.tags,
            project_id: rec.project_id,
            replace: true,
            force: true,
            force_by_tags: false,
            stop_timeout_ms,
            run_timeout_ms: None,
        })
        .await
    }

    pub async fn status(&self, id: &str) -> Result<TaskRecord> {
        let inner = self.inner.lock().await;
        inner
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| RunnerError::NotFound(id.to_string()))
    }

    pub async fn list(&self) -> Vec<TaskRecord> {
        let inner = self.inner.lock().await;
        inner.tasks.values().cloned().collect()
    }

    /// Block until the task reaches a terminal status.
    pub async fn wait(&self, id: &str, timeout_ms: Option<u64>) -> Result<TaskRecord> {
        let handle = {
            let inner = self.inner.lock().await;
            let rec = inner
                .tasks
                .get(id)
                .cloned()
                .ok_or_else(|| RunnerError::NotFound(id.to_string()))?;
            if rec.status.is_terminal() {
                return Ok(rec);
            }
            inner.children.get(id).map(|h| h.exited.clone())
        };

        match handle {
            Some(mut exited) => {
                let fut = exited.wait_for(|v| *v);
                match timeout_ms {
                    Some(ms) => {
                        if tokio::time::timeout(Duration::from_millis(ms), fut).await.is_err() {
                            return Err(RunnerError::WaitTimeout(id.to_string()));
                        }
                    }
                    None => {
                        let _ = fut.await;
                    }
                }
            }
            None => self.wait_orphan(id, timeout_ms).await?,
        }

        self.status(id).await
    }

    /// Orphans have no reaper; poll the PID and mark `lost` when it goes.
    async fn wait_orphan(&self, id: &str, timeout_ms: Option<u64>) -> Result<()> {
        let deadline = timeout_ms.map(|ms| tokio::time::Instant::now() + Duration::from_millis(ms));
        loop {
            let alive = {
                let inner = self.inner.lock().await;
                let rec = inner
                    .tasks
                    .get(id)
                    .ok_or_else(|| RunnerError::NotFound(id.to_string()))?;
                if rec.status.is_terminal() {
                    return Ok(());
                }
                rec.pid.map(pid_alive).unwrap_or(false)
            };
            if !alive {
                let mut inner = self.inner.lock().await;
                if let Some(rec) = inner.tasks.get_mut(id) {
                    if !rec.status.is_terminal() {
                        let now = now_iso();
                        rec.status = RunStatus::Lost;
                        rec.ended_at = Some(now.clone());
                        rec.updated_at = now;
                        rec.stdin_attached = false;
                    }
                }
                persist(&self.config, &inner.tasks)?;
                return Ok(());
            }
            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline {
                    return Err(RunnerError::WaitTimeout(id.to_string()));
                }
            }
            tokio::time::sleep(ORPHAN_POLL).await;
        }
    }

    /// Read a slice of a task's spooled log.
    pub async fn logs(&self, req: &LogsRequest) -> Result<LogSlice> {
        use std::io::{Read, Seek, SeekFrom};

        let rec = self.status(&req.id).await?;
        let path = PathBuf::from(&rec.log_path);
        let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

        let offset = if let Some(since) = req.since_bytes {
            since.min(size)
        } else if let Some(tail) = req.tail_bytes {
            size.saturating_sub(tail)
        } else {
            size.saturating_sub(DEFAULT_TAIL_BYTES)
        };
        let cap = req.max_bytes.unwrap_or(DEFAULT_MAX_BYTES);
        let len = (size - offset).min(cap);

        let mut content = Vec::with_capacity(len as usize);
        if len > 0 {
            let mut file = std::fs::File::open(&path)?;
            let _ = file.seek(SeekFrom::Start(offset))?;
            let _ = file.take(len).read_to_end(&mut content)?;
        }

        Ok(LogSlice {
            id: rec.id,
            path: rec.log_path,
            size,
            offset,
            content: String::from_utf8_lossy(&content).into_owned(),
        })
    }

    /// Feed data to a task's stdin.
    pub async fn write(&self, id: &str, data: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let attached = inner
            .tasks
            .get(id)
            .ok_or_else(|| RunnerError::NotFound(id.to_string()))?
            .stdin_attached;
        if !attached {
            return Err(RunnerError::StdinNotAttached(id.to_string()));
        }
        let stdin = inner
            .children
            .get_mut(id)
            .and_then(|h| h.stdin.as_mut())
            .ok_or_else(|| RunnerError::StdinNotAttached(id.to_string()))?;
        stdin.write_all(data.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Remove terminal records older than the cutoff; `older_than_ms = 0`
    /// prunes every terminal record. Returns the pruned ids.
    pub async fn prune(&self, older_than_ms: u64) -> Result<Vec<String>> {
        let cutoff = chrono::Utc::now()
            - chrono::Duration::milliseconds(i64::try_from(older_than_ms).unwrap_or(i64::MAX));
        let mut inner = self.inner.lock().await;
        let prunable: Vec<String> = inner
            .tasks
            .values()
            .filter(|rec| {
                if !rec.status.is_terminal() {
                    return false;
                }
                if older_than_ms == 0 {
                    return true;
                }
                match rec.ended_at.as_deref().and_then(parse_iso) {
                    Some(ended) => ended <= cutoff,
                    // Terminal without a timestamp: treat as ancient.
                    None => true,
                }
            })
            .map(|rec| rec.id.clone())
            .collect();

        for id in &prunable {
            let _ = inner.tasks.remove(id);
            let _ = std::fs::remove_file(self.config.log_path(id));
            let _ = std::fs::remove_file(self.config.pid_path(id));
        }
        if !prunable.is_empty() {
            persist(&self.config, &inner.tasks)?;
        }
        Ok(prunable)
    }
}

fn parse_iso(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

fn persist(config: &RunnerConfig, tasks: &BTreeMap<String, TaskRecord>) -> Result<()> {
    let state = StateFile {
        version: 1,
        updated_at: now_iso(),
        tasks: tasks.clone(),
    };
    state::save_state(&config.state_path(), &state)
}

async fn spool<R>(reader: &mut R, sink: &std::sync::Mutex<LogSink>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut sink = sink.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                if let Err(e) = sink.append(&buf[..n]) {
                    warn!(error = %e, "log append failed");
                    break;
                }
            }
        }
    }
}

/// Decide the final status from how the child went down.
fn finalize_record(
    rec: &mut TaskRecord,
    status: Option<std::process::ExitStatus>,
    stop_requested: bool,
    kill_escalated: bool,
    timed_out: bool,
) {
    let now = now_iso();
    match status {
        Some(status) => {
            rec.exit_code = status.code();
            let signal = exit_signal(&status);
            if let Some(sig) = signal {
                rec.exit_signal = Some(signal_name(sig));
                rec.status = if kill_escalated || sig == 9 {
                    RunStatus::Killed
                } else if stop_requested {
                    RunStatus::Stopped
                } else {
                    RunStatus::Failed
                };
            } else if status.success() || stop_requested {
                rec.status = RunStatus::Stopped;
            } else {
                rec.status = RunStatus::Failed;
            }
        }
        None => rec.status = RunStatus::Lost,
    }
    if timed_out {
        rec.status = RunStatus::Timeout;
    }
    rec.ended_at = Some(now.clone());
    rec.updated_at = now;
    rec.stdin_attached = false;
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

fn signal_name(sig: i32) -> String {
    match sig {
        1 => "SIGHUP".to_string(),
        2 => "SIGINT".to_string(),
        9 => "SIGKILL".to_string(),
        15 => "SIGTERM".to_string(),
        other => format!("SIG{other}"),
    }
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    false
}

#[cfg(unix)]
fn terminate(pid: u32, force: bool) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
    let _ = kill(Pid::from_raw(pid as i32), signal);
}

#[cfg(not(unix))]
fn terminate(_pid: u32, _force: bool) {}

fn short_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_supervisor() -> (Supervisor, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = RunnerConfig {
            base_dir: dir.path().join("runner"),
            allowed_cwds: vec![dir.path().to_path_buf()],
            stop_timeout_ms: 2000,
            ..Default::default()
        };
        (Supervisor::new(config), dir)
    }

    fn echo_request(id: &str) -> StartRequest {
        StartRequest {
            id: Some(id.to_string()),
            command: "echo hello-from-runner".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn start_and_wait_short_lived_task() {
        let (sup, _dir) = test_supervisor();
        let rec = sup.start(echo_request("t1")).await.unwrap();
        assert_eq!(rec.status, RunStatus::Running);
        assert!(rec.pid.is_some());

        let rec = sup.wait("t1", Some(10_000)).await.unwrap();
        assert_eq!(rec.status, RunStatus::Stopped);
        assert_eq!(rec.exit_code, Some(0));
        assert!(rec.ended_at.is_some());

        let logs = sup
            .logs(&LogsRequest {
                id: "t1".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(logs.content.contains("hello-from-runner"));
    }

    #[tokio::test]
    async fn nonzero_exit_marks_failed() {
        let (sup, _dir) = test_supervisor();
        let _ = sup
            .start(StartRequest {
                id: Some("f1".into()),
                command: "exit 3".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let rec = sup.wait("f1", Some(10_000)).await.unwrap();
        assert_eq!(rec.status, RunStatus::Failed);
        assert_eq!(rec.exit_code, Some(3));
    }

    #[tokio::test]
    async fn duplicate_id_requires_replace() {
        let (sup, _dir) = test_supervisor();
        let _ = sup.start(echo_request("dup")).await.unwrap();
        let _ = sup.wait("dup", Some(10_000)).await.unwrap();

        let err = sup.start(echo_request("dup")).await.unwrap_err();
        assert!(err.to_string().starts_with("Task already exists"));

        // Terminal record + replace is fine.
        let rec = sup
            .start(StartRequest {
                replace: true,
                ..echo_request("dup")
            })
            .await
            .unwrap();
        assert_eq!(rec.status, RunStatus::Running);
        let _ = sup.wait("dup", Some(10_000)).await.unwrap();
    }

    #[tokio::test]
    async fn replacing_a_running_task_requires_force() {
        let (sup, _dir) = test_supervisor();
        let _ = sup
            .start(StartRequest {
                id: Some("long".into()),
                command: "sleep 30".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let err = sup
            .start(StartRequest {
                replace: true,
                id: Some("long".into()),
                command: "echo again".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("still running"));

        let rec = sup
            .start(StartRequest {
                replace: true,
                force: true,
                id: Some("long".into()),
                command: "echo again".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(rec.status, RunStatus::Running);
        let rec = sup.wait("long", Some(10_000)).await.unwrap();
        assert_eq!(rec.status, RunStatus::Stopped);
    }

    #[tokio::test]
    async fn stop_terminates_with_sigterm() {
        let (sup, _dir) = test_supervisor();
        let _ = sup
            .start(StartRequest {
                id: Some("s1".into()),
                command: "sleep 30".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let rec = sup.stop("s1", Some(3000)).await.unwrap();
        assert_eq!(rec.status, RunStatus::Stopped);
        assert_eq!(rec.exit_signal.as_deref(), Some("SIGTERM"));
    }

    #[tokio::test]
    async fn force_by_tags_stops_overlapping_tasks() {
        let (sup, _dir) = test_supervisor();
        let _ = sup
            .start(StartRequest {
                id: Some("old".into()),
                command: "sleep 30".into(),
                tags: Some(vec!["project".into(), "p1".into()]),
                ..Default::default()
            })
            .await
            .unwrap();

        let _ = sup
            .start(StartRequest {
                id: Some("new".into()),
                command: "sleep 30".into(),
                tags: Some(vec!["project".into(), "p1".into()]),
                force_by_tags: true,
                stop_timeout_ms: Some(2000),
                ..Default::default()
            })
            .await
            .unwrap();

        let old = sup.status("old").await.unwrap();
        assert!(old.status.is_terminal());
        let new = sup.status("new").await.unwrap();
        assert_eq!(new.status, RunStatus::Running);
        let _ = sup.stop("new", Some(2000)).await.unwrap();
    }

    #[tokio::test]
    async fn write_feeds_stdin() {
        let (sup, _dir) = test_supervisor();
        let _ = sup
            .start(StartRequest {
                id: Some("cat".into()),
                command: "head -n 1".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        sup.write("cat", "ping\n").await.unwrap();
        let rec = sup.wait("cat", Some(10_000)).await.unwrap();
        assert_eq!(rec.status, RunStatus::Stopped);

        let logs = sup
            .logs(&LogsRequest {
                id: "cat".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(logs.content.contains("ping"));
    }

    #[tokio::test]
    async fn prune_removes_terminal_records_and_files() {
        let (sup, _dir) = test_supervisor();
        let _ = sup.start(echo_request("p1")).await.unwrap();
        let _ = sup.wait("p1", Some(10_000)).await.unwrap();
        let _ = sup
            .start(StartRequest {
                id: Some("live".into()),
                command: "sleep 30".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let pruned = sup.prune(0).await.unwrap();
        assert_eq!(pruned, vec!["p1".to_string()]);
        assert!(sup.status("p1").await.is_err());
        assert!(sup.status("live").await.is_ok());
        assert!(!sup.config().log_path("p1").exists());
        let _ = sup.stop("live", Some(2000)).await.unwrap();
    }

    #[tokio::test]
    async fn cwd_outside_allowlist_is_rejected() {
        let (sup, _dir) = test_supervisor();
        let err = sup
            .start(StartRequest {
                id: Some("bad".into()),
                command: "true".into(),
                cwd: Some("/".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::CwdNotAllowed(_)));
    }

    #[tokio::test]
    async fn blocked_env_is_filtered() {
        let (sup, _dir) = test_supervisor();
        std::env::set_var("NODE_OPTIONS", "--max-old-space-size=1");
        let _ = sup
            .start(StartRequest {
                id: Some("env".into()),
                command: "echo NODE_OPTIONS=${NODE_OPTIONS:-unset}".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let _ = sup.wait("env", Some(10_000)).await.unwrap();
        let logs = sup
            .logs(&LogsRequest {
                id: "env".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(logs.content.contains("NODE_OPTIONS=unset"));
        std::env::remove_var("NODE_OPTIONS");
    }

    #[tokio::test]
    async fn run_timeout_marks_task_timeout() {
        let (sup, _dir) = test_supervisor();
        let _ = sup
            .start(StartRequest {
                id: Some("slow".into()),
                command: "sleep 30".into(),
                run_timeout_ms: Some(300),
                ..Default::default()
            })
            .await
            .unwrap();
        let rec = sup.wait("slow", Some(10_000)).await.unwrap();
        assert_eq!(rec.status, RunStatus::Timeout);
        assert!(rec.ended_at.is_some());
    }

    #[tokio::test]
    async fn restart_reuses_the_recorded_command() {
        let (sup, _dir) = test_supervisor();
        let _ = sup.start(echo_request("r1")).await.unwrap();
        let _ = sup.wait("r1", Some(10_000)).await.unwrap();

        let rec = sup.restart("r1", None).await.unwrap();
        assert_eq!(rec.command, "echo hello-from-runner");
        assert_eq!(rec.status, RunStatus::Running);
        let rec = sup.wait("r1", Some(10_000)).await.unwrap();
        assert_eq!(rec.status, RunStatus::Stopped);
    }
}
