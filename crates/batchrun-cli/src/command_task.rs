use anyhow::Context;
use batchrun_core::{Arguments, TaskTimedOut};
use std::collections::HashMap;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs one external command per task, passing the task's merged arguments
/// as `BATCHRUN_<KEY>` environment variables.
#[derive(Debug, Clone)]
pub struct CommandTask {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
    live: LiveChildren,
}

/// Children still running, keyed by pid. Shared by every clone of a
/// `CommandTask` so the whole batch can be torn down at once.
#[derive(Debug, Clone, Default)]
struct LiveChildren(Arc<Mutex<HashMap<u32, Child>>>);

impl LiveChildren {
    fn lock(&self) -> MutexGuard<'_, HashMap<u32, Child>> {
        match self.0.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn insert(&self, child: Child) -> u32 {
        let pid = child.id();
        self.lock().insert(pid, child);
        pid
    }

    fn try_wait(&self, pid: u32) -> std::io::Result<Option<ExitStatus>> {
        let mut live = self.lock();
        let Some(child) = live.get_mut(&pid) else {
            return Err(std::io::Error::other("process was terminated"));
        };
        let status = child.try_wait()?;
        if status.is_some() {
            live.remove(&pid);
        }
        Ok(status)
    }

    fn kill(&self, pid: u32) {
        let child = self.lock().remove(&pid);
        if let Some(child) = child {
            kill_and_reap(child);
        }
    }

    fn kill_all(&self) -> usize {
        let children: Vec<Child> = self.lock().drain().map(|(_, c)| c).collect();
        let n = children.len();
        for child in children {
            kill_and_reap(child);
        }
        n
    }
}

/// SIGKILL the child's process group (it leads its own group), then reap it.
#[cfg(unix)]
fn kill_and_reap(mut child: Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Ok(pid) = i32::try_from(child.id()) {
        if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
            tracing::debug!(pid, "killpg failed: {}", e);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(not(unix))]
fn kill_and_reap(mut child: Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

pub fn env_key(key: &str) -> String {
    let key: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("BATCHRUN_{}", key)
}

fn env_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl CommandTask {
    pub fn from_argv(argv: &[String]) -> anyhow::Result<Self> {
        let (program, args) = argv.split_first().context("command must name a program")?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout: None,
            live: LiveChildren::default(),
        })
    }

    /// Kill a command that outlives `timeout`. `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Kill every command still running, returning how many were killed.
    pub fn kill_all(&self) -> usize {
        self.live.kill_all()
    }

    /// Blocking: waits for the child to exit. Returns trimmed stdout.
    pub fn run(&self, args: &Arguments) -> anyhow::Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(args.iter().map(|(k, v)| (env_key(k), env_value(v))))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own group, so a kill also reaches anything the command forked.
            cmd.process_group(0);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn '{}'", self.program))?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let pid = self.live.insert(child);

        let Some(status) = self.wait(pid)? else {
            self.live.kill(pid);
            let secs = self.timeout.unwrap_or_default().as_secs_f64();
            return Err(anyhow::Error::new(TaskTimedOut)
                .context(format!("'{}' killed after {:?}s", self.program, secs)));
        };

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();
        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            let stderr = stderr.trim();
            if stderr.is_empty() {
                anyhow::bail!("'{}' {}", self.program, status);
            }
            anyhow::bail!("'{}' {}: {}", self.program, status, stderr);
        }
        Ok(String::from_utf8_lossy(&stdout).trim_end().to_string())
    }

    /// `Ok(None)` once the deadline passes with the child still running.
    fn wait(&self, pid: u32) -> anyhow::Result<Option<ExitStatus>> {
        let start = Instant::now();
        loop {
            if let Some(status) = self
                .live
                .try_wait(pid)
                .with_context(|| format!("waiting for '{}'", self.program))?
            {
                return Ok(Some(status));
            }
            if self.timeout.is_some_and(|limit| start.elapsed() >= limit) {
                return Ok(None);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}
