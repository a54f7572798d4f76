//! Shared fixtures: an isolated fleet per test and a driver for the real binary

use fleet_counter::config::FleetConfig;
use fleet_counter::supervisor::SelfExecLauncher;
use fleet_counter::FleetContext;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub const BIN: &str = env!("CARGO_BIN_EXE_fleet-counter");

/// Unique segment/lock names plus a private directory for the artifact and log
pub struct TestFleet {
    pub dir: TempDir,
    pub config: FleetConfig,
}

impl TestFleet {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let tag = &uuid::Uuid::new_v4().simple().to_string()[..12];

        let mut config = FleetConfig::default();
        config.shm_name = format!("/fc-it-{tag}");
        config.lock_name = format!("/fc-itl-{tag}");
        config.leader_lock_path = dir.path().join("counter_leader.lock");
        config.log_path = dir.path().join("counter_log.txt");
        config.doubler_delay_ms = 200;

        Self { dir, config }
    }

    pub fn with(mut self, adjust: impl FnOnce(&mut FleetConfig)) -> Self {
        adjust(&mut self.config);
        self
    }

    /// In-process attachment without running the election
    pub fn context(&self) -> FleetContext {
        FleetContext::attach_worker(self.config.clone()).expect("attach to fleet")
    }

    /// In-process attachment as a full participant
    pub fn participant(&self) -> FleetContext {
        FleetContext::attach(self.config.clone()).expect("attach as participant")
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(BIN);
        cmd.args(self.config.worker_args());
        cmd.env("RUST_LOG", "off");
        cmd
    }

    pub fn worker(&self, kind: &str) -> Command {
        let mut cmd = self.command();
        cmd.args(["--worker", kind]);
        cmd.stdin(Stdio::null());
        cmd
    }

    pub fn launcher(&self) -> SelfExecLauncher {
        SelfExecLauncher::new(BIN, self.config.worker_args())
    }

    pub fn spawn_participant(&self) -> Participant {
        let mut child = self
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn participant");

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        Participant {
            child,
            stdin: Some(stdin),
            lines: rx,
        }
    }

    pub fn artifact(&self) -> PathBuf {
        self.config.leader_lock_path.clone()
    }

    pub fn log(&self) -> String {
        std::fs::read_to_string(&self.config.log_path).unwrap_or_default()
    }
}

impl Drop for TestFleet {
    fn drop(&mut self) {
        #[cfg(unix)]
        let _ = fleet_counter::platform::NamedSemaphore::unlink(&self.config.lock_name);
    }
}

/// A running participant binary driven over stdin/stdout
pub struct Participant {
    pub child: Child,
    stdin: Option<ChildStdin>,
    lines: mpsc::Receiver<String>,
}

impl Participant {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn send(&mut self, line: &str) {
        let stdin = self.stdin.as_mut().expect("stdin still open");
        writeln!(stdin, "{line}").expect("write to participant");
        stdin.flush().expect("flush participant stdin");
    }

    /// Wait for an output line containing `needle`.
    pub fn expect_line(&self, needle: &str, timeout: Duration) -> String {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.lines.recv_timeout(left) {
                Ok(line) if line.contains(needle) => return line,
                Ok(_) => continue,
                Err(_) => panic!("no output line containing {needle:?} within {timeout:?}"),
            }
        }
    }

    /// Send `exit` and wait for the process to end.
    pub fn exit(mut self, timeout: Duration) -> std::process::ExitStatus {
        self.send("exit");
        self.stdin.take();
        self.wait(timeout)
    }

    pub fn wait(&mut self, timeout: Duration) -> std::process::ExitStatus {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.child.try_wait().expect("poll participant") {
                return status;
            }
            if Instant::now() >= deadline {
                let _ = self.child.kill();
                panic!("participant {} did not exit within {timeout:?}", self.child.id());
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}

impl Drop for Participant {
    fn drop(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}
