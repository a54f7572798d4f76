//! Lock-file leader election
//!
//! The first process to create the artifact at `leader_lock_path` leads for
//! its lifetime. A later process that finds an artifact naming a dead (or no)
//! PID reclaims it once; everyone else follows.

use crate::core::lock::CrossProcessLock;
use crate::core::SharedState;
use crate::error::{errors, FleetResult};
use crate::logging::{debug, info, warn};
use crate::platform;
use chrono::Utc;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// How this process's election was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// Created the artifact on the first attempt
    Won,
    /// Replaced an artifact left by a process that is gone
    Reclaimed { stale_pid: Option<u32> },
    /// Another live process holds the artifact
    Deferred { leader_pid: Option<u32> },
}

impl ElectionOutcome {
    pub fn is_leader(&self) -> bool {
        !matches!(self, ElectionOutcome::Deferred { .. })
    }
}

/// The on-disk leader lock artifact: a file holding the leader PID as text.
#[derive(Debug, Clone)]
pub struct LeaderArtifact {
    path: PathBuf,
}

impl LeaderArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the artifact holding `pid`, or return `None` if it already exists.
    ///
    /// The content is written to a private file first and then linked into
    /// place, so no reader ever sees the artifact without its PID.
    pub fn try_create(&self, pid: u32) -> io::Result<Option<File>> {
        let temp = self.private_path("new", pid);
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp)?;

        let linked = file
            .write_all(pid.to_string().as_bytes())
            .and_then(|_| file.sync_all())
            .and_then(|_| fs::hard_link(&temp, &self.path));
        let _ = fs::remove_file(&temp);

        match linked {
            Ok(()) => Ok(Some(file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(err) if err.kind() == io::ErrorKind::Unsupported => self.create_in_place(pid),
            Err(err) => Err(err),
        }
    }

    // Fallback for filesystems without hard links
    fn create_in_place(&self, pid: u32) -> io::Result<Option<File>> {
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(mut file) => {
                file.write_all(pid.to_string().as_bytes())?;
                file.sync_all()?;
                Ok(Some(file))
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Raw artifact content, or `None` if there is no artifact.
    pub fn read_owner(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Delete the artifact (idempotent - no error if missing).
    pub fn remove(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Remove the artifact only if it still holds `expected`.
    ///
    /// The artifact is moved aside first; if another process replaced it in
    /// the meantime the replacement is linked back and `false` is returned.
    /// While it is aside the path is empty, so a third elector can create a
    /// fresh artifact and lead alongside the displaced owner. The displaced
    /// owner notices on its next [`LeaderElection::is_current_leader`] check.
    fn remove_if_unchanged(&self, expected: &str, pid: u32) -> io::Result<bool> {
        let aside = self.private_path("stale", pid);
        match fs::rename(&self.path, &aside) {
            Ok(()) => {}
            // someone else already cleared it
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(true),
            Err(err) => return Err(err),
        }

        let moved = fs::read_to_string(&aside).unwrap_or_default();
        if moved == expected {
            fs::remove_file(&aside)?;
            return Ok(true);
        }

        match fs::hard_link(&aside, &self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => warn(format!(
                "leader artifact {} was claimed while being restored (displaced owner {})",
                self.path.display(),
                moved.trim()
            )),
            Err(err) => warn(format!(
                "failed to restore leader artifact {}: {}",
                self.path.display(),
                err
            )),
        }
        let _ = fs::remove_file(&aside);
        Ok(false)
    }

    fn private_path(&self, tag: &str, pid: u32) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "leader".to_string());
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        self.path
            .with_file_name(format!(".{name}.{tag}.{pid}.{seq}"))
    }
}

/// Parse artifact content. `0` and garbage both mean "no owner".
pub fn parse_owner(content: &str) -> Option<u32> {
    content.trim().parse::<u32>().ok().filter(|pid| *pid != 0)
}

/// Per-process election result, decided once at startup
#[derive(Debug)]
pub struct LeaderElection {
    artifact: LeaderArtifact,
    pid: u32,
    outcome: ElectionOutcome,
    // held open for as long as this process leads
    handle: Option<File>,
    displaced: AtomicBool,
}

impl LeaderElection {
    /// Run the election for the current process against the real liveness probe.
    pub fn elect(path: impl Into<PathBuf>) -> FleetResult<Self> {
        Self::elect_with(path, platform::current_pid(), platform::process_alive)
    }

    /// Run the election as `pid`, deciding staleness with `is_alive`.
    pub fn elect_with(
        path: impl Into<PathBuf>,
        pid: u32,
        is_alive: impl Fn(u32) -> bool,
    ) -> FleetResult<Self> {
        let artifact = LeaderArtifact::new(path);

        if let Some(handle) = create(&artifact, pid)? {
            info(format!("PID={pid} elected leader ({})", artifact.path().display()));
            return Ok(Self::leader(artifact, pid, ElectionOutcome::Won, handle));
        }

        let content = artifact
            .read_owner()
            .map_err(|err| errors::election_error("cannot read leader artifact", artifact.path(), err))?;

        let Some(content) = content else {
            // vanished between our create and read: treat like a stale artifact
            return Self::reclaim(artifact, pid, None, None);
        };

        let owner = parse_owner(&content);
        match owner {
            Some(owner) if is_alive(owner) => {
                debug(format!("PID={pid} follows leader PID={owner}"));
                Ok(Self::follower(artifact, pid, Some(owner)))
            }
            stale => Self::reclaim(artifact, pid, stale, Some(content)),
        }
    }

    fn reclaim(
        artifact: LeaderArtifact,
        pid: u32,
        stale_pid: Option<u32>,
        content: Option<String>,
    ) -> FleetResult<Self> {
        if let Some(content) = content {
            let removed = artifact
                .remove_if_unchanged(&content, pid)
                .map_err(|err| errors::election_error("cannot remove stale leader artifact", artifact.path(), err))?;
            if !removed {
                debug(format!("PID={pid} lost reclaim race, following"));
                return Ok(Self::follower(artifact, pid, None));
            }
        }

        match create(&artifact, pid)? {
            Some(handle) => {
                match stale_pid {
                    Some(stale) => warn(format!("PID={pid} reclaimed leadership from dead PID={stale}")),
                    None => warn(format!("PID={pid} reclaimed leadership from an ownerless artifact")),
                }
                Ok(Self::leader(
                    artifact,
                    pid,
                    ElectionOutcome::Reclaimed { stale_pid },
                    handle,
                ))
            }
            None => {
                let holder = artifact.read_owner().ok().flatten().as_deref().and_then(parse_owner);
                debug(format!("PID={pid} lost reclaim race, following"));
                Ok(Self::follower(artifact, pid, holder))
            }
        }
    }

    fn leader(artifact: LeaderArtifact, pid: u32, outcome: ElectionOutcome, handle: File) -> Self {
        Self {
            artifact,
            pid,
            outcome,
            handle: Some(handle),
            displaced: AtomicBool::new(false),
        }
    }

    fn follower(artifact: LeaderArtifact, pid: u32, leader_pid: Option<u32>) -> Self {
        Self {
            artifact,
            pid,
            outcome: ElectionOutcome::Deferred { leader_pid },
            handle: None,
            displaced: AtomicBool::new(false),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.handle.is_some()
    }

    /// Like [`is_leader`](Self::is_leader), and a leader also refreshes its
    /// heartbeat in the shared record.
    ///
    /// A leader whose artifact now names another PID has been displaced and
    /// reports `false` from then on. A missing or unreadable artifact does
    /// not displace it.
    pub fn is_current_leader(&self, state: &SharedState, lock: &dyn CrossProcessLock) -> FleetResult<bool> {
        if !self.is_leader() || self.displaced.load(Ordering::Acquire) {
            return Ok(false);
        }
        if let Ok(Some(content)) = self.artifact.read_owner() {
            let owner = parse_owner(&content);
            if owner != Some(self.pid) {
                self.displaced.store(true, Ordering::Release);
                warn(format!(
                    "PID={} lost leader artifact {} to {}, stopping leader tasks",
                    self.pid,
                    self.artifact.path().display(),
                    content.trim()
                ));
                return Ok(false);
            }
        }
        let mut record = state.lock(lock)?;
        record.record_heartbeat(self.pid, Utc::now());
        Ok(true)
    }

    pub fn outcome(&self) -> ElectionOutcome {
        self.outcome
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn artifact_path(&self) -> &Path {
        self.artifact.path()
    }
}

impl Drop for LeaderElection {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        drop(handle);

        let ours = self
            .artifact
            .read_owner()
            .ok()
            .flatten()
            .as_deref()
            .and_then(parse_owner)
            == Some(self.pid);
        if !ours {
            warn(format!(
                "leader artifact {} no longer names PID={}, leaving it",
                self.artifact.path().display(),
                self.pid
            ));
            return;
        }

        match self.artifact.remove() {
            Ok(()) => debug(format!("removed leader artifact {}", self.artifact.path().display())),
            Err(err) => warn(format!(
                "failed to remove leader artifact {}: {}",
                self.artifact.path().display(),
                err
            )),
        }
    }
}

fn create(artifact: &LeaderArtifact, pid: u32) -> FleetResult<Option<File>> {
    artifact
        .try_create(pid)
        .map_err(|err| errors::election_error("cannot create leader artifact", artifact.path(), err))
}
