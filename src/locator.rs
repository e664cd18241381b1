//! Probe candidate executables and pick the first one that actually runs.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Result, SubgenError};

/// Default per-candidate probe timeout
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// A resolved executable, valid for the current process only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableHandle {
    pub tool: String,
    pub program: PathBuf,
}

impl ExecutableHandle {
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl AsRef<OsStr> for ExecutableHandle {
    fn as_ref(&self) -> &OsStr {
        self.program.as_os_str()
    }
}

#[derive(Debug, Clone)]
pub struct ExecutableLocator {
    probe_timeout: Duration,
}

impl Default for ExecutableLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutableLocator {
    pub fn new() -> Self {
        Self {
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }

    /// Return the first candidate whose probe invocation completes within the
    /// timeout, whatever its exit status.
    ///
    /// Nothing is cached: tools may appear or disappear between runs.
    pub async fn locate<S: AsRef<str>>(
        &self,
        tool: &str,
        candidates: &[S],
        probe_args: &[&str],
    ) -> Result<ExecutableHandle> {
        for candidate in candidates {
            let candidate = candidate.as_ref();
            if candidate.trim().is_empty() {
                continue;
            }
            if self.probe(candidate, probe_args).await {
                info!("Using {} at {}", tool, candidate);
                return Ok(ExecutableHandle {
                    tool: tool.to_string(),
                    program: PathBuf::from(candidate),
                });
            }
        }

        Err(SubgenError::ToolNotFound {
            tool: tool.to_string(),
            candidates: candidates.iter().map(|c| c.as_ref().to_string()).collect(),
        })
    }

    async fn probe(&self, candidate: &str, probe_args: &[&str]) -> bool {
        let spawned = Command::new(candidate)
            .args(probe_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                debug!("Candidate {} not runnable: {}", candidate, e);
                return false;
            }
        };

        match tokio::time::timeout(self.probe_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Candidate {} responded with {:?}", candidate, status.code());
                true
            }
            Ok(Err(e)) => {
                debug!("Candidate {} failed while probing: {}", candidate, e);
                false
            }
            Err(_) => {
                debug!("Candidate {} timed out after {:?}", candidate, self.probe_timeout);
                if let Err(e) = child.kill().await {
                    debug!("Failed to kill probe of {}: {}", candidate, e);
                }
                false
            }
        }
    }
}

/// Concatenate configured candidates ahead of built-in ones, dropping repeats.
pub fn candidate_list(configured: &[String], builtin: &[&str]) -> Vec<String> {
    let mut list: Vec<String> = Vec::with_capacity(configured.len() + builtin.len());
    for candidate in configured.iter().map(String::as_str).chain(builtin.iter().copied()) {
        if !list.iter().any(|c| c == candidate) {
            list.push(candidate.to_string());
        }
    }
    list
}
