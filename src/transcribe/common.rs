use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, SubgenError};

/// Fail with `ResourceNotFound` unless `path` is an existing file.
pub async fn require_file(resource: &str, path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(SubgenError::resource_not_found(resource, path)),
    }
}

/// Directory next to the waveform, where providers put their own scratch output.
pub fn scratch_dir(waveform: &Path) -> PathBuf {
    waveform
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(std::env::temp_dir)
}

/// Unique extension-less output stem inside `dir`
pub fn unique_stem(dir: &Path, prefix: &str) -> PathBuf {
    dir.join(format!("{}-{}", prefix, Uuid::new_v4().simple()))
}

/// Candidate locations of a provider's subtitle output.
///
/// Every candidate is removed when the guard drops, whether or not the read
/// succeeded.
#[derive(Debug)]
pub struct ProviderOutput {
    primary: PathBuf,
    fallback: PathBuf,
}

impl ProviderOutput {
    /// `fallback` is the waveform path with its extension replaced by `ext`.
    pub fn new(primary: PathBuf, waveform: &Path, ext: &str) -> Self {
        Self {
            primary,
            fallback: waveform.with_extension(ext),
        }
    }

    pub fn primary(&self) -> &Path {
        &self.primary
    }

    pub fn fallback(&self) -> &Path {
        &self.fallback
    }

    /// Read the primary output, or the fallback when the primary is absent.
    pub async fn read(&self) -> Result<String> {
        for candidate in [&self.primary, &self.fallback] {
            match tokio::fs::read(candidate).await {
                Ok(bytes) => {
                    debug!("Read transcription output from {}", candidate.display());
                    return Ok(String::from_utf8_lossy(&bytes).into_owned());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(SubgenError::OutputMissing(format!(
            "neither {} nor {} exists",
            self.primary.display(),
            self.fallback.display()
        )))
    }
}

// Blocking unlinks only; keep anything heavier out of this guard.
impl Drop for ProviderOutput {
    fn drop(&mut self) {
        for path in [&self.primary, &self.fallback] {
            match std::fs::remove_file(path) {
                Ok(()) => debug!("Removed transcription output {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
}
