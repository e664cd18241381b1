use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Result, SubgenError};

/// `<media-path-without-extension>.<language>.generated.<ext>`
pub fn sidecar_path<P: AsRef<Path>>(media_path: P, language: &str, ext: &str) -> PathBuf {
    let media_path = media_path.as_ref();
    let stem = media_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    media_path.with_file_name(format!("{}.{}.generated.{}", stem, language, ext))
}

/// One timed caption
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleEntry {
    pub index: u32,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl fmt::Display for SubtitleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n{} --> {}\n{}\n",
            self.index,
            format_srt_time(self.start),
            format_srt_time(self.end),
            self.text
        )
    }
}

/// Subtitle text as returned by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleDocument {
    text: String,
}

impl SubtitleDocument {
    pub fn new(text: String) -> Self {
        Self { text }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Parse SRT cues. Blocks without a valid timing line are skipped.
    pub fn entries(&self) -> Vec<SubtitleEntry> {
        let normalized = self.text.replace("\r\n", "\n");
        let mut entries = Vec::new();

        for block in normalized.split("\n\n") {
            let mut lines = block.lines().map(str::trim_end).filter(|l| !l.trim().is_empty());
            let Some(first) = lines.next() else { continue };

            // The index line is optional in the wild
            let (index, timing) = match first.trim().parse::<u32>() {
                Ok(index) => match lines.next() {
                    Some(timing) => (Some(index), timing),
                    None => continue,
                },
                Err(_) => (None, first),
            };

            let Some((start, end)) = parse_timing(timing) else { continue };
            let text = lines.collect::<Vec<_>>().join("\n");

            entries.push(SubtitleEntry {
                index: index.unwrap_or(entries.len() as u32 + 1),
                start,
                end,
                text,
            });
        }

        entries
    }

    /// Write the text verbatim to `path`, replacing any existing file.
    ///
    /// The content goes to a partial file in the same directory first and is
    /// renamed into place, so `path` is either fully written or untouched.
    pub async fn persist(&self, path: &Path, cancel: &CancellationToken) -> Result<()> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let partial = path.with_file_name(format!(
            ".{}.{}.partial",
            file_name,
            Uuid::new_v4().simple()
        ));

        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SubgenError::Cancelled),
            result = fs::write(&partial, self.text.as_bytes()) => result.map_err(SubgenError::from),
        };

        let result = match written {
            Ok(()) => fs::rename(&partial, path).await.map_err(SubgenError::from),
            Err(e) => Err(e),
        };

        if result.is_err() {
            if let Err(e) = fs::remove_file(&partial).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove partial subtitle {}: {}", partial.display(), e);
                }
            }
        } else {
            info!("Subtitle written to {}", path.display());
        }

        result
    }
}

fn parse_timing(line: &str) -> Option<(f64, f64)> {
    let (start, end) = line.split_once("-->")?;
    // Cue settings may follow the end timestamp
    let end = end.split_whitespace().next()?;
    Some((parse_srt_time(start.trim())?, parse_srt_time(end)?))
}

/// Parse `HH:MM:SS,mmm` (a `.` separator is accepted too) into seconds
fn parse_srt_time(value: &str) -> Option<f64> {
    let (clock, millis) = value
        .split_once(',')
        .or_else(|| value.split_once('.'))
        .unwrap_or((value, "0"));
    let mut parts = clock.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let millis: u64 = millis.parse().ok()?;
    if minutes >= 60 || seconds >= 60 || millis >= 1000 {
        return None;
    }
    let total = hours
        .checked_mul(3600)?
        .checked_add(minutes * 60 + seconds)?;
    Some(total as f64 + millis as f64 / 1000.0)
}

/// Format time in seconds to SRT time format (HH:MM:SS,mmm)
fn format_srt_time(seconds: f64) -> String {
    let total_milliseconds = (seconds * 1000.0).round() as u64;
    let hours = total_milliseconds / 3_600_000;
    let minutes = (total_milliseconds % 3_600_000) / 60_000;
    let secs = (total_milliseconds % 60_000) / 1_000;
    let millis = total_milliseconds % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}
