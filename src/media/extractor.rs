use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{AudioExtractor, ToolCommandBuilder};
use crate::config::MediaConfig;
use crate::error::{Result, SubgenError};
use crate::locator::{ExecutableHandle, ExecutableLocator, candidate_list};
use crate::process::ProcessRunner;

#[cfg(target_os = "linux")]
const BUNDLED_FFMPEG: &str = "/usr/lib/jellyfin-ffmpeg/ffmpeg";
#[cfg(target_os = "macos")]
const BUNDLED_FFMPEG: &str = "/Applications/Jellyfin.app/Contents/MacOS/ffmpeg";
#[cfg(target_os = "windows")]
const BUNDLED_FFMPEG: &str = r"C:\Program Files\Jellyfin\Server\ffmpeg.exe";
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const BUNDLED_FFMPEG: &str = "ffmpeg";

/// Built-in search order after any configured candidates
pub fn builtin_ffmpeg_candidates() -> Vec<&'static str> {
    vec!["ffmpeg", BUNDLED_FFMPEG, "/usr/bin/ffmpeg", "/usr/local/bin/ffmpeg"]
}

/// Waveform extraction through ffmpeg
pub struct FfmpegExtractor {
    config: MediaConfig,
    locator: ExecutableLocator,
    runner: ProcessRunner,
}

impl FfmpegExtractor {
    pub fn new(config: MediaConfig) -> Self {
        Self::with_locator(config, ExecutableLocator::new())
    }

    pub fn with_locator(config: MediaConfig, locator: ExecutableLocator) -> Self {
        Self {
            config,
            locator,
            runner: ProcessRunner::new(),
        }
    }

    pub fn candidates(&self) -> Vec<String> {
        candidate_list(&self.config.binary_candidates, &builtin_ffmpeg_candidates())
    }

    /// Resolve the conversion tool; re-probed on every call
    pub async fn locate(&self) -> Result<ExecutableHandle> {
        self.locator
            .locate("ffmpeg", &self.candidates(), &["-version"])
            .await
    }
}

#[async_trait]
impl AudioExtractor for FfmpegExtractor {
    async fn extract(
        &self,
        media_path: &Path,
        waveform_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let ffmpeg = self.locate().await?;

        info!(
            "Extracting audio from {} to {}",
            media_path.display(),
            waveform_path.display()
        );

        let output = ToolCommandBuilder::new(&ffmpeg)
            .extract_audio(media_path, waveform_path)
            .execute(&self.runner, cancel)
            .await?;

        if !output.success() {
            return Err(SubgenError::ExtractionFailed(output.diagnostic()));
        }

        // ffmpeg occasionally exits 0 without writing anything
        if !tokio::fs::try_exists(waveform_path).await.unwrap_or(false) {
            return Err(SubgenError::ExtractionFailed(format!(
                "{} reported success but {} was not created",
                ffmpeg.program.display(),
                waveform_path.display()
            )));
        }

        info!("Audio extraction completed");
        Ok(())
    }
}
