use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::common::{ProviderOutput, require_file, scratch_dir, unique_stem};
use super::TranscriptionProvider;
use crate::config::WhisperCppConfig;
use crate::error::{Result, SubgenError};
use crate::locator::{ExecutableHandle, ExecutableLocator, candidate_list};
use crate::process::ProcessRunner;

const BUILTIN_CANDIDATES: [&str; 4] = ["whisper-cli", "whisper-cpp", "whisper.cpp", "main"];

/// whisper.cpp CLI backend with a local ggml model
pub struct WhisperCppProvider {
    config: WhisperCppConfig,
    locator: ExecutableLocator,
    runner: ProcessRunner,
}

impl WhisperCppProvider {
    pub fn new(config: WhisperCppConfig) -> Self {
        Self::with_locator(config, ExecutableLocator::new())
    }

    pub fn with_locator(config: WhisperCppConfig, locator: ExecutableLocator) -> Self {
        Self {
            config,
            locator,
            runner: ProcessRunner::new(),
        }
    }

    pub fn candidates(&self) -> Vec<String> {
        candidate_list(&self.config.binary_candidates, &BUILTIN_CANDIDATES)
    }

    pub async fn locate(&self) -> Result<ExecutableHandle> {
        self.locator
            .locate("whisper.cpp", &self.candidates(), &["--help"])
            .await
    }

    fn build_args(&self, model: &Path, waveform: &Path, language: &str, stem: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-m".into(),
            model.as_os_str().to_owned(),
            "-f".into(),
            waveform.as_os_str().to_owned(),
            "-l".into(),
            language.into(),
            "-osrt".into(),
            "-of".into(),
            stem.as_os_str().to_owned(),
        ];
        if let Some(threads) = self.config.threads {
            args.push("-t".into());
            args.push(threads.to_string().into());
        }
        args
    }
}

#[async_trait]
impl TranscriptionProvider for WhisperCppProvider {
    fn name(&self) -> &'static str {
        "whisper.cpp"
    }

    async fn transcribe(
        &self,
        waveform: &Path,
        language: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        require_file("waveform", waveform).await?;
        let model = self
            .config
            .model_path
            .as_deref()
            .ok_or_else(|| SubgenError::resource_not_found("model", "<not configured>"))?;
        require_file("model", model).await?;

        let whisper = self.locate().await?;

        let stem = unique_stem(&scratch_dir(waveform), "subgen-whisper");
        let output = ProviderOutput::new(stem.with_extension("srt"), waveform, "srt");

        info!(
            "Transcribing {} with whisper.cpp model {} ({})",
            waveform.display(),
            model.display(),
            language
        );

        let result = self
            .runner
            .run(
                &whisper,
                self.build_args(model, waveform, language, &stem),
                "whisper.cpp",
                cancel,
            )
            .await?;

        if !result.success() {
            return Err(SubgenError::TranscriptionFailed(result.diagnostic()));
        }

        let text = output.read().await?;
        info!("whisper.cpp transcription completed");
        Ok(text)
    }
}
