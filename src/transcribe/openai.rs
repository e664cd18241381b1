use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::common::{ProviderOutput, require_file, scratch_dir};
use super::TranscriptionProvider;
use crate::config::OpenAiWhisperConfig;
use crate::error::{Result, SubgenError};
use crate::locator::{ExecutableHandle, ExecutableLocator, candidate_list};
use crate::process::ProcessRunner;

const BUILTIN_CANDIDATES: [&str; 1] = ["whisper"];

/// openai-whisper command-line backend
pub struct OpenAiWhisperProvider {
    config: OpenAiWhisperConfig,
    locator: ExecutableLocator,
    runner: ProcessRunner,
}

impl OpenAiWhisperProvider {
    pub fn new(config: OpenAiWhisperConfig) -> Self {
        Self {
            config,
            locator: ExecutableLocator::new(),
            runner: ProcessRunner::new(),
        }
    }

    pub fn candidates(&self) -> Vec<String> {
        candidate_list(&self.config.binary_candidates, &BUILTIN_CANDIDATES)
    }

    pub async fn locate(&self) -> Result<ExecutableHandle> {
        self.locator
            .locate("openai-whisper", &self.candidates(), &["--help"])
            .await
    }

    /// A model given as a checkpoint path must exist; bare names are downloaded by the tool.
    async fn validate_model(&self) -> Result<()> {
        let model = Path::new(&self.config.model);
        let is_path = model.components().count() > 1
            || model.extension().is_some_and(|ext| ext == "pt");
        if is_path {
            require_file("model", model).await?;
        }
        Ok(())
    }

    fn build_args(&self, waveform: &Path, language: &str, output_dir: &Path) -> Vec<OsString> {
        vec![
            waveform.as_os_str().to_owned(),
            "--model".into(),
            self.config.model.clone().into(),
            "--language".into(),
            language.into(),
            "--output_format".into(),
            "srt".into(),
            "--output_dir".into(),
            output_dir.as_os_str().to_owned(),
        ]
    }
}

#[async_trait]
impl TranscriptionProvider for OpenAiWhisperProvider {
    fn name(&self) -> &'static str {
        "openai-whisper"
    }

    async fn transcribe(
        &self,
        waveform: &Path,
        language: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        require_file("waveform", waveform).await?;
        self.validate_model().await?;

        let whisper = self.locate().await?;

        // Removed with everything in it when dropped
        let output_dir = tempfile::Builder::new()
            .prefix("subgen-whisper-")
            .tempdir_in(scratch_dir(waveform))?;

        let stem = waveform
            .file_stem()
            .ok_or_else(|| SubgenError::resource_not_found("waveform", waveform))?;
        let primary = output_dir
            .path()
            .join(format!("{}.srt", stem.to_string_lossy()));
        let output = ProviderOutput::new(primary, waveform, "srt");

        info!(
            "Transcribing {} with openai-whisper model {} ({})",
            waveform.display(),
            self.config.model,
            language
        );

        let result = self
            .runner
            .run(
                &whisper,
                self.build_args(waveform, language, output_dir.path()),
                "openai-whisper",
                cancel,
            )
            .await?;

        if !result.success() {
            return Err(SubgenError::TranscriptionFailed(result.diagnostic()));
        }

        let text = output.read().await?;
        debug!("Read {} bytes from {}", text.len(), output.primary().display());
        info!("openai-whisper transcription completed");
        Ok(text)
    }
}
