// Pluggable transcription backends
//
// Every backend turns a waveform file into subtitle text:
// - WhisperCpp: whisper.cpp CLI with a local ggml model
// - OpenAiWhisper: the openai-whisper Python CLI
//
// To add a backend, add a ProviderKind variant and map it in ProviderFactory.
// ProviderKind is the only place names are turned into backends.

pub mod common;
pub mod openai;
pub mod whisper_cpp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

pub use common::*;
use crate::config::ProviderConfig;
use crate::error::{Result, SubgenError};

/// Converts a waveform file into subtitle-formatted text
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Display name used in logs
    fn name(&self) -> &'static str;

    /// Transcribe `waveform` in `language`, returning the subtitle document text
    async fn transcribe(
        &self,
        waveform: &Path,
        language: &str,
        cancel: &CancellationToken,
    ) -> Result<String>;
}

/// Transcription backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProviderKind {
    #[default]
    WhisperCpp,
    OpenAiWhisper,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::WhisperCpp, ProviderKind::OpenAiWhisper];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::WhisperCpp => "whisper-cpp",
            ProviderKind::OpenAiWhisper => "openai-whisper",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = SubgenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "whisper-cpp" | "whisper.cpp" | "whisper" => Ok(ProviderKind::WhisperCpp),
            "openai-whisper" | "openai" => Ok(ProviderKind::OpenAiWhisper),
            _ => Err(SubgenError::Config(format!(
                "Invalid provider '{}'. Valid providers: whisper-cpp, openai-whisper",
                s
            ))),
        }
    }
}

impl TryFrom<String> for ProviderKind {
    type Error = SubgenError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ProviderKind> for String {
    fn from(kind: ProviderKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Factory for creating transcription providers
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create the provider selected in `config`
    pub fn create(config: &ProviderConfig) -> Box<dyn TranscriptionProvider> {
        Self::create_provider(config.selected, config)
    }

    pub fn create_provider(
        kind: ProviderKind,
        config: &ProviderConfig,
    ) -> Box<dyn TranscriptionProvider> {
        match kind {
            ProviderKind::WhisperCpp => Box::new(whisper_cpp::WhisperCppProvider::new(
                config.whisper_cpp.clone(),
            )),
            ProviderKind::OpenAiWhisper => Box::new(openai::OpenAiWhisperProvider::new(
                config.openai_whisper.clone(),
            )),
        }
    }
}
