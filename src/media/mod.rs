// Audio extraction
//
// - Commands: tool command builder shared by the extractor
// - Extractor: ffmpeg-backed waveform extraction

pub mod commands;
pub mod extractor;

use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

pub use commands::*;
pub use extractor::*;

use crate::config::MediaConfig;
use crate::error::Result;

/// Produces a normalized waveform (mono, s16le, 16 kHz) from any media file
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    async fn extract(
        &self,
        media_path: &Path,
        waveform_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Factory for creating audio extractor instances
pub struct AudioExtractorFactory;

impl AudioExtractorFactory {
    /// Create the default extractor implementation (ffmpeg-based)
    pub fn create_extractor(config: MediaConfig) -> Box<dyn AudioExtractor> {
        Box::new(FfmpegExtractor::new(config))
    }
}
