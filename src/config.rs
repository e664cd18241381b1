use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SubgenError};
use crate::transcribe::ProviderKind;

fn default_language() -> String {
    "en".to_string()
}

fn default_subtitle_extension() -> String {
    "srt".to_string()
}

fn default_openai_model() -> String {
    "base".to_string()
}

fn default_max_concurrent_runs() -> usize {
    2
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub media: MediaConfig,
    pub pipeline: PipelineConfig,
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Transcription backend used for every run
    #[serde(default)]
    pub selected: ProviderKind,
    /// Language used when the caller does not override it
    #[serde(default = "default_language")]
    pub language: String,
    /// Extension of the generated sidecar file
    #[serde(default = "default_subtitle_extension")]
    pub subtitle_extension: String,
    #[serde(default)]
    pub whisper_cpp: WhisperCppConfig,
    #[serde(default)]
    pub openai_whisper: OpenAiWhisperConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WhisperCppConfig {
    /// Path to the ggml model file
    pub model_path: Option<PathBuf>,
    /// Executables tried before the built-in search order
    pub binary_candidates: Vec<String>,
    /// Thread count passed with `-t`
    pub threads: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiWhisperConfig {
    /// Model name understood by the `whisper` command (tiny, base, small, ...)
    #[serde(default = "default_openai_model")]
    pub model: String,
    /// Executables tried before the built-in search order
    #[serde(default)]
    pub binary_candidates: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Audio conversion executables tried before the built-in search order
    pub binary_candidates: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Whether library-wide generation is allowed to run
    #[serde(default = "default_true")]
    pub auto_generate: bool,
    /// Library ids that batch runs walk
    #[serde(default)]
    pub monitored_libraries: Vec<String>,
    /// Directory for temporary waveform files (system temp dir when unset)
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    /// Upper bound on concurrent runs in a batch
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
    /// Known libraries and their root directories
    #[serde(default)]
    pub libraries: Vec<LibraryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    pub id: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Base URL of the media server, e.g. http://localhost:8096
    pub endpoint: Option<String>,
    /// API key sent with refresh requests
    pub api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            selected: ProviderKind::default(),
            language: default_language(),
            subtitle_extension: default_subtitle_extension(),
            whisper_cpp: WhisperCppConfig::default(),
            openai_whisper: OpenAiWhisperConfig::default(),
        }
    }
}

impl Default for OpenAiWhisperConfig {
    fn default() -> Self {
        Self {
            model: default_openai_model(),
            binary_candidates: Vec::new(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            auto_generate: true,
            monitored_libraries: Vec::new(),
            temp_dir: None,
            max_concurrent_runs: default_max_concurrent_runs(),
            libraries: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Libraries that are both configured and monitored, in monitored order.
    pub fn monitored(&self) -> Vec<&LibraryConfig> {
        self.monitored_libraries
            .iter()
            .filter_map(|id| self.libraries.iter().find(|lib| &lib.id == id))
            .collect()
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SubgenError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| SubgenError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SubgenError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| SubgenError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [provider]
            selected = "openai-whisper"

            [provider.whisper_cpp]
            model_path = "/models/ggml-base.bin"
            "#,
        )
        .unwrap();

        assert_eq!(config.provider.selected, ProviderKind::OpenAiWhisper);
        assert_eq!(config.provider.language, "en");
        assert_eq!(config.provider.subtitle_extension, "srt");
        assert_eq!(config.provider.openai_whisper.model, "base");
        assert_eq!(
            config.provider.whisper_cpp.model_path.as_deref(),
            Some(Path::new("/models/ggml-base.bin"))
        );
        assert!(config.pipeline.auto_generate);
        assert_eq!(config.pipeline.max_concurrent_runs, 2);
    }

    #[test]
    fn test_monitored_libraries_keep_order_and_skip_unknown() {
        let config: Config = toml::from_str(
            r#"
            [pipeline]
            monitored_libraries = ["shows", "missing", "movies"]
            libraries = [
                { id = "movies", path = "/media/movies" },
                { id = "shows", path = "/media/shows" },
            ]
            "#,
        )
        .unwrap();

        let ids: Vec<&str> = config
            .pipeline
            .monitored()
            .iter()
            .map(|lib| lib.id.as_str())
            .collect();
        assert_eq!(ids, vec!["shows", "movies"]);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subgen.toml");

        let mut config = Config::default();
        config.provider.language = "de".to_string();
        config.catalog.endpoint = Some("http://localhost:8096".to_string());
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.provider.language, "de");
        assert_eq!(loaded.catalog.endpoint.as_deref(), Some("http://localhost:8096"));
    }

    #[test]
    fn test_openai_selection_survives_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subgen.toml");

        let mut config = Config::default();
        config.provider.selected = ProviderKind::OpenAiWhisper;
        config.save_to_file(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains(r#"selected = "openai-whisper""#));
        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.provider.selected, ProviderKind::OpenAiWhisper);
    }

    #[test]
    fn test_invalid_provider_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subgen.toml");
        std::fs::write(&path, "[provider]\nselected = \"vosk\"\n").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, SubgenError::Config(_)));
    }
}
