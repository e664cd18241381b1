use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::transcribe::ProviderKind;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a subtitle sidecar for a single media file
    Generate {
        /// Input media file
        #[arg(short, long)]
        input: PathBuf,

        /// Catalog item id (defaults to the file path)
        #[arg(long)]
        item_id: Option<String>,

        /// Subtitle language (defaults to the configured language)
        #[arg(short, long)]
        language: Option<String>,

        /// Transcription provider (whisper-cpp, openai-whisper)
        #[arg(short, long)]
        provider: Option<ProviderKind>,

        /// Print the run outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate subtitles for every media file in the monitored libraries
    Batch {
        /// Only scan this library (must be configured)
        #[arg(long)]
        library: Option<String>,

        /// Subtitle language (defaults to the configured language)
        #[arg(short, long)]
        language: Option<String>,

        /// Transcription provider (whisper-cpp, openai-whisper)
        #[arg(short, long)]
        provider: Option<ProviderKind>,

        /// Run even when auto generation is disabled in the configuration
        #[arg(long)]
        force: bool,

        /// Print the batch report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Probe for the external tools each backend needs
    Tools,

    /// Write the default configuration to a file
    InitConfig {
        /// Output configuration file
        #[arg(short, long, default_value = "subgen.toml")]
        output: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_arguments() {
        let args = Args::parse_from([
            "subgen", "-v", "generate", "-i", "/media/movie.mkv", "-l", "de", "-p", "openai",
        ]);
        assert!(args.verbose);
        match args.command {
            Commands::Generate {
                input,
                language,
                provider,
                item_id,
                json,
            } => {
                assert_eq!(input, PathBuf::from("/media/movie.mkv"));
                assert_eq!(language.as_deref(), Some("de"));
                assert_eq!(provider, Some(ProviderKind::OpenAiWhisper));
                assert!(item_id.is_none());
                assert!(!json);
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let result = Args::try_parse_from(["subgen", "generate", "-i", "a.mkv", "-p", "vosk"]);
        assert!(result.is_err());
    }
}
