//! Subgen - Sidecar Subtitle Generation
//!
//! Extracts a waveform from a media file with ffmpeg, transcribes it with a
//! pluggable whisper backend, writes the result next to the media as
//! `<name>.<lang>.generated.srt` and tells the media catalog to refresh.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod locator;
pub mod media;
pub mod pipeline;
pub mod process;
pub mod subtitle;
pub mod transcribe;
