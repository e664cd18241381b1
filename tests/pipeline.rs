#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use assert_fs::TempDir;
use assert_fs::prelude::*;
use tokio_util::sync::CancellationToken;

use subgen::catalog::MediaItem;
use subgen::config::Config;
use subgen::error::SubgenError;
use subgen::pipeline::{RunOutcome, SubtitlePipeline};
use subgen::subtitle::SubtitleDocument;

const FAKE_FFMPEG: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then echo "ffmpeg version fake"; exit 0; fi
for last; do :; done
printf 'RIFF' > "$last"
"#;

const FAKE_FFMPEG_HANG: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then echo "ffmpeg version fake"; exit 0; fi
for last; do :; done
printf 'RIFF partial' > "$last"
exec sleep 30
"#;

const FAKE_WHISPER_OK: &str = r#"#!/bin/sh
if [ "$1" = "--help" ]; then echo "usage" >&2; exit 1; fi
stem=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-of" ]; then stem="$2"; fi
  shift
done
cat > "$stem.srt" <<'SRT'
1
00:00:00,000 --> 00:00:02,000
It's a trap!

2
00:00:02,500 --> 00:00:04,000
Hold your fire.

3
00:00:04,500 --> 00:00:06,000
Punch it.

SRT
"#;

const FAKE_WHISPER_FAIL: &str = r#"#!/bin/sh
if [ "$1" = "--help" ]; then exit 0; fi
echo "whisper_init_from_file: failed to load model" >&2
exit 3
"#;

const FAKE_WHISPER_HANG: &str = r#"#!/bin/sh
if [ "$1" = "--help" ]; then exit 0; fi
exec sleep 30
"#;

struct Library {
    root: TempDir,
    temp: PathBuf,
}

impl Library {
    fn new(whisper: &str) -> Self {
        Self::with_tools(FAKE_FFMPEG, whisper)
    }

    fn with_tools(ffmpeg: &str, whisper: &str) -> Self {
        let root = TempDir::new().unwrap();
        root.child("bin").create_dir_all().unwrap();
        root.child("tmp").create_dir_all().unwrap();
        root.child("models/ggml-base.en.bin").write_str("ggml").unwrap();
        root.child("media/movie.mkv").write_str("matroska").unwrap();

        install(&root.path().join("bin/ffmpeg"), ffmpeg);
        install(&root.path().join("bin/whisper-cli"), whisper);

        let temp = root.path().join("tmp");
        Self { root, temp }
    }

    fn config(&self) -> Config {
        let bin = self.root.path().join("bin");
        let mut config = Config::default();
        config.media.binary_candidates = vec![bin.join("ffmpeg").display().to_string()];
        config.provider.whisper_cpp.binary_candidates =
            vec![bin.join("whisper-cli").display().to_string()];
        config.provider.whisper_cpp.model_path =
            Some(self.root.path().join("models/ggml-base.en.bin"));
        config.pipeline.temp_dir = Some(self.temp.clone());
        config
    }

    fn item(&self) -> MediaItem {
        MediaItem::new("movie-1", self.root.path().join("media/movie.mkv"))
    }

    fn sidecar(&self) -> PathBuf {
        self.root.path().join("media/movie.en.generated.srt")
    }

    fn temp_is_empty(&self) -> bool {
        std::fs::read_dir(&self.temp).unwrap().next().is_none()
    }
}

fn install(path: &Path, script: &str) {
    std::fs::write(path, script).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[tokio::test]
async fn generates_sidecar_next_to_media() {
    let library = Library::new(FAKE_WHISPER_OK);
    let pipeline = SubtitlePipeline::new(library.config()).unwrap();

    let outcome = pipeline
        .run(&library.item(), None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Generated {
            sidecar: library.sidecar(),
            entries: 3
        }
    );

    let written = std::fs::read_to_string(library.sidecar()).unwrap();
    let entries = SubtitleDocument::new(written).entries();
    let texts: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(texts, vec!["It's a trap!", "Hold your fire.", "Punch it."]);
    assert!(library.temp_is_empty());
}

#[tokio::test]
async fn failed_transcription_leaves_no_trace() {
    let library = Library::new(FAKE_WHISPER_FAIL);
    let pipeline = SubtitlePipeline::new(library.config()).unwrap();

    let err = pipeline
        .run(&library.item(), None, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        SubgenError::TranscriptionFailed(detail) => assert!(detail.contains("failed to load model")),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!library.sidecar().exists());
    assert!(library.temp_is_empty());
}

#[tokio::test]
async fn missing_model_is_reported_before_transcribing() {
    let library = Library::new(FAKE_WHISPER_OK);
    let mut config = library.config();
    config.provider.whisper_cpp.model_path = Some(library.root.path().join("models/missing.bin"));
    let pipeline = SubtitlePipeline::new(config).unwrap();

    let err = pipeline
        .run(&library.item(), None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SubgenError::ResourceNotFound { .. }));
    assert!(!library.sidecar().exists());
    assert!(library.temp_is_empty());
}

#[tokio::test]
async fn cancellation_terminates_transcription() {
    let library = Library::new(FAKE_WHISPER_HANG);
    let pipeline = SubtitlePipeline::new(library.config()).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = pipeline
        .run(&library.item(), None, &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!library.sidecar().exists());
    assert!(library.temp_is_empty());
}

#[tokio::test]
async fn cancellation_during_extraction_removes_partial_waveform() {
    let library = Library::with_tools(FAKE_FFMPEG_HANG, FAKE_WHISPER_OK);
    let pipeline = SubtitlePipeline::new(library.config()).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let temp = library.temp.clone();
    tokio::spawn(async move {
        // Fire once the partial waveform is on disk, or after a deadline
        for _ in 0..100 {
            let written = std::fs::read_dir(&temp)
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false);
            if written {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        trigger.cancel();
    });

    let started = Instant::now();
    let err = pipeline
        .run(&library.item(), None, &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(15));
    assert!(!library.sidecar().exists());
    assert!(library.temp_is_empty());
}

#[tokio::test]
async fn missing_media_is_skipped() {
    let library = Library::new(FAKE_WHISPER_OK);
    let pipeline = SubtitlePipeline::new(library.config()).unwrap();

    let item = MediaItem::new("gone", library.root.path().join("media/gone.mkv"));
    let outcome = pipeline
        .run(&item, None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Skipped { .. }));
    assert!(library.temp_is_empty());
    assert!(!library.root.path().join("media/gone.en.generated.srt").exists());
}
