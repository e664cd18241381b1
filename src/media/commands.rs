use std::ffi::OsString;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::locator::ExecutableHandle;
use crate::process::{ProcessOutput, ProcessRunner};

/// External tool invocation: program, arguments and a description for logs
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub description: String,
}

impl ToolCommand {
    pub fn new<P: Into<OsString>, S: Into<String>>(program: P, description: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<OsString>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().as_os_str())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().as_os_str())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<OsString>>(self, codec: S) -> Self {
        self.arg("-acodec").arg(codec)
    }

    /// Disable video
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Set audio sample rate
    pub fn audio_sample_rate(self, rate: u32) -> Self {
        self.arg("-ar").arg(rate.to_string())
    }

    /// Set audio channels
    pub fn audio_channels(self, channels: u32) -> Self {
        self.arg("-ac").arg(channels.to_string())
    }

    /// Run through `runner`; a nonzero exit is returned in the output, not as an error.
    pub async fn execute(
        &self,
        runner: &ProcessRunner,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput> {
        runner
            .run(&self.program, &self.args, &self.description, cancel)
            .await
    }
}

/// Builder for the audio conversion tool's commands
pub struct ToolCommandBuilder {
    program: OsString,
}

impl ToolCommandBuilder {
    pub fn new(handle: &ExecutableHandle) -> Self {
        Self {
            program: handle.program.clone().into_os_string(),
        }
    }

    /// Mono 16 kHz signed 16-bit little-endian PCM, overwriting `audio_path`
    pub fn extract_audio<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        media_path: P,
        audio_path: Q,
    ) -> ToolCommand {
        ToolCommand::new(self.program.clone(), "Audio extraction")
            .input(media_path)
            .no_video()
            .audio_codec("pcm_s16le")
            .audio_channels(1)
            .audio_sample_rate(16000)
            .overwrite()
            .output(audio_path)
    }
}
