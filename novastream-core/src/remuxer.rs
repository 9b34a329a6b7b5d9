//! The `Remuxer` contract (spec.md §6): "an external binary invoked by
//! command line, producing an HLS `.m3u8` and segment files in a directory;
//! emits structured stderr." The spec fixes only the argument semantics
//! (spec.md §4.5), not the binary, so this module only owns process
//! plumbing — argument construction lives in `transcode::args`.
//!
//! Grounded in `other_examples/.../borisgk-sratim__src-streaming-process.rs`'s
//! `spawn_ffmpeg`/`probe_metadata`: a thin `tokio::process::Command` wrapper
//! with piped stdio and `kill_on_drop(true)`.

use crate::error::{NovaError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdin};

/// A spawned remux/probe process, with stdin/stderr handles the pipeline
/// needs to drive (feed a ranged pipe, classify stderr output).
pub struct RemuxChild {
    pub child: Child,
    pub stdin: Option<ChildStdin>,
    pub stderr: Option<ChildStderr>,
}

/// Abstraction over the external remuxing/probing tool.
#[async_trait]
pub trait Remuxer: Send + Sync {
    /// Run the binary to completion and capture stdout as a UTF-8 string.
    /// Used for `-show_format -show_streams` probing (spec.md §4.2). When
    /// `stdin_data` is given, it's written and closed before waiting for
    /// output — used for the `RangedPipe` probe input form (spec.md §4.3).
    async fn probe(&self, args: &[String], stdin_data: Option<Bytes>) -> Result<String>;

    /// Spawn the binary for a long-running remux, writing output files into
    /// `cwd`. When `pipe_stdin` is true the caller owns feeding `stdin`
    /// (used for the `RangedPipe` source form, spec.md §4.3).
    fn run(&self, args: &[String], cwd: &Path, pipe_stdin: bool) -> Result<RemuxChild>;
}

/// Default `Remuxer` implementation: spawns the configured binary
/// (`ffmpeg`/`ffprobe` by convention) as a child process.
pub struct CommandRemuxer {
    pub probe_binary: String,
    pub run_binary: String,
}

impl CommandRemuxer {
    pub fn new(probe_binary: impl Into<String>, run_binary: impl Into<String>) -> Self {
        Self {
            probe_binary: probe_binary.into(),
            run_binary: run_binary.into(),
        }
    }
}

#[async_trait]
impl Remuxer for CommandRemuxer {
    async fn probe(&self, args: &[String], stdin_data: Option<Bytes>) -> Result<String> {
        let mut command = tokio::process::Command::new(&self.probe_binary);
        command.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = if let Some(data) = stdin_data {
            command.stdin(Stdio::piped());
            let mut child = command
                .spawn()
                .map_err(|e| NovaError::ProbeFailed(format!("failed to spawn prober: {e}")))?;
            if let Some(mut stdin) = child.stdin.take() {
                // Best effort: the prober may exit before consuming all of it
                // once it has enough to find the moov/tfdt atoms.
                let _ = stdin.write_all(&data).await;
                let _ = stdin.shutdown().await;
            }
            child
                .wait_with_output()
                .await
                .map_err(|e| NovaError::ProbeFailed(format!("prober I/O error: {e}")))?
        } else {
            command.stdin(Stdio::null());
            command
                .output()
                .await
                .map_err(|e| NovaError::ProbeFailed(format!("failed to spawn prober: {e}")))?
        };

        if !output.status.success() {
            return Err(NovaError::ProbeFailed(format!(
                "prober exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn run(&self, args: &[String], cwd: &Path, pipe_stdin: bool) -> Result<RemuxChild> {
        let mut command = tokio::process::Command::new(&self.run_binary);
        command
            .args(args)
            .current_dir(cwd)
            .stdin(if pipe_stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| NovaError::Transient(format!("failed to spawn remuxer: {e}")))?;

        let stdin = child.stdin.take();
        let stderr = child.stderr.take();

        Ok(RemuxChild { child, stdin, stderr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn probe_without_stdin_captures_stdout() {
        let remuxer = CommandRemuxer::new("echo", "true");
        let out = remuxer
            .probe(&["hello world".to_string()], None)
            .await
            .unwrap();
        assert_eq!(out.trim(), "hello world");
    }

    #[tokio::test]
    async fn probe_with_stdin_writes_before_waiting() {
        let remuxer = CommandRemuxer::new("cat", "true");
        let out = remuxer
            .probe(&[], Some(Bytes::from_static(b"piped bytes")))
            .await
            .unwrap();
        assert_eq!(out, "piped bytes");
    }
}
