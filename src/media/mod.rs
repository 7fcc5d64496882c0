//! Invocation of the external media tools (`ffmpeg` / `ffprobe`).
//!
//! The [`MediaRunner`] trait is the seam that lets the pipeline run against
//! a stub in tests instead of spawning real processes.

pub mod time_parse;

use crate::progress::ProgressSink;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use thiserror::Error;
use time_parse::TimeProgress;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("could not run {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {detail}")]
    Failed {
        tool: &'static str,
        status: ExitStatus,
        detail: String,
    },

    #[error("could not decode ffprobe output: {0}")]
    Report(#[from] serde_json::Error),
}

/// Stream listing from `ffprobe -show_streams`.
#[derive(Debug, Default, Deserialize)]
pub struct StreamReport {
    #[serde(default)]
    pub streams: Vec<StreamInfo>,
}

#[derive(Debug, Deserialize)]
pub struct StreamInfo {
    pub index: u32,
    #[serde(default)]
    pub codec_type: String,
}

impl StreamReport {
    /// The source carries audio when more than one stream is reported.
    pub fn has_audio(&self) -> bool {
        self.streams.len() > 1
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaRunner: Send + Sync {
    /// List the streams of a media file.
    async fn probe_streams(&self, file: &Path) -> Result<StreamReport, MediaError>;

    /// Run a transcode with `workspace` as working directory, feeding the
    /// tool's diagnostic stream through the time-based progress parser.
    /// The sink is always driven to `(1, 1)` once the process exits.
    async fn transcode(
        &self,
        workspace: &Path,
        args: &[String],
        sink: Arc<dyn ProgressSink>,
    ) -> Result<(), MediaError>;
}

/// [`MediaRunner`] backed by the real `ffmpeg` and `ffprobe` binaries.
pub struct FfmpegRunner;

#[async_trait]
impl MediaRunner for FfmpegRunner {
    async fn probe_streams(&self, file: &Path) -> Result<StreamReport, MediaError> {
        let output = Command::new("ffprobe")
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-print_format",
                "json",
                "-show_streams",
            ])
            .arg(file)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| MediaError::Spawn {
                tool: "ffprobe",
                source,
            })?;

        if !output.status.success() {
            return Err(MediaError::Failed {
                tool: "ffprobe",
                status: output.status,
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }

    async fn transcode(
        &self,
        workspace: &Path,
        args: &[String],
        sink: Arc<dyn ProgressSink>,
    ) -> Result<(), MediaError> {
        debug!("ffmpeg {}", args.join(" "));

        let mut command = Command::new("ffmpeg");
        command
            .args(["-hide_banner", "-loglevel", "info", "-stats"])
            .args(args)
            .current_dir(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| MediaError::Spawn {
            tool: "ffmpeg",
            source,
        })?;

        // ffmpeg emits its stats lines terminated by carriage returns, so
        // split on both \r and \n instead of reading whole lines.
        let mut captured = String::new();
        if let Some(stderr) = child.stderr.take() {
            let mut parser = TimeProgress::new(Arc::clone(&sink));
            let mut reader = BufReader::new(stderr);
            let mut pending = String::new();
            let mut chunk = [0u8; 4096];

            loop {
                let n = match reader.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                pending.push_str(&String::from_utf8_lossy(&chunk[..n]));

                while let Some(at) = pending.find(['\n', '\r']) {
                    let raw: String = pending.drain(..=at).collect();
                    let line = raw.trim_end_matches(['\n', '\r']);
                    parser.observe_line(line);
                    captured.push_str(line);
                    captured.push('\n');
                }
            }

            if !pending.is_empty() {
                parser.observe_line(&pending);
                captured.push_str(&pending);
            }
        }

        let status = child.wait().await.map_err(|source| MediaError::Spawn {
            tool: "ffmpeg",
            source,
        })?;

        // Make sure the step reaches 100% even if no progress line appeared.
        sink.report(1, 1);

        if !status.success() {
            warn!("ffmpeg failed with {status}");
            return Err(MediaError::Failed {
                tool: "ffmpeg",
                status,
                detail: last_lines(&captured, 20),
            });
        }

        Ok(())
    }
}

fn last_lines(text: &str, count: usize) -> String {
    let mut lines: Vec<&str> = text.lines().rev().take(count).collect();
    lines.reverse();
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stream_report() {
        let json = r#"{
            "streams": [
                {"index": 0, "codec_type": "video"},
                {"index": 1, "codec_type": "audio"}
            ]
        }"#;

        let report: StreamReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.streams.len(), 2);
        assert_eq!(report.streams[0].index, 0);
        assert_eq!(report.streams[1].codec_type, "audio");
        assert!(report.has_audio());
    }

    #[test]
    fn single_stream_means_no_audio() {
        let json = r#"{"streams": [{"index": 0, "codec_type": "video"}]}"#;
        let report: StreamReport = serde_json::from_str(json).unwrap();
        assert!(!report.has_audio());
    }

    #[test]
    fn empty_report_tolerated() {
        let report: StreamReport = serde_json::from_str("{}").unwrap();
        assert!(report.streams.is_empty());
        assert!(!report.has_audio());
    }

    #[test]
    fn last_lines_keeps_the_tail() {
        let text = "one\ntwo\nthree\nfour";
        assert_eq!(last_lines(text, 2), "three\nfour");
        assert_eq!(last_lines(text, 10), text);
    }
}
