//! The export pipeline: drives one job from submission to a terminal state
//! through download, probe, frame extraction, subtitle rendering, two-pass
//! encode and cleanup.

use crate::config::Config;
use crate::error::ExportError;
use crate::job::ExportJob;
use crate::media::MediaRunner;
use crate::progress::ProgressSink;
use crate::project::Subtitle;
use crate::render::{FrameRenderer, RenderError};
use crate::scheduler::JobExecutor;
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, info_span, Instrument};

/// Pipeline stages with a progress step: download, extract, render,
/// encode pass 1, encode pass 2.
pub const PIPELINE_STEPS: usize = 5;

/// Fixed output frame rate; frame timestamps are `index / 25.0`.
pub const OUTPUT_FRAME_RATE: u32 = 25;

pub struct ExportPipeline<R, A> {
    runner: R,
    renderer: Arc<A>,
    http: reqwest::Client,
    config: Config,
}

impl<R, A> ExportPipeline<R, A>
where
    R: MediaRunner,
    A: FrameRenderer + 'static,
{
    pub fn new(runner: R, renderer: A, config: Config) -> Self {
        Self {
            runner,
            renderer: Arc::new(renderer),
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Run every stage for `job`. On any exit path the workspace is cleaned
    /// of intermediate files and the meter is forced to 1.0 so that status
    /// polling unblocks; a failure is stored on the job as terminal state.
    pub async fn run(&self, job: &ExportJob) -> Result<(), ExportError> {
        let span = info_span!("export", id = %job.id);
        async {
            job.meter().rebase(PIPELINE_STEPS);
            let workspace = self.config.export_dir.join(&job.id);

            let result = self.export(job, &workspace).await;

            info!("cleanup");
            cleanup(&workspace).await;

            match &result {
                Ok(()) => info!("finished"),
                Err(err) => job.set_error(err.to_string()),
            }
            job.meter().finish_now();

            result
        }
        .instrument(span)
        .await
    }

    async fn export(&self, job: &ExportJob, workspace: &Path) -> Result<(), ExportError> {
        let project = &job.project;
        fs::create_dir_all(workspace)
            .await
            .map_err(ExportError::Workspace)?;

        info!("downloading original video");
        let original = workspace.join("original.mp4");
        self.download(&project.video, &original, job.meter().step(0))
            .await?;

        // Read video information first so unreadable input fails before
        // any expensive work.
        let mut has_audio = false;
        if !project.silent {
            info!("checking for audio stream in original video");
            let report = self
                .runner
                .probe_streams(&original)
                .await
                .map_err(ExportError::Probe)?;
            has_audio = report.has_audio();
        }

        info!("converting video to frames");
        let scale = format!(
            "scale='min(iw,{})':-2,fps={}:start_time=0",
            self.config.max_frame_width, OUTPUT_FRAME_RATE
        );
        let args = string_args([
            "-i",
            "original.mp4",
            "-vf",
            &scale,
            "-y",
            "-q:v",
            "5",
            "-an",
            "frame-%06d.jpg",
        ]);
        self.runner
            .transcode(workspace, &args, Arc::new(job.meter().step(1)))
            .await
            .map_err(ExportError::Extract)?;

        let frames = list_frames(workspace)
            .await
            .map_err(ExportError::FrameScan)?;
        if frames.is_empty() {
            return Err(ExportError::NoFrames);
        }

        let (_, height) =
            image::image_dimensions(&frames[0]).map_err(ExportError::FrameProbe)?;
        let font_size = height as f32 / 16.0;

        info!(frames = frames.len(), "rendering subtitles");
        self.render_frames(job, frames, font_size).await?;

        // Readers racing the final pass must gate on the finished flag, not
        // on this path existing.
        job.set_output_file(workspace.join("rendered.mp4"));

        for (index, pass) in ["1", "2"].into_iter().enumerate() {
            info!("encoding frames to video (pass {pass})");
            // Pass 1 only gathers rate statistics; audio is mapped into the
            // final output during pass 2.
            let with_audio = has_audio && index == 1;
            let args = encode_args(pass, with_audio, self.config.video_bitrate_kbps);
            self.runner
                .transcode(workspace, &args, Arc::new(job.meter().step(3 + index)))
                .await
                .map_err(|source| ExportError::Encode {
                    pass: index as u8 + 1,
                    source,
                })?;
        }

        Ok(())
    }

    /// Composite subtitles over every frame whose timestamp falls inside at
    /// least one active window. Image work is synchronous, so it runs on the
    /// blocking pool.
    async fn render_frames(
        &self,
        job: &ExportJob,
        frames: Vec<PathBuf>,
        font_size: f32,
    ) -> Result<(), ExportError> {
        let renderer = Arc::clone(&self.renderer);
        let subtitles = job.project.subtitles.clone();
        let sink = job.meter().step(2);

        tokio::task::spawn_blocking(move || -> Result<(), RenderError> {
            let total = frames.len() as u64;
            for (idx, frame) in frames.iter().enumerate() {
                sink.report(idx as u64, total);

                let timestamp = idx as f64 / OUTPUT_FRAME_RATE as f64;
                let active: Vec<Subtitle> = subtitles
                    .iter()
                    .filter(|subtitle| subtitle.active_at(timestamp))
                    .cloned()
                    .collect();

                // Frames without subtitles keep their original encoding.
                if active.is_empty() {
                    continue;
                }

                renderer.render_frame(frame, font_size, &active)?;
            }
            Ok(())
        })
        .await
        .map_err(ExportError::RenderTask)?
        .map_err(ExportError::Render)
    }

    /// Stream the source video to `target`, reporting byte progress when the
    /// response advertises a content length.
    pub(crate) async fn download(
        &self,
        url: &str,
        target: &Path,
        sink: impl ProgressSink,
    ) -> Result<(), ExportError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(ExportError::Download)?
            .error_for_status()
            .map_err(ExportError::Download)?;

        let total = response.content_length();
        let mut file = fs::File::create(target)
            .await
            .map_err(ExportError::DownloadIo)?;

        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(ExportError::Download)?;
            file.write_all(&chunk)
                .await
                .map_err(ExportError::DownloadIo)?;

            if let Some(total) = total {
                written += chunk.len() as u64;
                sink.report(written, total);
            }
        }

        file.flush().await.map_err(ExportError::DownloadIo)?;
        Ok(())
    }
}

#[async_trait]
impl<R, A> JobExecutor for ExportPipeline<R, A>
where
    R: MediaRunner,
    A: FrameRenderer + 'static,
{
    async fn execute(&self, job: Arc<ExportJob>) {
        if let Err(err) = self.run(&job).await {
            error!(id = %job.id, error = %err, "export failed");
        }
    }
}

fn encode_args(pass: &str, with_audio: bool, bitrate_kbps: u32) -> Vec<String> {
    let rate = OUTPUT_FRAME_RATE.to_string();
    let bitrate = format!("{bitrate_kbps}k");

    let mut args = string_args(["-r", &rate, "-i", "frame-%06d.jpg"]);
    if with_audio {
        args.extend(string_args(["-i", "original.mp4"]));
    }
    args.extend(string_args(["-map", "0:v"]));
    if with_audio {
        args.extend(string_args(["-map", "1:a", "-codec:a", "copy", "-shortest"]));
    }
    args.extend(string_args([
        "-preset",
        "slow",
        "-b:v",
        &bitrate,
        "-codec:v",
        "libx264",
        "-profile:v",
        "high",
        "-level",
        "4.2",
        "-pass",
        pass,
        "-y",
        "rendered.mp4",
    ]));
    args
}

fn string_args<const N: usize>(args: [&str; N]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// The extracted frames, sorted by name. The zero-padded numbering makes the
/// lexicographic order the frame order.
async fn list_frames(workspace: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    let mut entries = fs::read_dir(workspace).await?;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("frame-") && name.ends_with(".jpg") {
            frames.push(entry.path());
        }
    }

    frames.sort();
    Ok(frames)
}

/// Remove everything from the workspace except the rendered output.
/// Best-effort; files that are already gone are not an error.
async fn cleanup(workspace: &Path) {
    for side_file in ["original.mp4", "ffmpeg2pass-0.log", "ffmpeg2pass-0.log.mbtree"] {
        let _ = fs::remove_file(workspace.join(side_file)).await;
    }

    if let Ok(frames) = list_frames(workspace).await {
        for frame in frames {
            let _ = fs::remove_file(frame).await;
        }
    }
}
