//! Pipeline error taxonomy. Each stage failure aborts the remaining stages
//! and its message is stored on the job as the terminal error.

use crate::media::MediaError;
use crate::render::RenderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("could not create workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("could not download original video: {0}")]
    Download(#[source] reqwest::Error),

    #[error("could not write original video to workspace: {0}")]
    DownloadIo(#[source] std::io::Error),

    #[error("could not get video information from file: {0}")]
    Probe(#[source] MediaError),

    #[error("could not extract frames from video: {0}")]
    Extract(#[source] MediaError),

    #[error("could not find the generated frames: {0}")]
    FrameScan(#[source] std::io::Error),

    #[error("frame extraction produced no frames")]
    NoFrames,

    #[error("could not read image size from first frame: {0}")]
    FrameProbe(#[source] image::ImageError),

    #[error("could not render subtitles: {0}")]
    Render(#[source] RenderError),

    #[error("subtitle rendering task stopped unexpectedly: {0}")]
    RenderTask(#[source] tokio::task::JoinError),

    #[error("error encoding the video in pass {pass}: {source}")]
    Encode {
        pass: u8,
        #[source]
        source: MediaError,
    },
}
