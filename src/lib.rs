//! Subburn - subtitle burn-in export service
//!
//! Turns a submitted project (source video URL plus timed subtitles) into a
//! rendered video with the subtitles composited into the frames.
//!
//! - api: HTTP handlers for submission, status polling and download
//! - config: environment configuration
//! - job: export jobs and the in-memory registry
//! - media: ffmpeg/ffprobe invocation behind a mockable seam
//! - pipeline: the staged export pipeline for one job
//! - progress: weighted multi-step progress meter
//! - project: submitted data model
//! - render: subtitle layout and compositing
//! - scheduler: bounded worker pool over the submission queue

pub mod api;
pub mod config;
pub mod error;
pub mod job;
pub mod media;
pub mod pipeline;
pub mod progress;
pub mod project;
pub mod render;
pub mod scheduler;

pub use config::Config;
pub use error::ExportError;
pub use job::{ExportJob, JobRegistry};
pub use pipeline::ExportPipeline;
pub use progress::{Meter, ProgressSink};
pub use project::{Project, Subtitle};
