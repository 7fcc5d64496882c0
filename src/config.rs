//! Configuration loaded from the environment.

use crate::scheduler::DEFAULT_CONCURRENCY;
use std::env;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct Config {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Root directory holding one workspace per export job
    pub export_dir: PathBuf,
    /// TTF font used for subtitle rendering
    pub font_file: PathBuf,
    /// Maximum number of export pipelines running in parallel
    pub max_concurrent_exports: usize,
    /// Video bitrate for the two-pass encode, in kbit/s
    pub video_bitrate_kbps: u32,
    /// Frames wider than this are downscaled, preserving aspect ratio
    pub max_frame_width: u32,
}

impl Config {
    /// Load configuration from environment variables, with defaults for
    /// everything.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            addr: env::var("ADDR").unwrap_or_else(|_| String::from("127.0.0.1")),
            port: env::var("PORT").unwrap_or_else(|_| String::from("8000")),
            export_dir: env::var("EXPORT_DIR")
                .unwrap_or_else(|_| String::from("temp/export"))
                .into(),
            font_file: env::var("FONT_FILE")
                .unwrap_or_else(|_| String::from("assets/font.ttf"))
                .into(),
            max_concurrent_exports: env::var("MAX_CONCURRENT_EXPORTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_CONCURRENCY),
            video_bitrate_kbps: env::var("VIDEO_BITRATE_KBPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(600),
            max_frame_width: env::var("MAX_FRAME_WIDTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(848),
        }
    }
}
