use std::sync::Arc;

use subburn::api::{router, AppState};
use subburn::config::Config;
use subburn::job::JobRegistry;
use subburn::media::FfmpegRunner;
use subburn::pipeline::ExportPipeline;
use subburn::render::SubtitleRenderer;
use subburn::scheduler::{run_export_jobs, SUBMIT_QUEUE_DEPTH};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env();

    let registry = Arc::new(JobRegistry::new());
    let (submit, queued) = mpsc::channel(SUBMIT_QUEUE_DEPTH);

    let pipeline = Arc::new(ExportPipeline::new(
        FfmpegRunner,
        SubtitleRenderer::new(config.font_file.clone()),
        config.clone(),
    ));
    tokio::spawn(run_export_jobs(
        config.max_concurrent_exports,
        queued,
        pipeline,
    ));

    let state = AppState {
        registry,
        submit,
        export_dir: config.export_dir.clone(),
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port))
        .await
        .expect("Failed to bind TCP listener");
    tracing::info!("listening at {}:{}", config.addr, config.port);
    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
