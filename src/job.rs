//! Export jobs and the in-memory registry used by status queries.

use crate::progress::Meter;
use crate::project::Project;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Length of the random job id. The id doubles as the workspace directory
/// name and must stay ASCII letters only (the download route enforces it).
pub const JOB_ID_LEN: usize = 12;

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub fn random_id(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect()
}

#[derive(Default)]
struct JobState {
    output_file: Option<PathBuf>,
    error: Option<String>,
}

/// One export's identity, input, progress and outcome.
///
/// Exactly one pipeline execution mutates a job; status queries only read
/// the progress meter and the state behind the lock.
pub struct ExportJob {
    pub id: String,
    pub project: Project,
    meter: Meter,
    state: Mutex<JobState>,
}

impl ExportJob {
    /// A fresh job with a provisional 1-step meter; the pipeline re-baselines
    /// it to the real step count when execution starts.
    pub fn new(project: Project) -> Self {
        Self {
            id: random_id(JOB_ID_LEN),
            project,
            meter: Meter::new(1),
            state: Mutex::new(JobState::default()),
        }
    }

    pub fn meter(&self) -> &Meter {
        &self.meter
    }

    pub fn progress(&self) -> f64 {
        self.meter.progress()
    }

    pub fn finished(&self) -> bool {
        self.meter.finished()
    }

    /// Set before the final encode pass runs; readers must gate on
    /// `finished()`, not on the file existing.
    pub fn set_output_file(&self, path: PathBuf) {
        self.state.lock().output_file = Some(path);
    }

    pub fn output_file(&self) -> Option<PathBuf> {
        self.state.lock().output_file.clone()
    }

    pub fn set_error(&self, message: String) {
        self.state.lock().error = Some(message);
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }
}

/// Concurrency-safe lookup of jobs by id. Entries are inserted once at
/// submission and live for the process lifetime; there is no eviction.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, Arc<ExportJob>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, job: Arc<ExportJob>) {
        self.jobs.lock().insert(job.id.clone(), job);
    }

    pub fn get(&self, id: &str) -> Option<Arc<ExportJob>> {
        self.jobs.lock().get(id).cloned()
    }
}
