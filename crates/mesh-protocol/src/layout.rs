//! Remote directory layout used by a run

use serde::{Deserialize, Serialize};

/// Default remote job directory, relative to the login directory
pub const DEFAULT_JOB_DIR: &str = "job";

/// Default name of the uploaded workspace archive
pub const DEFAULT_ARCHIVE_NAME: &str = "mesh.tar";

/// Default name of the job's log file inside the job directory
pub const DEFAULT_LOG_FILE: &str = "output.log";

/// Where a run places its files on every host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteLayout {
    /// Job directory (cleared before every run)
    pub job_dir: String,
    /// Archive file name, written inside `job_dir`
    pub archive_name: String,
    /// Log file name, written inside `job_dir`
    pub log_file: String,
}

impl Default for RemoteLayout {
    fn default() -> Self {
        Self {
            job_dir: DEFAULT_JOB_DIR.to_string(),
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            log_file: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

impl RemoteLayout {
    /// Path of the job log relative to the login directory
    pub fn log_path(&self) -> String {
        format!("{}/{}", self.job_dir, self.log_file)
    }

    /// Path of the uploaded archive relative to the login directory
    pub fn archive_path(&self) -> String {
        format!("{}/{}", self.job_dir, self.archive_name)
    }
}
