//! Process-wide render worker options
//!
//! Set once, before the first engine is created. Engines that run the
//! PDF library on a background thread read these when they spawn it.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

static WORKER_OPTIONS: OnceLock<WorkerOptions> = OnceLock::new();

/// How engine worker threads are created
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerOptions {
    #[serde(default = "default_thread_name")]
    pub thread_name: String,

    /// Stack size in bytes; the platform default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_size: Option<usize>,
}

fn default_thread_name() -> String {
    "pdf-render-worker".to_string()
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            stack_size: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerConfigError {
    #[error("render worker options are already set")]
    AlreadyConfigured,
}

/// Install the process-wide worker options.
///
/// Fails if options were already installed or already read through
/// [`options`].
pub fn configure(options: WorkerOptions) -> Result<(), WorkerConfigError> {
    WORKER_OPTIONS
        .set(options)
        .map_err(|_| WorkerConfigError::AlreadyConfigured)
}

/// Current worker options; the first read freezes the defaults if
/// nothing was configured.
pub fn options() -> &'static WorkerOptions {
    WORKER_OPTIONS.get_or_init(WorkerOptions::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_can_only_be_set_once() {
        let wanted = WorkerOptions {
            thread_name: "test-worker".to_string(),
            stack_size: Some(4 * 1024 * 1024),
        };

        let first = configure(wanted.clone());
        let second = configure(WorkerOptions::default());

        assert!(matches!(second, Err(WorkerConfigError::AlreadyConfigured)));
        if first.is_ok() {
            assert_eq!(options(), &wanted);
        }
    }

    #[test]
    fn defaults_deserialize_from_empty_mapping() {
        let parsed: WorkerOptions = serde_yaml::from_str("{}").expect("valid yaml");
        assert_eq!(parsed, WorkerOptions::default());
    }
}
