use std::path::PathBuf;

use thiserror::Error;

/// Failures the workflow distinguishes. They travel inside
/// `anyhow::Error`; use `downcast_ref::<WorkflowError>()` to inspect.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("no alignment source: supply --bam and --bai, or both --fastq1 and --fastq2")]
    NoAlignmentSource,

    #[error("incomplete input: {0}")]
    IncompleteInput(String),

    #[error("missing {what} {path:?}")]
    MissingInput { what: &'static str, path: PathBuf },

    #[error("output {0:?} already exists")]
    OutputCollision(PathBuf),

    #[error("bad output prefix {0:?}")]
    BadPrefix(String),

    #[error("{stage} stage is not configured: {setting} is required")]
    Unconfigured {
        stage: &'static str,
        setting: &'static str,
    },

    #[error("failed to start {tool}: {source}")]
    ToolSpawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}\n{stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("{tool} exceeded the {hours} hour timeout")]
    ToolTimeout { tool: String, hours: f64 },

    #[error("{stage} stage did not produce {path:?}")]
    MissingOutput { stage: &'static str, path: PathBuf },

    #[error("no barcode in read name {}", String::from_utf8_lossy(.0))]
    NoBarcode(Vec<u8>),
}
