//! Error types for the rendering pipeline.
//!
//! Every stage surfaces a typed error; the orchestrator records a
//! human-readable message on the job before re-raising, so no failure is
//! silently swallowed.

use thiserror::Error;

/// Errors produced by the speech synthesis provider.
///
/// None of these are retried at this layer; retry policy belongs to the
/// external job runner.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("speech provider rejected credentials: {0}")]
    Unauthorized(String),

    #[error("speech provider quota exhausted: {0}")]
    QuotaExceeded(String),

    #[error("speech provider rejected input: {0}")]
    MalformedInput(String),

    #[error("speech provider contract violation: {0}")]
    ContractViolation(String),

    #[error("speech provider error: {0}")]
    Provider(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors produced while driving the external encoder.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("render graph precondition failed: {0}")]
    Precondition(String),

    #[error("failed to spawn encoder process: {0}")]
    Spawn(std::io::Error),

    #[error("encoder exited with status {status}: {stderr_tail}")]
    ExitStatus { status: String, stderr_tail: String },

    #[error("encoder timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("encode cancelled")]
    Cancelled,

    #[error("encoder produced a missing or empty output file: {0}")]
    EmptyOutput(String),

    #[error("IO error during encode: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error taxonomy for one render job.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Bad scene list. Fatal, never retried.
    #[error("invalid input: {0}")]
    InputValidation(String),

    /// Speech provider failure. Fatal for this attempt.
    #[error("voiceover synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    /// Frame rendering failure. Should be impossible for well-formed
    /// scenes; any occurrence is a bug and still fails the job cleanly.
    #[error("frame asset generation failed: {0}")]
    AssetGeneration(String),

    /// Encoder subprocess failure. Often transient.
    #[error("video encode failed: {0}")]
    Encode(#[from] EncodeError),

    /// Storage provider failure. Opaque by contract.
    #[error("upload failed: {0}")]
    Upload(String),

    /// Status sink failure while the job was still making progress.
    #[error("status update failed: {0}")]
    Status(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type used across the pipeline.
pub type Result<T> = std::result::Result<T, RenderError>;
