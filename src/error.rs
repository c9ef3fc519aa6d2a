//! Pipeline error taxonomy.

/// Errors reported by the capture and recognition pipeline.
///
/// Construction- and open-time errors ([`Error::Configuration`], [`Error::Device`],
/// [`Error::Thread`], [`Error::AlreadyOpen`], [`Error::AlreadyRunning`]) are returned
/// synchronously, before any thread is started. Errors that occur inside a running loop are not surfaced through this type:
/// a fatal device read failure terminates the capture loop (the consumer observes frozen output),
/// and submission failures are logged and skipped.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid recognizer configuration (bad confidence threshold, missing model asset).
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The capture device could not be opened.
    #[error("failed to open capture device: {0}")]
    Device(anyhow::Error),

    /// A pipeline thread could not be started.
    #[error("failed to start thread: {0}")]
    Thread(anyhow::Error),

    /// `open` was called on a camera that is already capturing.
    #[error("capture device is already open")]
    AlreadyOpen,

    /// `start` was called on a recognizer that is already running.
    #[error("recognizer is already running")]
    AlreadyRunning,
}

/// Error returned by [`RecognizerEngine::submit`][crate::recognizer::RecognizerEngine::submit].
///
/// Submission failures are non-fatal: the recognition loop logs them and continues with the next
/// frame.
#[derive(Debug, thiserror::Error)]
#[error("recognizer submission failed: {reason}")]
pub struct SubmissionError {
    reason: String,
}

impl SubmissionError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
