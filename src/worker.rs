//! Engine-side execution context for blocking estimators.

use std::panic::resume_unwind;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{Sender, TrySendError};

use crate::error::SubmissionError;
use crate::frame::Frame;
use crate::recognizer::{RecognitionResult, RecognizerEngine, ResultCallback};

/// Runs a blocking estimator on a dedicated thread, turning it into a [`RecognizerEngine`].
///
/// Submissions go into a bounded FIFO queue that the worker thread drains one at a time, invoking
/// the result callback after each estimation. A single thread draining a FIFO queue means
/// callbacks arrive in submission order. When the queue is full, the submission is silently
/// dropped (the engine contract permits dropping submissions internally) and the caller is
/// never blocked.
///
/// Dropping the engine disconnects the queue and joins the thread, letting queued estimations and
/// their callbacks complete first. A panic on the worker thread is forwarded to the dropping
/// thread.
pub struct ThreadedEngine {
    sender: Option<Sender<(Arc<Frame>, u64)>>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadedEngine {
    /// Spawns the worker thread.
    ///
    /// `estimate` runs once per queued submission; its result is handed to `callback` together
    /// with the submission timestamp. An estimation error is logged and produces no callback
    /// invocation for that submission. `capacity` bounds the queue; queue-full submissions are
    /// dropped.
    pub fn spawn<F>(mut estimate: F, mut callback: ResultCallback, capacity: usize) -> Self
    where
        F: FnMut(&Frame) -> anyhow::Result<RecognitionResult> + Send + 'static,
    {
        let (sender, recv) = crossbeam::channel::bounded::<(Arc<Frame>, u64)>(capacity);
        let handle = thread::Builder::new()
            .name("recognizer engine".into())
            .spawn(move || {
                for (frame, timestamp) in recv {
                    match estimate(&frame) {
                        Ok(result) => callback(result, timestamp),
                        Err(e) => log::warn!("estimation failed at t={timestamp}: {e}"),
                    }
                }
            })
            .unwrap();
        Self {
            sender: Some(sender),
            handle: Some(handle),
        }
    }
}

impl RecognizerEngine for ThreadedEngine {
    fn submit(&mut self, frame: Arc<Frame>, timestamp: u64) -> Result<(), SubmissionError> {
        let Some(sender) = &self.sender else {
            return Err(SubmissionError::new("engine is shut down"));
        };
        match sender.try_send((frame, timestamp)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                // The estimator is behind; this frame gets coalesced away.
                log::trace!("engine queue full, dropping submission t={timestamp}");
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(SubmissionError::new("engine worker exited"))
            }
        }
    }
}

impl Drop for ThreadedEngine {
    fn drop(&mut self) {
        // Closing the channel signals the thread to exit once the queue is drained.
        drop(self.sender.take());
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(()) => {}
                Err(payload) => {
                    if !thread::panicking() {
                        resume_unwind(payload);
                    }
                }
            }
        }
    }
}
