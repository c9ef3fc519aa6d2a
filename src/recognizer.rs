//! Asynchronous gesture recognition: the submission loop, the callback merge, and the hand
//! snapshot served to consumers.
//!
//! The estimation engine itself is an opaque capability behind [`RecognizerEngine`]. Frames are
//! submitted to it from a dedicated, throttled recognition thread; results come back through a
//! callback invoked from the engine's own execution context and are merged into a mutex-guarded
//! snapshot. Consumers poll [`GestureRecognizer::hands`] at any rate from any thread and always
//! observe a fully formed snapshot whose hand list and count agree.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::coords::CoordinateMapper;
use crate::error::{Error, SubmissionError};
use crate::frame::{Frame, FrameReader, Resolution};
use crate::hand::{Hand, Point, NUM_LANDMARKS};

/// Raw result delivered by a [`RecognizerEngine`] callback.
///
/// Landmark coordinates are in the estimator's normalized `[0, 1]²` space. `gestures` pairs with
/// `hands` by index and may be shorter; hands without a matching entry have no gesture.
#[derive(Debug, Clone, Default)]
pub struct RecognitionResult {
    pub hands: Vec<Vec<Point>>,
    pub gestures: Vec<String>,
}

/// Callback through which a [`RecognizerEngine`] delivers results.
///
/// Invoked from the engine's execution context, in submission order.
pub type ResultCallback = Box<dyn FnMut(RecognitionResult, u64) + Send>;

/// An opaque asynchronous estimation engine.
///
/// An engine is constructed around a [`ResultCallback`] (see [`GestureRecognizer::new`]) and
/// accepts `(frame, timestamp)` submissions with strictly increasing timestamps. At some later
/// point it invokes the callback from its own execution context, zero or more times per
/// submission (typically once), never delivering the result for a later timestamp before that of
/// an earlier one. Engines are free to drop or coalesce submissions internally when they cannot
/// keep up.
pub trait RecognizerEngine: Send + 'static {
    /// Submits a frame for recognition.
    ///
    /// This is fire-and-forget: it must not block on the estimation itself. A submission error is
    /// non-fatal; the recognition loop logs it and moves on to the next frame.
    fn submit(&mut self, frame: Arc<Frame>, timestamp: u64) -> Result<(), SubmissionError>;
}

/// Recognizer configuration.
///
/// `output` is the size of the coordinate space landmarks are mapped into (typically the size of
/// the window the consumer renders to). It is an explicit parameter here; nothing is read from
/// ambient display state.
#[derive(Debug, Clone)]
pub struct RecognizerOptions {
    output: Resolution,
    max_hands: usize,
    min_detection_confidence: f32,
    min_tracking_confidence: f32,
    model_asset_path: Option<PathBuf>,
    throttle: Duration,
}

impl RecognizerOptions {
    /// Default delay between successive submissions to the engine.
    pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(10);

    pub fn new(output: Resolution) -> Self {
        Self {
            output,
            max_hands: 2,
            min_detection_confidence: 0.7,
            min_tracking_confidence: 0.7,
            model_asset_path: None,
            throttle: Self::DEFAULT_THROTTLE,
        }
    }

    /// Sets the maximum number of hands the engine should detect (default: 2).
    #[inline]
    pub fn max_hands(mut self, max_hands: usize) -> Self {
        self.max_hands = max_hands;
        self
    }

    /// Sets the minimum detection confidence, in `[0, 1]` (default: 0.7).
    #[inline]
    pub fn min_detection_confidence(mut self, confidence: f32) -> Self {
        self.min_detection_confidence = confidence;
        self
    }

    /// Sets the minimum confidence for tracking a hand between frames, in `[0, 1]`
    /// (default: 0.7).
    #[inline]
    pub fn min_tracking_confidence(mut self, confidence: f32) -> Self {
        self.min_tracking_confidence = confidence;
        self
    }

    /// Sets the model asset for the engine to load.
    #[inline]
    pub fn model_asset_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_asset_path = Some(path.into());
        self
    }

    /// Sets the delay between successive submissions.
    ///
    /// The throttle keeps the recognition loop from flooding the engine faster than it can
    /// estimate. With a slow engine, many captured frames are skipped entirely (the frame buffer
    /// only holds the latest one); lowering the throttle does not change that, it only submits
    /// the surviving frames more often.
    #[inline]
    pub fn throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_hands: self.max_hands,
            min_detection_confidence: self.min_detection_confidence,
            min_tracking_confidence: self.min_tracking_confidence,
            model_asset_path: self.model_asset_path.clone(),
        }
    }

    fn validate(&self) -> Result<(), Error> {
        for (name, value) in [
            ("min_detection_confidence", self.min_detection_confidence),
            ("min_tracking_confidence", self.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Configuration(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.max_hands == 0 {
            return Err(Error::Configuration("max_hands must be at least 1".into()));
        }
        if let Some(path) = &self.model_asset_path {
            if !path.is_file() {
                return Err(Error::Configuration(format!(
                    "model asset `{}` not found",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// Engine construction parameters.
///
/// Derived from validated [`RecognizerOptions`] and handed to the engine factory together with
/// the result callback (see [`GestureRecognizer::new`]).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_hands: usize,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    pub model_asset_path: Option<PathBuf>,
}

#[derive(Default)]
struct Snapshot {
    hands: Vec<Hand>,
    visible: usize,
}

/// Tracks hands and gestures in the frames captured by a [`Camera`].
///
/// [`Camera`]: crate::camera::Camera
pub struct GestureRecognizer<E: RecognizerEngine> {
    reader: FrameReader,
    engine: Arc<Mutex<E>>,
    snapshot: Arc<Mutex<Snapshot>>,
    timestamp: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    throttle: Duration,
    thread: Option<JoinHandle<()>>,
}

impl<E: RecognizerEngine> GestureRecognizer<E> {
    /// Creates a recognizer reading frames through `reader`.
    ///
    /// `make_engine` receives the engine construction parameters and the result callback, and
    /// builds the engine around them. It is only invoked once the options have been validated:
    /// invalid confidence thresholds or a missing model asset fail here, before any engine exists
    /// or any thread runs.
    pub fn new<F>(
        reader: FrameReader,
        options: RecognizerOptions,
        make_engine: F,
    ) -> Result<Self, Error>
    where
        F: FnOnce(EngineConfig, ResultCallback) -> Result<E, Error>,
    {
        options.validate()?;

        let snapshot = Arc::new(Mutex::new(Snapshot::default()));
        let mapper = CoordinateMapper::new(options.output, reader.mirror());
        let callback = merge_callback(snapshot.clone(), mapper, options.max_hands);
        let engine = make_engine(options.engine_config(), callback)?;

        Ok(Self {
            reader,
            engine: Arc::new(Mutex::new(engine)),
            snapshot,
            timestamp: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            throttle: options.throttle,
            thread: None,
        })
    }

    /// Starts the recognition loop on its own thread.
    ///
    /// Fails with [`Error::AlreadyRunning`] when the loop is already running; the running loop is
    /// left untouched. Restarting after [`stop`](Self::stop) is allowed; the submission
    /// timestamp continues where it left off, keeping the engine's strictly-increasing timestamp
    /// requirement intact.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.thread.is_some() {
            return Err(Error::AlreadyRunning);
        }

        self.running.store(true, Ordering::Relaxed);
        let thread = thread::Builder::new()
            .name("gesture recognition".into())
            .spawn({
                let running = self.running.clone();
                let reader = self.reader.clone();
                let engine = self.engine.clone();
                let timestamp = self.timestamp.clone();
                let throttle = self.throttle;
                move || recognition_loop(&reader, &engine, &timestamp, &running, throttle)
            })
            .map_err(|e| {
                self.running.store(false, Ordering::Relaxed);
                Error::Thread(e.into())
            })?;
        self.thread = Some(thread);
        Ok(())
    }

    /// Stops the recognition loop, blocking until it has exited its current iteration.
    ///
    /// Stopping a recognizer that is not running is a no-op. In-flight submissions are not
    /// cancelled; their callbacks may still arrive afterwards and will update the snapshot, which
    /// remains valid.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("recognition thread panicked");
            }
        }
    }

    /// Whether the recognition loop is currently running.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Returns the latest snapshot of detected hands.
    ///
    /// The returned list is a copy; callback merges after this call do not affect it. Hands
    /// appear in the estimator's tracking order, which is not necessarily left to right.
    pub fn hands(&self) -> Vec<Hand> {
        self.snapshot.lock().unwrap().hands.clone()
    }

    /// Returns the number of currently visible hands.
    pub fn visible_hands(&self) -> usize {
        self.snapshot.lock().unwrap().visible
    }

    /// Returns the hand list and the visible-hand count, read under a single lock acquisition.
    ///
    /// The two always agree; separate calls to [`hands`](Self::hands) and
    /// [`visible_hands`](Self::visible_hands) may interleave with a callback merge.
    pub fn hands_with_count(&self) -> (Vec<Hand>, usize) {
        let guard = self.snapshot.lock().unwrap();
        (guard.hands.clone(), guard.visible)
    }
}

impl<E: RecognizerEngine> Drop for GestureRecognizer<E> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Builds the result callback that merges engine output into the snapshot.
///
/// The new hand list is constructed outside the lock; only the wholesale swap happens inside it,
/// so snapshot readers never wait on coordinate mapping. Readers always see list and count agree.
fn merge_callback(
    snapshot: Arc<Mutex<Snapshot>>,
    mapper: CoordinateMapper,
    max_hands: usize,
) -> ResultCallback {
    Box::new(move |result: RecognitionResult, timestamp| {
        let mut hands = Vec::with_capacity(result.hands.len().min(max_hands));
        for (i, landmarks) in result.hands.iter().enumerate() {
            if hands.len() == max_hands {
                log::warn!(
                    "estimator reported more than {max_hands} hands at t={timestamp}, \
                     ignoring the rest"
                );
                break;
            }
            let mapped: Vec<Point> = landmarks.iter().map(|&p| mapper.map(p)).collect();
            let mapped: [Point; NUM_LANDMARKS] = match mapped.try_into() {
                Ok(mapped) => mapped,
                Err(_) => {
                    log::warn!(
                        "discarding hand with {} landmarks at t={timestamp}",
                        landmarks.len()
                    );
                    continue;
                }
            };
            hands.push(Hand::new(mapped, result.gestures.get(i).cloned()));
        }

        let visible = hands.len();
        let mut guard = snapshot.lock().unwrap();
        guard.hands = hands;
        guard.visible = visible;
    })
}

fn recognition_loop<E: RecognizerEngine>(
    reader: &FrameReader,
    engine: &Mutex<E>,
    timestamp: &AtomicU64,
    running: &AtomicBool,
    throttle: Duration,
) {
    while running.load(Ordering::Relaxed) {
        // Before the first capture there is nothing to submit; just wait out the throttle.
        if let Some(frame) = reader.frame() {
            // This loop is the sole writer of the counter, so submission timestamps are strictly
            // increasing, as the engine requires.
            let ts = timestamp.fetch_add(1, Ordering::Relaxed) + 1;
            if let Err(e) = engine.lock().unwrap().submit(frame, ts) {
                // A single bad frame must not take down the pipeline.
                log::warn!("submission failed, skipping frame: {}", e);
            }
        }
        thread::sleep(throttle);
    }
}
