//! End-to-end tests of the capture, recognition, and snapshot stages, using fake frame sources
//! and estimators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use gesture_kit::camera::{Camera, CameraOptions, FrameSource};
use gesture_kit::error::{Error, SubmissionError};
use gesture_kit::frame::{Frame, Resolution};
use gesture_kit::hand::NUM_LANDMARKS;
use gesture_kit::recognizer::{
    GestureRecognizer, RecognitionResult, RecognizerEngine, RecognizerOptions,
};
use gesture_kit::worker::ThreadedEngine;

/// Produces a blank frame per read, after an optional per-frame delay.
struct TestSource {
    delay: Duration,
}

impl TestSource {
    fn instant() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }

    fn slow(delay: Duration) -> Self {
        Self { delay }
    }
}

impl FrameSource for TestSource {
    fn read_frame(&mut self) -> anyhow::Result<Frame> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        Ok(Frame::new(4, 4))
    }
}

/// Records submissions without ever producing a result.
struct RecordingEngine {
    timestamps: Arc<Mutex<Vec<u64>>>,
}

impl RecognizerEngine for RecordingEngine {
    fn submit(&mut self, _frame: Arc<Frame>, timestamp: u64) -> Result<(), SubmissionError> {
        self.timestamps.lock().unwrap().push(timestamp);
        Ok(())
    }
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for condition");
        thread::sleep(Duration::from_millis(1));
    }
}

fn open_camera(source: TestSource) -> Camera {
    let mut camera = Camera::new(CameraOptions::default().mirror(true));
    camera.open_source(source).unwrap();
    camera
}

fn options() -> RecognizerOptions {
    RecognizerOptions::new(Resolution::new(1000, 800)).throttle(Duration::from_millis(1))
}

#[test]
fn submission_timestamps_strictly_increase() {
    let mut camera = open_camera(TestSource::instant());
    let timestamps = Arc::new(Mutex::new(Vec::new()));

    let mut recognizer = GestureRecognizer::new(camera.reader().unwrap(), options(), |_config, _callback| {
        Ok(RecordingEngine {
            timestamps: timestamps.clone(),
        })
    })
    .unwrap();
    recognizer.start().unwrap();
    wait_until(|| timestamps.lock().unwrap().len() >= 20);
    recognizer.stop();
    camera.close();

    let timestamps = timestamps.lock().unwrap();
    assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn timestamps_stay_monotonic_across_restart() {
    let mut camera = open_camera(TestSource::instant());
    let timestamps = Arc::new(Mutex::new(Vec::new()));

    let mut recognizer = GestureRecognizer::new(camera.reader().unwrap(), options(), |_config, _callback| {
        Ok(RecordingEngine {
            timestamps: timestamps.clone(),
        })
    })
    .unwrap();

    for _ in 0..2 {
        recognizer.start().unwrap();
        let seen = timestamps.lock().unwrap().len();
        wait_until(|| timestamps.lock().unwrap().len() >= seen + 5);
        recognizer.stop();
    }
    camera.close();

    let timestamps = timestamps.lock().unwrap();
    assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn snapshot_is_never_torn() {
    let mut camera = open_camera(TestSource::instant());

    // The estimator alternates between an empty result and two well-formed hands, so readers that
    // catch a partial replace would see a list whose length disagrees with the count.
    let mut flip = false;
    let mut recognizer = GestureRecognizer::new(
        camera.reader().unwrap(),
        options().max_hands(4),
        |_config, callback| {
            Ok(ThreadedEngine::spawn(
                move |_frame| {
                    flip = !flip;
                    if flip {
                        Ok(RecognitionResult {
                            hands: vec![vec![[0.5, 0.5]; NUM_LANDMARKS]; 2],
                            gestures: vec!["palm".into(), "fist".into()],
                        })
                    } else {
                        Ok(RecognitionResult::default())
                    }
                },
                callback,
                2,
            ))
        },
    )
    .unwrap();
    recognizer.start().unwrap();

    let recognizer = Arc::new(recognizer);
    let stop = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let recognizer = recognizer.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let (hands, count) = recognizer.hands_with_count();
                    assert_eq!(hands.len(), count);
                    assert!(count == 0 || count == 2);
                    for hand in &hands {
                        assert_eq!(hand.landmarks().len(), NUM_LANDMARKS);
                    }
                }
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(200));
    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }

    let mut recognizer = Arc::into_inner(recognizer).unwrap();
    recognizer.stop();
    camera.close();
}

#[test]
fn empty_result_clears_the_snapshot() {
    let mut camera = open_camera(TestSource::instant());
    let hands_visible = Arc::new(AtomicBool::new(true));

    let mut recognizer = GestureRecognizer::new(camera.reader().unwrap(), options(), {
        let hands_visible = hands_visible.clone();
        |_config, callback| {
            Ok(ThreadedEngine::spawn(
                move |_frame| {
                    if hands_visible.load(Ordering::Relaxed) {
                        Ok(RecognitionResult {
                            hands: vec![vec![[0.3, 0.5]; NUM_LANDMARKS]],
                            gestures: Vec::new(),
                        })
                    } else {
                        Ok(RecognitionResult::default())
                    }
                },
                callback,
                2,
            ))
        }
    })
    .unwrap();
    recognizer.start().unwrap();

    wait_until(|| recognizer.visible_hands() == 1);
    // The camera is mirrored, so x maps straight through: 0.3 * 1000.
    assert_eq!(recognizer.hands()[0].landmarks()[0], [300.0, 400.0]);

    hands_visible.store(false, Ordering::Relaxed);
    wait_until(|| recognizer.visible_hands() == 0);
    assert!(recognizer.hands().is_empty());

    recognizer.stop();
    camera.close();
}

#[test]
fn submit_failure_does_not_stop_the_loop() {
    /// Fails every other submission, recording only the successful ones.
    struct FlakyEngine {
        timestamps: Arc<Mutex<Vec<u64>>>,
        calls: u64,
    }

    impl RecognizerEngine for FlakyEngine {
        fn submit(&mut self, _frame: Arc<Frame>, timestamp: u64) -> Result<(), SubmissionError> {
            self.calls += 1;
            if self.calls % 2 == 1 {
                return Err(SubmissionError::new("engine hiccup"));
            }
            self.timestamps.lock().unwrap().push(timestamp);
            Ok(())
        }
    }

    let mut camera = open_camera(TestSource::instant());
    let timestamps = Arc::new(Mutex::new(Vec::new()));
    let mut recognizer =
        GestureRecognizer::new(camera.reader().unwrap(), options(), |_config, _callback| {
            Ok(FlakyEngine {
                timestamps: timestamps.clone(),
                calls: 0,
            })
        })
        .unwrap();
    recognizer.start().unwrap();

    // Ten successful submissions imply at least as many interleaved failures, each of which the
    // loop survived.
    wait_until(|| timestamps.lock().unwrap().len() >= 10);
    assert!(recognizer.is_running());
    recognizer.stop();
    camera.close();

    let timestamps = timestamps.lock().unwrap();
    assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn stop_is_idempotent() {
    let mut camera = open_camera(TestSource::instant());
    let mut recognizer =
        GestureRecognizer::new(camera.reader().unwrap(), options(), |_config, _callback| {
            Ok(RecordingEngine {
                timestamps: Arc::new(Mutex::new(Vec::new())),
            })
        })
        .unwrap();

    recognizer.start().unwrap();
    assert!(matches!(recognizer.start(), Err(Error::AlreadyRunning)));
    recognizer.stop();
    recognizer.stop();
    assert!(!recognizer.is_running());

    camera.close();
    camera.close();
}

#[test]
fn stopping_before_first_frame_does_not_deadlock() {
    // The source takes longer per read than the whole open/close cycle below, so the capture
    // thread is joined while it has never produced a frame. The loop re-checks its running flag
    // between reads and each read returns in bounded time, which bounds the join.
    let mut camera = open_camera(TestSource::slow(Duration::from_millis(50)));
    let mut recognizer =
        GestureRecognizer::new(camera.reader().unwrap(), options(), |_config, _callback| {
            Ok(RecordingEngine {
                timestamps: Arc::new(Mutex::new(Vec::new())),
            })
        })
        .unwrap();
    recognizer.start().unwrap();

    recognizer.stop();
    camera.close();
}

#[test]
fn throttle_limits_submission_rate() {
    let count_submissions = |throttle: Duration, runtime: Duration| {
        let mut camera = open_camera(TestSource::instant());
        let timestamps = Arc::new(Mutex::new(Vec::new()));
        let mut recognizer = GestureRecognizer::new(
            camera.reader().unwrap(),
            options().throttle(throttle),
            |_config, _callback| {
                Ok(RecordingEngine {
                    timestamps: timestamps.clone(),
                })
            },
        )
        .unwrap();
        recognizer.start().unwrap();
        thread::sleep(runtime);
        recognizer.stop();
        camera.close();
        let count = timestamps.lock().unwrap().len();
        count
    };

    let slow = count_submissions(Duration::from_millis(100), Duration::from_millis(250));
    let fast = count_submissions(Duration::from_millis(1), Duration::from_millis(250));
    assert!(slow <= 6, "throttled loop submitted {slow} times in 250ms");
    assert!(fast > slow);
}
