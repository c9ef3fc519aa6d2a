//! Camera-fed hand tracking and gesture recognition pipeline.
//!
//! The pipeline consists of three execution contexts: a capture thread that pulls frames from a
//! [`FrameSource`] into a single-slot [`FrameBuffer`], a recognition thread that submits the
//! latest frame to an opaque [`RecognizerEngine`], and the engine's own callback context, which
//! merges results into a lock-protected snapshot of the currently visible hands. Consumers (a
//! render loop, typically) poll [`GestureRecognizer::hands`] and [`Camera::surface`] at their own
//! cadence; no stage ever blocks another on a full queue: the newest frame always wins and stale
//! frames are silently dropped.
//!
//! # Coordinates
//!
//! Estimators report landmarks in normalized `[0, 1]²` image space with the horizontal axis
//! flipped relative to the output. [`CoordinateMapper`] translates these into output-space pixels,
//! honoring the camera's mirror mode. Values are not clamped; an estimator reporting coordinates
//! outside `[0, 1]` yields landmarks outside the output rectangle.
//!
//! [`FrameSource`]: camera::FrameSource
//! [`FrameBuffer`]: frame::FrameBuffer
//! [`RecognizerEngine`]: recognizer::RecognizerEngine
//! [`GestureRecognizer::hands`]: recognizer::GestureRecognizer::hands
//! [`Camera::surface`]: camera::Camera::surface
//! [`CoordinateMapper`]: coords::CoordinateMapper

use log::LevelFilter;

pub mod camera;
pub mod coords;
pub mod error;
pub mod frame;
pub mod hand;
pub mod recognizer;
pub mod worker;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and `gesture-kit` will log at *debug* level; `RUST_LOG` overrides still
/// apply. If a global logger is already registered, this macro does nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
