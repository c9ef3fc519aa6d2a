//! Per-hand tracking data exposed to consumers.

/// Number of landmarks the estimator reports per hand.
pub const NUM_LANDMARKS: usize = 21;

/// A 2D position in output space, in pixels.
pub type Point = [f32; 2];

/// An axis-aligned rectangle in output space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.x
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.y
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.height
    }
}

/// A detected hand: 21 landmarks in output space, plus the classified gesture, if any.
///
/// Hands are immutable once constructed. A hand always carries exactly [`NUM_LANDMARKS`]
/// landmarks; estimator results with a different landmark count are discarded during the merge and
/// never become a `Hand`.
#[derive(Debug, Clone)]
pub struct Hand {
    landmarks: [Point; NUM_LANDMARKS],
    gesture: Option<String>,
}

impl Hand {
    pub(crate) fn new(landmarks: [Point; NUM_LANDMARKS], gesture: Option<String>) -> Self {
        Self { landmarks, gesture }
    }

    /// The hand's landmarks, in output-space pixels.
    ///
    /// The landmark order is the estimator's: index 0 is the wrist, indices 1-4 the thumb, then
    /// four landmarks per finger from index to pinky.
    #[inline]
    pub fn landmarks(&self) -> &[Point; NUM_LANDMARKS] {
        &self.landmarks
    }

    /// The gesture classified for this hand, or `None` when no gesture was recognized.
    #[inline]
    pub fn gesture(&self) -> Option<&str> {
        self.gesture.as_deref()
    }

    /// Computes the axis-aligned bounding rectangle containing all landmarks.
    pub fn bounding_box(&self) -> Rect {
        let mut min = self.landmarks[0];
        let mut max = self.landmarks[0];
        for [x, y] in &self.landmarks[1..] {
            min = [min[0].min(*x), min[1].min(*y)];
            max = [max[0].max(*x), max[1].max(*y)];
        }
        Rect::new(min[0], min[1], max[0] - min[0], max[1] - min[1])
    }
}
