//! Frame storage and the latest-frame exchange between pipeline stages.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

/// Resolution (`width x height`) of a frame, camera mode, or output surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    /// Creates a new [`Resolution`] of `width x height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }
}

/// One decoded camera image: a dense, tightly packed RGB8 pixel buffer.
///
/// Frames are immutable once produced. The capture loop hands each frame to the
/// [`FrameBuffer`], where it stays until the next capture supersedes it; no history is retained.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Box<[u8]>,
}

impl Frame {
    /// Creates a black frame of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 3].into_boxed_slice(),
        }
    }

    /// Creates a frame from a tightly packed RGB8 buffer.
    ///
    /// Returns `None` when `data` does not hold exactly `width * height` RGB triples.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != width as usize * height as usize * 3 {
            return None;
        }
        Some(Self {
            width,
            height,
            data: data.into_boxed_slice(),
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Raw pixel data, `width * height` RGB triples in row-major order.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }
}

/// A display-ready transform of a [`Frame`].
///
/// The camera's horizontal axis is reversed relative to the output space, so the default
/// presentation flips the frame horizontally. In mirror mode the two flips cancel and the surface
/// shows the frame unchanged. The surface always has the frame's own dimensions. It is recomputed
/// once per captured frame and derived deterministically, so two surfaces built from the same
/// frame and mirror flag are identical.
#[derive(Debug, Clone)]
pub struct Surface {
    width: u32,
    height: u32,
    data: Box<[u8]>,
}

impl Surface {
    /// Builds the presentation surface for `frame`.
    pub fn from_frame(frame: &Frame, mirror: bool) -> Self {
        let width = frame.width();
        let height = frame.height();
        if mirror {
            return Self {
                width,
                height,
                data: frame.data().into(),
            };
        }
        let mut data = vec![0; width as usize * height as usize * 3];
        for y in 0..height {
            for x in 0..width {
                let px = frame.pixel(width - 1 - x, y);
                let i = (y as usize * width as usize + x as usize) * 3;
                data[i..i + 3].copy_from_slice(&px);
            }
        }
        Self {
            width,
            height,
            data: data.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw pixel data, `width * height` RGB triples in row-major order.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Single-slot, overwrite-on-write holder for the latest [`Frame`] and its [`Surface`].
///
/// There is no queue: the capture loop overwrites the slots regardless of whether anyone has
/// observed the previous value, so readers always see the most recent frame and stale frames are
/// silently dropped. Readers may observe the same frame twice or skip frames entirely.
///
/// Writes are plain atomic reference swaps, so readers never observe a half-written frame. The
/// frame and surface slots are swapped independently; a reader polling both may pair a frame with
/// the surface of an adjacent capture tick. Each value is self-consistent and nothing downstream
/// correlates the two, so the slots are kept independent rather than swapped as a pair.
#[derive(Default)]
pub struct FrameBuffer {
    frame: ArcSwapOption<Frame>,
    surface: ArcSwapOption<Surface>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a newly captured frame and its presentation surface, discarding the previous
    /// ones.
    pub fn publish(&self, frame: Arc<Frame>, surface: Arc<Surface>) {
        self.frame.store(Some(frame));
        self.surface.store(Some(surface));
    }

    /// Returns the most recently captured frame, or `None` before the first capture.
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.frame.load_full()
    }

    /// Returns the most recently derived surface, or `None` before the first capture.
    pub fn latest_surface(&self) -> Option<Arc<Surface>> {
        self.surface.load_full()
    }
}

/// A cloneable read handle onto a [`Camera`]'s frame buffer.
///
/// Handed to the recognition loop (and any other consumer) so that frames can be read without
/// holding a reference to the [`Camera`] itself.
///
/// [`Camera`]: crate::camera::Camera
#[derive(Clone)]
pub struct FrameReader {
    buffer: Arc<FrameBuffer>,
    mirror: bool,
}

impl FrameReader {
    pub(crate) fn new(buffer: Arc<FrameBuffer>, mirror: bool) -> Self {
        Self { buffer, mirror }
    }

    /// Returns the most recently captured frame, or `None` before the first capture.
    pub fn frame(&self) -> Option<Arc<Frame>> {
        self.buffer.latest_frame()
    }

    /// Returns the most recently derived surface, or `None` before the first capture.
    pub fn surface(&self) -> Option<Arc<Surface>> {
        self.buffer.latest_surface()
    }

    /// Whether the camera that owns the underlying buffer is in mirror mode.
    #[inline]
    pub fn mirror(&self) -> bool {
        self.mirror
    }
}
