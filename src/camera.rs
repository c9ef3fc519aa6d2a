//! Camera device access and the capture thread.
//!
//! [`Camera`] owns a [`FrameSource`] and a dedicated thread that pulls frames from it as fast as
//! the device yields them, publishing each frame (and its presentation [`Surface`]) to a
//! single-slot [`FrameBuffer`]. There is no backpressure: a frame nobody looked at is simply
//! overwritten by the next one.
//!
//! The default [`FrameSource`] is [`Webcam`], a V4L2 `VIDEO_CAPTURE` device yielding JFIF JPEG or
//! Motion JPEG frames.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};

use anyhow::bail;
use linuxvideo::{
    format::{FrameSizes, PixFormat, PixelFormat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device,
};

use crate::error::Error;
use crate::frame::{Frame, FrameBuffer, FrameReader, Surface};

/// A capture device producing decoded RGB [`Frame`]s.
///
/// Implementations must return from [`read_frame`](Self::read_frame) in bounded time, with either
/// a frame or an error: [`Camera::close`] joins the capture thread, and the thread only checks
/// its running flag between reads.
pub trait FrameSource: Send + 'static {
    /// Blocks until the next frame is available and returns it.
    ///
    /// An error is fatal to the capture loop: the loop logs it and terminates, freezing the
    /// pipeline's output on the last published frame.
    fn read_frame(&mut self) -> anyhow::Result<Frame>;
}

/// A V4L2 webcam, selected by device index.
pub struct Webcam {
    stream: ReadStream,
    width: u32,
    height: u32,
}

impl Webcam {
    /// Opens the `index`-th video capture device that yields a supported pixel format.
    ///
    /// The maximum discrete resolution offered by the device is selected; frames arrive at
    /// whatever rate the device produces them.
    pub fn open(index: usize) -> Result<Self, Error> {
        Self::open_impl(index).map_err(Error::Device)
    }

    fn open_impl(index: usize) -> anyhow::Result<Self> {
        let mut skip = index;
        for res in linuxvideo::list()? {
            let dev = match res {
                Ok(dev) => dev,
                Err(e) => {
                    log::warn!("{}", e);
                    continue;
                }
            };
            match Self::probe(&dev) {
                Ok(Some(config)) => {
                    if skip == 0 {
                        return Self::configure(dev, config);
                    }
                    skip -= 1;
                }
                Ok(None) => {}
                Err(e) => log::debug!("{}", e),
            }
        }
        bail!("no usable capture device at index {index}")
    }

    /// Checks whether `dev` can capture in a supported format, without configuring it.
    fn probe(dev: &Device) -> anyhow::Result<Option<(PixelFormat, u32, u32)>> {
        let caps = dev.capabilities()?;
        if !caps
            .device_capabilities()
            .contains(CapabilityFlags::VIDEO_CAPTURE)
        {
            return Ok(None);
        }

        let mut pixel_format = None;
        for format in dev.formats(BufType::VIDEO_CAPTURE) {
            let format = format?;
            if format.pixel_format() == PixelFormat::JPEG || format.pixel_format() == PixelFormat::MJPG
            {
                pixel_format = Some(format.pixel_format());
                break;
            }
        }
        let Some(pixel_format) = pixel_format else {
            return Ok(None);
        };

        let sizes = match dev.frame_sizes(pixel_format)? {
            FrameSizes::Discrete(sizes) => sizes,
            FrameSizes::Stepwise(_) | FrameSizes::Continuous(_) => {
                bail!("stepwise or continuous resolutions are not supported");
            }
        };
        let best = sizes
            .into_iter()
            .max_by_key(|size| u64::from(size.width()) * u64::from(size.height()));
        Ok(best.map(|size| (pixel_format, size.width(), size.height())))
    }

    fn configure(dev: Device, (pixfmt, width, height): (PixelFormat, u32, u32)) -> anyhow::Result<Self> {
        let caps = dev.capabilities()?;
        let path = dev.path()?;
        let capture = dev.video_capture(PixFormat::new(width, height, pixfmt))?;
        let format = capture.format();
        log::info!(
            "opened {} ({}), {}x{}",
            caps.card(),
            path.display(),
            format.width(),
            format.height(),
        );
        let (width, height) = (format.width(), format.height());
        let stream = capture.into_stream()?;
        Ok(Self {
            stream,
            width,
            height,
        })
    }
}

impl FrameSource for Webcam {
    fn read_frame(&mut self) -> anyhow::Result<Frame> {
        let (width, height) = (self.width, self.height);
        self.stream
            .dequeue(|buf| {
                let frame = match decode_jpeg(&buf) {
                    Ok(frame) => frame,
                    Err(e) => {
                        // Even high-quality webcams produce occasional corrupted MJPG frames,
                        // presumably due to USB data corruption. Hand back a blank frame instead
                        // of skipping, which would cause a latency spike.
                        log::error!("webcam decode error: {}", e);
                        Frame::new(width, height)
                    }
                };
                Ok(frame)
            })
            .map_err(Into::into)
    }
}

fn decode_jpeg(data: &[u8]) -> anyhow::Result<Frame> {
    let mut decoder = jpeg_decoder::Decoder::new(data);
    let pixels = decoder.decode()?;
    let info = match decoder.info() {
        Some(info) => info,
        None => bail!("decoder reported no image info"),
    };
    if info.pixel_format != jpeg_decoder::PixelFormat::RGB24 {
        bail!("unsupported pixel format {:?}", info.pixel_format);
    }
    match Frame::from_rgb(info.width.into(), info.height.into(), pixels) {
        Some(frame) => Ok(frame),
        None => bail!("JPEG data does not match image dimensions"),
    }
}

/// Camera configuration options.
#[derive(Debug, Default, Clone, Copy)]
pub struct CameraOptions {
    mirror: bool,
}

impl CameraOptions {
    /// Enables mirror mode: the presentation surface shows frames as the camera captured them (a
    /// mirror view for a user facing the camera), and landmark coordinates are mapped to match.
    #[inline]
    pub fn mirror(self, mirror: bool) -> Self {
        Self { mirror }
    }
}

/// Owns the capture device and the thread that drives it.
pub struct Camera {
    mirror: bool,
    capture: Option<Capture>,
}

struct Capture {
    running: Arc<AtomicBool>,
    buffer: Arc<FrameBuffer>,
    thread: JoinHandle<()>,
}

impl Camera {
    pub fn new(options: CameraOptions) -> Self {
        Self {
            mirror: options.mirror,
            capture: None,
        }
    }

    /// Opens the `index`-th webcam and starts the capture thread.
    ///
    /// Fails with [`Error::AlreadyOpen`] when the camera is already capturing (the running
    /// capture is left untouched), or with [`Error::Device`] when no usable device exists at
    /// `index`. On error, no thread is started.
    pub fn open(&mut self, index: usize) -> Result<(), Error> {
        if self.capture.is_some() {
            return Err(Error::AlreadyOpen);
        }
        let webcam = Webcam::open(index)?;
        self.open_source(webcam)
    }

    /// Starts the capture thread on an already constructed [`FrameSource`].
    pub fn open_source<S: FrameSource>(&mut self, mut source: S) -> Result<(), Error> {
        if self.capture.is_some() {
            return Err(Error::AlreadyOpen);
        }

        let running = Arc::new(AtomicBool::new(true));
        let buffer = Arc::new(FrameBuffer::new());
        let thread = thread::Builder::new()
            .name("camera capture".into())
            .spawn({
                let running = running.clone();
                let buffer = buffer.clone();
                let mirror = self.mirror;
                move || capture_loop(&mut source, &buffer, &running, mirror)
            })
            .map_err(|e| Error::Thread(e.into()))?;

        self.capture = Some(Capture {
            running,
            buffer,
            thread,
        });
        Ok(())
    }

    /// Stops the capture thread and releases the device.
    ///
    /// Closing a camera that is not open is a no-op. The running flag is cleared first and an
    /// in-flight device read is allowed to complete; this call joins the capture thread, which
    /// drops the [`FrameSource`] and with it the device handle.
    pub fn close(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.running.store(false, Ordering::Relaxed);
            if capture.thread.join().is_err() {
                log::error!("capture thread panicked");
            }
        }
    }

    /// Whether the camera has been opened (and not closed since).
    ///
    /// This keeps reporting `true` after a fatal device read error; the capture thread is gone,
    /// but the camera still has to be [`close`](Self::close)d.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.capture.is_some()
    }

    /// Whether mirror mode is enabled.
    #[inline]
    pub fn mirror(&self) -> bool {
        self.mirror
    }

    /// Returns the most recently captured frame, or `None` before the first capture (or while
    /// the camera is closed).
    pub fn raw_frame(&self) -> Option<Arc<Frame>> {
        self.capture.as_ref()?.buffer.latest_frame()
    }

    /// Returns the latest presentation surface, or `None` before the first capture (or while the
    /// camera is closed).
    pub fn surface(&self) -> Option<Arc<Surface>> {
        self.capture.as_ref()?.buffer.latest_surface()
    }

    /// Returns a read handle onto the frame buffer, or `None` while the camera is closed.
    pub fn reader(&self) -> Option<FrameReader> {
        let capture = self.capture.as_ref()?;
        Some(FrameReader::new(capture.buffer.clone(), self.mirror))
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        self.close();
    }
}

fn capture_loop<S: FrameSource>(
    source: &mut S,
    buffer: &FrameBuffer,
    running: &AtomicBool,
    mirror: bool,
) {
    while running.load(Ordering::Relaxed) {
        let frame = match source.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                // Fatal: without a device there is nothing left to capture. Readers keep seeing
                // the last published frame.
                log::error!("camera read failed, capture stops: {}", e);
                return;
            }
        };
        let surface = Surface::from_frame(&frame, mirror);
        buffer.publish(Arc::new(frame), Arc::new(surface));
    }
}
