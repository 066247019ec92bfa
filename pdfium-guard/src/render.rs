//! Render targets and image output

use crate::engine::Engine;
use crate::error::{PdfError, Result};
use crate::handle::{kind, HandleRef, OpaqueHandle};
use crate::runtime::Runtime;
use pdfium_guard_sys::*;
use std::cell::{Ref, RefCell, RefMut};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::path::Path;

/// Pixel format of a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// Grayscale format (1 byte per pixel)
    Gray,
    /// BGR format (3 bytes per pixel)
    Bgr,
    /// BGRx format (4 bytes per pixel, unused alpha byte)
    Bgrx,
    /// BGRA format (4 bytes per pixel)
    #[default]
    Bgra,
}

impl PixelFormat {
    /// Get the number of bytes per pixel for this format.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Gray => 1,
            PixelFormat::Bgr => 3,
            PixelFormat::Bgrx | PixelFormat::Bgra => 4,
        }
    }

    /// Convert to PDFium bitmap format constant.
    pub(crate) fn to_fpdf_format(self) -> c_int {
        match self {
            PixelFormat::Gray => FPDFBitmap_Gray,
            PixelFormat::Bgr => FPDFBitmap_BGR,
            PixelFormat::Bgrx => FPDFBitmap_BGRx,
            PixelFormat::Bgra => FPDFBitmap_BGRA,
        }
    }
}

/// 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// PDFium's 0xAARRGGBB encoding.
    pub fn to_argb(self) -> u32 {
        (self.a as u32) << 24 | (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }
}

/// A native bitmap that pages render into.
///
/// Pixel access and destruction are refused while a render into the target is
/// in flight ([`PdfError::TargetBusy`]). The target keeps the runtime alive.
///
/// `'buf` is the borrow of caller-owned pixels for targets made with
/// [`from_buffer`](Self::from_buffer); targets that own their pixels are
/// `RenderTarget<'static>`.
pub struct RenderTarget<'buf> {
    bitmap: RefCell<OpaqueHandle<kind::Bitmap>>,
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    _runtime: Runtime,
    _buffer: PhantomData<&'buf mut [u8]>,
}

// SAFETY: the bitmap is exclusively owned by this target and PDFium bitmaps
// carry no thread affinity. The RefCell makes the target !Sync, so it is used
// from one thread at a time.
unsafe impl Send for RenderTarget<'_> {}

fn check_size(width: u32, height: u32) -> Result<(c_int, c_int)> {
    match (c_int::try_from(width), c_int::try_from(height)) {
        (Ok(w), Ok(h)) if w > 0 && h > 0 => Ok((w, h)),
        _ => Err(PdfError::InvalidParameter(format!(
            "bitmap size {width}x{height} out of range"
        ))),
    }
}

impl RenderTarget<'static> {
    /// Allocate a `width` x `height` bitmap.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use pdfium_guard::{PixelFormat, RenderTarget, Runtime};
    ///
    /// let runtime = Runtime::acquire()?;
    /// let target = RenderTarget::new(&runtime, 200, 300, PixelFormat::Bgr)?;
    /// assert!(target.stride() >= 200 * 3);
    /// # Ok::<(), pdfium_guard::PdfError>(())
    /// ```
    pub fn new(runtime: &Runtime, width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        let (w, h) = check_size(width, height)?;

        let engine = runtime.engine().clone();
        // SAFETY: PDFium allocates and owns the buffer when `first_scan` is null.
        let raw = unsafe {
            engine.bitmap_create_ex(w, h, format.to_fpdf_format(), std::ptr::null_mut(), 0)
        };
        let bitmap = unsafe { OpaqueHandle::<kind::Bitmap>::wrap(engine.clone(), raw) }
            .ok_or(PdfError::Allocation { width, height })?;

        let stride = unsafe { engine.bitmap_get_stride(raw) };
        let stride = usize::try_from(stride)
            .ok()
            .filter(|s| *s >= width as usize * format.bytes_per_pixel())
            .ok_or_else(|| PdfError::RenderFailed {
                reason: format!("bitmap reported invalid stride {stride}"),
            })?;

        Ok(Self {
            bitmap: RefCell::new(bitmap),
            width,
            height,
            stride,
            format,
            _runtime: runtime.clone(),
            _buffer: PhantomData,
        })
    }
}

impl<'buf> RenderTarget<'buf> {
    /// Render straight into caller-owned pixels laid out as `height` rows of
    /// `stride` bytes. The buffer stays borrowed until the target is dropped.
    ///
    /// ```no_run
    /// use pdfium_guard::{PixelFormat, RenderTarget, Runtime};
    ///
    /// let runtime = Runtime::acquire()?;
    /// let mut frame = vec![0u8; 640 * 4 * 480];
    /// {
    ///     let target =
    ///         RenderTarget::from_buffer(&runtime, &mut frame, 640, 480, PixelFormat::Bgra, 640 * 4)?;
    ///     // render pages into `target`
    /// }
    /// let first_pixel = &frame[..4];
    /// # Ok::<(), pdfium_guard::PdfError>(())
    /// ```
    pub fn from_buffer(
        runtime: &Runtime,
        buffer: &'buf mut [u8],
        width: u32,
        height: u32,
        format: PixelFormat,
        stride: usize,
    ) -> Result<Self> {
        let (w, h) = check_size(width, height)?;
        let row = width as usize * format.bytes_per_pixel();
        let raw_stride = c_int::try_from(stride)
            .ok()
            .filter(|_| stride >= row)
            .ok_or_else(|| {
                PdfError::InvalidParameter(format!(
                    "stride {stride} too small for {row} bytes per row"
                ))
            })?;
        let needed = stride.checked_mul(height as usize).unwrap_or(usize::MAX);
        if buffer.len() < needed {
            return Err(PdfError::InvalidParameter(format!(
                "buffer of {} bytes cannot hold {needed}",
                buffer.len()
            )));
        }

        let engine = runtime.engine().clone();
        // SAFETY: the buffer is large enough for the layout and stays
        // mutably borrowed for `'buf`, which outlives the bitmap.
        let raw = unsafe {
            engine.bitmap_create_ex(
                w,
                h,
                format.to_fpdf_format(),
                buffer.as_mut_ptr().cast(),
                raw_stride,
            )
        };
        let bitmap = unsafe { OpaqueHandle::<kind::Bitmap>::wrap(engine, raw) }
            .ok_or(PdfError::Allocation { width, height })?;

        Ok(Self {
            bitmap: RefCell::new(bitmap),
            width,
            height,
            stride,
            format,
            _runtime: runtime.clone(),
            _buffer: PhantomData,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Bytes per row, which may exceed `width * bytes_per_pixel`.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Length of the pixel buffer (`stride * height`).
    pub fn byte_len(&self) -> usize {
        self.stride * self.height as usize
    }

    pub fn is_valid(&self) -> bool {
        self.bitmap.try_borrow().map_or(true, |b| b.is_valid())
    }

    /// Read-only view of the pixel buffer.
    pub fn pixels(&self) -> Result<Pixels<'_>> {
        let guard = self.bitmap.try_borrow().map_err(|_| PdfError::TargetBusy)?;
        let raw = guard.borrow()?.as_ptr();
        let data = unsafe { self.buffer(&**guard.engine(), raw)? };
        // SAFETY: the buffer belongs to the bitmap, which `guard` keeps alive
        // and unborrowed mutably.
        let data = unsafe { std::slice::from_raw_parts(data, self.byte_len()) };
        Ok(Pixels {
            _guard: guard,
            data,
        })
    }

    /// Mutable view of the pixel buffer.
    pub fn pixels_mut(&self) -> Result<PixelsMut<'_>> {
        let guard = self
            .bitmap
            .try_borrow_mut()
            .map_err(|_| PdfError::TargetBusy)?;
        let raw = guard.borrow()?.as_ptr();
        let data = unsafe { self.buffer(&**guard.engine(), raw)? };
        // SAFETY: as in `pixels`, and the RefMut makes this view exclusive.
        let data = unsafe { std::slice::from_raw_parts_mut(data, self.byte_len()) };
        Ok(PixelsMut {
            _guard: guard,
            data,
        })
    }

    unsafe fn buffer(&self, engine: &dyn Engine, raw: FPDF_BITMAP) -> Result<*mut u8> {
        let data = engine.bitmap_get_buffer(raw) as *mut u8;
        if data.is_null() {
            return Err(PdfError::InvalidHandle { kind: "bitmap" });
        }
        Ok(data)
    }

    /// Fill the whole target with `color`.
    pub fn clear(&self, color: Color) -> Result<()> {
        let guard = self
            .bitmap
            .try_borrow_mut()
            .map_err(|_| PdfError::TargetBusy)?;
        let raw = guard.borrow()?.as_ptr();
        // Dimensions were range-checked at construction.
        let ok = unsafe {
            guard.engine().bitmap_fill_rect(
                raw,
                0,
                0,
                self.width as c_int,
                self.height as c_int,
                color.to_argb() as FPDF_DWORD,
            )
        };
        if ok == 0 {
            return Err(PdfError::RenderFailed {
                reason: "bitmap fill failed".to_string(),
            });
        }
        Ok(())
    }

    /// Destroy the native bitmap now. Refused while a render is in flight or
    /// the pixels are borrowed; a second call is a lifecycle error.
    pub fn destroy(&self) -> Result<()> {
        let mut guard = self
            .bitmap
            .try_borrow_mut()
            .map_err(|_| PdfError::TargetBusy)?;
        guard.destroy()
    }

    /// Exclusive access for the duration of a native render call.
    pub(crate) fn begin_render(&self) -> Result<RenderLease<'_>> {
        let guard = self
            .bitmap
            .try_borrow_mut()
            .map_err(|_| PdfError::TargetBusy)?;
        guard.borrow()?;
        Ok(RenderLease { guard })
    }

    /// Copy of the pixels without stride padding.
    pub fn to_packed(&self) -> Result<Vec<u8>> {
        let pixels = self.pixels()?;
        let row = self.width as usize * self.format.bytes_per_pixel();
        let mut packed = Vec::with_capacity(row * self.height as usize);
        for y in 0..self.height as usize {
            let start = y * self.stride;
            packed.extend_from_slice(&pixels[start..start + row]);
        }
        Ok(packed)
    }

    /// Save the pixels as a PNG file.
    pub fn save_as_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use png::{BitDepth, ColorType, Encoder};
        use std::fs::File;
        use std::io::BufWriter;

        let pixels = self.pixels()?;
        let (width, height, stride) = (self.width as usize, self.height as usize, self.stride);

        let (color_type, data) = match self.format {
            PixelFormat::Bgra => {
                let mut rgba = Vec::with_capacity(width * height * 4);
                for y in 0..height {
                    for x in 0..width {
                        let offset = y * stride + x * 4;
                        rgba.push(pixels[offset + 2]); // R
                        rgba.push(pixels[offset + 1]); // G
                        rgba.push(pixels[offset]); // B
                        rgba.push(pixels[offset + 3]); // A
                    }
                }
                (ColorType::Rgba, rgba)
            }
            PixelFormat::Bgr | PixelFormat::Bgrx => {
                let bpp = self.format.bytes_per_pixel();
                let mut rgb = Vec::with_capacity(width * height * 3);
                for y in 0..height {
                    for x in 0..width {
                        let offset = y * stride + x * bpp;
                        rgb.push(pixels[offset + 2]);
                        rgb.push(pixels[offset + 1]);
                        rgb.push(pixels[offset]);
                    }
                }
                (ColorType::Rgb, rgb)
            }
            PixelFormat::Gray => {
                let mut gray = Vec::with_capacity(width * height);
                for y in 0..height {
                    gray.extend_from_slice(&pixels[y * stride..y * stride + width]);
                }
                (ColorType::Grayscale, gray)
            }
        };
        drop(pixels);

        let file = File::create(path)?;
        let mut encoder = Encoder::new(BufWriter::new(file), self.width, self.height);
        encoder.set_color(color_type);
        encoder.set_depth(BitDepth::Eight);

        let mut png_writer = encoder
            .write_header()
            .map_err(|e| PdfError::PngEncoding(e.to_string()))?;
        png_writer
            .write_image_data(&data)
            .map_err(|e| PdfError::PngEncoding(e.to_string()))?;
        Ok(())
    }
}

impl std::fmt::Debug for RenderTarget<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTarget")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .finish()
    }
}

/// Bitmap held for a native render call.
pub(crate) struct RenderLease<'a> {
    guard: RefMut<'a, OpaqueHandle<kind::Bitmap>>,
}

impl RenderLease<'_> {
    pub(crate) fn bitmap(&self) -> Result<HandleRef<'_, kind::Bitmap>> {
        self.guard.borrow()
    }
}

/// Shared pixel view; blocks renders into the target while alive.
pub struct Pixels<'a> {
    _guard: Ref<'a, OpaqueHandle<kind::Bitmap>>,
    data: &'a [u8],
}

impl Deref for Pixels<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data
    }
}

/// Exclusive pixel view.
pub struct PixelsMut<'a> {
    _guard: RefMut<'a, OpaqueHandle<kind::Bitmap>>,
    data: &'a mut [u8],
}

impl Deref for PixelsMut<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data
    }
}

impl DerefMut for PixelsMut<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.data
    }
}
