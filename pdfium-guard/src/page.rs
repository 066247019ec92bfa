//! Pages, transforms, and rendering.

use crate::bridge::Pinned;
use crate::cancel::CancelFlag;
use crate::document::{PageEntry, SessionState};
use crate::error::{ErrorCode, LifecycleError, PdfError, Result};
use crate::form::PageRect;
use crate::handle::{kind, OpaqueHandle};
use crate::render::RenderTarget;
use crate::text::{TextRun, TextRuns};
use pdfium_guard_sys::*;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::rc::Rc;
use tracing::{trace, warn};

/// Page size in points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

/// Affine transform from page space (points, origin top-left, y down) to
/// target pixels: `x' = a*x + c*y + e`, `y' = b*x + d*y + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn identity() -> Self {
        Self::IDENTITY
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    pub fn translate(tx: f32, ty: f32) -> Self {
        Self {
            e: tx,
            f: ty,
            ..Self::IDENTITY
        }
    }

    /// Scale a page of `size` to exactly `width` x `height` pixels.
    pub fn fit(size: PageSize, width: u32, height: u32) -> Self {
        Self::scale(width as f32 / size.width, height as f32 / size.height)
    }

    /// `self` followed by `next`.
    pub fn then(self, next: Transform) -> Transform {
        Transform {
            a: self.a * next.a + self.b * next.c,
            b: self.a * next.b + self.b * next.d,
            c: self.c * next.a + self.d * next.c,
            d: self.c * next.b + self.d * next.d,
            e: self.e * next.a + self.f * next.c + next.e,
            f: self.e * next.b + self.f * next.d + next.f,
        }
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    pub fn determinant(&self) -> f32 {
        self.a * self.d - self.b * self.c
    }

    pub fn is_invertible(&self) -> bool {
        let det = self.determinant();
        det != 0.0
            && det.is_finite()
            && [self.a, self.b, self.c, self.d, self.e, self.f]
                .iter()
                .all(|v| v.is_finite())
    }

    fn to_fs_matrix(self) -> FS_MATRIX {
        FS_MATRIX {
            a: self.a,
            b: self.b,
            c: self.c,
            d: self.d,
            e: self.e,
            f: self.f,
        }
    }

    /// Layout box for the PDFium entry points that take one instead of a
    /// matrix.
    fn axis_aligned_layout(&self, size: PageSize) -> Result<RenderLayout> {
        if self.b != 0.0 || self.c != 0.0 || self.a <= 0.0 || self.d <= 0.0 {
            return Err(PdfError::InvalidParameter(
                "transform must be an axis-aligned scale and translation".to_string(),
            ));
        }
        let round = |v: f32| v.round() as c_int;
        Ok(RenderLayout::new(
            round(self.e),
            round(self.f),
            round(size.width * self.a),
            round(size.height * self.d),
        ))
    }
}

/// Clockwise page rotation for layout-based rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PageRotation {
    #[default]
    None,
    Deg90,
    Deg180,
    Deg270,
}

impl PageRotation {
    pub(crate) fn as_raw(self) -> c_int {
        match self {
            PageRotation::None => 0,
            PageRotation::Deg90 => 1,
            PageRotation::Deg180 => 2,
            PageRotation::Deg270 => 3,
        }
    }
}

/// Device box a page is fitted into: `width` x `height` pixels at
/// (`start_x`, `start_y`), turned by `rotation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderLayout {
    pub start_x: i32,
    pub start_y: i32,
    pub width: i32,
    pub height: i32,
    pub rotation: PageRotation,
}

impl RenderLayout {
    pub fn new(start_x: i32, start_y: i32, width: i32, height: i32) -> Self {
        Self {
            start_x,
            start_y,
            width,
            height,
            rotation: PageRotation::None,
        }
    }

    /// The whole of `target`.
    pub fn full(target: &RenderTarget<'_>) -> Self {
        // Target dimensions are range-checked to fit a c_int.
        Self::new(0, 0, target.width() as i32, target.height() as i32)
    }

    pub fn with_rotation(mut self, rotation: PageRotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// The page-to-device transform this layout stands for, for a page of
    /// `size`.
    pub fn transform(&self, size: PageSize) -> Transform {
        let (sx, sy) = (self.start_x as f32, self.start_y as f32);
        let (w, h) = (self.width as f32, self.height as f32);
        let zero = Transform {
            a: 0.0,
            b: 0.0,
            c: 0.0,
            d: 0.0,
            e: 0.0,
            f: 0.0,
        };
        match self.rotation {
            PageRotation::None => Transform {
                a: w / size.width,
                d: h / size.height,
                e: sx,
                f: sy,
                ..zero
            },
            PageRotation::Deg90 => Transform {
                b: h / size.width,
                c: -w / size.height,
                e: sx + w,
                f: sy,
                ..zero
            },
            PageRotation::Deg180 => Transform {
                a: -w / size.width,
                d: -h / size.height,
                e: sx + w,
                f: sy + h,
                ..zero
            },
            PageRotation::Deg270 => Transform {
                b: -h / size.width,
                c: w / size.height,
                e: sx,
                f: sy + h,
                ..zero
            },
        }
    }

    fn validate(&self) -> Result<()> {
        if self.width <= 0 || self.height <= 0 {
            return Err(PdfError::InvalidParameter(format!(
                "layout size {}x{} out of range",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Render options. PDFium flags plus [`FORMS`](Self::FORMS).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RenderFlags(u32);

impl RenderFlags {
    pub const NONE: RenderFlags = RenderFlags(0);
    pub const ANNOTATIONS: RenderFlags = RenderFlags(FPDF_ANNOT as u32);
    pub const LCD_TEXT: RenderFlags = RenderFlags(FPDF_LCD_TEXT as u32);
    pub const NO_NATIVE_TEXT: RenderFlags = RenderFlags(FPDF_NO_NATIVETEXT as u32);
    pub const GRAYSCALE: RenderFlags = RenderFlags(FPDF_GRAYSCALE as u32);
    pub const REVERSE_BYTE_ORDER: RenderFlags = RenderFlags(FPDF_REVERSE_BYTE_ORDER as u32);
    pub const CONVERT_FILL_TO_STROKE: RenderFlags = RenderFlags(FPDF_CONVERT_FILL_TO_STROKE as u32);
    pub const LIMITED_IMAGE_CACHE: RenderFlags = RenderFlags(FPDF_RENDER_LIMITEDIMAGECACHE as u32);
    pub const FORCE_HALFTONE: RenderFlags = RenderFlags(FPDF_RENDER_FORCEHALFTONE as u32);
    pub const PRINTING: RenderFlags = RenderFlags(FPDF_PRINTING as u32);
    pub const NO_SMOOTH_TEXT: RenderFlags = RenderFlags(FPDF_RENDER_NO_SMOOTHTEXT as u32);
    pub const NO_SMOOTH_IMAGE: RenderFlags = RenderFlags(FPDF_RENDER_NO_SMOOTHIMAGE as u32);
    pub const NO_SMOOTH_PATH: RenderFlags = RenderFlags(FPDF_RENDER_NO_SMOOTHPATH as u32);
    /// Draw form fields through the session's form environment after the
    /// page content. Not a PDFium flag; stripped before the native call.
    pub const FORMS: RenderFlags = RenderFlags(1 << 30);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: RenderFlags) -> bool {
        self.0 & other.0 == other.0
    }

    fn native_bits(self) -> c_int {
        (self.0 & !Self::FORMS.0) as c_int
    }
}

impl BitOr for RenderFlags {
    type Output = RenderFlags;

    fn bitor(self, rhs: RenderFlags) -> RenderFlags {
        RenderFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for RenderFlags {
    fn bitor_assign(&mut self, rhs: RenderFlags) {
        self.0 |= rhs.0;
    }
}

#[repr(C)]
struct PauseRecord {
    sys: IFSDK_PAUSE,
    cancel: CancelFlag,
}

unsafe extern "C" fn need_to_pause_now(this: *mut IFSDK_PAUSE) -> FPDF_BOOL {
    // SAFETY: `this` is the first field of the `PauseRecord` pinned for the
    // duration of the render.
    match (this as *const PauseRecord).as_ref() {
        Some(record) => record.cancel.is_cancelled() as FPDF_BOOL,
        None => 0,
    }
}

/// A loaded page.
///
/// A token into its document session: the native page is owned by the
/// session, which closes it when the token is closed or dropped, or when
/// the session itself closes.
pub struct Page {
    pub(crate) session: Rc<RefCell<SessionState>>,
    pub(crate) id: u64,
    index: usize,
    closed: Cell<bool>,
}

impl Page {
    pub(crate) fn new(session: Rc<RefCell<SessionState>>, id: u64, index: usize) -> Self {
        Self {
            session,
            id,
            index,
            closed: Cell::new(false),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// False once the page or its session is closed.
    pub fn is_valid(&self) -> bool {
        !self.closed.get()
            && self
                .session
                .try_borrow()
                .is_ok_and(|state| state.pages.contains_key(&self.id))
    }

    fn with_page<T>(
        &self,
        f: impl FnOnce(&SessionState, &PageEntry, FPDF_PAGE) -> Result<T>,
    ) -> Result<T> {
        if self.closed.get() {
            return Err(PdfError::InvalidHandle { kind: "page" });
        }
        let state = self.session.borrow();
        let entry = state
            .pages
            .get(&self.id)
            .ok_or(PdfError::InvalidHandle { kind: "page" })?;
        let raw = entry.handle.borrow()?.as_ptr();
        f(&state, entry, raw)
    }

    pub fn size(&self) -> Result<PageSize> {
        self.with_page(|state, _, page| Ok(page_size(state, page)))
    }

    /// Render into the whole of `target`.
    ///
    /// With [`RenderFlags::FORMS`] and an attached form environment, form
    /// fields are drawn on top; that needs an axis-aligned `transform`.
    pub fn render(
        &self,
        target: &RenderTarget<'_>,
        transform: &Transform,
        flags: RenderFlags,
    ) -> Result<()> {
        if !transform.is_invertible() {
            return Err(PdfError::InvalidParameter(
                "render transform is not invertible".to_string(),
            ));
        }
        self.with_page(|state, entry, page| {
            let forms = if draws_forms(state, entry, flags) {
                Some(transform.axis_aligned_layout(page_size(state, page))?)
            } else {
                None
            };
            let lease = target.begin_render()?;
            let bitmap = lease.bitmap()?.as_ptr();
            let engine = state.engine();
            let matrix = transform.to_fs_matrix();
            let clip = FS_RECTF {
                left: 0.0,
                top: 0.0,
                right: target.width() as f32,
                bottom: target.height() as f32,
            };

            // SAFETY: page and bitmap are live for the call; matrix and clip
            // are stack values that outlive it.
            let status = unsafe {
                engine.render_page_bitmap_with_matrix(
                    bitmap,
                    page,
                    &matrix,
                    &clip,
                    flags.native_bits(),
                )
            };
            if let Some(err) = state.take_callback_error() {
                return Err(err);
            }
            if let Some(code) = ErrorCode::from_raw(status) {
                return Err(PdfError::RenderFailed {
                    reason: code.to_string(),
                });
            }
            if let (Some(layout), Some(form)) = (forms, &state.form) {
                form.draw(bitmap, page, &layout, flags.native_bits())?;
            }
            trace!("Rendered page {} into {}x{}", self.index, target.width(), target.height());
            Ok(())
        })
    }

    /// Progressive render that stops at the next pause point once `cancel`
    /// is set, returning `Cancelled`. `transform` must be axis-aligned.
    pub fn render_cancellable(
        &self,
        target: &RenderTarget<'_>,
        transform: &Transform,
        flags: RenderFlags,
        cancel: &CancelFlag,
    ) -> Result<()> {
        if !transform.is_invertible() {
            return Err(PdfError::InvalidParameter(
                "render transform is not invertible".to_string(),
            ));
        }
        if cancel.is_cancelled() {
            return Err(PdfError::Cancelled);
        }
        let layout = transform.axis_aligned_layout(self.size()?)?;
        self.render_layout_cancellable(target, &layout, flags, cancel)
    }

    /// Progressive render into a layout box, which may be rotated.
    pub fn render_layout_cancellable(
        &self,
        target: &RenderTarget<'_>,
        layout: &RenderLayout,
        flags: RenderFlags,
        cancel: &CancelFlag,
    ) -> Result<()> {
        layout.validate()?;
        if cancel.is_cancelled() {
            return Err(PdfError::Cancelled);
        }
        self.with_page(|state, entry, page| {
            let forms = draws_forms(state, entry, flags);
            let lease = target.begin_render()?;
            let bitmap = lease.bitmap()?.as_ptr();
            let engine = state.engine();

            let pause = Pinned::new(PauseRecord {
                sys: IFSDK_PAUSE {
                    version: 1,
                    NeedToPauseNow: Some(need_to_pause_now),
                    user: std::ptr::null_mut(),
                },
                cancel: cancel.clone(),
            });
            let pause_ptr = pause.as_ptr().cast::<IFSDK_PAUSE>();

            // SAFETY: page, bitmap and the pause record stay alive until
            // FPDF_RenderPage_Close below.
            let status = unsafe {
                let mut status = engine.render_page_bitmap_start(
                    bitmap,
                    page,
                    layout.start_x,
                    layout.start_y,
                    layout.width,
                    layout.height,
                    layout.rotation.as_raw(),
                    flags.native_bits(),
                    pause_ptr,
                );
                while status == FPDF_RENDER_TOBECONTINUED && !cancel.is_cancelled() {
                    status = engine.render_page_continue(page, pause_ptr);
                }
                engine.render_page_close(page);
                status
            };
            drop(pause);

            if let Some(err) = state.take_callback_error() {
                return Err(err);
            }
            match status {
                FPDF_RENDER_DONE => {}
                FPDF_RENDER_TOBECONTINUED => {
                    trace!("Render of page {} cancelled", self.index);
                    return Err(PdfError::Cancelled);
                }
                other => {
                    return Err(PdfError::RenderFailed {
                        reason: format!("progressive render ended with status {other}"),
                    })
                }
            }
            if let (true, Some(form)) = (forms, &state.form) {
                form.draw(bitmap, page, layout, flags.native_bits())?;
            }
            Ok(())
        })
    }

    /// Map a pixel of `layout` to page space: points, origin bottom-left,
    /// y up.
    pub fn device_to_page(&self, layout: &RenderLayout, x: i32, y: i32) -> Result<(f64, f64)> {
        layout.validate()?;
        self.with_page(|state, _, page| {
            let (mut page_x, mut page_y) = (0.0, 0.0);
            // SAFETY: the page is live; the out-pointers are locals.
            let ok = unsafe {
                state.engine().device_to_page(
                    page,
                    layout.start_x,
                    layout.start_y,
                    layout.width,
                    layout.height,
                    layout.rotation.as_raw(),
                    x,
                    y,
                    &mut page_x,
                    &mut page_y,
                )
            };
            if ok == 0 {
                return Err(PdfError::InvalidParameter(
                    "FPDF_DeviceToPage rejected the layout".to_string(),
                ));
            }
            Ok((page_x, page_y))
        })
    }

    /// Inverse of [`device_to_page`](Self::device_to_page), rounded to
    /// whole pixels.
    pub fn page_to_device(&self, layout: &RenderLayout, x: f64, y: f64) -> Result<(i32, i32)> {
        layout.validate()?;
        self.with_page(|state, _, page| {
            let (mut device_x, mut device_y) = (0, 0);
            // SAFETY: as in `device_to_page`.
            let ok = unsafe {
                state.engine().page_to_device(
                    page,
                    layout.start_x,
                    layout.start_y,
                    layout.width,
                    layout.height,
                    layout.rotation.as_raw(),
                    x,
                    y,
                    &mut device_x,
                    &mut device_y,
                )
            };
            if ok == 0 {
                return Err(PdfError::InvalidParameter(
                    "FPDF_PageToDevice rejected the layout".to_string(),
                ));
            }
            Ok((device_x, device_y))
        })
    }

    /// Visible page area (crop box clipped to the media box) in page space.
    pub fn bounding_box(&self) -> Result<PageRect> {
        self.with_page(|state, _, page| {
            let mut rect = FS_RECTF::default();
            // SAFETY: the page is live; `rect` is a local out-pointer.
            let ok = unsafe { state.engine().get_page_bounding_box(page, &mut rect) };
            if ok == 0 {
                return Err(PdfError::InvalidData(
                    "page has no bounding box".to_string(),
                ));
            }
            Ok(PageRect {
                left: rect.left as f64,
                top: rect.top as f64,
                right: rect.right as f64,
                bottom: rect.bottom as f64,
            })
        })
    }

    /// Lazy line iterator over the page text.
    pub fn extract_text(&self) -> Result<TextRuns<'_>> {
        if self.closed.get() {
            return Err(PdfError::InvalidHandle { kind: "page" });
        }
        let mut state = self.session.borrow_mut();
        let entry = state
            .pages
            .get(&self.id)
            .ok_or(PdfError::InvalidHandle { kind: "page" })?;
        let page = entry.handle.borrow()?.as_ptr();
        let engine = state.engine().clone();

        // SAFETY: the page is live; the text page is registered with the
        // session below so it is closed before the page.
        let raw = unsafe { engine.text_load_page(page) };
        let mut handle = unsafe { OpaqueHandle::<kind::TextPage>::wrap(engine.clone(), raw) }
            .ok_or_else(|| PdfError::TextExtractionFailed {
                reason: "FPDFText_LoadPage returned null".to_string(),
            })?;
        let total = unsafe { engine.text_count_chars(raw) };
        let Ok(total) = usize::try_from(total) else {
            let _ = handle.destroy();
            return Err(PdfError::TextExtractionFailed {
                reason: format!("FPDFText_CountChars returned {total}"),
            });
        };

        let id = state.next_id();
        state.text_pages.insert(
            id,
            crate::document::TextPageEntry {
                page: self.id,
                handle,
            },
        );
        Ok(TextRuns::new(self, id, total))
    }

    /// Whole page text, lines joined with `\n`.
    pub fn text(&self) -> Result<String> {
        let runs = self.extract_text()?.collect::<Result<Vec<TextRun>>>()?;
        Ok(runs
            .into_iter()
            .map(|run| run.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Close the page now. A second call fails with `AlreadyDestroyed`;
    /// a page invalidated by its session closing fails with `InvalidHandle`.
    pub fn close(&self) -> Result<()> {
        if self.closed.get() {
            return Err(LifecycleError::AlreadyDestroyed { kind: "page" }.into());
        }
        let mut state = self.session.borrow_mut();
        if !state.pages.contains_key(&self.id) {
            return Err(PdfError::InvalidHandle { kind: "page" });
        }
        self.closed.set(true);
        state.close_page(self.id)
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        if self.closed.get() {
            return;
        }
        match self.session.try_borrow_mut() {
            Ok(mut state) => {
                if state.pages.contains_key(&self.id) {
                    if let Err(err) = state.close_page(self.id) {
                        warn!("Error while closing page {}: {}", self.index, err);
                    }
                }
            }
            Err(_) => warn!(
                "Page {} dropped while its session is in use; it closes with the session",
                self.index
            ),
        }
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("index", &self.index)
            .field("valid", &self.is_valid())
            .finish()
    }
}

fn page_size(state: &SessionState, page: FPDF_PAGE) -> PageSize {
    let engine = state.engine();
    // SAFETY: callers pass a page borrowed from the session registry.
    unsafe {
        PageSize {
            width: engine.get_page_width(page),
            height: engine.get_page_height(page),
        }
    }
}

/// Whether a form pass is requested and the page is registered with a form.
fn draws_forms(state: &SessionState, entry: &PageEntry, flags: RenderFlags) -> bool {
    flags.contains(RenderFlags::FORMS) && entry.form_notified && state.form.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_then_applies_left_to_right() {
        let t = Transform::scale(2.0, 3.0).then(Transform::translate(10.0, 20.0));
        assert_eq!(t.apply(1.0, 1.0), (12.0, 23.0));

        let u = Transform::translate(10.0, 20.0).then(Transform::scale(2.0, 3.0));
        assert_eq!(u.apply(1.0, 1.0), (22.0, 63.0));
    }

    #[test]
    fn test_invertibility() {
        assert!(Transform::identity().is_invertible());
        assert!(!Transform::scale(0.0, 1.0).is_invertible());
        assert!(!Transform::scale(f32::NAN, 1.0).is_invertible());
        assert_eq!(Transform::scale(2.0, 4.0).determinant(), 8.0);
    }

    #[test]
    fn test_axis_aligned_layout() {
        let size = PageSize {
            width: 200.0,
            height: 300.0,
        };
        let t = Transform::scale(2.0, 2.0).then(Transform::translate(5.0, 7.0));
        assert_eq!(
            t.axis_aligned_layout(size).unwrap(),
            RenderLayout::new(5, 7, 400, 600)
        );

        let rotated = Transform {
            a: 0.0,
            b: 1.0,
            c: -1.0,
            d: 0.0,
            e: 0.0,
            f: 0.0,
        };
        assert!(matches!(
            rotated.axis_aligned_layout(size),
            Err(PdfError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_layout_transform_turns_clockwise() {
        let size = PageSize {
            width: 100.0,
            height: 200.0,
        };
        let layout = RenderLayout::new(10, 20, 400, 200);

        let upright = layout.transform(size);
        assert_eq!(upright.apply(0.0, 0.0), (10.0, 20.0));
        assert_eq!(upright.apply(100.0, 200.0), (410.0, 220.0));

        // The page's top-left corner follows the rotation around the box.
        let corner = |rotation| layout.with_rotation(rotation).transform(size).apply(0.0, 0.0);
        assert_eq!(corner(PageRotation::Deg90), (410.0, 20.0));
        assert_eq!(corner(PageRotation::Deg180), (410.0, 220.0));
        assert_eq!(corner(PageRotation::Deg270), (10.0, 220.0));

        // Rotated a quarter turn, the page's width runs down the box.
        let quarter = layout.with_rotation(PageRotation::Deg90).transform(size);
        assert_eq!(quarter.apply(100.0, 0.0), (410.0, 220.0));
        assert!(quarter.is_invertible());
    }

    #[test]
    fn test_empty_layout_is_rejected() {
        assert!(RenderLayout::new(0, 0, 10, 10).validate().is_ok());
        assert!(matches!(
            RenderLayout::new(0, 0, 0, 10).validate(),
            Err(PdfError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_forms_flag_is_not_passed_to_pdfium() {
        let flags = RenderFlags::ANNOTATIONS | RenderFlags::FORMS;
        assert!(flags.contains(RenderFlags::FORMS));
        assert_eq!(flags.native_bits(), FPDF_ANNOT);

        let mut flags = RenderFlags::NONE;
        flags |= RenderFlags::GRAYSCALE;
        assert_eq!(flags.bits(), FPDF_GRAYSCALE as u32);
    }
}
