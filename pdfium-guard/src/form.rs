//! Form-fill environment.
//!
//! PDFium keeps the `FPDF_FORMFILLINFO` pointer from
//! `FPDFDOC_InitFormFillEnvironment` until `FPDFDOC_ExitFormFillEnvironment`
//! and calls back into it during page loads, actions, and drawing. The
//! bridge below owns that table and the host callbacks, and is owned by the
//! document session so it is freed only after the environment exits.

use crate::bridge::{ErrorSlot, Pinned};
use crate::document::SessionState;
use crate::engine::Engine;
use crate::error::{CallbackError, LifecycleError, PdfError, Result};
use crate::font::CallbackResult;
use crate::handle::{kind, OpaqueHandle};
use crate::page::RenderLayout;
use crate::text::utf16_to_string;
use chrono::{DateTime, Datelike, Local, Timelike};
use pdfium_guard_sys::*;
use std::cell::{Cell, RefCell};
use std::ffi::CStr;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Rectangle in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PageRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    Arrow,
    Nesw,
    Nwse,
    VBeam,
    HBeam,
    Hand,
    Other(i32),
}

impl Cursor {
    fn from_raw(raw: c_int) -> Self {
        match raw {
            FPDF_CURSOR_ARROW => Cursor::Arrow,
            FPDF_CURSOR_NESW => Cursor::Nesw,
            FPDF_CURSOR_NWSE => Cursor::Nwse,
            FPDF_CURSOR_VBEAM => Cursor::VBeam,
            FPDF_CURSOR_HBEAM => Cursor::HBeam,
            FPDF_CURSOR_HAND => Cursor::Hand,
            other => Cursor::Other(other),
        }
    }
}

/// Host side of the form-fill environment.
///
/// Pages are identified by index; `None` means PDFium referred to a page
/// this session did not load. Every method defaults to doing nothing. An
/// error or panic is reported by the document call that triggered it.
pub trait FormCallbacks {
    fn invalidate(&mut self, page: Option<usize>, area: PageRect) -> CallbackResult<()> {
        let _ = (page, area);
        Ok(())
    }

    fn output_selected_rect(&mut self, page: Option<usize>, area: PageRect) -> CallbackResult<()> {
        let _ = (page, area);
        Ok(())
    }

    fn set_cursor(&mut self, cursor: Cursor) -> CallbackResult<()> {
        let _ = cursor;
        Ok(())
    }

    fn on_change(&mut self) -> CallbackResult<()> {
        Ok(())
    }

    /// Index of the page the user is looking at.
    fn current_page(&mut self) -> CallbackResult<Option<usize>> {
        Ok(None)
    }

    /// Rotation in quarter turns clockwise.
    fn page_rotation(&mut self, page: Option<usize>) -> CallbackResult<i32> {
        let _ = page;
        Ok(0)
    }

    fn execute_named_action(&mut self, action: &str) -> CallbackResult<()> {
        let _ = action;
        Ok(())
    }

    fn set_text_field_focus(&mut self, value: &str, focused: bool) -> CallbackResult<()> {
        let _ = (value, focused);
        Ok(())
    }

    fn do_uri_action(&mut self, uri: &str) -> CallbackResult<()> {
        let _ = uri;
        Ok(())
    }

    fn do_goto_action(
        &mut self,
        page_index: usize,
        zoom_mode: i32,
        position: &[f32],
    ) -> CallbackResult<()> {
        let _ = (page_index, zoom_mode, position);
        Ok(())
    }
}

/// Callbacks that accept everything and do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFormCallbacks;

impl FormCallbacks for NoopFormCallbacks {}

/// Options for [`DocumentSession::attach_form_environment`](crate::DocumentSession::attach_form_environment).
pub struct FormConfig {
    callbacks: Box<dyn FormCallbacks>,
}

impl FormConfig {
    pub fn new(callbacks: impl FormCallbacks + 'static) -> Self {
        Self {
            callbacks: Box::new(callbacks),
        }
    }
}

impl Default for FormConfig {
    fn default() -> Self {
        Self::new(NoopFormCallbacks)
    }
}

impl fmt::Debug for FormConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormConfig").finish_non_exhaustive()
    }
}

// ============================================================================
// Bridge
// ============================================================================

#[repr(C)]
struct FormRecord {
    sys: FPDF_FORMFILLINFO,
    callbacks: RefCell<Box<dyn FormCallbacks>>,
    /// Loaded pages as `(index, raw page)`.
    pages: RefCell<Vec<(usize, usize)>>,
    errors: ErrorSlot,
}

impl FormRecord {
    fn page_at(&self, index: usize) -> FPDF_PAGE {
        self.pages
            .try_borrow()
            .ok()
            .and_then(|pages| pages.iter().find(|(i, _)| *i == index).map(|&(_, raw)| raw))
            .map_or(std::ptr::null_mut(), |raw| raw as FPDF_PAGE)
    }

    fn index_of(&self, page: FPDF_PAGE) -> Option<usize> {
        let pages = self.pages.try_borrow().ok()?;
        pages
            .iter()
            .find(|&&(_, raw)| raw == page as usize)
            .map(|&(index, _)| index)
    }

    fn dispatch<T>(
        &self,
        callback: &'static str,
        sentinel: T,
        f: impl FnOnce(&mut dyn FormCallbacks, &FormRecord) -> CallbackResult<T>,
    ) -> T {
        self.errors.guard(callback, sentinel, || {
            let mut callbacks = self
                .callbacks
                .try_borrow_mut()
                .map_err(|_| CallbackError::new("form callbacks re-entered"))?;
            f(&mut **callbacks, self)
        })
    }
}

pub(crate) struct FormBridge {
    record: Pinned<FormRecord>,
}

impl FormBridge {
    fn new(callbacks: Box<dyn FormCallbacks>) -> Self {
        let record = Pinned::new(FormRecord {
            sys: FPDF_FORMFILLINFO {
                version: 1,
                Release: None,
                FFI_Invalidate: Some(invalidate),
                FFI_OutputSelectedRect: Some(output_selected_rect),
                FFI_SetCursor: Some(set_cursor),
                FFI_SetTimer: Some(set_timer),
                FFI_KillTimer: Some(kill_timer),
                FFI_GetLocalTime: Some(get_local_time),
                FFI_OnChange: Some(on_change),
                FFI_GetPage: Some(get_page),
                FFI_GetCurrentPage: Some(get_current_page),
                FFI_GetRotation: Some(get_rotation),
                FFI_ExecuteNamedAction: Some(execute_named_action),
                FFI_SetTextFieldFocus: Some(set_text_field_focus),
                FFI_DoURIAction: Some(do_uri_action),
                FFI_DoGoToAction: Some(do_goto_action),
                m_pJsPlatform: std::ptr::null_mut(),
            },
            callbacks: RefCell::new(callbacks),
            pages: RefCell::new(Vec::new()),
            errors: ErrorSlot::default(),
        });
        Self { record }
    }

    fn as_sys_ptr(&self) -> *mut FPDF_FORMFILLINFO {
        self.record.as_ptr().cast()
    }

    fn register(&self, index: usize, page: FPDF_PAGE) {
        self.record.get().pages.borrow_mut().push((index, page as usize));
    }

    fn unregister(&self, page: FPDF_PAGE) {
        self.record
            .get()
            .pages
            .borrow_mut()
            .retain(|&(_, raw)| raw != page as usize);
    }

    fn take_error(&self) -> Result<()> {
        match self.record.get().errors.take() {
            Some(err) => Err(PdfError::Callback(err)),
            None => Ok(()),
        }
    }
}

unsafe fn record<'a>(this: *mut FPDF_FORMFILLINFO) -> Option<&'a FormRecord> {
    // SAFETY: PDFium passes back the pointer given at init, which is the
    // start of a live `FormRecord`.
    (this as *const FormRecord).as_ref()
}

unsafe fn lossy_cstr(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

fn rect(left: c_double, top: c_double, right: c_double, bottom: c_double) -> PageRect {
    PageRect {
        left,
        top,
        right,
        bottom,
    }
}

unsafe extern "C" fn invalidate(
    this: *mut FPDF_FORMFILLINFO,
    page: FPDF_PAGE,
    left: c_double,
    top: c_double,
    right: c_double,
    bottom: c_double,
) {
    if let Some(rec) = record(this) {
        rec.dispatch("FFI_Invalidate", (), |cb, rec| {
            cb.invalidate(rec.index_of(page), rect(left, top, right, bottom))
        })
    }
}

unsafe extern "C" fn output_selected_rect(
    this: *mut FPDF_FORMFILLINFO,
    page: FPDF_PAGE,
    left: c_double,
    top: c_double,
    right: c_double,
    bottom: c_double,
) {
    if let Some(rec) = record(this) {
        rec.dispatch("FFI_OutputSelectedRect", (), |cb, rec| {
            cb.output_selected_rect(rec.index_of(page), rect(left, top, right, bottom))
        })
    }
}

unsafe extern "C" fn set_cursor(this: *mut FPDF_FORMFILLINFO, cursor: c_int) {
    if let Some(rec) = record(this) {
        rec.dispatch("FFI_SetCursor", (), |cb, _| cb.set_cursor(Cursor::from_raw(cursor)))
    }
}

// Timers are declined: PDFium treats 0 as "no timer" and skips the callback.
unsafe extern "C" fn set_timer(
    _this: *mut FPDF_FORMFILLINFO,
    elapse: c_int,
    _func: TimerCallback,
) -> c_int {
    tracing::trace!("Declined form timer ({} ms)", elapse);
    0
}

unsafe extern "C" fn kill_timer(_this: *mut FPDF_FORMFILLINFO, _timer_id: c_int) {}

unsafe extern "C" fn get_local_time(_this: *mut FPDF_FORMFILLINFO) -> FPDF_SYSTEMTIME {
    system_time(Local::now())
}

fn system_time(now: DateTime<Local>) -> FPDF_SYSTEMTIME {
    FPDF_SYSTEMTIME {
        wYear: u16::try_from(now.year()).unwrap_or(0),
        wMonth: now.month() as u16,
        wDayOfWeek: now.weekday().num_days_from_sunday() as u16,
        wDay: now.day() as u16,
        wHour: now.hour() as u16,
        wMinute: now.minute() as u16,
        wSecond: now.second().min(59) as u16,
        wMilliseconds: now.timestamp_subsec_millis().min(999) as u16,
    }
}

unsafe extern "C" fn on_change(this: *mut FPDF_FORMFILLINFO) {
    if let Some(rec) = record(this) {
        rec.dispatch("FFI_OnChange", (), |cb, _| cb.on_change())
    }
}

unsafe extern "C" fn get_page(
    this: *mut FPDF_FORMFILLINFO,
    _document: FPDF_DOCUMENT,
    index: c_int,
) -> FPDF_PAGE {
    match (record(this), usize::try_from(index)) {
        (Some(rec), Ok(index)) => rec.page_at(index),
        _ => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn get_current_page(
    this: *mut FPDF_FORMFILLINFO,
    _document: FPDF_DOCUMENT,
) -> FPDF_PAGE {
    match record(this) {
        Some(rec) => rec.dispatch("FFI_GetCurrentPage", std::ptr::null_mut(), |cb, rec| {
            Ok(cb
                .current_page()?
                .map_or(std::ptr::null_mut(), |index| rec.page_at(index)))
        }),
        None => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn get_rotation(this: *mut FPDF_FORMFILLINFO, page: FPDF_PAGE) -> c_int {
    match record(this) {
        Some(rec) => rec.dispatch("FFI_GetRotation", 0, |cb, rec| {
            Ok(cb.page_rotation(rec.index_of(page))?.rem_euclid(4))
        }),
        None => 0,
    }
}

unsafe extern "C" fn execute_named_action(this: *mut FPDF_FORMFILLINFO, action: FPDF_BYTESTRING) {
    if let Some(rec) = record(this) {
        let action = lossy_cstr(action);
        rec.dispatch("FFI_ExecuteNamedAction", (), |cb, _| {
            cb.execute_named_action(&action)
        })
    }
}

unsafe extern "C" fn set_text_field_focus(
    this: *mut FPDF_FORMFILLINFO,
    value: FPDF_WIDESTRING,
    len: FPDF_DWORD,
    focused: FPDF_BOOL,
) {
    if let Some(rec) = record(this) {
        let value = if value.is_null() {
            String::new()
        } else {
            utf16_to_string(std::slice::from_raw_parts(value, len as usize))
        };
        rec.dispatch("FFI_SetTextFieldFocus", (), |cb, _| {
            cb.set_text_field_focus(&value, focused != 0)
        })
    }
}

unsafe extern "C" fn do_uri_action(this: *mut FPDF_FORMFILLINFO, uri: FPDF_BYTESTRING) {
    if let Some(rec) = record(this) {
        let uri = lossy_cstr(uri);
        rec.dispatch("FFI_DoURIAction", (), |cb, _| cb.do_uri_action(&uri))
    }
}

unsafe extern "C" fn do_goto_action(
    this: *mut FPDF_FORMFILLINFO,
    page_index: c_int,
    zoom_mode: c_int,
    position: *mut f32,
    count: c_int,
) {
    let Some(rec) = record(this) else {
        return;
    };
    let position: &[f32] = match usize::try_from(count) {
        Ok(count) if count > 0 && !position.is_null() => {
            std::slice::from_raw_parts(position, count)
        }
        _ => &[],
    };
    rec.dispatch("FFI_DoGoToAction", (), |cb, _| {
        let page_index = usize::try_from(page_index)
            .map_err(|_| CallbackError::new(format!("negative page index {page_index}")))?;
        cb.do_goto_action(page_index, zoom_mode, position)
    })
}

// ============================================================================
// Session-owned state
// ============================================================================

/// The live environment of a session: the native handle and the bridge it
/// points into. The handle is declared first so it exits before the bridge
/// is freed.
pub(crate) struct FormState {
    pub(crate) id: u64,
    handle: OpaqueHandle<kind::FormEnv>,
    bridge: FormBridge,
}

impl FormState {
    pub(crate) fn attach(
        engine: &Arc<dyn Engine>,
        document: FPDF_DOCUMENT,
        config: FormConfig,
        id: u64,
    ) -> Result<Self> {
        let bridge = FormBridge::new(config.callbacks);
        // SAFETY: the bridge outlives the environment; see `FormState`.
        let raw = unsafe { engine.init_form_fill_environment(document, bridge.as_sys_ptr()) };
        let handle = unsafe { OpaqueHandle::wrap(engine.clone(), raw) }.ok_or_else(|| {
            PdfError::FormEnvironmentFailed {
                reason: "FPDFDOC_InitFormFillEnvironment returned null".to_string(),
            }
        })?;
        bridge.take_error()?;
        Ok(Self { id, handle, bridge })
    }

    fn raw(&self) -> Result<FPDF_FORMHANDLE> {
        Ok(self.handle.borrow()?.as_ptr())
    }

    pub(crate) fn notify_page_opened(&self, page: FPDF_PAGE, index: usize) -> Result<()> {
        let form = self.raw()?;
        // PDFium asks FFI_GetPage for the page during the calls below.
        self.bridge.register(index, page);
        let engine = self.handle.engine();
        // SAFETY: `page` and `form` are live handles of the same document.
        unsafe {
            engine.form_on_after_load_page(page, form);
            engine.form_do_page_aaction(page, form, FPDFPAGE_AACTION_OPEN);
        }
        self.bridge.take_error()
    }

    pub(crate) fn notify_page_closed(&self, page: FPDF_PAGE) -> Result<()> {
        let form = self.raw()?;
        let engine = self.handle.engine();
        // SAFETY: as in `notify_page_opened`; the page is still open.
        unsafe {
            engine.form_do_page_aaction(page, form, FPDFPAGE_AACTION_CLOSE);
            engine.form_on_before_close_page(page, form);
        }
        self.bridge.unregister(page);
        self.bridge.take_error()
    }

    /// Draw form fields over an already rendered page.
    pub(crate) fn draw(
        &self,
        bitmap: FPDF_BITMAP,
        page: FPDF_PAGE,
        layout: &RenderLayout,
        flags: c_int,
    ) -> Result<()> {
        let form = self.raw()?;
        // SAFETY: all three handles are live for the duration of the call.
        unsafe {
            self.handle.engine().ffl_draw(
                form,
                bitmap,
                page,
                layout.start_x,
                layout.start_y,
                layout.width,
                layout.height,
                layout.rotation.as_raw(),
                flags,
            )
        };
        self.bridge.take_error()
    }

    pub(crate) fn close(mut self) -> Result<()> {
        self.handle.destroy()?;
        self.bridge.take_error()
    }
}

// ============================================================================
// Token
// ============================================================================

/// Handle to a session's form-fill environment.
///
/// Dropping the token leaves the environment attached; it exits with the
/// session. [`close`](Self::close) detaches it early.
pub struct FormEnvironment {
    session: Rc<RefCell<SessionState>>,
    id: u64,
    closed: Cell<bool>,
}

impl FormEnvironment {
    pub(crate) fn new(session: Rc<RefCell<SessionState>>, id: u64) -> Self {
        Self {
            session,
            id,
            closed: Cell::new(false),
        }
    }

    /// Exit the environment. Fails with `FormInUse` while pages loaded under
    /// it are still open.
    pub fn close(&self) -> Result<()> {
        if self.closed.get() {
            return Err(LifecycleError::AlreadyDestroyed {
                kind: "form environment",
            }
            .into());
        }
        let mut state = self.session.borrow_mut();
        if !state.form.as_ref().is_some_and(|form| form.id == self.id) {
            return Err(PdfError::InvalidHandle {
                kind: "form environment",
            });
        }
        let pages = state.pages.values().filter(|p| p.form_notified).count();
        if pages > 0 {
            return Err(LifecycleError::FormInUse { pages }.into());
        }
        self.closed.set(true);
        match state.form.take() {
            Some(form) => {
                tracing::debug!("Closing form environment");
                form.close()
            }
            None => Ok(()),
        }
    }

    /// Whether this environment is still attached to an open session.
    pub fn is_active(&self) -> bool {
        !self.closed.get()
            && self
                .session
                .try_borrow()
                .is_ok_and(|state| state.form.as_ref().is_some_and(|form| form.id == self.id))
    }
}

impl fmt::Debug for FormEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormEnvironment")
            .field("id", &self.id)
            .field("closed", &self.closed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Default)]
    struct Recorder {
        uris: Rc<RefCell<Vec<String>>>,
    }

    impl FormCallbacks for Recorder {
        fn do_uri_action(&mut self, uri: &str) -> CallbackResult<()> {
            self.uris.borrow_mut().push(uri.to_string());
            Ok(())
        }

        fn page_rotation(&mut self, _page: Option<usize>) -> CallbackResult<i32> {
            Ok(5)
        }

        fn execute_named_action(&mut self, action: &str) -> CallbackResult<()> {
            Err(CallbackError::new(format!("unknown action {action}")))
        }
    }

    #[test]
    fn test_get_page_resolves_registered_pages() {
        let bridge = FormBridge::new(Box::new(NoopFormCallbacks));
        let sys = bridge.as_sys_ptr();
        let page = 0x40 as FPDF_PAGE;
        bridge.register(3, page);

        let get = unsafe { (*sys).FFI_GetPage.unwrap() };
        assert_eq!(unsafe { get(sys, std::ptr::null_mut(), 3) }, page);
        assert!(unsafe { get(sys, std::ptr::null_mut(), 0) }.is_null());

        bridge.unregister(page);
        assert!(unsafe { get(sys, std::ptr::null_mut(), 3) }.is_null());
    }

    #[test]
    fn test_callbacks_receive_decoded_arguments() {
        let recorder = Recorder::default();
        let uris = recorder.uris.clone();
        let bridge = FormBridge::new(Box::new(recorder));
        let sys = bridge.as_sys_ptr();

        unsafe {
            ((*sys).FFI_DoURIAction.unwrap())(sys, b"https://example.com\0".as_ptr().cast());
            assert_eq!(((*sys).FFI_GetRotation.unwrap())(sys, std::ptr::null_mut()), 1);
        }
        assert_eq!(*uris.borrow(), vec!["https://example.com".to_string()]);
        assert!(bridge.take_error().is_ok());
    }

    #[test]
    fn test_callback_error_is_kept_for_host() {
        let bridge = FormBridge::new(Box::new(Recorder::default()));
        let sys = bridge.as_sys_ptr();
        unsafe { ((*sys).FFI_ExecuteNamedAction.unwrap())(sys, b"Print\0".as_ptr().cast()) };

        match bridge.take_error() {
            Err(PdfError::Callback(err)) => {
                assert_eq!(err.callback(), "FFI_ExecuteNamedAction");
                assert!(err.message().contains("Print"));
            }
            other => panic!("Expected callback error, got {:?}", other),
        }
    }

    #[test]
    fn test_timers_are_declined() {
        let bridge = FormBridge::new(Box::new(NoopFormCallbacks));
        let sys = bridge.as_sys_ptr();
        assert_eq!(unsafe { ((*sys).FFI_SetTimer.unwrap())(sys, 100, None) }, 0);
    }

    #[test]
    fn test_system_time_fields() {
        let now = Local.with_ymd_and_hms(2024, 2, 29, 13, 45, 7).unwrap();
        let time = system_time(now);
        assert_eq!(
            (time.wYear, time.wMonth, time.wDay, time.wHour, time.wMinute, time.wSecond),
            (2024, 2, 29, 13, 45, 7)
        );
        // 29 February 2024 was a Thursday.
        assert_eq!(time.wDayOfWeek, 4);
    }
}
