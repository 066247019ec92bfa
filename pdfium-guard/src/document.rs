//! Document sessions.
//!
//! A [`DocumentSession`] owns one native document together with everything
//! that must outlive it: the document bytes or the stream bridge, the form
//! environment, every loaded page and text page, and a runtime reference.
//! Pages and form environments handed to the caller are tokens into the
//! session's registry, so teardown order is decided here and nowhere else.

use crate::cancel::CancelFlag;
use crate::engine::Engine;
use crate::error::{ErrorCode, PdfError, Result};
use crate::form::{FormConfig, FormEnvironment, FormState};
use crate::handle::{kind, OpaqueHandle};
use crate::page::{Page, PageSize};
use crate::runtime::Runtime;
use crate::stream::StreamAccess;
use crate::text::utf16le_to_string;
use pdfium_guard_sys::{c_int, FPDF_PAGE, FS_SIZEF};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ffi::{CStr, CString};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, warn};

/// How to open a document.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    password: Option<String>,
    cancel: Option<CancelFlag>,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Checked before the open and, for streams, on every read for the
    /// whole life of the session.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    fn from_password(password: Option<&str>) -> Self {
        Self {
            password: password.map(str::to_string),
            cancel: None,
        }
    }

    /// An empty password counts as none.
    fn password_supplied(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    fn password_cstring(&self) -> Result<Option<CString>> {
        self.password
            .as_deref()
            .map(|p| {
                CString::new(p)
                    .map_err(|_| PdfError::InvalidData("password contains NUL".to_string()))
            })
            .transpose()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }
}

/// PDF file version from the document header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Pdf1_0,
    Pdf1_1,
    Pdf1_2,
    Pdf1_3,
    Pdf1_4,
    Pdf1_5,
    Pdf1_6,
    Pdf1_7,
    Pdf2_0,
    /// PDFium reported no version, as for documents without a header.
    Unset,
    /// A version number outside the known range, as `major * 10 + minor`.
    Other(i32),
}

impl Version {
    fn from_raw(raw: c_int) -> Self {
        match raw {
            10 => Version::Pdf1_0,
            11 => Version::Pdf1_1,
            12 => Version::Pdf1_2,
            13 => Version::Pdf1_3,
            14 => Version::Pdf1_4,
            15 => Version::Pdf1_5,
            16 => Version::Pdf1_6,
            17 => Version::Pdf1_7,
            20 => Version::Pdf2_0,
            other => Version::Other(other),
        }
    }
}

/// Document information dictionary keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataTag {
    Title,
    Author,
    Subject,
    Keywords,
    Creator,
    Producer,
    CreationDate,
    ModificationDate,
}

impl MetadataTag {
    fn as_cstr(self) -> &'static CStr {
        match self {
            MetadataTag::Title => c"Title",
            MetadataTag::Author => c"Author",
            MetadataTag::Subject => c"Subject",
            MetadataTag::Keywords => c"Keywords",
            MetadataTag::Creator => c"Creator",
            MetadataTag::Producer => c"Producer",
            MetadataTag::CreationDate => c"CreationDate",
            MetadataTag::ModificationDate => c"ModDate",
        }
    }
}

// ============================================================================
// Session state
// ============================================================================

/// Where PDFium reads the document from. Must stay alive until the native
/// document is closed.
enum Backing {
    Bytes(Box<[u8]>),
    Stream(StreamAccess),
    Released,
}

pub(crate) struct PageEntry {
    pub(crate) handle: OpaqueHandle<kind::Page>,
    pub(crate) index: usize,
    /// `FORM_OnAfterLoadPage` ran, so the close path must notify the form.
    pub(crate) form_notified: bool,
}

pub(crate) struct TextPageEntry {
    pub(crate) page: u64,
    pub(crate) handle: OpaqueHandle<kind::TextPage>,
}

/// Registry shared by a session and its tokens.
///
/// Fields are declared in teardown order, so dropping the state without an
/// explicit close still releases dependents first.
pub(crate) struct SessionState {
    pub(crate) text_pages: BTreeMap<u64, TextPageEntry>,
    pub(crate) pages: BTreeMap<u64, PageEntry>,
    pub(crate) form: Option<FormState>,
    pub(crate) document: OpaqueHandle<kind::Document>,
    backing: Backing,
    runtime: Option<Runtime>,
    next_id: u64,
    closed: bool,
}

impl SessionState {
    pub(crate) fn engine(&self) -> &Arc<dyn Engine> {
        self.document.engine()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn page_count(&self) -> usize {
        match self.document.borrow() {
            // SAFETY: the document is live while borrowed.
            Ok(doc) => unsafe { self.engine().get_page_count(doc.as_ptr()) }.max(0) as usize,
            Err(_) => 0,
        }
    }

    /// Failure raised by a host callback during the last native call.
    pub(crate) fn take_callback_error(&self) -> Option<PdfError> {
        let stream = match &self.backing {
            Backing::Stream(access) => access.take_error(),
            _ => None,
        };
        stream.or_else(crate::font::take_pending_error)
    }

    /// Close one page: its text pages, then the form notification, then
    /// the native page.
    pub(crate) fn close_page(&mut self, id: u64) -> Result<()> {
        let Some(mut entry) = self.pages.remove(&id) else {
            return Err(PdfError::InvalidHandle { kind: "page" });
        };
        let mut first = self.close_text_pages_of(id).err();

        if entry.form_notified {
            if let (Some(form), Ok(raw)) = (&self.form, entry.handle.borrow()) {
                if let Err(err) = form.notify_page_closed(raw.as_ptr()) {
                    first.get_or_insert(err);
                }
            }
        }
        if let Err(err) = entry.handle.destroy() {
            first.get_or_insert(err);
        }
        debug!("Closed page {}", entry.index);
        first.map_or(Ok(()), Err)
    }

    fn close_text_pages_of(&mut self, page: u64) -> Result<()> {
        let ids: Vec<u64> = self
            .text_pages
            .iter()
            .filter(|(_, entry)| entry.page == page)
            .map(|(&id, _)| id)
            .collect();
        let mut first = None;
        for id in ids {
            if let Some(mut entry) = self.text_pages.remove(&id) {
                if let Err(err) = entry.handle.destroy() {
                    first.get_or_insert(err);
                }
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Release everything in dependency order. Idempotent; always runs to
    /// the end and reports the first failure.
    fn teardown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut first: Option<PdfError> = None;

        if !self.pages.is_empty() {
            debug!("Invalidating {} outstanding pages", self.pages.len());
        }
        let ids: Vec<u64> = self.pages.keys().copied().collect();
        for id in ids {
            if let Err(err) = self.close_page(id) {
                first.get_or_insert(err);
            }
        }
        for (_, mut entry) in std::mem::take(&mut self.text_pages) {
            if let Err(err) = entry.handle.destroy() {
                first.get_or_insert(err);
            }
        }
        if let Some(form) = self.form.take() {
            if let Err(err) = form.close() {
                first.get_or_insert(err);
            }
        }
        if let Err(err) = self.document.destroy() {
            first.get_or_insert(err);
        }
        self.backing = Backing::Released;
        // Last: the engine must stay initialized until the document is gone.
        self.runtime = None;

        debug!("Closed document session");
        first.map_or(Ok(()), Err)
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            warn!("Error while tearing down document session: {}", err);
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// An open PDF document.
///
/// Confined to the thread that opened it. Every page, text iterator, and
/// form environment obtained from the session is invalidated when it
/// closes.
///
/// # Example
///
/// ```no_run
/// use pdfium_guard::{DocumentSession, PixelFormat, RenderFlags, RenderTarget, Runtime, Transform};
///
/// let runtime = Runtime::acquire()?;
/// let session = DocumentSession::open_from_file(&runtime, "report.pdf", None)?;
/// let page = session.load_page(0)?;
/// let size = page.size()?;
///
/// let (width, height) = (size.width as u32, size.height as u32);
/// let target = RenderTarget::new(&runtime, width, height, PixelFormat::Bgra)?;
/// page.render(&target, &Transform::identity(), RenderFlags::ANNOTATIONS)?;
/// target.save_as_png("page-0.png")?;
/// # Ok::<(), pdfium_guard::PdfError>(())
/// ```
pub struct DocumentSession {
    state: Rc<RefCell<SessionState>>,
}

impl DocumentSession {
    /// Open a document held in memory. The bytes are kept for the session's
    /// life; PDFium reads pages from them lazily.
    pub fn open_from_bytes(
        runtime: &Runtime,
        bytes: impl Into<Vec<u8>>,
        password: Option<&str>,
    ) -> Result<Self> {
        Self::open_from_bytes_with(runtime, bytes, &OpenOptions::from_password(password))
    }

    pub fn open_from_bytes_with(
        runtime: &Runtime,
        bytes: impl Into<Vec<u8>>,
        options: &OpenOptions,
    ) -> Result<Self> {
        let bytes: Box<[u8]> = bytes.into().into_boxed_slice();
        if options.is_cancelled() {
            return Err(PdfError::Cancelled);
        }
        let password = options.password_cstring()?;
        let engine = runtime.engine().clone();

        // SAFETY: `bytes` moves into the session below and outlives the
        // document.
        let raw = unsafe {
            engine.load_mem_document64(
                bytes.as_ptr().cast(),
                bytes.len(),
                password.as_ref().map_or(std::ptr::null(), |p| p.as_ptr()),
            )
        };
        let document = unsafe { OpaqueHandle::wrap(engine.clone(), raw) }
            .ok_or_else(|| open_failure(&*engine, options))?;

        debug!("Opened document from {} bytes", bytes.len());
        Ok(Self::from_parts(runtime, document, Backing::Bytes(bytes)))
    }

    /// Open a document read through `reader`. The reader is kept for the
    /// session's life and consulted on every lazy page load.
    pub fn open_from_stream<R>(runtime: &Runtime, reader: R, password: Option<&str>) -> Result<Self>
    where
        R: Read + Seek + 'static,
    {
        Self::open_from_stream_with(runtime, reader, &OpenOptions::from_password(password))
    }

    pub fn open_from_stream_with<R>(
        runtime: &Runtime,
        reader: R,
        options: &OpenOptions,
    ) -> Result<Self>
    where
        R: Read + Seek + 'static,
    {
        let access = StreamAccess::new(reader, options.cancel.clone())?;
        if options.is_cancelled() {
            return Err(PdfError::Cancelled);
        }
        let password = options.password_cstring()?;
        let engine = runtime.engine().clone();

        // SAFETY: `access` moves into the session and outlives the document.
        let raw = unsafe {
            engine.load_custom_document(
                access.as_sys_ptr(),
                password.as_ref().map_or(std::ptr::null(), |p| p.as_ptr()),
            )
        };
        let document = unsafe { OpaqueHandle::<kind::Document>::wrap(engine.clone(), raw) };
        if let Some(err) = access.take_error() {
            // Close a document PDFium opened anyway before the reader goes.
            drop(document);
            return Err(err);
        }
        let document = document.ok_or_else(|| open_failure(&*engine, options))?;

        debug!("Opened document from {} byte stream", access.len());
        Ok(Self::from_parts(runtime, document, Backing::Stream(access)))
    }

    pub fn open_from_file(
        runtime: &Runtime,
        path: impl AsRef<Path>,
        password: Option<&str>,
    ) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PdfError::FileNotFound(path.display().to_string()));
        }
        let file = File::open(path)?;
        Self::open_from_stream(runtime, BufReader::new(file), password)
    }

    fn from_parts(
        runtime: &Runtime,
        document: OpaqueHandle<kind::Document>,
        backing: Backing,
    ) -> Self {
        Self {
            state: Rc::new(RefCell::new(SessionState {
                text_pages: BTreeMap::new(),
                pages: BTreeMap::new(),
                form: None,
                document,
                backing,
                runtime: Some(runtime.clone()),
                next_id: 0,
                closed: false,
            })),
        }
    }

    /// Page count, or 0 once the session is closed.
    pub fn page_count(&self) -> usize {
        self.state.borrow().page_count()
    }

    /// Size of page `index` without loading it.
    pub fn page_size(&self, index: usize) -> Result<PageSize> {
        let state = self.state.borrow();
        let count = state.page_count();
        if index >= count {
            return Err(PdfError::PageIndexOutOfRange { index, count });
        }
        let doc = state.document.borrow()?.as_ptr();
        let mut size = FS_SIZEF::default();
        // SAFETY: `doc` is live, `index` came from a c_int count and `size`
        // is a valid out-pointer.
        let ok = unsafe { state.engine().get_page_size_by_index(doc, index as c_int, &mut size) };
        if ok == 0 {
            return Err(PdfError::PageLoadFailed { index });
        }
        Ok(PageSize {
            width: size.width,
            height: size.height,
        })
    }

    /// The page's label (`"iv"`, `"A-3"`), if the document defines one.
    pub fn page_label(&self, index: usize) -> Result<Option<String>> {
        let state = self.state.borrow();
        let count = state.page_count();
        if index >= count {
            return Err(PdfError::PageIndexOutOfRange { index, count });
        }
        let doc = state.document.borrow()?.as_ptr();
        let engine = state.engine();
        let index = index as c_int;

        // SAFETY: as in `metadata`.
        let len = unsafe { engine.get_page_label(doc, index, std::ptr::null_mut(), 0) };
        if len <= 2 {
            return Ok(None);
        }
        let mut buf = vec![0u8; len as usize];
        let copied = unsafe { engine.get_page_label(doc, index, buf.as_mut_ptr().cast(), len) };
        buf.truncate((copied as usize).min(buf.len()));

        let label = utf16le_to_string(&buf);
        Ok((!label.is_empty()).then_some(label))
    }

    pub fn load_page(&self, index: usize) -> Result<Page> {
        let mut state = self.state.borrow_mut();
        let count = state.page_count();
        if index >= count {
            return Err(PdfError::PageIndexOutOfRange { index, count });
        }
        let engine = state.engine().clone();
        let doc = state.document.borrow()?.as_ptr();

        // SAFETY: `doc` is live; `index` is in range and fits a c_int
        // because the count came from one.
        let raw = unsafe { engine.load_page(doc, index as c_int) };
        let handle = unsafe { OpaqueHandle::<kind::Page>::wrap(engine.clone(), raw) };
        if let Some(err) = state.take_callback_error() {
            drop(handle);
            return Err(err);
        }
        let handle = handle.ok_or(PdfError::PageLoadFailed { index })?;

        let id = state.next_id();
        let form_notified = state.form.is_some();
        state.pages.insert(
            id,
            PageEntry {
                handle,
                index,
                form_notified,
            },
        );
        let opened = match &state.form {
            Some(form) => form.notify_page_opened(raw, index),
            None => Ok(()),
        };
        if let Err(err) = opened {
            let _ = state.close_page(id);
            return Err(err);
        }
        debug!("Loaded page {}", index);
        Ok(Page::new(self.state.clone(), id, index))
    }

    /// Attach the form-fill environment. Pages already loaded are
    /// registered with it.
    pub fn attach_form_environment(&self, config: FormConfig) -> Result<FormEnvironment> {
        let mut state = self.state.borrow_mut();
        if state.form.is_some() {
            return Err(PdfError::FormAlreadyAttached);
        }
        let engine = state.engine().clone();
        let doc = state.document.borrow()?.as_ptr();
        let id = state.next_id();
        let form = FormState::attach(&engine, doc, config, id)?;

        let open: Vec<(u64, FPDF_PAGE, usize)> = state
            .pages
            .iter()
            .filter_map(|(&page_id, entry)| {
                entry
                    .handle
                    .borrow()
                    .ok()
                    .map(|raw| (page_id, raw.as_ptr(), entry.index))
            })
            .collect();
        let mut opened = Vec::with_capacity(open.len());
        for (page_id, raw, index) in open {
            // A page the form saw even partially needs its close notification.
            opened.push((page_id, raw));
            if let Err(err) = form.notify_page_opened(raw, index) {
                for &(_, raw) in opened.iter().rev() {
                    if let Err(close_err) = form.notify_page_closed(raw) {
                        warn!("Error while closing page under a failed form: {}", close_err);
                    }
                }
                if let Err(close_err) = form.close() {
                    warn!("Error while exiting a failed form environment: {}", close_err);
                }
                return Err(err);
            }
        }

        let state = &mut *state;
        for (page_id, _) in opened {
            if let Some(entry) = state.pages.get_mut(&page_id) {
                entry.form_notified = true;
            }
        }
        state.form = Some(form);

        debug!("Attached form environment");
        Ok(FormEnvironment::new(self.state.clone(), id))
    }

    pub fn has_form_environment(&self) -> bool {
        self.state.borrow().form.is_some()
    }

    /// Number of pages loaded and not yet closed.
    pub fn open_page_count(&self) -> usize {
        self.state.borrow().pages.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    pub fn version(&self) -> Result<Version> {
        let state = self.state.borrow();
        let doc = state.document.borrow()?.as_ptr();
        let mut raw: c_int = 0;
        // SAFETY: `doc` is live and `raw` is a valid out-pointer.
        let ok = unsafe { state.engine().get_file_version(doc, &mut raw) };
        Ok(if ok == 0 {
            Version::Unset
        } else {
            Version::from_raw(raw)
        })
    }

    /// Value of an information dictionary entry; `None` when absent or
    /// empty.
    pub fn metadata(&self, tag: MetadataTag) -> Result<Option<String>> {
        let state = self.state.borrow();
        let doc = state.document.borrow()?.as_ptr();
        let engine = state.engine();
        let tag = tag.as_cstr();

        // SAFETY: size query with a null buffer, then a copy into a buffer
        // of exactly the reported size.
        let len = unsafe { engine.get_meta_text(doc, tag.as_ptr(), std::ptr::null_mut(), 0) };
        if len <= 2 {
            return Ok(None);
        }
        let mut buf = vec![0u8; len as usize];
        let copied =
            unsafe { engine.get_meta_text(doc, tag.as_ptr(), buf.as_mut_ptr().cast(), len) };
        buf.truncate((copied as usize).min(buf.len()));

        let text = utf16le_to_string(&buf);
        Ok((!text.is_empty()).then_some(text))
    }

    /// Close the session, invalidating any pages still open.
    ///
    /// Teardown always completes; the first failure is returned.
    pub fn close(self) -> Result<()> {
        let result = self.state.borrow_mut().teardown();
        result
    }

    /// Close only if no pages are open. On refusal the session is handed
    /// back unchanged.
    pub fn close_strict(self) -> std::result::Result<(), CloseError> {
        let open = self.open_page_count();
        if open > 0 {
            return Err(CloseError {
                session: Some(self),
                error: PdfError::OutstandingPages { count: open },
            });
        }
        self.close().map_err(|error| {
            warn!("Strict close completed with error: {}", error);
            CloseError::detached(error)
        })
    }
}

impl Drop for DocumentSession {
    fn drop(&mut self) {
        match self.state.try_borrow_mut() {
            Ok(mut state) => {
                if let Err(err) = state.teardown() {
                    warn!("Error while closing document: {}", err);
                }
            }
            // The state tears itself down once the last token lets go.
            Err(_) => warn!("Document session dropped while in use"),
        }
    }
}

impl fmt::Debug for DocumentSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("DocumentSession");
        match self.state.try_borrow() {
            Ok(state) => s
                .field("closed", &state.closed)
                .field("open_pages", &state.pages.len())
                .field("form", &state.form.is_some())
                .finish(),
            Err(_) => s.finish_non_exhaustive(),
        }
    }
}

/// Failed strict close.
#[derive(Debug)]
pub struct CloseError {
    session: Option<DocumentSession>,
    error: PdfError,
}

impl CloseError {
    fn detached(error: PdfError) -> Self {
        Self {
            session: None,
            error,
        }
    }

    pub fn error(&self) -> &PdfError {
        &self.error
    }

    /// The session, when the close was refused before teardown started.
    pub fn into_session(self) -> Option<DocumentSession> {
        self.session
    }

    pub fn into_error(self) -> PdfError {
        self.error
    }
}

impl fmt::Display for CloseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for CloseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

impl From<CloseError> for PdfError {
    fn from(err: CloseError) -> Self {
        err.error
    }
}

fn open_failure(engine: &dyn Engine, options: &OpenOptions) -> PdfError {
    // SAFETY: plain query of the thread's last error.
    let code = ErrorCode::from_raw(unsafe { engine.get_last_error() });
    let err = PdfError::from_open_failure(code, options.password_supplied());
    debug!("Document open failed: {}", err);
    err
}
