//! `FPDF_SYSFONTINFO` bridge: lets the host enumerate and serve system fonts.
//!
//! PDFium installs one font interface per process, so the bridge belongs to
//! the runtime rather than to a document. Font callbacks run on whichever
//! thread is inside a native call; their failures are kept per thread and
//! reported by the next render on that thread.

use crate::bridge::{guarded, Pinned};
use crate::engine::Engine;
use crate::error::{CallbackError, PdfError};
use pdfium_guard_sys::*;
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

pub type CallbackResult<T> = std::result::Result<T, CallbackError>;

/// Host-chosen identifier for a font it serves. Handed to PDFium as an
/// opaque pointer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FontId(NonZeroUsize);

impl FontId {
    /// `None` for zero, which PDFium reserves for "no font".
    pub fn new(id: usize) -> Option<Self> {
        NonZeroUsize::new(id).map(FontId)
    }

    pub fn get(self) -> usize {
        self.0.get()
    }

    fn to_raw(self) -> *mut c_void {
        self.0.get() as *mut c_void
    }

    fn from_raw(raw: *mut c_void) -> Option<Self> {
        Self::new(raw as usize)
    }
}

/// Character set code as used by the PDFium font interface
/// (`FXFONT_*_CHARSET`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Charset(pub i32);

impl Charset {
    pub const ANSI: Charset = Charset(FXFONT_ANSI_CHARSET);
    pub const DEFAULT: Charset = Charset(FXFONT_DEFAULT_CHARSET);
    pub const SYMBOL: Charset = Charset(FXFONT_SYMBOL_CHARSET);
    pub const SHIFT_JIS: Charset = Charset(FXFONT_SHIFTJIS_CHARSET);
    pub const HANGEUL: Charset = Charset(FXFONT_HANGEUL_CHARSET);
    pub const GB2312: Charset = Charset(FXFONT_GB2312_CHARSET);
    pub const CHINESE_BIG5: Charset = Charset(FXFONT_CHINESEBIG5_CHARSET);
    pub const GREEK: Charset = Charset(FXFONT_GREEK_CHARSET);
    pub const VIETNAMESE: Charset = Charset(FXFONT_VIETNAMESE_CHARSET);
    pub const HEBREW: Charset = Charset(FXFONT_HEBREW_CHARSET);
    pub const ARABIC: Charset = Charset(FXFONT_ARABIC_CHARSET);
    pub const CYRILLIC: Charset = Charset(FXFONT_CYRILLIC_CHARSET);
    pub const THAI: Charset = Charset(FXFONT_THAI_CHARSET);
    pub const EASTERN_EUROPEAN: Charset = Charset(FXFONT_EASTERNEUROPEAN_CHARSET);
}

/// Parameters of a `MapFont` request.
#[derive(Debug, Clone, PartialEq)]
pub struct FontRequest {
    pub weight: i32,
    pub italic: bool,
    pub charset: Charset,
    pub pitch_family: i32,
    pub face: String,
}

/// Result of a successful mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontMatch {
    pub font: FontId,
    /// Whether the face name matched exactly.
    pub exact: bool,
}

/// Sink handed to [`FontProvider::enumerate`]; each call registers one
/// installed face with PDFium's font mapper.
pub struct FontRegistry<'a> {
    engine: &'a dyn Engine,
    mapper: *mut c_void,
    added: usize,
}

impl FontRegistry<'_> {
    pub fn add(&mut self, face: &str, charset: Charset) -> CallbackResult<()> {
        let face = CString::new(face)
            .map_err(|_| CallbackError::new(format!("font face {face:?} contains NUL")))?;
        // SAFETY: `mapper` is the pointer PDFium passed to EnumFonts and is
        // only used for the duration of that callback.
        unsafe { self.engine.add_installed_font(self.mapper, face.as_ptr(), charset.0) };
        self.added += 1;
        Ok(())
    }

    pub fn added(&self) -> usize {
        self.added
    }
}

/// Host-side font source. Every method may fail; failures are reported as
/// [`PdfError::Callback`] after the native call returns.
pub trait FontProvider: Send {
    /// Register every installed face.
    fn enumerate(&mut self, registry: &mut FontRegistry<'_>) -> CallbackResult<()>;

    fn map_font(&mut self, request: &FontRequest) -> CallbackResult<Option<FontMatch>>;

    fn font_by_face(&mut self, face: &str) -> CallbackResult<Option<FontId>> {
        let _ = face;
        Ok(None)
    }

    /// Raw font data; `table` is a TrueType table tag or 0 for the whole file.
    fn font_data(&mut self, font: FontId, table: u32) -> CallbackResult<Option<Vec<u8>>>;

    fn face_name(&mut self, font: FontId) -> CallbackResult<Option<String>>;

    fn charset(&mut self, font: FontId) -> CallbackResult<Charset> {
        let _ = font;
        Ok(Charset::DEFAULT)
    }

    fn release(&mut self, font: FontId) {
        let _ = font;
    }
}

thread_local! {
    static PENDING: RefCell<Option<CallbackError>> = const { RefCell::new(None) };
}

fn record_pending(err: CallbackError) {
    PENDING.with(|slot| {
        if let Ok(mut slot) = slot.try_borrow_mut() {
            if slot.is_none() {
                *slot = Some(err);
            }
        }
    });
}

/// Font callback failure recorded on this thread since the last call.
pub(crate) fn take_pending_error() -> Option<PdfError> {
    PENDING
        .with(|slot| slot.try_borrow_mut().ok().and_then(|mut s| s.take()))
        .map(PdfError::Callback)
}

struct ProviderState {
    provider: Box<dyn FontProvider>,
    // GetFontData is called twice: once for the size, once to copy.
    cached: Option<(FontId, u32, Vec<u8>)>,
}

#[repr(C)]
struct FontRecord {
    sys: FPDF_SYSFONTINFO,
    engine: Arc<dyn Engine>,
    state: Mutex<ProviderState>,
}

/// Installed font interface. Kept alive until the runtime shuts down.
pub(crate) struct FontBridge {
    record: Pinned<FontRecord>,
}

// SAFETY: the record is only touched through `&FontRecord`; the provider sits
// behind a Mutex and `FontProvider: Send`. The engine is `Send + Sync`.
unsafe impl Send for FontBridge {}

impl FontBridge {
    pub(crate) fn new(engine: Arc<dyn Engine>, provider: Box<dyn FontProvider>) -> Self {
        let record = Pinned::new(FontRecord {
            sys: FPDF_SYSFONTINFO {
                version: 1,
                Release: None,
                EnumFonts: Some(enum_fonts),
                MapFont: Some(map_font),
                GetFont: Some(get_font),
                GetFontData: Some(get_font_data),
                GetFaceName: Some(get_face_name),
                GetFontCharset: Some(get_font_charset),
                DeleteFont: Some(delete_font),
            },
            engine,
            state: Mutex::new(ProviderState {
                provider,
                cached: None,
            }),
        });
        Self { record }
    }

    pub(crate) fn as_sys_ptr(&self) -> *mut FPDF_SYSFONTINFO {
        self.record.as_ptr().cast()
    }
}

unsafe fn record<'a>(this: *mut FPDF_SYSFONTINFO) -> &'a FontRecord {
    // SAFETY: PDFium passes back the pointer installed by the runtime; the
    // bridge outlives the library.
    &*(this as *const FontRecord)
}

fn with_provider<T>(
    record: &FontRecord,
    f: impl FnOnce(&mut ProviderState) -> CallbackResult<T>,
) -> CallbackResult<T> {
    let mut state = record.state.lock().unwrap_or_else(|e| e.into_inner());
    f(&mut state)
}

unsafe fn c_str_arg(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

unsafe extern "C" fn enum_fonts(this: *mut FPDF_SYSFONTINFO, mapper: *mut c_void) {
    let record = record(this);
    guarded("EnumFonts", (), record_pending, || {
        with_provider(record, |state| {
            let mut registry = FontRegistry {
                engine: &*record.engine,
                mapper,
                added: 0,
            };
            state.provider.enumerate(&mut registry)?;
            tracing::debug!("Registered {} system fonts", registry.added());
            Ok(())
        })
    })
}

unsafe extern "C" fn map_font(
    this: *mut FPDF_SYSFONTINFO,
    weight: c_int,
    italic: FPDF_BOOL,
    charset: c_int,
    pitch_family: c_int,
    face: *const c_char,
    exact: *mut FPDF_BOOL,
) -> *mut c_void {
    let record = record(this);
    let request = FontRequest {
        weight,
        italic: italic != 0,
        charset: Charset(charset),
        pitch_family,
        face: c_str_arg(face),
    };
    guarded("MapFont", std::ptr::null_mut(), record_pending, || {
        let found = with_provider(record, |state| state.provider.map_font(&request))?;
        Ok(match found {
            Some(found) => {
                if !exact.is_null() {
                    *exact = FPDF_BOOL::from(found.exact);
                }
                found.font.to_raw()
            }
            None => std::ptr::null_mut(),
        })
    })
}

unsafe extern "C" fn get_font(this: *mut FPDF_SYSFONTINFO, face: *const c_char) -> *mut c_void {
    let record = record(this);
    let face = c_str_arg(face);
    guarded("GetFont", std::ptr::null_mut(), record_pending, || {
        let found = with_provider(record, |state| state.provider.font_by_face(&face))?;
        Ok(found.map_or(std::ptr::null_mut(), FontId::to_raw))
    })
}

unsafe extern "C" fn get_font_data(
    this: *mut FPDF_SYSFONTINFO,
    font: *mut c_void,
    table: c_uint,
    buffer: *mut c_uchar,
    buf_size: c_ulong,
) -> c_ulong {
    let record = record(this);
    let Some(font) = FontId::from_raw(font) else {
        return 0;
    };
    guarded("GetFontData", 0, record_pending, || {
        with_provider(record, |state| {
            let hit = matches!(&state.cached, Some((f, t, _)) if *f == font && *t == table);
            if !hit {
                let data = state.provider.font_data(font, table)?.unwrap_or_default();
                state.cached = Some((font, table, data));
            }
            let data = match &state.cached {
                Some((_, _, data)) => data.as_slice(),
                None => &[],
            };
            let len = c_ulong::try_from(data.len())
                .map_err(|_| CallbackError::new("font data exceeds native size range"))?;
            if !buffer.is_null() && buf_size >= len {
                std::ptr::copy_nonoverlapping(data.as_ptr(), buffer, data.len());
                state.cached = None;
            }
            Ok(len)
        })
    })
}

unsafe extern "C" fn get_face_name(
    this: *mut FPDF_SYSFONTINFO,
    font: *mut c_void,
    buffer: *mut c_char,
    buf_size: c_ulong,
) -> c_ulong {
    let record = record(this);
    let Some(font) = FontId::from_raw(font) else {
        return 0;
    };
    guarded("GetFaceName", 0, record_pending, || {
        let Some(name) = with_provider(record, |state| state.provider.face_name(font))? else {
            return Ok(0);
        };
        let name = CString::new(name).map_err(|_| CallbackError::new("face name contains NUL"))?;
        let bytes = name.as_bytes_with_nul();
        let len = c_ulong::try_from(bytes.len())
            .map_err(|_| CallbackError::new("face name exceeds native size range"))?;
        if !buffer.is_null() && buf_size >= len {
            std::ptr::copy_nonoverlapping(bytes.as_ptr().cast::<c_char>(), buffer, bytes.len());
        }
        Ok(len)
    })
}

unsafe extern "C" fn get_font_charset(this: *mut FPDF_SYSFONTINFO, font: *mut c_void) -> c_int {
    let record = record(this);
    let Some(font) = FontId::from_raw(font) else {
        return FXFONT_DEFAULT_CHARSET;
    };
    guarded("GetFontCharset", FXFONT_DEFAULT_CHARSET, record_pending, || {
        with_provider(record, |state| state.provider.charset(font)).map(|c| c.0)
    })
}

unsafe extern "C" fn delete_font(this: *mut FPDF_SYSFONTINFO, font: *mut c_void) {
    let record = record(this);
    let Some(font) = FontId::from_raw(font) else {
        return;
    };
    guarded("DeleteFont", (), record_pending, || {
        with_provider(record, |state| {
            if matches!(&state.cached, Some((f, _, _)) if *f == font) {
                state.cached = None;
            }
            state.provider.release(font);
            Ok(())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEngine;

    struct OneFont {
        data_calls: usize,
    }

    impl FontProvider for OneFont {
        fn enumerate(&mut self, registry: &mut FontRegistry<'_>) -> CallbackResult<()> {
            registry.add("Test Sans", Charset::ANSI)?;
            registry.add("Test Mono", Charset::CYRILLIC)
        }

        fn map_font(&mut self, request: &FontRequest) -> CallbackResult<Option<FontMatch>> {
            Ok((request.face == "Test Sans").then(|| FontMatch {
                font: FontId::new(1).unwrap(),
                exact: true,
            }))
        }

        fn font_data(&mut self, _font: FontId, _table: u32) -> CallbackResult<Option<Vec<u8>>> {
            self.data_calls += 1;
            Ok(Some(vec![1, 2, 3, 4, 5]))
        }

        fn face_name(&mut self, _font: FontId) -> CallbackResult<Option<String>> {
            Ok(Some("Test Sans".to_string()))
        }
    }

    fn bridge(engine: &Arc<MockEngine>) -> FontBridge {
        let engine: Arc<dyn Engine> = engine.clone();
        FontBridge::new(engine, Box::new(OneFont { data_calls: 0 }))
    }

    #[test]
    fn test_enumerate_registers_faces_with_engine() {
        let engine = MockEngine::new();
        let bridge = bridge(&engine);
        let sys = bridge.as_sys_ptr();
        unsafe { ((*sys).EnumFonts.unwrap())(sys, 0x10 as *mut c_void) };

        assert_eq!(
            engine.installed_fonts(),
            vec![
                ("Test Sans".to_string(), FXFONT_ANSI_CHARSET),
                ("Test Mono".to_string(), FXFONT_CYRILLIC_CHARSET)
            ]
        );
        assert!(take_pending_error().is_none());
    }

    #[test]
    fn test_map_font_and_size_then_copy_protocol() {
        let engine = MockEngine::new();
        let bridge = bridge(&engine);
        let sys = bridge.as_sys_ptr();
        let face = CString::new("Test Sans").unwrap();
        let mut exact: FPDF_BOOL = 0;

        unsafe {
            let font = ((*sys).MapFont.unwrap())(sys, 400, 0, 0, 0, face.as_ptr(), &mut exact);
            assert_eq!(font as usize, 1);
            assert_eq!(exact, 1);

            let get = (*sys).GetFontData.unwrap();
            let len = get(sys, font, 0, std::ptr::null_mut(), 0);
            assert_eq!(len, 5);
            let mut buf = vec![0u8; len as usize];
            assert_eq!(get(sys, font, 0, buf.as_mut_ptr(), len), 5);
            assert_eq!(buf, vec![1, 2, 3, 4, 5]);

            let mut name = [0 as c_char; 32];
            let n = ((*sys).GetFaceName.unwrap())(sys, font, name.as_mut_ptr(), 32);
            assert_eq!(n as usize, "Test Sans".len() + 1);
            assert_eq!(CStr::from_ptr(name.as_ptr()).to_str().unwrap(), "Test Sans");
        }

        let state = bridge.record.get().state.lock().unwrap();
        assert!(state.cached.is_none());
    }

    #[test]
    fn test_unknown_face_maps_to_null() {
        let engine = MockEngine::new();
        let bridge = bridge(&engine);
        let sys = bridge.as_sys_ptr();
        let face = CString::new("Missing").unwrap();
        let font = unsafe {
            ((*sys).MapFont.unwrap())(sys, 400, 0, 0, 0, face.as_ptr(), std::ptr::null_mut())
        };
        assert!(font.is_null());
    }

    #[test]
    fn test_provider_panic_is_pending_on_thread() {
        struct Broken;
        impl FontProvider for Broken {
            fn enumerate(&mut self, _: &mut FontRegistry<'_>) -> CallbackResult<()> {
                panic!("font directory vanished")
            }
            fn map_font(&mut self, _: &FontRequest) -> CallbackResult<Option<FontMatch>> {
                Err(CallbackError::new("unused"))
            }
            fn font_data(&mut self, _: FontId, _: u32) -> CallbackResult<Option<Vec<u8>>> {
                Ok(None)
            }
            fn face_name(&mut self, _: FontId) -> CallbackResult<Option<String>> {
                Ok(None)
            }
        }

        let engine: Arc<dyn Engine> = MockEngine::new();
        let bridge = FontBridge::new(engine, Box::new(Broken));
        let sys = bridge.as_sys_ptr();
        unsafe { ((*sys).EnumFonts.unwrap())(sys, std::ptr::null_mut()) };

        match take_pending_error() {
            Some(PdfError::Callback(err)) => {
                assert!(err.is_panic());
                assert_eq!(err.callback(), "EnumFonts");
            }
            other => panic!("Expected pending font error, got {:?}", other),
        }
        assert!(take_pending_error().is_none());
    }
}
