//! Raw C-ABI declarations for the subset of PDFium consumed by `pdfium-guard`.
//!
//! Nothing here is linked at build time. The entry points are resolved at
//! runtime through [`Bindings`], so this crate builds on machines without a
//! PDFium binary and callers decide where the library comes from.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(clippy::upper_case_acronyms)]

mod bindings;

pub use bindings::{Bindings, BindingsError, LIBRARY_DIR_ENV, LIBRARY_NAME};

pub use libc::{c_char, c_double, c_int, c_uchar, c_uint, c_ulong, c_ushort, c_void};

// ============================================================================
// Opaque handle targets
// ============================================================================

#[repr(C)]
pub struct fpdf_document_t__ {
    _private: [u8; 0],
}

#[repr(C)]
pub struct fpdf_page_t__ {
    _private: [u8; 0],
}

#[repr(C)]
pub struct fpdf_bitmap_t__ {
    _private: [u8; 0],
}

#[repr(C)]
pub struct fpdf_textpage_t__ {
    _private: [u8; 0],
}

#[repr(C)]
pub struct fpdf_form_handle_t__ {
    _private: [u8; 0],
}

pub type FPDF_DOCUMENT = *mut fpdf_document_t__;
pub type FPDF_PAGE = *mut fpdf_page_t__;
pub type FPDF_BITMAP = *mut fpdf_bitmap_t__;
pub type FPDF_TEXTPAGE = *mut fpdf_textpage_t__;
pub type FPDF_FORMHANDLE = *mut fpdf_form_handle_t__;

pub type FPDF_BOOL = c_int;
pub type FPDF_DWORD = c_ulong;
pub type FPDF_WCHAR = c_ushort;
pub type FPDF_BYTESTRING = *const c_char;
pub type FPDF_WIDESTRING = *const FPDF_WCHAR;
pub type FPDF_RENDERER_TYPE = c_int;

// ============================================================================
// Error codes (FPDF_GetLastError)
// ============================================================================

pub const FPDF_ERR_SUCCESS: c_ulong = 0;
pub const FPDF_ERR_UNKNOWN: c_ulong = 1;
pub const FPDF_ERR_FILE: c_ulong = 2;
pub const FPDF_ERR_FORMAT: c_ulong = 3;
pub const FPDF_ERR_PASSWORD: c_ulong = 4;
pub const FPDF_ERR_SECURITY: c_ulong = 5;
pub const FPDF_ERR_PAGE: c_ulong = 6;
// Only defined by XFA-enabled headers. The values are fixed here so hosts can
// match on them regardless of how the binary was configured.
pub const FPDF_ERR_XFALOAD: c_ulong = 7;
pub const FPDF_ERR_XFALAYOUT: c_ulong = 8;

// ============================================================================
// Bitmap formats
// ============================================================================

pub const FPDFBitmap_Unknown: c_int = 0;
pub const FPDFBitmap_Gray: c_int = 1;
pub const FPDFBitmap_BGR: c_int = 2;
pub const FPDFBitmap_BGRx: c_int = 3;
pub const FPDFBitmap_BGRA: c_int = 4;

// ============================================================================
// Render flags
// ============================================================================

pub const FPDF_ANNOT: c_int = 0x01;
pub const FPDF_LCD_TEXT: c_int = 0x02;
pub const FPDF_NO_NATIVETEXT: c_int = 0x04;
pub const FPDF_GRAYSCALE: c_int = 0x08;
pub const FPDF_DEBUG_INFO: c_int = 0x80;
pub const FPDF_NO_CATCH: c_int = 0x100;
pub const FPDF_RENDER_LIMITEDIMAGECACHE: c_int = 0x200;
pub const FPDF_RENDER_FORCEHALFTONE: c_int = 0x400;
pub const FPDF_PRINTING: c_int = 0x800;
pub const FPDF_RENDER_NO_SMOOTHTEXT: c_int = 0x1000;
pub const FPDF_RENDER_NO_SMOOTHIMAGE: c_int = 0x2000;
pub const FPDF_RENDER_NO_SMOOTHPATH: c_int = 0x4000;
pub const FPDF_REVERSE_BYTE_ORDER: c_int = 0x10;
pub const FPDF_CONVERT_FILL_TO_STROKE: c_int = 0x20;

// Progressive render status
pub const FPDF_RENDER_READY: c_int = 0;
pub const FPDF_RENDER_TOBECONTINUED: c_int = 1;
pub const FPDF_RENDER_DONE: c_int = 2;
pub const FPDF_RENDER_FAILED: c_int = 3;

// Page additional actions
pub const FPDFPAGE_AACTION_OPEN: c_int = 0;
pub const FPDFPAGE_AACTION_CLOSE: c_int = 1;

// Renderer selection in FPDF_LIBRARY_CONFIG (version >= 3)
pub const FPDF_RENDERERTYPE_AGG: FPDF_RENDERER_TYPE = 0;
pub const FPDF_RENDERERTYPE_SKIA: FPDF_RENDERER_TYPE = 1;

// Cursor types passed to FFI_SetCursor
pub const FPDF_CURSOR_ARROW: c_int = 0;
pub const FPDF_CURSOR_NESW: c_int = 1;
pub const FPDF_CURSOR_NWSE: c_int = 2;
pub const FPDF_CURSOR_VBEAM: c_int = 3;
pub const FPDF_CURSOR_HBEAM: c_int = 4;
pub const FPDF_CURSOR_HAND: c_int = 5;

// Character sets used by the system font interface
pub const FXFONT_ANSI_CHARSET: c_int = 0;
pub const FXFONT_DEFAULT_CHARSET: c_int = 1;
pub const FXFONT_SYMBOL_CHARSET: c_int = 2;
pub const FXFONT_SHIFTJIS_CHARSET: c_int = 128;
pub const FXFONT_HANGEUL_CHARSET: c_int = 129;
pub const FXFONT_GB2312_CHARSET: c_int = 134;
pub const FXFONT_CHINESEBIG5_CHARSET: c_int = 136;
pub const FXFONT_GREEK_CHARSET: c_int = 161;
pub const FXFONT_VIETNAMESE_CHARSET: c_int = 163;
pub const FXFONT_HEBREW_CHARSET: c_int = 177;
pub const FXFONT_ARABIC_CHARSET: c_int = 178;
pub const FXFONT_CYRILLIC_CHARSET: c_int = 204;
pub const FXFONT_THAI_CHARSET: c_int = 222;
pub const FXFONT_EASTERNEUROPEAN_CHARSET: c_int = 238;

// ============================================================================
// Plain structs
// ============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FS_MATRIX {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FS_RECTF {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FS_SIZEF {
    pub width: f32,
    pub height: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FPDF_SYSTEMTIME {
    pub wYear: c_ushort,
    pub wMonth: c_ushort,
    pub wDayOfWeek: c_ushort,
    pub wDay: c_ushort,
    pub wHour: c_ushort,
    pub wMinute: c_ushort,
    pub wSecond: c_ushort,
    pub wMilliseconds: c_ushort,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FPDF_LIBRARY_CONFIG {
    pub version: c_int,
    pub m_pUserFontPaths: *mut *const c_char,
    pub m_pIsolate: *mut c_void,
    pub m_v8EmbedderSlot: c_uint,
    pub m_pPlatform: *mut c_void,
    pub m_RendererType: FPDF_RENDERER_TYPE,
}

// ============================================================================
// Callback tables
// ============================================================================

/// Custom file access. `m_GetBlock` returns non-zero on success.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FPDF_FILEACCESS {
    pub m_FileLen: c_ulong,
    pub m_GetBlock: Option<
        unsafe extern "C" fn(
            param: *mut c_void,
            position: c_ulong,
            pBuf: *mut c_uchar,
            size: c_ulong,
        ) -> c_int,
    >,
    pub m_Param: *mut c_void,
}

/// Pause interface for progressive rendering.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct IFSDK_PAUSE {
    pub version: c_int,
    pub NeedToPauseNow: Option<unsafe extern "C" fn(pThis: *mut IFSDK_PAUSE) -> FPDF_BOOL>,
    pub user: *mut c_void,
}

pub type TimerCallback = Option<unsafe extern "C" fn(idEvent: c_int)>;

/// Form fill environment callbacks, version 1 layout.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FPDF_FORMFILLINFO {
    pub version: c_int,
    pub Release: Option<unsafe extern "C" fn(pThis: *mut FPDF_FORMFILLINFO)>,
    pub FFI_Invalidate: Option<
        unsafe extern "C" fn(
            pThis: *mut FPDF_FORMFILLINFO,
            page: FPDF_PAGE,
            left: c_double,
            top: c_double,
            right: c_double,
            bottom: c_double,
        ),
    >,
    pub FFI_OutputSelectedRect: Option<
        unsafe extern "C" fn(
            pThis: *mut FPDF_FORMFILLINFO,
            page: FPDF_PAGE,
            left: c_double,
            top: c_double,
            right: c_double,
            bottom: c_double,
        ),
    >,
    pub FFI_SetCursor:
        Option<unsafe extern "C" fn(pThis: *mut FPDF_FORMFILLINFO, nCursorType: c_int)>,
    pub FFI_SetTimer: Option<
        unsafe extern "C" fn(
            pThis: *mut FPDF_FORMFILLINFO,
            uElapse: c_int,
            lpTimerFunc: TimerCallback,
        ) -> c_int,
    >,
    pub FFI_KillTimer: Option<unsafe extern "C" fn(pThis: *mut FPDF_FORMFILLINFO, nTimerID: c_int)>,
    pub FFI_GetLocalTime:
        Option<unsafe extern "C" fn(pThis: *mut FPDF_FORMFILLINFO) -> FPDF_SYSTEMTIME>,
    pub FFI_OnChange: Option<unsafe extern "C" fn(pThis: *mut FPDF_FORMFILLINFO)>,
    pub FFI_GetPage: Option<
        unsafe extern "C" fn(
            pThis: *mut FPDF_FORMFILLINFO,
            document: FPDF_DOCUMENT,
            nPageIndex: c_int,
        ) -> FPDF_PAGE,
    >,
    pub FFI_GetCurrentPage: Option<
        unsafe extern "C" fn(pThis: *mut FPDF_FORMFILLINFO, document: FPDF_DOCUMENT) -> FPDF_PAGE,
    >,
    pub FFI_GetRotation:
        Option<unsafe extern "C" fn(pThis: *mut FPDF_FORMFILLINFO, page: FPDF_PAGE) -> c_int>,
    pub FFI_ExecuteNamedAction:
        Option<unsafe extern "C" fn(pThis: *mut FPDF_FORMFILLINFO, namedAction: FPDF_BYTESTRING)>,
    pub FFI_SetTextFieldFocus: Option<
        unsafe extern "C" fn(
            pThis: *mut FPDF_FORMFILLINFO,
            value: FPDF_WIDESTRING,
            valueLen: FPDF_DWORD,
            is_focus: FPDF_BOOL,
        ),
    >,
    pub FFI_DoURIAction:
        Option<unsafe extern "C" fn(pThis: *mut FPDF_FORMFILLINFO, bsURI: FPDF_BYTESTRING)>,
    pub FFI_DoGoToAction: Option<
        unsafe extern "C" fn(
            pThis: *mut FPDF_FORMFILLINFO,
            nPageIndex: c_int,
            zoomMode: c_int,
            fPosArray: *mut f32,
            sizeofArray: c_int,
        ),
    >,
    pub m_pJsPlatform: *mut c_void,
}

/// System font interface, version 1 layout.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FPDF_SYSFONTINFO {
    pub version: c_int,
    pub Release: Option<unsafe extern "C" fn(pThis: *mut FPDF_SYSFONTINFO)>,
    pub EnumFonts: Option<unsafe extern "C" fn(pThis: *mut FPDF_SYSFONTINFO, pMapper: *mut c_void)>,
    pub MapFont: Option<
        unsafe extern "C" fn(
            pThis: *mut FPDF_SYSFONTINFO,
            weight: c_int,
            bItalic: FPDF_BOOL,
            charset: c_int,
            pitch_family: c_int,
            face: *const c_char,
            bExact: *mut FPDF_BOOL,
        ) -> *mut c_void,
    >,
    pub GetFont: Option<
        unsafe extern "C" fn(pThis: *mut FPDF_SYSFONTINFO, face: *const c_char) -> *mut c_void,
    >,
    pub GetFontData: Option<
        unsafe extern "C" fn(
            pThis: *mut FPDF_SYSFONTINFO,
            hFont: *mut c_void,
            table: c_uint,
            buffer: *mut c_uchar,
            buf_size: c_ulong,
        ) -> c_ulong,
    >,
    pub GetFaceName: Option<
        unsafe extern "C" fn(
            pThis: *mut FPDF_SYSFONTINFO,
            hFont: *mut c_void,
            buffer: *mut c_char,
            buf_size: c_ulong,
        ) -> c_ulong,
    >,
    pub GetFontCharset:
        Option<unsafe extern "C" fn(pThis: *mut FPDF_SYSFONTINFO, hFont: *mut c_void) -> c_int>,
    pub DeleteFont: Option<unsafe extern "C" fn(pThis: *mut FPDF_SYSFONTINFO, hFont: *mut c_void)>,
}
