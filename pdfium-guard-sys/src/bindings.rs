//! Runtime-resolved PDFium entry points.

use crate::*;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable naming a directory that contains the PDFium library.
pub const LIBRARY_DIR_ENV: &str = "PDFIUM_LIB_DIR";

#[cfg(all(target_family = "unix", not(target_os = "macos")))]
pub const LIBRARY_NAME: &str = "libpdfium.so";

#[cfg(target_os = "macos")]
pub const LIBRARY_NAME: &str = "libpdfium.dylib";

#[cfg(target_os = "windows")]
pub const LIBRARY_NAME: &str = "pdfium.dll";

/// Failure to open the library or resolve one of its symbols.
#[derive(Debug)]
pub struct BindingsError {
    path: PathBuf,
    source: libloading::Error,
}

impl BindingsError {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for BindingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.source)
    }
}

impl std::error::Error for BindingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

macro_rules! bindings {
    ($( $name:ident : fn( $($arg:ident : $ty:ty),* $(,)? ) $(-> $ret:ty)? ; )*) => {
        /// Function table resolved from a loaded PDFium library.
        ///
        /// The pointers stay valid as long as the table is alive because the
        /// table owns the library.
        pub struct Bindings {
            $( pub $name: unsafe extern "C" fn($($ty),*) $(-> $ret)?, )*
            _library: libloading::Library,
        }

        impl Bindings {
            /// Resolve every entry point from an already opened library.
            ///
            /// # Safety
            ///
            /// `library` must be a PDFium build whose exports match the
            /// declared signatures.
            pub unsafe fn from_library(library: libloading::Library) -> Result<Self, libloading::Error> {
                $(
                    let $name = *library.get::<unsafe extern "C" fn($($ty),*) $(-> $ret)?>(
                        concat!(stringify!($name), "\0").as_bytes(),
                    )?;
                )*
                Ok(Self { $( $name, )* _library: library })
            }
        }
    };
}

bindings! {
    FPDF_InitLibraryWithConfig: fn(config: *const FPDF_LIBRARY_CONFIG);
    FPDF_DestroyLibrary: fn();
    FPDF_GetLastError: fn() -> c_ulong;
    FPDF_SetSystemFontInfo: fn(font_info: *mut FPDF_SYSFONTINFO);
    FPDF_AddInstalledFont: fn(mapper: *mut c_void, face: *const c_char, charset: c_int);

    FPDF_LoadMemDocument64: fn(data_buf: *const c_void, size: usize, password: FPDF_BYTESTRING) -> FPDF_DOCUMENT;
    FPDF_LoadCustomDocument: fn(file_access: *mut FPDF_FILEACCESS, password: FPDF_BYTESTRING) -> FPDF_DOCUMENT;
    FPDF_CloseDocument: fn(document: FPDF_DOCUMENT);
    FPDF_GetPageCount: fn(document: FPDF_DOCUMENT) -> c_int;
    FPDF_GetFileVersion: fn(document: FPDF_DOCUMENT, file_version: *mut c_int) -> FPDF_BOOL;
    FPDF_GetMetaText: fn(document: FPDF_DOCUMENT, tag: FPDF_BYTESTRING, buffer: *mut c_void, buflen: c_ulong) -> c_ulong;

    FPDF_LoadPage: fn(document: FPDF_DOCUMENT, page_index: c_int) -> FPDF_PAGE;
    FPDF_ClosePage: fn(page: FPDF_PAGE);
    FPDF_GetPageWidthF: fn(page: FPDF_PAGE) -> f32;
    FPDF_GetPageHeightF: fn(page: FPDF_PAGE) -> f32;
    FPDF_GetPageSizeByIndexF: fn(document: FPDF_DOCUMENT, page_index: c_int, size: *mut FS_SIZEF) -> FPDF_BOOL;
    FPDF_GetPageLabel: fn(document: FPDF_DOCUMENT, page_index: c_int, buffer: *mut c_void, buflen: c_ulong) -> c_ulong;
    FPDF_GetPageBoundingBox: fn(page: FPDF_PAGE, rect: *mut FS_RECTF) -> FPDF_BOOL;
    FPDF_DeviceToPage: fn(page: FPDF_PAGE, start_x: c_int, start_y: c_int, size_x: c_int, size_y: c_int, rotate: c_int, device_x: c_int, device_y: c_int, page_x: *mut c_double, page_y: *mut c_double) -> FPDF_BOOL;
    FPDF_PageToDevice: fn(page: FPDF_PAGE, start_x: c_int, start_y: c_int, size_x: c_int, size_y: c_int, rotate: c_int, page_x: c_double, page_y: c_double, device_x: *mut c_int, device_y: *mut c_int) -> FPDF_BOOL;

    FPDF_RenderPageBitmapWithMatrix: fn(bitmap: FPDF_BITMAP, page: FPDF_PAGE, matrix: *const FS_MATRIX, clipping: *const FS_RECTF, flags: c_int);
    FPDF_RenderPageBitmap_Start: fn(bitmap: FPDF_BITMAP, page: FPDF_PAGE, start_x: c_int, start_y: c_int, size_x: c_int, size_y: c_int, rotate: c_int, flags: c_int, pause: *mut IFSDK_PAUSE) -> c_int;
    FPDF_RenderPage_Continue: fn(page: FPDF_PAGE, pause: *mut IFSDK_PAUSE) -> c_int;
    FPDF_RenderPage_Close: fn(page: FPDF_PAGE);

    FPDFBitmap_CreateEx: fn(width: c_int, height: c_int, format: c_int, first_scan: *mut c_void, stride: c_int) -> FPDF_BITMAP;
    FPDFBitmap_Destroy: fn(bitmap: FPDF_BITMAP);
    FPDFBitmap_GetBuffer: fn(bitmap: FPDF_BITMAP) -> *mut c_void;
    FPDFBitmap_GetStride: fn(bitmap: FPDF_BITMAP) -> c_int;
    FPDFBitmap_FillRect: fn(bitmap: FPDF_BITMAP, left: c_int, top: c_int, width: c_int, height: c_int, color: FPDF_DWORD) -> FPDF_BOOL;

    FPDFText_LoadPage: fn(page: FPDF_PAGE) -> FPDF_TEXTPAGE;
    FPDFText_ClosePage: fn(text_page: FPDF_TEXTPAGE);
    FPDFText_CountChars: fn(text_page: FPDF_TEXTPAGE) -> c_int;
    FPDFText_GetText: fn(text_page: FPDF_TEXTPAGE, start_index: c_int, count: c_int, result: *mut c_ushort) -> c_int;

    FPDFDOC_InitFormFillEnvironment: fn(document: FPDF_DOCUMENT, form_info: *mut FPDF_FORMFILLINFO) -> FPDF_FORMHANDLE;
    FPDFDOC_ExitFormFillEnvironment: fn(form: FPDF_FORMHANDLE);
    FORM_OnAfterLoadPage: fn(page: FPDF_PAGE, form: FPDF_FORMHANDLE);
    FORM_OnBeforeClosePage: fn(page: FPDF_PAGE, form: FPDF_FORMHANDLE);
    FORM_DoPageAAction: fn(page: FPDF_PAGE, form: FPDF_FORMHANDLE, aa_type: c_int);
    FPDF_FFLDraw: fn(form: FPDF_FORMHANDLE, bitmap: FPDF_BITMAP, page: FPDF_PAGE, start_x: c_int, start_y: c_int, size_x: c_int, size_y: c_int, rotate: c_int, flags: c_int);
}

impl Bindings {
    /// Load PDFium from `$PDFIUM_LIB_DIR` when set, otherwise from the
    /// platform library name on the system search path.
    pub fn load() -> Result<Self, BindingsError> {
        match std::env::var_os(LIBRARY_DIR_ENV) {
            Some(dir) if !dir.is_empty() => Self::load_from_dir(dir),
            _ => Self::load_from_path(LIBRARY_NAME),
        }
    }

    /// Load the platform library name from `dir`.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, BindingsError> {
        Self::load_from_path(dir.as_ref().join(LIBRARY_NAME))
    }

    /// Load a PDFium library from an explicit path.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, BindingsError> {
        let path = path.as_ref();
        let wrap = |source| BindingsError {
            path: path.to_path_buf(),
            source,
        };
        // SAFETY: loading runs the library's initializers; PDFium has none
        // with observable side effects. Symbol types are checked by name only.
        unsafe {
            let library = libloading::Library::new(path).map_err(wrap)?;
            Self::from_library(library).map_err(wrap)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_library_reports_path() {
        let err = match Bindings::load_from_dir("/nonexistent/pdfium-guard") {
            Ok(_) => panic!("loading from a missing directory should fail"),
            Err(e) => e,
        };
        assert!(err.path().starts_with("/nonexistent/pdfium-guard"));
        assert!(err.to_string().contains(LIBRARY_NAME));
    }
}
