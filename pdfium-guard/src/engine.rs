//! The native call surface the safe layer is written against.
//!
//! [`NativeEngine`] forwards every call to a runtime-loaded PDFium library.
//! [`crate::mock::MockEngine`] implements the same trait in-process so the
//! lifetime rules can be exercised without a PDFium binary.

use pdfium_guard_sys::*;
use std::path::Path;

/// One-to-one mirror of the PDFium entry points used by this crate.
///
/// Every method is `unsafe`: callers must pass handles that are alive and
/// belong to this engine, and pointers that are valid for the duration the
/// PDFium documentation requires.
#[allow(clippy::too_many_arguments)]
pub trait Engine: Send + Sync + 'static {
    unsafe fn init_library(&self, config: *const FPDF_LIBRARY_CONFIG);
    unsafe fn destroy_library(&self);
    unsafe fn get_last_error(&self) -> c_ulong;
    unsafe fn set_system_font_info(&self, font_info: *mut FPDF_SYSFONTINFO);
    unsafe fn add_installed_font(&self, mapper: *mut c_void, face: *const c_char, charset: c_int);

    unsafe fn load_mem_document64(
        &self,
        data: *const c_void,
        size: usize,
        password: FPDF_BYTESTRING,
    ) -> FPDF_DOCUMENT;
    unsafe fn load_custom_document(
        &self,
        access: *mut FPDF_FILEACCESS,
        password: FPDF_BYTESTRING,
    ) -> FPDF_DOCUMENT;
    unsafe fn close_document(&self, document: FPDF_DOCUMENT);
    unsafe fn get_page_count(&self, document: FPDF_DOCUMENT) -> c_int;
    unsafe fn get_file_version(&self, document: FPDF_DOCUMENT, version: *mut c_int) -> FPDF_BOOL;
    unsafe fn get_meta_text(
        &self,
        document: FPDF_DOCUMENT,
        tag: FPDF_BYTESTRING,
        buffer: *mut c_void,
        buflen: c_ulong,
    ) -> c_ulong;

    unsafe fn load_page(&self, document: FPDF_DOCUMENT, index: c_int) -> FPDF_PAGE;
    unsafe fn close_page(&self, page: FPDF_PAGE);
    unsafe fn get_page_width(&self, page: FPDF_PAGE) -> f32;
    unsafe fn get_page_height(&self, page: FPDF_PAGE) -> f32;
    unsafe fn get_page_size_by_index(
        &self,
        document: FPDF_DOCUMENT,
        index: c_int,
        size: *mut FS_SIZEF,
    ) -> FPDF_BOOL;
    unsafe fn get_page_label(
        &self,
        document: FPDF_DOCUMENT,
        index: c_int,
        buffer: *mut c_void,
        buflen: c_ulong,
    ) -> c_ulong;
    unsafe fn get_page_bounding_box(&self, page: FPDF_PAGE, rect: *mut FS_RECTF) -> FPDF_BOOL;
    unsafe fn device_to_page(
        &self,
        page: FPDF_PAGE,
        start_x: c_int,
        start_y: c_int,
        size_x: c_int,
        size_y: c_int,
        rotate: c_int,
        device_x: c_int,
        device_y: c_int,
        page_x: *mut c_double,
        page_y: *mut c_double,
    ) -> FPDF_BOOL;
    unsafe fn page_to_device(
        &self,
        page: FPDF_PAGE,
        start_x: c_int,
        start_y: c_int,
        size_x: c_int,
        size_y: c_int,
        rotate: c_int,
        page_x: c_double,
        page_y: c_double,
        device_x: *mut c_int,
        device_y: *mut c_int,
    ) -> FPDF_BOOL;

    /// Render with a full matrix. Returns the failure code of this call, or
    /// `FPDF_ERR_SUCCESS`.
    unsafe fn render_page_bitmap_with_matrix(
        &self,
        bitmap: FPDF_BITMAP,
        page: FPDF_PAGE,
        matrix: *const FS_MATRIX,
        clipping: *const FS_RECTF,
        flags: c_int,
    ) -> c_ulong;
    unsafe fn render_page_bitmap_start(
        &self,
        bitmap: FPDF_BITMAP,
        page: FPDF_PAGE,
        start_x: c_int,
        start_y: c_int,
        size_x: c_int,
        size_y: c_int,
        rotate: c_int,
        flags: c_int,
        pause: *mut IFSDK_PAUSE,
    ) -> c_int;
    unsafe fn render_page_continue(&self, page: FPDF_PAGE, pause: *mut IFSDK_PAUSE) -> c_int;
    unsafe fn render_page_close(&self, page: FPDF_PAGE);

    unsafe fn bitmap_create_ex(
        &self,
        width: c_int,
        height: c_int,
        format: c_int,
        first_scan: *mut c_void,
        stride: c_int,
    ) -> FPDF_BITMAP;
    unsafe fn bitmap_destroy(&self, bitmap: FPDF_BITMAP);
    unsafe fn bitmap_get_buffer(&self, bitmap: FPDF_BITMAP) -> *mut c_void;
    unsafe fn bitmap_get_stride(&self, bitmap: FPDF_BITMAP) -> c_int;
    unsafe fn bitmap_fill_rect(
        &self,
        bitmap: FPDF_BITMAP,
        left: c_int,
        top: c_int,
        width: c_int,
        height: c_int,
        color: FPDF_DWORD,
    ) -> FPDF_BOOL;

    unsafe fn text_load_page(&self, page: FPDF_PAGE) -> FPDF_TEXTPAGE;
    unsafe fn text_close_page(&self, text_page: FPDF_TEXTPAGE);
    unsafe fn text_count_chars(&self, text_page: FPDF_TEXTPAGE) -> c_int;
    unsafe fn text_get_text(
        &self,
        text_page: FPDF_TEXTPAGE,
        start_index: c_int,
        count: c_int,
        result: *mut c_ushort,
    ) -> c_int;

    unsafe fn init_form_fill_environment(
        &self,
        document: FPDF_DOCUMENT,
        info: *mut FPDF_FORMFILLINFO,
    ) -> FPDF_FORMHANDLE;
    unsafe fn exit_form_fill_environment(&self, form: FPDF_FORMHANDLE);
    unsafe fn form_on_after_load_page(&self, page: FPDF_PAGE, form: FPDF_FORMHANDLE);
    unsafe fn form_on_before_close_page(&self, page: FPDF_PAGE, form: FPDF_FORMHANDLE);
    unsafe fn form_do_page_aaction(&self, page: FPDF_PAGE, form: FPDF_FORMHANDLE, aa_type: c_int);
    unsafe fn ffl_draw(
        &self,
        form: FPDF_FORMHANDLE,
        bitmap: FPDF_BITMAP,
        page: FPDF_PAGE,
        start_x: c_int,
        start_y: c_int,
        size_x: c_int,
        size_y: c_int,
        rotate: c_int,
        flags: c_int,
    );
}

// ============================================================================
// Native engine
// ============================================================================

/// Engine backed by a dynamically loaded PDFium library.
pub struct NativeEngine {
    bindings: Bindings,
}

impl NativeEngine {
    /// Load PDFium from `$PDFIUM_LIB_DIR`, falling back to the system
    /// library search path.
    pub fn load() -> crate::Result<Self> {
        Bindings::load().map(Self::from_bindings).map_err(Self::load_error)
    }

    /// Load PDFium from an explicit library path.
    pub fn load_from_path(path: impl AsRef<Path>) -> crate::Result<Self> {
        Bindings::load_from_path(path)
            .map(Self::from_bindings)
            .map_err(Self::load_error)
    }

    pub fn from_bindings(bindings: Bindings) -> Self {
        Self { bindings }
    }

    fn load_error(err: BindingsError) -> crate::PdfError {
        crate::PdfError::InitializationFailed {
            reason: err.to_string(),
        }
    }
}

impl std::fmt::Debug for NativeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeEngine").finish_non_exhaustive()
    }
}

#[allow(clippy::too_many_arguments)]
impl Engine for NativeEngine {
    unsafe fn init_library(&self, config: *const FPDF_LIBRARY_CONFIG) {
        (self.bindings.FPDF_InitLibraryWithConfig)(config)
    }

    unsafe fn destroy_library(&self) {
        (self.bindings.FPDF_DestroyLibrary)()
    }

    unsafe fn get_last_error(&self) -> c_ulong {
        (self.bindings.FPDF_GetLastError)()
    }

    unsafe fn set_system_font_info(&self, font_info: *mut FPDF_SYSFONTINFO) {
        (self.bindings.FPDF_SetSystemFontInfo)(font_info)
    }

    unsafe fn add_installed_font(&self, mapper: *mut c_void, face: *const c_char, charset: c_int) {
        (self.bindings.FPDF_AddInstalledFont)(mapper, face, charset)
    }

    unsafe fn load_mem_document64(
        &self,
        data: *const c_void,
        size: usize,
        password: FPDF_BYTESTRING,
    ) -> FPDF_DOCUMENT {
        (self.bindings.FPDF_LoadMemDocument64)(data, size, password)
    }

    unsafe fn load_custom_document(
        &self,
        access: *mut FPDF_FILEACCESS,
        password: FPDF_BYTESTRING,
    ) -> FPDF_DOCUMENT {
        (self.bindings.FPDF_LoadCustomDocument)(access, password)
    }

    unsafe fn close_document(&self, document: FPDF_DOCUMENT) {
        (self.bindings.FPDF_CloseDocument)(document)
    }

    unsafe fn get_page_count(&self, document: FPDF_DOCUMENT) -> c_int {
        (self.bindings.FPDF_GetPageCount)(document)
    }

    unsafe fn get_file_version(&self, document: FPDF_DOCUMENT, version: *mut c_int) -> FPDF_BOOL {
        (self.bindings.FPDF_GetFileVersion)(document, version)
    }

    unsafe fn get_meta_text(
        &self,
        document: FPDF_DOCUMENT,
        tag: FPDF_BYTESTRING,
        buffer: *mut c_void,
        buflen: c_ulong,
    ) -> c_ulong {
        (self.bindings.FPDF_GetMetaText)(document, tag, buffer, buflen)
    }

    unsafe fn load_page(&self, document: FPDF_DOCUMENT, index: c_int) -> FPDF_PAGE {
        (self.bindings.FPDF_LoadPage)(document, index)
    }

    unsafe fn close_page(&self, page: FPDF_PAGE) {
        (self.bindings.FPDF_ClosePage)(page)
    }

    unsafe fn get_page_width(&self, page: FPDF_PAGE) -> f32 {
        (self.bindings.FPDF_GetPageWidthF)(page)
    }

    unsafe fn get_page_height(&self, page: FPDF_PAGE) -> f32 {
        (self.bindings.FPDF_GetPageHeightF)(page)
    }

    unsafe fn get_page_size_by_index(
        &self,
        document: FPDF_DOCUMENT,
        index: c_int,
        size: *mut FS_SIZEF,
    ) -> FPDF_BOOL {
        (self.bindings.FPDF_GetPageSizeByIndexF)(document, index, size)
    }

    unsafe fn get_page_label(
        &self,
        document: FPDF_DOCUMENT,
        index: c_int,
        buffer: *mut c_void,
        buflen: c_ulong,
    ) -> c_ulong {
        (self.bindings.FPDF_GetPageLabel)(document, index, buffer, buflen)
    }

    unsafe fn get_page_bounding_box(&self, page: FPDF_PAGE, rect: *mut FS_RECTF) -> FPDF_BOOL {
        (self.bindings.FPDF_GetPageBoundingBox)(page, rect)
    }

    unsafe fn device_to_page(
        &self,
        page: FPDF_PAGE,
        start_x: c_int,
        start_y: c_int,
        size_x: c_int,
        size_y: c_int,
        rotate: c_int,
        device_x: c_int,
        device_y: c_int,
        page_x: *mut c_double,
        page_y: *mut c_double,
    ) -> FPDF_BOOL {
        (self.bindings.FPDF_DeviceToPage)(
            page, start_x, start_y, size_x, size_y, rotate, device_x, device_y, page_x, page_y,
        )
    }

    unsafe fn page_to_device(
        &self,
        page: FPDF_PAGE,
        start_x: c_int,
        start_y: c_int,
        size_x: c_int,
        size_y: c_int,
        rotate: c_int,
        page_x: c_double,
        page_y: c_double,
        device_x: *mut c_int,
        device_y: *mut c_int,
    ) -> FPDF_BOOL {
        (self.bindings.FPDF_PageToDevice)(
            page, start_x, start_y, size_x, size_y, rotate, page_x, page_y, device_x, device_y,
        )
    }

    // FPDF_RenderPageBitmapWithMatrix returns nothing, and PDFium only
    // writes the last error on failure, so a repeat of the code already set
    // is not visible here.
    unsafe fn render_page_bitmap_with_matrix(
        &self,
        bitmap: FPDF_BITMAP,
        page: FPDF_PAGE,
        matrix: *const FS_MATRIX,
        clipping: *const FS_RECTF,
        flags: c_int,
    ) -> c_ulong {
        let before = (self.bindings.FPDF_GetLastError)();
        (self.bindings.FPDF_RenderPageBitmapWithMatrix)(bitmap, page, matrix, clipping, flags);
        let after = (self.bindings.FPDF_GetLastError)();
        if after != before {
            after
        } else {
            FPDF_ERR_SUCCESS
        }
    }

    unsafe fn render_page_bitmap_start(
        &self,
        bitmap: FPDF_BITMAP,
        page: FPDF_PAGE,
        start_x: c_int,
        start_y: c_int,
        size_x: c_int,
        size_y: c_int,
        rotate: c_int,
        flags: c_int,
        pause: *mut IFSDK_PAUSE,
    ) -> c_int {
        (self.bindings.FPDF_RenderPageBitmap_Start)(
            bitmap, page, start_x, start_y, size_x, size_y, rotate, flags, pause,
        )
    }

    unsafe fn render_page_continue(&self, page: FPDF_PAGE, pause: *mut IFSDK_PAUSE) -> c_int {
        (self.bindings.FPDF_RenderPage_Continue)(page, pause)
    }

    unsafe fn render_page_close(&self, page: FPDF_PAGE) {
        (self.bindings.FPDF_RenderPage_Close)(page)
    }

    unsafe fn bitmap_create_ex(
        &self,
        width: c_int,
        height: c_int,
        format: c_int,
        first_scan: *mut c_void,
        stride: c_int,
    ) -> FPDF_BITMAP {
        (self.bindings.FPDFBitmap_CreateEx)(width, height, format, first_scan, stride)
    }

    unsafe fn bitmap_destroy(&self, bitmap: FPDF_BITMAP) {
        (self.bindings.FPDFBitmap_Destroy)(bitmap)
    }

    unsafe fn bitmap_get_buffer(&self, bitmap: FPDF_BITMAP) -> *mut c_void {
        (self.bindings.FPDFBitmap_GetBuffer)(bitmap)
    }

    unsafe fn bitmap_get_stride(&self, bitmap: FPDF_BITMAP) -> c_int {
        (self.bindings.FPDFBitmap_GetStride)(bitmap)
    }

    unsafe fn bitmap_fill_rect(
        &self,
        bitmap: FPDF_BITMAP,
        left: c_int,
        top: c_int,
        width: c_int,
        height: c_int,
        color: FPDF_DWORD,
    ) -> FPDF_BOOL {
        (self.bindings.FPDFBitmap_FillRect)(bitmap, left, top, width, height, color)
    }

    unsafe fn text_load_page(&self, page: FPDF_PAGE) -> FPDF_TEXTPAGE {
        (self.bindings.FPDFText_LoadPage)(page)
    }

    unsafe fn text_close_page(&self, text_page: FPDF_TEXTPAGE) {
        (self.bindings.FPDFText_ClosePage)(text_page)
    }

    unsafe fn text_count_chars(&self, text_page: FPDF_TEXTPAGE) -> c_int {
        (self.bindings.FPDFText_CountChars)(text_page)
    }

    unsafe fn text_get_text(
        &self,
        text_page: FPDF_TEXTPAGE,
        start_index: c_int,
        count: c_int,
        result: *mut c_ushort,
    ) -> c_int {
        (self.bindings.FPDFText_GetText)(text_page, start_index, count, result)
    }

    unsafe fn init_form_fill_environment(
        &self,
        document: FPDF_DOCUMENT,
        info: *mut FPDF_FORMFILLINFO,
    ) -> FPDF_FORMHANDLE {
        (self.bindings.FPDFDOC_InitFormFillEnvironment)(document, info)
    }

    unsafe fn exit_form_fill_environment(&self, form: FPDF_FORMHANDLE) {
        (self.bindings.FPDFDOC_ExitFormFillEnvironment)(form)
    }

    unsafe fn form_on_after_load_page(&self, page: FPDF_PAGE, form: FPDF_FORMHANDLE) {
        (self.bindings.FORM_OnAfterLoadPage)(page, form)
    }

    unsafe fn form_on_before_close_page(&self, page: FPDF_PAGE, form: FPDF_FORMHANDLE) {
        (self.bindings.FORM_OnBeforeClosePage)(page, form)
    }

    unsafe fn form_do_page_aaction(&self, page: FPDF_PAGE, form: FPDF_FORMHANDLE, aa_type: c_int) {
        (self.bindings.FORM_DoPageAAction)(page, form, aa_type)
    }

    unsafe fn ffl_draw(
        &self,
        form: FPDF_FORMHANDLE,
        bitmap: FPDF_BITMAP,
        page: FPDF_PAGE,
        start_x: c_int,
        start_y: c_int,
        size_x: c_int,
        size_y: c_int,
        rotate: c_int,
        flags: c_int,
    ) {
        (self.bindings.FPDF_FFLDraw)(
            form, bitmap, page, start_x, start_y, size_x, size_y, rotate, flags,
        )
    }
}
