//! In-process stand-in for PDFium.
//!
//! [`MockEngine`] implements [`Engine`] over a small line-based document
//! format built with [`MockDocument`]. It never dereferences the handles it
//! hands out; instead it keeps a table per handle kind and records every
//! lifetime rule a caller breaks (double closes, closed handles reaching a
//! native call, documents closed under live pages) in
//! [`MockStats::violations`].
//!
//! The engine behaves like PDFium where the safe layer depends on it:
//!
//! - documents opened from memory are re-read from the caller's buffer on
//!   every page load, and custom file access is read through `m_GetBlock`
//!   in 64-byte blocks, both at open and at page load;
//! - progressive renders paint 32-row bands and ask `NeedToPauseNow`
//!   between bands;
//! - the first render after `FPDF_SetSystemFontInfo` drives the installed
//!   font interface (enumerate, map, data, face name, delete);
//! - a form environment resolves pages through `FFI_GetPage` and draws
//!   through `FFI_Invalidate`.

use crate::engine::Engine;
use pdfium_guard_sys::*;
use std::collections::{HashMap, HashSet};
use std::ffi::CStr;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard};

const HEADER: &str = "%MOCKPDF-";
const TRAILER: &str = "%%EOF";
const BAND_ROWS: usize = 32;
const BLOCK_SIZE: usize = 64;
const MAPPER_TOKEN: usize = 0x4d50_0000;

/// Value written to the first pixel of the draw area by `FPDF_FFLDraw`.
pub const FORM_MARKER: u8 = 0x5A;

// ============================================================================
// Document format
// ============================================================================

/// Builder for mock document bytes.
///
/// ```text
/// %MOCKPDF-1.7
/// password=secret
/// meta.Title=Quarterly report
/// page=200x300
/// label=iv
/// text=first line
/// %%EOF
/// ```
#[derive(Debug, Clone)]
pub struct MockDocument {
    version: Option<(u8, u8)>,
    password: Option<String>,
    metadata: Vec<(String, String)>,
    pages: Vec<PageLayout>,
    unsupported_security: bool,
    broken_xfa: bool,
}

impl Default for MockDocument {
    fn default() -> Self {
        Self {
            version: Some((1, 7)),
            password: None,
            metadata: Vec::new(),
            pages: Vec::new(),
            unsupported_security: false,
            broken_xfa: false,
        }
    }
}

impl MockDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` produces a document whose file version is unset.
    pub fn with_version(mut self, version: Option<(u8, u8)>) -> Self {
        self.version = version;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_metadata(mut self, tag: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((tag.into(), value.into()));
        self
    }

    pub fn with_page(self, width: f32, height: f32) -> Self {
        self.with_text_page(width, height, &[])
    }

    /// Add a page with one text line per entry. Embedded newlines start new
    /// lines.
    pub fn with_text_page(mut self, width: f32, height: f32, lines: &[&str]) -> Self {
        self.pages.push(PageLayout {
            width,
            height,
            label: None,
            lines: lines
                .iter()
                .flat_map(|line| line.split('\n'))
                .map(str::to_string)
                .collect(),
        });
        self
    }

    /// Label the most recently added page.
    pub fn with_page_label(mut self, label: impl Into<String>) -> Self {
        if let Some(page) = self.pages.last_mut() {
            page.label = Some(label.into());
        }
        self
    }

    pub fn with_unsupported_security(mut self) -> Self {
        self.unsupported_security = true;
        self
    }

    pub fn with_broken_xfa(mut self) -> Self {
        self.broken_xfa = true;
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::from(HEADER);
        if let Some((major, minor)) = self.version {
            out.push_str(&format!("{major}.{minor}"));
        }
        out.push('\n');
        if let Some(password) = &self.password {
            out.push_str(&format!("password={password}\n"));
        }
        for (tag, value) in &self.metadata {
            out.push_str(&format!("meta.{tag}={value}\n"));
        }
        if self.unsupported_security {
            out.push_str("security=unsupported\n");
        }
        if self.broken_xfa {
            out.push_str("xfa=broken\n");
        }
        for page in &self.pages {
            out.push_str(&format!("page={}x{}\n", page.width, page.height));
            if let Some(label) = &page.label {
                out.push_str(&format!("label={label}\n"));
            }
            for line in &page.lines {
                out.push_str(&format!("text={line}\n"));
            }
        }
        out.push_str(TRAILER);
        out.push('\n');
        out.into_bytes()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PageLayout {
    width: f32,
    height: f32,
    label: Option<String>,
    lines: Vec<String>,
}

#[derive(Debug, Clone)]
struct Parsed {
    version: Option<c_int>,
    password: Option<String>,
    metadata: Vec<(String, String)>,
    pages: Vec<PageLayout>,
}

fn parse(bytes: &[u8]) -> Result<Parsed, c_ulong> {
    let text = std::str::from_utf8(bytes).map_err(|_| FPDF_ERR_FORMAT)?;
    let mut lines = text.lines();
    let version = lines
        .next()
        .and_then(|line| line.strip_prefix(HEADER))
        .ok_or(FPDF_ERR_FORMAT)?;
    let version = if version.is_empty() {
        None
    } else {
        Some(parse_version(version).ok_or(FPDF_ERR_FORMAT)?)
    };

    let mut parsed = Parsed {
        version,
        password: None,
        metadata: Vec::new(),
        pages: Vec::new(),
    };
    let mut failure = None;
    let mut terminated = false;

    for line in lines {
        if terminated {
            if line.trim().is_empty() {
                continue;
            }
            return Err(FPDF_ERR_FORMAT);
        }
        if line == TRAILER {
            terminated = true;
            continue;
        }
        let (key, value) = line.split_once('=').ok_or(FPDF_ERR_FORMAT)?;
        if let Some(tag) = key.strip_prefix("meta.") {
            parsed.metadata.push((tag.to_string(), value.to_string()));
            continue;
        }
        match key {
            "password" => parsed.password = Some(value.to_string()),
            "page" => {
                let (w, h) = value.split_once('x').ok_or(FPDF_ERR_FORMAT)?;
                let width: f32 = w.parse().map_err(|_| FPDF_ERR_FORMAT)?;
                let height: f32 = h.parse().map_err(|_| FPDF_ERR_FORMAT)?;
                if !(width > 0.0 && height > 0.0) {
                    return Err(FPDF_ERR_FORMAT);
                }
                parsed.pages.push(PageLayout {
                    width,
                    height,
                    label: None,
                    lines: Vec::new(),
                });
            }
            "label" => {
                parsed.pages.last_mut().ok_or(FPDF_ERR_FORMAT)?.label = Some(value.to_string());
            }
            "text" => parsed
                .pages
                .last_mut()
                .ok_or(FPDF_ERR_FORMAT)?
                .lines
                .push(value.to_string()),
            "security" => {
                failure.get_or_insert(FPDF_ERR_SECURITY);
            }
            "xfa" => {
                failure.get_or_insert(FPDF_ERR_XFALOAD);
            }
            _ => return Err(FPDF_ERR_FORMAT),
        }
    }

    if !terminated {
        return Err(FPDF_ERR_FORMAT);
    }
    match failure {
        Some(code) => Err(code),
        None => Ok(parsed),
    }
}

fn parse_version(version: &str) -> Option<c_int> {
    let (major, minor) = version.split_once('.')?;
    Some(major.parse::<c_int>().ok()? * 10 + minor.parse::<c_int>().ok()?)
}

// ============================================================================
// Engine state
// ============================================================================

/// Counters and the violation log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockStats {
    pub init_calls: usize,
    pub destroy_calls: usize,
    pub documents_opened: usize,
    pub documents_closed: usize,
    pub pages_loaded: usize,
    pub pages_closed: usize,
    pub bitmaps_created: usize,
    pub bitmaps_destroyed: usize,
    pub text_pages_loaded: usize,
    pub text_pages_closed: usize,
    pub forms_initialized: usize,
    pub forms_exited: usize,
    pub renders: usize,
    pub progressive_pauses: usize,
    pub form_draws: usize,
    /// `(page index, action)` for every `FORM_DoPageAAction`.
    pub page_actions: Vec<(usize, c_int)>,
    pub last_render_flags: Option<c_int>,
    pub violations: Vec<String>,
}

/// What the engine observed while driving the installed font interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FontUsage {
    pub mapped: bool,
    pub exact: bool,
    pub data: Vec<u8>,
    pub face_name: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Source {
    Memory { data: usize, len: usize },
    Custom { access: usize },
}

struct DocState {
    source: Source,
    parsed: Parsed,
}

struct Progress {
    bitmap: usize,
    matrix: FS_MATRIX,
    next_row: usize,
}

struct PageState {
    document: usize,
    index: usize,
    layout: PageLayout,
    progress: Option<Progress>,
}

enum PixelStore {
    Owned(Vec<u8>),
    /// Caller memory passed as `first_scan`.
    External { addr: usize, len: usize },
}

struct BitmapState {
    width: usize,
    height: usize,
    bpp: usize,
    stride: usize,
    store: PixelStore,
}

impl BitmapState {
    fn pixels(&mut self) -> &mut [u8] {
        match &mut self.store {
            PixelStore::Owned(buffer) => buffer.as_mut_slice(),
            // SAFETY: the creator keeps the memory alive for the bitmap's
            // lifetime and only touches it through the bitmap meanwhile.
            PixelStore::External { addr, len } => unsafe {
                std::slice::from_raw_parts_mut(*addr as *mut u8, *len)
            },
        }
    }
}

struct TextState {
    page: usize,
    units: Vec<u16>,
}

struct FormState {
    document: usize,
    info: usize,
    pages: Vec<usize>,
}

#[derive(Default)]
struct MockState {
    initialized: bool,
    last_error: c_ulong,
    next_id: usize,
    fail_next_init: bool,
    fail_next_bitmap: bool,
    fail_next_render: bool,
    change_on_load: Option<usize>,
    font_paths: Vec<String>,
    installed_fonts: Vec<(String, c_int)>,
    font_info: Option<usize>,
    fonts_exercised: bool,
    font_usage: Option<FontUsage>,
    documents: HashMap<usize, DocState>,
    pages: HashMap<usize, PageState>,
    bitmaps: HashMap<usize, BitmapState>,
    text_pages: HashMap<usize, TextState>,
    forms: HashMap<usize, FormState>,
    released: HashSet<usize>,
    stats: MockStats,
}

impl MockState {
    fn violation(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("Mock engine violation: {}", message);
        self.stats.violations.push(message);
    }

    fn allocate(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    fn require_init(&mut self, call: &str) -> bool {
        if !self.initialized {
            self.violation(format!("{call} called before FPDF_InitLibrary"));
            self.last_error = FPDF_ERR_UNKNOWN;
        }
        self.initialized
    }

    fn stale(&mut self, call: &str, kind: &str, id: usize) {
        if self.released.contains(&id) {
            self.violation(format!("{call} on closed {kind}"));
        } else {
            self.violation(format!("{call} on unknown {kind}"));
        }
    }

    /// Record a violation unless every `(kind, present)` check passes.
    fn check(&mut self, call: &str, handles: &[(&str, usize)]) -> bool {
        for &(kind, id) in handles {
            let present = match kind {
                "document" => self.documents.contains_key(&id),
                "page" => self.pages.contains_key(&id),
                "bitmap" => self.bitmaps.contains_key(&id),
                "text page" => self.text_pages.contains_key(&id),
                _ => self.forms.contains_key(&id),
            };
            if !present {
                self.stale(call, kind, id);
                return false;
            }
        }
        true
    }

    fn live_handles(&self) -> usize {
        self.documents.len()
            + self.pages.len()
            + self.bitmaps.len()
            + self.text_pages.len()
            + self.forms.len()
    }

    fn open_document(
        &mut self,
        bytes: &[u8],
        password: Option<&str>,
        source: Source,
    ) -> FPDF_DOCUMENT {
        let parsed = parse(bytes).and_then(|parsed| match &parsed.password {
            Some(expected) if password != Some(expected.as_str()) => Err(FPDF_ERR_PASSWORD),
            _ => Ok(parsed),
        });
        match parsed {
            Ok(parsed) => {
                let id = self.allocate();
                self.documents.insert(id, DocState { source, parsed });
                self.stats.documents_opened += 1;
                self.last_error = FPDF_ERR_SUCCESS;
                to_ptr(id)
            }
            Err(code) => {
                self.last_error = code;
                std::ptr::null_mut()
            }
        }
    }
}

fn to_ptr<T>(id: usize) -> *mut T {
    (id * 16) as *mut T
}

fn to_id<T>(ptr: *mut T) -> usize {
    ptr as usize / 16
}

unsafe fn read_cstr(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

unsafe fn read_font_paths(config: *const FPDF_LIBRARY_CONFIG) -> Vec<String> {
    let mut paths = Vec::new();
    if config.is_null() || (*config).m_pUserFontPaths.is_null() {
        return paths;
    }
    let mut cursor = (*config).m_pUserFontPaths;
    while let Some(path) = read_cstr(*cursor) {
        paths.push(path);
        cursor = cursor.add(1);
    }
    paths
}

unsafe fn read_memory(source: Source) -> Option<Vec<u8>> {
    match source {
        Source::Memory { len: 0, .. } => Some(Vec::new()),
        Source::Memory { data, len } => {
            Some(std::slice::from_raw_parts(data as *const u8, len).to_vec())
        }
        Source::Custom { access } => read_custom(access as *mut FPDF_FILEACCESS),
    }
}

unsafe fn read_custom(access: *mut FPDF_FILEACCESS) -> Option<Vec<u8>> {
    let access = &*access;
    let get_block = access.m_GetBlock?;
    let len = access.m_FileLen as usize;
    let mut out = vec![0u8; len];
    let mut position = 0;
    while position < len {
        let size = (len - position).min(BLOCK_SIZE);
        let ok = get_block(
            access.m_Param,
            position as c_ulong,
            out[position..].as_mut_ptr(),
            size as c_ulong,
        );
        if ok == 0 {
            return None;
        }
        position += size;
    }
    Some(out)
}

fn bytes_per_pixel(format: c_int) -> Option<usize> {
    match format {
        FPDFBitmap_Gray => Some(1),
        FPDFBitmap_BGR => Some(3),
        FPDFBitmap_BGRx | FPDFBitmap_BGRA => Some(4),
        _ => None,
    }
}

fn page_seed(page: &PageLayout, index: usize) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    let mut feed = |bytes: &[u8]| {
        for &b in bytes {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
    };
    feed(&(index as u64).to_le_bytes());
    feed(&page.width.to_bits().to_le_bytes());
    feed(&page.height.to_bits().to_le_bytes());
    for line in &page.lines {
        feed(line.as_bytes());
        feed(b"\n");
    }
    hash
}

fn mix(seed: u64, x: i64, y: i64, channel: usize) -> u8 {
    let mut h = seed ^ 0x9e37_79b9_7f4a_7c15;
    for v in [x as u64, y as u64, channel as u64] {
        h ^= v;
        h = h.wrapping_mul(0x0100_0000_01b3);
        h ^= h >> 29;
    }
    (h >> 24) as u8
}

fn invert(m: &FS_MATRIX) -> Option<FS_MATRIX> {
    let det = m.a * m.d - m.b * m.c;
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    Some(FS_MATRIX {
        a: m.d / det,
        b: -m.b / det,
        c: -m.c / det,
        d: m.a / det,
        e: (m.c * m.f - m.d * m.e) / det,
        f: (m.b * m.e - m.a * m.f) / det,
    })
}

/// Page-to-device matrix for a `start`/`size` layout turned `rotate`
/// quarter turns clockwise.
fn layout_matrix(
    start: (c_int, c_int),
    size: (c_int, c_int),
    rotate: c_int,
    page: (f32, f32),
) -> Option<FS_MATRIX> {
    let (sx, sy) = (start.0 as f32, start.1 as f32);
    let (w, h) = (size.0 as f32, size.1 as f32);
    let (pw, ph) = page;
    let zero = FS_MATRIX::default();
    let matrix = match rotate {
        0 => FS_MATRIX {
            a: w / pw,
            d: h / ph,
            e: sx,
            f: sy,
            ..zero
        },
        1 => FS_MATRIX {
            b: h / pw,
            c: -w / ph,
            e: sx + w,
            f: sy,
            ..zero
        },
        2 => FS_MATRIX {
            a: -w / pw,
            d: -h / ph,
            e: sx + w,
            f: sy + h,
            ..zero
        },
        3 => FS_MATRIX {
            b: -h / pw,
            c: w / ph,
            e: sx,
            f: sy + h,
            ..zero
        },
        _ => return None,
    };
    Some(matrix)
}

/// Paint the deterministic page pattern into `rows` of `bitmap`.
fn paint(
    bitmap: &mut BitmapState,
    rows: Range<usize>,
    matrix: &FS_MATRIX,
    clip: Option<FS_RECTF>,
    seed: u64,
    page: (f32, f32),
) {
    let Some(inv) = invert(matrix) else {
        return;
    };
    let (width, stride, bpp) = (bitmap.width, bitmap.stride, bitmap.bpp);
    let buffer = bitmap.pixels();
    for y in rows {
        for x in 0..width {
            let (fx, fy) = (x as f32, y as f32);
            if let Some(c) = clip {
                if fx < c.left || fx >= c.right || fy < c.top || fy >= c.bottom {
                    continue;
                }
            }
            let (cx, cy) = (fx + 0.5, fy + 0.5);
            let px = inv.a * cx + inv.c * cy + inv.e;
            let py = inv.b * cx + inv.d * cy + inv.f;
            if px < 0.0 || py < 0.0 || px >= page.0 || py >= page.1 {
                continue;
            }
            let (px, py) = (px.floor() as i64, py.floor() as i64);
            let offset = y * stride + x * bpp;
            for channel in 0..bpp {
                buffer[offset + channel] = if bpp == 4 && channel == 3 {
                    0xFF
                } else {
                    mix(seed, px, py, channel)
                };
            }
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Engine that simulates PDFium and checks how it is driven.
#[derive(Default)]
pub struct MockEngine {
    state: Mutex<MockState>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn stats(&self) -> MockStats {
        self.lock().stats.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    /// Number of native objects of any kind that are currently open.
    pub fn live_handles(&self) -> usize {
        self.lock().live_handles()
    }

    /// The next `FPDF_InitLibraryWithConfig` reports `FPDF_ERR_UNKNOWN`.
    pub fn fail_next_init(&self) {
        self.lock().fail_next_init = true;
    }

    /// The next bitmap allocation returns null.
    pub fn fail_next_bitmap(&self) {
        self.lock().fail_next_bitmap = true;
    }

    /// The next render paints nothing and reports `FPDF_ERR_UNKNOWN`.
    pub fn fail_next_render(&self) {
        self.lock().fail_next_render = true;
    }

    /// The next `FORM_OnAfterLoadPage` for page `index` calls back into
    /// `FFI_OnChange`, as PDFium does when page-open scripts edit a field.
    pub fn change_on_page_load(&self, index: usize) {
        self.lock().change_on_load = Some(index);
    }

    /// Font directories passed at the last initialization.
    pub fn font_paths(&self) -> Vec<String> {
        self.lock().font_paths.clone()
    }

    /// Faces registered through `FPDF_AddInstalledFont`.
    pub fn installed_fonts(&self) -> Vec<(String, c_int)> {
        self.lock().installed_fonts.clone()
    }

    pub fn font_usage(&self) -> Option<FontUsage> {
        self.lock().font_usage.clone()
    }

    /// Drive the installed font interface once per installation.
    unsafe fn exercise_fonts(&self) {
        let info = {
            let mut s = self.lock();
            match s.font_info {
                Some(info) if !s.fonts_exercised => {
                    s.fonts_exercised = true;
                    info as *mut FPDF_SYSFONTINFO
                }
                _ => return,
            }
        };
        let sys = *info;
        if let Some(enum_fonts) = sys.EnumFonts {
            enum_fonts(info, MAPPER_TOKEN as *mut c_void);
        }

        let mut usage = FontUsage::default();
        if let Some(map_font) = sys.MapFont {
            let mut exact: FPDF_BOOL = 0;
            let face = b"Helvetica\0";
            let font = map_font(
                info,
                400,
                0,
                FXFONT_ANSI_CHARSET,
                0,
                face.as_ptr().cast(),
                &mut exact,
            );
            if !font.is_null() {
                usage.mapped = true;
                usage.exact = exact != 0;
                if let Some(font_data) = sys.GetFontData {
                    let len = font_data(info, font, 0, std::ptr::null_mut(), 0);
                    if len > 0 {
                        let mut buf = vec![0u8; len as usize];
                        let copied = font_data(info, font, 0, buf.as_mut_ptr(), len);
                        buf.truncate((copied as usize).min(buf.len()));
                        usage.data = buf;
                    }
                }
                if let Some(face_name) = sys.GetFaceName {
                    let len = face_name(info, font, std::ptr::null_mut(), 0);
                    if len > 0 {
                        let mut buf = vec![0u8; len as usize];
                        face_name(info, font, buf.as_mut_ptr().cast(), len);
                        usage.face_name = CStr::from_bytes_until_nul(&buf)
                            .ok()
                            .and_then(|name| name.to_str().ok())
                            .map(str::to_string);
                    }
                }
                if let Some(delete_font) = sys.DeleteFont {
                    delete_font(info, font);
                }
            }
        }
        self.lock().font_usage = Some(usage);
    }

    /// Paint bands until the page is done or the host asks to pause.
    unsafe fn run_progress(&self, page_id: usize, pause: *mut IFSDK_PAUSE) -> c_int {
        loop {
            let done = {
                let mut guard = self.lock();
                let s = &mut *guard;
                let Some(page) = s.pages.get_mut(&page_id) else {
                    return FPDF_RENDER_FAILED;
                };
                let seed = page_seed(&page.layout, page.index);
                let size = (page.layout.width, page.layout.height);
                let Some(progress) = page.progress.as_mut() else {
                    s.stats
                        .violations
                        .push("FPDF_RenderPage_Continue without a render in progress".into());
                    return FPDF_RENDER_FAILED;
                };
                let Some(bitmap) = s.bitmaps.get_mut(&progress.bitmap) else {
                    s.stats
                        .violations
                        .push("bitmap destroyed during a progressive render".into());
                    return FPDF_RENDER_FAILED;
                };
                let end = (progress.next_row + BAND_ROWS).min(bitmap.height);
                paint(bitmap, progress.next_row..end, &progress.matrix, None, seed, size);
                progress.next_row = end;
                end >= bitmap.height
            };
            if done {
                return FPDF_RENDER_DONE;
            }
            if !pause.is_null() {
                if let Some(need_to_pause) = (*pause).NeedToPauseNow {
                    if need_to_pause(pause) != 0 {
                        self.lock().stats.progressive_pauses += 1;
                        return FPDF_RENDER_TOBECONTINUED;
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for MockEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.lock();
        f.debug_struct("MockEngine")
            .field("initialized", &s.initialized)
            .field("live_handles", &s.live_handles())
            .field("violations", &s.stats.violations.len())
            .finish()
    }
}

#[allow(clippy::too_many_arguments)]
impl Engine for MockEngine {
    unsafe fn init_library(&self, config: *const FPDF_LIBRARY_CONFIG) {
        let mut s = self.lock();
        s.stats.init_calls += 1;
        if s.initialized {
            s.violation("FPDF_InitLibrary called twice");
        }
        s.initialized = true;
        s.font_paths = read_font_paths(config);
        s.last_error = if std::mem::take(&mut s.fail_next_init) {
            FPDF_ERR_UNKNOWN
        } else {
            FPDF_ERR_SUCCESS
        };
    }

    unsafe fn destroy_library(&self) {
        let mut s = self.lock();
        s.stats.destroy_calls += 1;
        if !s.initialized {
            s.violation("FPDF_DestroyLibrary without a matching init");
        }
        let live = s.live_handles();
        if live > 0 {
            s.violation(format!("FPDF_DestroyLibrary with {live} live handles"));
        }
        s.initialized = false;
        s.font_info = None;
        s.fonts_exercised = false;
    }

    unsafe fn get_last_error(&self) -> c_ulong {
        self.lock().last_error
    }

    unsafe fn set_system_font_info(&self, font_info: *mut FPDF_SYSFONTINFO) {
        let mut s = self.lock();
        s.font_info = (!font_info.is_null()).then_some(font_info as usize);
        s.fonts_exercised = false;
    }

    unsafe fn add_installed_font(&self, _mapper: *mut c_void, face: *const c_char, charset: c_int) {
        let mut s = self.lock();
        match read_cstr(face) {
            Some(face) => s.installed_fonts.push((face, charset)),
            None => s.violation("FPDF_AddInstalledFont with a null face"),
        }
    }

    unsafe fn load_mem_document64(
        &self,
        data: *const c_void,
        size: usize,
        password: FPDF_BYTESTRING,
    ) -> FPDF_DOCUMENT {
        let mut s = self.lock();
        if !s.require_init("FPDF_LoadMemDocument64") {
            return std::ptr::null_mut();
        }
        if data.is_null() && size > 0 {
            s.last_error = FPDF_ERR_FILE;
            return std::ptr::null_mut();
        }
        let source = Source::Memory {
            data: data as usize,
            len: size,
        };
        let bytes = read_memory(source).unwrap_or_default();
        let password = read_cstr(password);
        s.open_document(&bytes, password.as_deref(), source)
    }

    unsafe fn load_custom_document(
        &self,
        access: *mut FPDF_FILEACCESS,
        password: FPDF_BYTESTRING,
    ) -> FPDF_DOCUMENT {
        {
            let mut s = self.lock();
            if !s.require_init("FPDF_LoadCustomDocument") {
                return std::ptr::null_mut();
            }
            if access.is_null() {
                s.last_error = FPDF_ERR_FILE;
                return std::ptr::null_mut();
            }
        }
        let bytes = read_custom(access);
        let mut s = self.lock();
        let Some(bytes) = bytes else {
            s.last_error = FPDF_ERR_FILE;
            return std::ptr::null_mut();
        };
        let password = read_cstr(password);
        let source = Source::Custom {
            access: access as usize,
        };
        s.open_document(&bytes, password.as_deref(), source)
    }

    unsafe fn close_document(&self, document: FPDF_DOCUMENT) {
        let id = to_id(document);
        let mut s = self.lock();
        if s.documents.remove(&id).is_none() {
            s.stale("FPDF_CloseDocument", "document", id);
            return;
        }
        s.released.insert(id);
        s.stats.documents_closed += 1;
        let pages = s.pages.values().filter(|p| p.document == id).count();
        if pages > 0 {
            s.violation(format!("FPDF_CloseDocument with {pages} open pages"));
        }
        if s.forms.values().any(|f| f.document == id) {
            s.violation("FPDF_CloseDocument with a live form environment");
        }
    }

    unsafe fn get_page_count(&self, document: FPDF_DOCUMENT) -> c_int {
        let id = to_id(document);
        let mut s = self.lock();
        if !s.check("FPDF_GetPageCount", &[("document", id)]) {
            return 0;
        }
        s.documents[&id].parsed.pages.len() as c_int
    }

    unsafe fn get_file_version(&self, document: FPDF_DOCUMENT, version: *mut c_int) -> FPDF_BOOL {
        let id = to_id(document);
        let mut s = self.lock();
        if !s.check("FPDF_GetFileVersion", &[("document", id)]) || version.is_null() {
            return 0;
        }
        match s.documents[&id].parsed.version {
            Some(v) => {
                *version = v;
                1
            }
            None => 0,
        }
    }

    unsafe fn get_meta_text(
        &self,
        document: FPDF_DOCUMENT,
        tag: FPDF_BYTESTRING,
        buffer: *mut c_void,
        buflen: c_ulong,
    ) -> c_ulong {
        let id = to_id(document);
        let mut s = self.lock();
        if !s.check("FPDF_GetMetaText", &[("document", id)]) {
            return 0;
        }
        let Some(tag) = read_cstr(tag) else {
            return 0;
        };
        let value = s.documents[&id]
            .parsed
            .metadata
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_str())
            .unwrap_or("");
        let mut encoded: Vec<u8> = value.encode_utf16().flat_map(u16::to_le_bytes).collect();
        encoded.extend_from_slice(&[0, 0]);
        if !buffer.is_null() && buflen as usize >= encoded.len() {
            std::ptr::copy_nonoverlapping(encoded.as_ptr(), buffer.cast(), encoded.len());
        }
        encoded.len() as c_ulong
    }

    unsafe fn load_page(&self, document: FPDF_DOCUMENT, index: c_int) -> FPDF_PAGE {
        let doc_id = to_id(document);
        let source = {
            let mut s = self.lock();
            if !s.require_init("FPDF_LoadPage")
                || !s.check("FPDF_LoadPage", &[("document", doc_id)])
            {
                return std::ptr::null_mut();
            }
            let doc = &s.documents[&doc_id];
            let (count, source) = (doc.parsed.pages.len(), doc.source);
            if index < 0 || index as usize >= count {
                s.last_error = FPDF_ERR_PAGE;
                return std::ptr::null_mut();
            }
            source
        };

        // Lazy loading: the page content comes from the source as it is now.
        let bytes = read_memory(source);
        let mut s = self.lock();
        let layout = bytes
            .and_then(|bytes| parse(&bytes).ok())
            .and_then(|parsed| parsed.pages.into_iter().nth(index as usize));
        let Some(layout) = layout else {
            s.last_error = FPDF_ERR_FILE;
            return std::ptr::null_mut();
        };
        if !s.check("FPDF_LoadPage", &[("document", doc_id)]) {
            return std::ptr::null_mut();
        }
        let id = s.allocate();
        s.pages.insert(
            id,
            PageState {
                document: doc_id,
                index: index as usize,
                layout,
                progress: None,
            },
        );
        s.stats.pages_loaded += 1;
        to_ptr(id)
    }

    unsafe fn close_page(&self, page: FPDF_PAGE) {
        let id = to_id(page);
        let mut s = self.lock();
        let Some(state) = s.pages.remove(&id) else {
            s.stale("FPDF_ClosePage", "page", id);
            return;
        };
        s.released.insert(id);
        s.stats.pages_closed += 1;
        let texts = s.text_pages.values().filter(|t| t.page == id).count();
        if texts > 0 {
            s.violation(format!("FPDF_ClosePage with {texts} open text pages"));
        }
        if s.forms.values().any(|f| f.pages.contains(&id)) {
            s.violation(format!(
                "FPDF_ClosePage on page {} still registered with a form",
                state.index
            ));
        }
        if state.progress.is_some() {
            s.violation("FPDF_ClosePage during a progressive render");
        }
    }

    unsafe fn get_page_width(&self, page: FPDF_PAGE) -> f32 {
        let id = to_id(page);
        let mut s = self.lock();
        if !s.check("FPDF_GetPageWidthF", &[("page", id)]) {
            return 0.0;
        }
        s.pages[&id].layout.width
    }

    unsafe fn get_page_height(&self, page: FPDF_PAGE) -> f32 {
        let id = to_id(page);
        let mut s = self.lock();
        if !s.check("FPDF_GetPageHeightF", &[("page", id)]) {
            return 0.0;
        }
        s.pages[&id].layout.height
    }

    unsafe fn get_page_size_by_index(
        &self,
        document: FPDF_DOCUMENT,
        index: c_int,
        size: *mut FS_SIZEF,
    ) -> FPDF_BOOL {
        let id = to_id(document);
        let mut s = self.lock();
        if !s.check("FPDF_GetPageSizeByIndexF", &[("document", id)]) || size.is_null() {
            return 0;
        }
        let pages = &s.documents[&id].parsed.pages;
        let Some(page) = usize::try_from(index).ok().and_then(|i| pages.get(i)) else {
            return 0;
        };
        *size = FS_SIZEF {
            width: page.width,
            height: page.height,
        };
        1
    }

    unsafe fn get_page_label(
        &self,
        document: FPDF_DOCUMENT,
        index: c_int,
        buffer: *mut c_void,
        buflen: c_ulong,
    ) -> c_ulong {
        let id = to_id(document);
        let mut s = self.lock();
        if !s.check("FPDF_GetPageLabel", &[("document", id)]) {
            return 0;
        }
        let pages = &s.documents[&id].parsed.pages;
        let label = usize::try_from(index)
            .ok()
            .and_then(|i| pages.get(i))
            .and_then(|page| page.label.as_deref());
        let Some(label) = label else {
            return 0;
        };
        let mut encoded: Vec<u8> = label.encode_utf16().flat_map(u16::to_le_bytes).collect();
        encoded.extend_from_slice(&[0, 0]);
        if !buffer.is_null() && buflen as usize >= encoded.len() {
            std::ptr::copy_nonoverlapping(encoded.as_ptr(), buffer.cast(), encoded.len());
        }
        encoded.len() as c_ulong
    }

    unsafe fn get_page_bounding_box(&self, page: FPDF_PAGE, rect: *mut FS_RECTF) -> FPDF_BOOL {
        let id = to_id(page);
        let mut s = self.lock();
        if !s.check("FPDF_GetPageBoundingBox", &[("page", id)]) || rect.is_null() {
            return 0;
        }
        let layout = &s.pages[&id].layout;
        *rect = FS_RECTF {
            left: 0.0,
            top: layout.height,
            right: layout.width,
            bottom: 0.0,
        };
        1
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
        let id = to_id(page);
        let mut s = self.lock();
        if !s.check("FPDF_DeviceToPage", &[("page", id)]) || page_x.is_null() || page_y.is_null()
        {
            return 0;
        }
        let layout = &s.pages[&id].layout;
        let size = (layout.width, layout.height);
        let Some(inv) = layout_matrix((start_x, start_y), (size_x, size_y), rotate, size)
            .as_ref()
            .and_then(invert)
        else {
            return 0;
        };
        let (dx, dy) = (device_x as f64, device_y as f64);
        let x = inv.a as f64 * dx + inv.c as f64 * dy + inv.e as f64;
        let y = inv.b as f64 * dx + inv.d as f64 * dy + inv.f as f64;
        *page_x = x;
        *page_y = size.1 as f64 - y;
        1
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
        let id = to_id(page);
        let mut s = self.lock();
        if !s.check("FPDF_PageToDevice", &[("page", id)])
            || device_x.is_null()
            || device_y.is_null()
        {
            return 0;
        }
        let layout = &s.pages[&id].layout;
        let size = (layout.width, layout.height);
        let Some(m) = layout_matrix((start_x, start_y), (size_x, size_y), rotate, size)
            .filter(|m| invert(m).is_some())
        else {
            return 0;
        };
        let (x, y) = (page_x, size.1 as f64 - page_y);
        *device_x = (m.a as f64 * x + m.c as f64 * y + m.e as f64).round() as c_int;
        *device_y = (m.b as f64 * x + m.d as f64 * y + m.f as f64).round() as c_int;
        1
    }

    unsafe fn render_page_bitmap_with_matrix(
        &self,
        bitmap: FPDF_BITMAP,
        page: FPDF_PAGE,
        matrix: *const FS_MATRIX,
        clipping: *const FS_RECTF,
        flags: c_int,
    ) -> c_ulong {
        self.exercise_fonts();
        let (bitmap_id, page_id) = (to_id(bitmap), to_id(page));
        let mut guard = self.lock();
        let s = &mut *guard;
        if !s.check(
            "FPDF_RenderPageBitmapWithMatrix",
            &[("page", page_id), ("bitmap", bitmap_id)],
        ) {
            return FPDF_ERR_UNKNOWN;
        }
        s.stats.renders += 1;
        s.stats.last_render_flags = Some(flags);
        if std::mem::take(&mut s.fail_next_render) {
            s.last_error = FPDF_ERR_UNKNOWN;
            return FPDF_ERR_UNKNOWN;
        }
        let matrix = if matrix.is_null() {
            FS_MATRIX {
                a: 1.0,
                d: 1.0,
                ..FS_MATRIX::default()
            }
        } else {
            *matrix
        };
        let clip = (!clipping.is_null()).then(|| *clipping);
        let page = &s.pages[&page_id];
        let seed = page_seed(&page.layout, page.index);
        let size = (page.layout.width, page.layout.height);
        if let Some(bitmap) = s.bitmaps.get_mut(&bitmap_id) {
            let rows = 0..bitmap.height;
            paint(bitmap, rows, &matrix, clip, seed, size);
        }
        FPDF_ERR_SUCCESS
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
        self.exercise_fonts();
        let (bitmap_id, page_id) = (to_id(bitmap), to_id(page));
        {
            let mut guard = self.lock();
            let s = &mut *guard;
            if !s.check(
                "FPDF_RenderPageBitmap_Start",
                &[("page", page_id), ("bitmap", bitmap_id)],
            ) {
                return FPDF_RENDER_FAILED;
            }
            s.stats.renders += 1;
            s.stats.last_render_flags = Some(flags);
            if std::mem::take(&mut s.fail_next_render) {
                s.last_error = FPDF_ERR_UNKNOWN;
                return FPDF_RENDER_FAILED;
            }
            let in_progress = s.pages[&page_id].progress.is_some();
            if in_progress {
                s.violation("FPDF_RenderPageBitmap_Start while a render is in progress");
            }
            let page = match s.pages.get_mut(&page_id) {
                Some(page) => page,
                None => return FPDF_RENDER_FAILED,
            };
            let size = (page.layout.width, page.layout.height);
            let Some(matrix) = layout_matrix((start_x, start_y), (size_x, size_y), rotate, size)
            else {
                return FPDF_RENDER_FAILED;
            };
            page.progress = Some(Progress {
                bitmap: bitmap_id,
                matrix,
                next_row: 0,
            });
        }
        self.run_progress(page_id, pause)
    }

    unsafe fn render_page_continue(&self, page: FPDF_PAGE, pause: *mut IFSDK_PAUSE) -> c_int {
        let page_id = to_id(page);
        if !self.lock().check("FPDF_RenderPage_Continue", &[("page", page_id)]) {
            return FPDF_RENDER_FAILED;
        }
        self.run_progress(page_id, pause)
    }

    unsafe fn render_page_close(&self, page: FPDF_PAGE) {
        let page_id = to_id(page);
        let mut s = self.lock();
        if s.check("FPDF_RenderPage_Close", &[("page", page_id)]) {
            if let Some(page) = s.pages.get_mut(&page_id) {
                page.progress = None;
            }
        }
    }

    unsafe fn bitmap_create_ex(
        &self,
        width: c_int,
        height: c_int,
        format: c_int,
        first_scan: *mut c_void,
        stride: c_int,
    ) -> FPDF_BITMAP {
        let mut s = self.lock();
        if !s.require_init("FPDFBitmap_CreateEx") || std::mem::take(&mut s.fail_next_bitmap) {
            return std::ptr::null_mut();
        }
        let Some(bpp) = bytes_per_pixel(format) else {
            return std::ptr::null_mut();
        };
        if width <= 0 || height <= 0 {
            return std::ptr::null_mut();
        }
        let (width, height) = (width as usize, height as usize);
        let min_stride = width * bpp;
        let stride = if stride > 0 {
            if (stride as usize) < min_stride {
                return std::ptr::null_mut();
            }
            stride as usize
        } else {
            min_stride.div_ceil(4) * 4
        };
        let store = if first_scan.is_null() {
            PixelStore::Owned(vec![0; stride * height])
        } else {
            PixelStore::External {
                addr: first_scan as usize,
                len: stride * height,
            }
        };
        let id = s.allocate();
        s.bitmaps.insert(
            id,
            BitmapState {
                width,
                height,
                bpp,
                stride,
                store,
            },
        );
        s.stats.bitmaps_created += 1;
        to_ptr(id)
    }

    unsafe fn bitmap_destroy(&self, bitmap: FPDF_BITMAP) {
        let id = to_id(bitmap);
        let mut s = self.lock();
        if s.bitmaps.remove(&id).is_none() {
            s.stale("FPDFBitmap_Destroy", "bitmap", id);
            return;
        }
        s.released.insert(id);
        s.stats.bitmaps_destroyed += 1;
        let rendering = s
            .pages
            .values()
            .any(|p| p.progress.as_ref().is_some_and(|r| r.bitmap == id));
        if rendering {
            s.violation("FPDFBitmap_Destroy during a progressive render");
        }
    }

    unsafe fn bitmap_get_buffer(&self, bitmap: FPDF_BITMAP) -> *mut c_void {
        let id = to_id(bitmap);
        let mut s = self.lock();
        if !s.check("FPDFBitmap_GetBuffer", &[("bitmap", id)]) {
            return std::ptr::null_mut();
        }
        s.bitmaps
            .get_mut(&id)
            .map_or(std::ptr::null_mut(), |b| b.pixels().as_mut_ptr().cast())
    }

    unsafe fn bitmap_get_stride(&self, bitmap: FPDF_BITMAP) -> c_int {
        let id = to_id(bitmap);
        let mut s = self.lock();
        if !s.check("FPDFBitmap_GetStride", &[("bitmap", id)]) {
            return 0;
        }
        s.bitmaps[&id].stride as c_int
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
        let id = to_id(bitmap);
        let mut s = self.lock();
        if !s.check("FPDFBitmap_FillRect", &[("bitmap", id)]) {
            return 0;
        }
        let Some(b) = s.bitmaps.get_mut(&id) else {
            return 0;
        };
        let channel = |shift: u32| ((color >> shift) & 0xFF) as u8;
        let (a, r, g, bl) = (channel(24), channel(16), channel(8), channel(0));
        let pixel: Vec<u8> = match b.bpp {
            1 => vec![((r as u32 * 299 + g as u32 * 587 + bl as u32 * 114) / 1000) as u8],
            3 => vec![bl, g, r],
            _ => vec![bl, g, r, a],
        };
        let (stride, bpp) = (b.stride, b.bpp);
        let x0 = left.max(0) as usize;
        let y0 = top.max(0) as usize;
        let x1 = ((left as i64 + width as i64).max(0) as usize).min(b.width);
        let y1 = ((top as i64 + height as i64).max(0) as usize).min(b.height);
        let buffer = b.pixels();
        for y in y0..y1 {
            for x in x0..x1 {
                let offset = y * stride + x * bpp;
                buffer[offset..offset + bpp].copy_from_slice(&pixel);
            }
        }
        1
    }

    unsafe fn text_load_page(&self, page: FPDF_PAGE) -> FPDF_TEXTPAGE {
        let page_id = to_id(page);
        let mut s = self.lock();
        if !s.require_init("FPDFText_LoadPage")
            || !s.check("FPDFText_LoadPage", &[("page", page_id)])
        {
            return std::ptr::null_mut();
        }
        let units = s.pages[&page_id].layout.lines.join("\r\n").encode_utf16().collect();
        let id = s.allocate();
        s.text_pages.insert(
            id,
            TextState {
                page: page_id,
                units,
            },
        );
        s.stats.text_pages_loaded += 1;
        to_ptr(id)
    }

    unsafe fn text_close_page(&self, text_page: FPDF_TEXTPAGE) {
        let id = to_id(text_page);
        let mut s = self.lock();
        if s.text_pages.remove(&id).is_none() {
            s.stale("FPDFText_ClosePage", "text page", id);
            return;
        }
        s.released.insert(id);
        s.stats.text_pages_closed += 1;
    }

    unsafe fn text_count_chars(&self, text_page: FPDF_TEXTPAGE) -> c_int {
        let id = to_id(text_page);
        let mut s = self.lock();
        if !s.check("FPDFText_CountChars", &[("text page", id)]) {
            return -1;
        }
        s.text_pages[&id].units.len() as c_int
    }

    unsafe fn text_get_text(
        &self,
        text_page: FPDF_TEXTPAGE,
        start_index: c_int,
        count: c_int,
        result: *mut c_ushort,
    ) -> c_int {
        let id = to_id(text_page);
        let mut s = self.lock();
        if !s.check("FPDFText_GetText", &[("text page", id)]) {
            return 0;
        }
        let units = &s.text_pages[&id].units;
        if start_index < 0 || count < 0 || result.is_null() || start_index as usize > units.len() {
            return 0;
        }
        let start = start_index as usize;
        let n = (count as usize).min(units.len() - start);
        std::ptr::copy_nonoverlapping(units[start..].as_ptr(), result, n);
        *result.add(n) = 0;
        (n + 1) as c_int
    }

    unsafe fn init_form_fill_environment(
        &self,
        document: FPDF_DOCUMENT,
        info: *mut FPDF_FORMFILLINFO,
    ) -> FPDF_FORMHANDLE {
        let doc_id = to_id(document);
        let mut s = self.lock();
        if !s.require_init("FPDFDOC_InitFormFillEnvironment")
            || !s.check("FPDFDOC_InitFormFillEnvironment", &[("document", doc_id)])
            || info.is_null()
        {
            return std::ptr::null_mut();
        }
        if s.forms.values().any(|f| f.document == doc_id) {
            s.violation("FPDFDOC_InitFormFillEnvironment twice on one document");
        }
        let id = s.allocate();
        s.forms.insert(
            id,
            FormState {
                document: doc_id,
                info: info as usize,
                pages: Vec::new(),
            },
        );
        s.stats.forms_initialized += 1;
        to_ptr(id)
    }

    unsafe fn exit_form_fill_environment(&self, form: FPDF_FORMHANDLE) {
        let id = to_id(form);
        let mut s = self.lock();
        let Some(state) = s.forms.remove(&id) else {
            s.stale("FPDFDOC_ExitFormFillEnvironment", "form environment", id);
            return;
        };
        s.released.insert(id);
        s.stats.forms_exited += 1;
        if !state.pages.is_empty() {
            s.violation(format!(
                "FPDFDOC_ExitFormFillEnvironment with {} pages still registered",
                state.pages.len()
            ));
        }
    }

    unsafe fn form_on_after_load_page(&self, page: FPDF_PAGE, form: FPDF_FORMHANDLE) {
        let (page_id, form_id) = (to_id(page), to_id(form));
        let (info, document, index, change) = {
            let mut guard = self.lock();
            let s = &mut *guard;
            if !s.check(
                "FORM_OnAfterLoadPage",
                &[("page", page_id), ("form environment", form_id)],
            ) {
                return;
            }
            let index = s.pages[&page_id].index;
            let change = s.change_on_load == Some(index);
            if change {
                s.change_on_load = None;
            }
            let Some(state) = s.forms.get_mut(&form_id) else {
                return;
            };
            let duplicate = state.pages.contains(&page_id);
            state.pages.push(page_id);
            let found = (state.info, state.document, index, change);
            if duplicate {
                s.violation("FORM_OnAfterLoadPage twice for one page");
            }
            found
        };

        let info = info as *mut FPDF_FORMFILLINFO;
        if let Some(get_page) = (*info).FFI_GetPage {
            let found = get_page(info, to_ptr(document), index as c_int);
            if found != page {
                self.lock()
                    .violation(format!("FFI_GetPage({index}) did not return the loaded page"));
            }
        }
        if change {
            if let Some(on_change) = (*info).FFI_OnChange {
                on_change(info);
            }
        }
    }

    unsafe fn form_on_before_close_page(&self, page: FPDF_PAGE, form: FPDF_FORMHANDLE) {
        let (page_id, form_id) = (to_id(page), to_id(form));
        let mut s = self.lock();
        if !s.check(
            "FORM_OnBeforeClosePage",
            &[("page", page_id), ("form environment", form_id)],
        ) {
            return;
        }
        let removed = s.forms.get_mut(&form_id).is_some_and(|state| {
            let before = state.pages.len();
            state.pages.retain(|&p| p != page_id);
            state.pages.len() < before
        });
        if !removed {
            s.violation("FORM_OnBeforeClosePage for a page the form never saw");
        }
    }

    unsafe fn form_do_page_aaction(&self, page: FPDF_PAGE, form: FPDF_FORMHANDLE, aa_type: c_int) {
        let (page_id, form_id) = (to_id(page), to_id(form));
        let mut s = self.lock();
        if !s.check(
            "FORM_DoPageAAction",
            &[("page", page_id), ("form environment", form_id)],
        ) {
            return;
        }
        let index = s.pages[&page_id].index;
        s.stats.page_actions.push((index, aa_type));
    }

    unsafe fn ffl_draw(
        &self,
        form: FPDF_FORMHANDLE,
        bitmap: FPDF_BITMAP,
        page: FPDF_PAGE,
        start_x: c_int,
        start_y: c_int,
        _size_x: c_int,
        _size_y: c_int,
        _rotate: c_int,
        _flags: c_int,
    ) {
        let (form_id, bitmap_id, page_id) = (to_id(form), to_id(bitmap), to_id(page));
        let (info, width, height) = {
            let mut guard = self.lock();
            let s = &mut *guard;
            if !s.check(
                "FPDF_FFLDraw",
                &[
                    ("form environment", form_id),
                    ("bitmap", bitmap_id),
                    ("page", page_id),
                ],
            ) {
                return;
            }
            if !s.forms[&form_id].pages.contains(&page_id) {
                s.violation("FPDF_FFLDraw on a page the form never saw");
            }
            s.stats.form_draws += 1;
            if let Some(b) = s.bitmaps.get_mut(&bitmap_id) {
                let (x, y) = (start_x.max(0) as usize, start_y.max(0) as usize);
                if x < b.width && y < b.height {
                    let (offset, bpp) = (y * b.stride + x * b.bpp, b.bpp);
                    b.pixels()[offset..offset + bpp].fill(FORM_MARKER);
                }
            }
            let layout = &s.pages[&page_id].layout;
            (s.forms[&form_id].info, layout.width, layout.height)
        };

        let info = info as *mut FPDF_FORMFILLINFO;
        if let Some(invalidate) = (*info).FFI_Invalidate {
            invalidate(info, page, 0.0, height as f64, width as f64, 0.0);
        }
    }
}
