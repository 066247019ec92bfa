//! Process-wide PDFium initialization.
//!
//! PDFium has one global init/shutdown pair. [`Runtime`] turns it into a
//! reference-counted guard: the first live guard initializes the engine, the
//! last one to drop shuts it down. Every session and render target holds a
//! guard, so the engine cannot go away underneath a native handle.

use crate::document::DocumentSession;
use crate::engine::{Engine, NativeEngine};
use crate::error::{ErrorCode, PdfError, Result};
use crate::font::{FontBridge, FontProvider};
use crate::render::{PixelFormat, RenderTarget};
use pdfium_guard_sys::{
    c_char, FPDF_LIBRARY_CONFIG, FPDF_RENDERERTYPE_AGG, FPDF_RENDERERTYPE_SKIA,
};
use std::ffi::CString;
use std::fmt;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

// ============================================================================
// Configuration
// ============================================================================

/// Rasterizer backend requested at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RendererType {
    #[default]
    Agg,
    /// Only honoured by PDFium builds with Skia enabled.
    Skia,
}

/// Options for the 0→1 initialization.
///
/// # Example
///
/// ```no_run
/// use pdfium_guard::{LibraryConfig, RendererType, Runtime};
///
/// let config = LibraryConfig::new()
///     .with_font_path("/usr/share/fonts/truetype")
///     .with_renderer(RendererType::Agg);
/// let runtime = Runtime::acquire_with_config(&config)?;
/// # Ok::<(), pdfium_guard::PdfError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct LibraryConfig {
    font_paths: Vec<PathBuf>,
    renderer: RendererType,
}

impl LibraryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory PDFium scans for fonts.
    pub fn with_font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_paths.push(path.into());
        self
    }

    pub fn with_renderer(mut self, renderer: RendererType) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn font_paths(&self) -> &[PathBuf] {
        &self.font_paths
    }

    pub fn renderer(&self) -> RendererType {
        self.renderer
    }
}

/// NUL-terminated font path array. PDFium keeps the pointer and reads it
/// lazily, so it lives in the runtime state until shutdown.
struct FontPaths {
    _strings: Vec<CString>,
    pointers: Vec<*const c_char>,
}

// SAFETY: the pointers refer into `_strings`, which never change after
// construction and are freed together with them.
unsafe impl Send for FontPaths {}

impl FontPaths {
    fn new(paths: &[PathBuf]) -> Result<Option<Self>> {
        if paths.is_empty() {
            return Ok(None);
        }
        let strings = paths
            .iter()
            .map(|p| path_to_cstring(p))
            .collect::<Result<Vec<_>>>()?;
        let mut pointers: Vec<*const c_char> = strings.iter().map(|s| s.as_ptr()).collect();
        pointers.push(std::ptr::null());
        Ok(Some(Self {
            _strings: strings,
            pointers,
        }))
    }
}

pub(crate) fn path_to_cstring(path: &Path) -> Result<CString> {
    #[cfg(unix)]
    let bytes = {
        use std::os::unix::ffi::OsStrExt;
        path.as_os_str().as_bytes().to_vec()
    };
    #[cfg(not(unix))]
    let bytes = path
        .to_str()
        .ok_or_else(|| PdfError::InvalidData(format!("non-UTF-8 path {}", path.display())))?
        .as_bytes()
        .to_vec();

    CString::new(bytes)
        .map_err(|_| PdfError::InvalidData(format!("path {} contains NUL", path.display())))
}

// ============================================================================
// Global state
// ============================================================================

struct RuntimeState {
    references: usize,
    engine: Option<Arc<dyn Engine>>,
    font_paths: Option<FontPaths>,
    // The active bridge is last. Replaced bridges stay here because PDFium
    // may still be inside a callback on another thread.
    fonts: Vec<FontBridge>,
}

static RUNTIME: Mutex<RuntimeState> = Mutex::new(RuntimeState {
    references: 0,
    engine: None,
    font_paths: None,
    fonts: Vec::new(),
});

fn lock_state() -> MutexGuard<'static, RuntimeState> {
    RUNTIME.lock().unwrap_or_else(|e| e.into_inner())
}

fn same_engine(a: &Arc<dyn Engine>, b: &Arc<dyn Engine>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

fn initialize(
    state: &mut RuntimeState,
    engine: Arc<dyn Engine>,
    config: &LibraryConfig,
) -> Result<()> {
    let font_paths = FontPaths::new(&config.font_paths)?;
    let sys = FPDF_LIBRARY_CONFIG {
        version: 4,
        m_pUserFontPaths: font_paths
            .as_ref()
            .map_or(std::ptr::null_mut(), |p| p.pointers.as_ptr() as *mut *const c_char),
        m_pIsolate: std::ptr::null_mut(),
        m_v8EmbedderSlot: 0,
        m_pPlatform: std::ptr::null_mut(),
        m_RendererType: match config.renderer {
            RendererType::Agg => FPDF_RENDERERTYPE_AGG,
            RendererType::Skia => FPDF_RENDERERTYPE_SKIA,
        },
    };

    // SAFETY: `sys` and the font path array outlive the call; the path array
    // is kept in the runtime state until shutdown.
    let code = unsafe {
        engine.init_library(&sys);
        ErrorCode::from_raw(engine.get_last_error())
    };
    if let Some(code) = code {
        unsafe { engine.destroy_library() };
        return Err(PdfError::InitializationFailed {
            reason: code.to_string(),
        });
    }

    tracing::debug!(
        "PDFium initialized ({} font paths, {:?} renderer)",
        config.font_paths.len(),
        config.renderer
    );
    state.engine = Some(engine);
    state.font_paths = font_paths;
    Ok(())
}

fn shutdown(state: &mut RuntimeState) {
    if let Some(engine) = state.engine.take() {
        // SAFETY: the reference count reached zero, so no handle created by
        // this engine is alive.
        unsafe { engine.destroy_library() };
    }
    // Only after the library is gone: it may call into font bridges until then.
    let retired = state.fonts.len();
    state.fonts.clear();
    state.font_paths = None;
    tracing::debug!("PDFium shut down ({} font bridges freed)", retired);
}

fn release_reference() {
    let mut state = lock_state();
    if state.references == 0 {
        drop(state);
        panic!("PDFium runtime released more times than it was acquired");
    }
    state.references -= 1;
    if state.references == 0 {
        shutdown(&mut state);
    }
}

// ============================================================================
// Runtime guard
// ============================================================================

/// One reference to the initialized PDFium engine.
///
/// Cloning takes another reference. Dropping releases it; the last release
/// shuts the engine down. Safe to acquire and release from any thread.
pub struct Runtime {
    engine: Arc<dyn Engine>,
}

impl Runtime {
    /// Acquire the runtime, loading the native library on first use.
    ///
    /// When an engine is already active (for example a
    /// [`MockEngine`](crate::mock::MockEngine)), this joins it.
    pub fn acquire() -> Result<Self> {
        Self::acquire_with_config(&LibraryConfig::default())
    }

    /// Like [`acquire`](Self::acquire). `config` only matters when this call
    /// performs the initialization.
    pub fn acquire_with_config(config: &LibraryConfig) -> Result<Self> {
        let mut state = lock_state();
        if state.references > 0 {
            if let Some(engine) = state.engine.clone() {
                state.references += 1;
                return Ok(Self { engine });
            }
        }
        let engine: Arc<dyn Engine> = Arc::new(NativeEngine::load()?);
        Self::acquire_locked(&mut state, engine, config)
    }

    /// Acquire the runtime on a specific engine.
    ///
    /// Fails with `InitializationFailed` if a different engine is already
    /// active.
    pub fn acquire_with(engine: Arc<dyn Engine>, config: &LibraryConfig) -> Result<Self> {
        let mut state = lock_state();
        Self::acquire_locked(&mut state, engine, config)
    }

    fn acquire_locked(
        state: &mut RuntimeState,
        engine: Arc<dyn Engine>,
        config: &LibraryConfig,
    ) -> Result<Self> {
        if state.references == 0 {
            initialize(state, engine.clone(), config)?;
        } else if let Some(active) = &state.engine {
            if !same_engine(active, &engine) {
                return Err(PdfError::InitializationFailed {
                    reason: "a different PDFium engine is already active".to_string(),
                });
            }
        }
        state.references += 1;
        Ok(Self { engine })
    }

    /// Release this reference. Same as dropping it.
    pub fn release(self) {
        drop(self)
    }

    /// Number of live guards in the process.
    pub fn reference_count() -> usize {
        lock_state().references
    }

    pub fn is_initialized() -> bool {
        let state = lock_state();
        state.engine.is_some() && state.references > 0
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Serve system fonts from `provider` for the rest of this runtime's
    /// life. A later call replaces the provider.
    pub fn set_font_provider(&self, provider: impl FontProvider + 'static) {
        let mut state = lock_state();
        let bridge = FontBridge::new(self.engine.clone(), Box::new(provider));
        // SAFETY: the bridge is stored in the runtime state below and freed
        // only after FPDF_DestroyLibrary.
        unsafe { self.engine.set_system_font_info(bridge.as_sys_ptr()) };
        state.fonts.push(bridge);
        tracing::debug!("Installed system font provider");
    }

    /// Shorthand for [`DocumentSession::open_from_bytes`].
    pub fn open_from_bytes(
        &self,
        bytes: impl Into<Vec<u8>>,
        password: Option<&str>,
    ) -> Result<DocumentSession> {
        DocumentSession::open_from_bytes(self, bytes, password)
    }

    /// Shorthand for [`DocumentSession::open_from_stream`].
    pub fn open_from_stream<R>(&self, reader: R, password: Option<&str>) -> Result<DocumentSession>
    where
        R: Read + Seek + 'static,
    {
        DocumentSession::open_from_stream(self, reader, password)
    }

    /// Shorthand for [`DocumentSession::open_from_file`].
    pub fn open_from_file(
        &self,
        path: impl AsRef<Path>,
        password: Option<&str>,
    ) -> Result<DocumentSession> {
        DocumentSession::open_from_file(self, path, password)
    }

    /// Shorthand for [`RenderTarget::new`].
    pub fn create_target(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<RenderTarget<'static>> {
        RenderTarget::new(self, width, height, format)
    }
}

impl Clone for Runtime {
    fn clone(&self) -> Self {
        let mut state = lock_state();
        state.references += 1;
        Self {
            engine: self.engine.clone(),
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        release_reference();
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("references", &Runtime::reference_count())
            .finish()
    }
}
