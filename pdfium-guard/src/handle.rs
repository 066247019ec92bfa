//! Owned wrapper for raw PDFium handles.
//!
//! An [`OpaqueHandle`] owns exactly one native object and runs its
//! destructor exactly once. Code that needs the raw pointer goes through
//! [`OpaqueHandle::borrow`], which refuses once the handle is destroyed, so a
//! stale handle is caught before it reaches native code.

use crate::engine::Engine;
use crate::error::{LifecycleError, PdfError, Result};
use pdfium_guard_sys::*;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::Arc;

/// A category of native object and the call that frees it.
pub trait HandleKind: 'static {
    /// Pointee of the PDFium handle typedef.
    type Raw;

    /// Name used in error messages.
    const NAME: &'static str;

    /// # Safety
    ///
    /// `raw` must be a live handle of this kind created by `engine`.
    unsafe fn release(engine: &dyn Engine, raw: *mut Self::Raw);
}

/// Handle kinds. These are never instantiated.
pub mod kind {
    use super::*;

    pub enum Document {}
    pub enum Page {}
    pub enum Bitmap {}
    pub enum FormEnv {}
    pub enum TextPage {}

    impl HandleKind for Document {
        type Raw = fpdf_document_t__;
        const NAME: &'static str = "document";

        unsafe fn release(engine: &dyn Engine, raw: *mut Self::Raw) {
            engine.close_document(raw)
        }
    }

    impl HandleKind for Page {
        type Raw = fpdf_page_t__;
        const NAME: &'static str = "page";

        unsafe fn release(engine: &dyn Engine, raw: *mut Self::Raw) {
            engine.close_page(raw)
        }
    }

    impl HandleKind for Bitmap {
        type Raw = fpdf_bitmap_t__;
        const NAME: &'static str = "bitmap";

        unsafe fn release(engine: &dyn Engine, raw: *mut Self::Raw) {
            engine.bitmap_destroy(raw)
        }
    }

    impl HandleKind for FormEnv {
        type Raw = fpdf_form_handle_t__;
        const NAME: &'static str = "form environment";

        unsafe fn release(engine: &dyn Engine, raw: *mut Self::Raw) {
            engine.exit_form_fill_environment(raw)
        }
    }

    impl HandleKind for TextPage {
        type Raw = fpdf_textpage_t__;
        const NAME: &'static str = "text page";

        unsafe fn release(engine: &dyn Engine, raw: *mut Self::Raw) {
            engine.text_close_page(raw)
        }
    }
}

/// Exclusive owner of one native handle.
///
/// Not `Clone`: the only copyable view is the [`HandleRef`] returned by
/// [`borrow`](Self::borrow).
pub struct OpaqueHandle<K: HandleKind> {
    raw: NonNull<K::Raw>,
    valid: bool,
    engine: Arc<dyn Engine>,
}

impl<K: HandleKind> OpaqueHandle<K> {
    /// Take ownership of `raw`. Returns `None` for a null pointer, which is
    /// how PDFium reports a failed constructor.
    ///
    /// # Safety
    ///
    /// A non-null `raw` must be a live handle of kind `K` created by `engine`
    /// and not owned by anything else.
    pub unsafe fn wrap(engine: Arc<dyn Engine>, raw: *mut K::Raw) -> Option<Self> {
        NonNull::new(raw).map(|raw| Self {
            raw,
            valid: true,
            engine,
        })
    }

    /// Run the native destructor. A second call fails without touching
    /// native code.
    pub fn destroy(&mut self) -> Result<()> {
        if !self.valid {
            return Err(LifecycleError::AlreadyDestroyed { kind: K::NAME }.into());
        }
        self.valid = false;
        // SAFETY: `wrap` established that `raw` is live and owned by us, and
        // `valid` guarantees this is the first release.
        unsafe { K::release(&*self.engine, self.raw.as_ptr()) };
        Ok(())
    }

    /// Non-owning view for passing into a native call.
    pub fn borrow(&self) -> Result<HandleRef<'_, K>> {
        if !self.valid {
            return Err(PdfError::InvalidHandle { kind: K::NAME });
        }
        Ok(HandleRef {
            raw: self.raw,
            _owner: PhantomData,
        })
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }
}

impl<K: HandleKind> Drop for OpaqueHandle<K> {
    fn drop(&mut self) {
        if self.valid {
            let _ = self.destroy();
        }
    }
}

impl<K: HandleKind> fmt::Debug for OpaqueHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpaqueHandle")
            .field("kind", &K::NAME)
            .field("raw", &self.raw)
            .field("valid", &self.valid)
            .finish()
    }
}

/// Borrowed raw handle, valid for as long as the owning [`OpaqueHandle`] is
/// borrowed.
pub struct HandleRef<'a, K: HandleKind> {
    raw: NonNull<K::Raw>,
    _owner: PhantomData<&'a OpaqueHandle<K>>,
}

impl<K: HandleKind> HandleRef<'_, K> {
    pub fn as_ptr(self) -> *mut K::Raw {
        self.raw.as_ptr()
    }
}

impl<K: HandleKind> Clone for HandleRef<'_, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: HandleKind> Copy for HandleRef<'_, K> {}

impl<K: HandleKind> fmt::Debug for HandleRef<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandleRef<{}>({:p})", K::NAME, self.raw)
    }
}
