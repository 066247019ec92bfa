//! # pdfium-guard
//!
//! Safe lifetime management for PDFium.
//!
//! PDFium hands out raw pointers with strict ordering rules: pages before
//! documents, form environments around pages, everything before the library
//! itself. This crate owns those pointers and enforces the order:
//!
//! - **[`Runtime`]** is a reference-counted guard over library initialization
//! - **[`DocumentSession`]** owns a document, its pages, text pages and form
//!   environment, and tears them down child-first
//! - **[`Page`]** and **[`FormEnvironment`]** are tokens into a session that
//!   report `InvalidHandle` once the session is gone
//! - **[`RenderTarget`]** is a bitmap that can be read only while no render
//!   writes to it
//! - Host callbacks (streams, fonts, forms) never unwind across the C boundary;
//!   their failures surface as errors from the call that triggered them
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdfium_guard::{DocumentSession, PixelFormat, RenderFlags, RenderTarget, Runtime, Transform};
//!
//! let runtime = Runtime::acquire()?;
//! let doc = DocumentSession::open_from_file(&runtime, "document.pdf", None)?;
//!
//! for index in 0..doc.page_count() {
//!     let page = doc.load_page(index)?;
//!     println!("{}", page.text()?);
//!
//!     let size = page.size()?;
//!     let (width, height) = (size.width as u32 * 2, size.height as u32 * 2);
//!     let target = RenderTarget::new(&runtime, width, height, PixelFormat::Bgra)?;
//!     page.render(&target, &Transform::fit(size, width, height), RenderFlags::ANNOTATIONS)?;
//!     target.save_as_png(format!("page_{index}.png"))?;
//! }
//!
//! doc.close()?;
//! # Ok::<(), pdfium_guard::PdfError>(())
//! ```

mod bridge;
mod cancel;
mod document;
mod engine;
mod error;
mod font;
mod form;
mod handle;
pub mod mock;
mod page;
mod render;
mod runtime;
mod stream;
mod text;

pub use cancel::CancelFlag;
pub use document::{CloseError, DocumentSession, MetadataTag, OpenOptions, Version};
pub use engine::{Engine, NativeEngine};
pub use error::{CallbackError, ErrorCode, LifecycleError, PdfError, Result};
pub use font::{
    CallbackResult, Charset, FontId, FontMatch, FontProvider, FontRegistry, FontRequest,
};
pub use form::{
    Cursor, FormCallbacks, FormConfig, FormEnvironment, NoopFormCallbacks, PageRect,
};
pub use handle::{kind, HandleKind, HandleRef, OpaqueHandle};
pub use page::{Page, PageRotation, PageSize, RenderFlags, RenderLayout, Transform};
pub use render::{Color, PixelFormat, Pixels, PixelsMut, RenderTarget};
pub use runtime::{LibraryConfig, RendererType, Runtime};
pub use text::{TextRun, TextRuns};

/// Raw PDFium types, for implementing [`Engine`].
pub use pdfium_guard_sys as sys;
