//! Error types for pdfium-guard

use pdfium_guard_sys::{
    c_ulong, FPDF_ERR_FILE, FPDF_ERR_FORMAT, FPDF_ERR_PAGE, FPDF_ERR_PASSWORD, FPDF_ERR_SECURITY,
    FPDF_ERR_SUCCESS, FPDF_ERR_UNKNOWN, FPDF_ERR_XFALAYOUT, FPDF_ERR_XFALOAD,
};
use std::any::Any;
use std::fmt;
use thiserror::Error;

/// Result type for pdfium-guard operations
pub type Result<T> = std::result::Result<T, PdfError>;

/// Error types for PDF operations
#[derive(Error, Debug)]
pub enum PdfError {
    /// The native library could not be loaded or initialized
    #[error("Failed to initialize PDFium library: {reason}")]
    InitializationFailed { reason: String },

    /// A destroyed or foreign handle reached an operation
    #[error("Use of invalid {kind} handle")]
    InvalidHandle { kind: &'static str },

    /// A destroy or close that breaks the ownership rules
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Strict close refused because pages are still open
    #[error("Document still has {count} open pages")]
    OutstandingPages { count: usize },

    /// Page index out of range
    #[error("Page index {index} out of range (document has {count} pages)")]
    PageIndexOutOfRange { index: usize, count: usize },

    /// Native page load returned no page
    #[error("Failed to load page {index}")]
    PageLoadFailed { index: usize },

    /// The input is not a readable PDF
    #[error("Malformed document ({code})")]
    MalformedDocument { code: ErrorCode },

    /// Document is encrypted and no password was supplied
    #[error("Document requires a password")]
    PasswordRequired,

    /// Document is encrypted and the supplied password was rejected
    #[error("Wrong password for encrypted document")]
    WrongPassword,

    /// Document uses a security handler or XFA feature the engine lacks
    #[error("Unsupported document format ({code})")]
    UnsupportedFormat { code: ErrorCode },

    /// A cancel flag stopped the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Failed to render page
    #[error("Failed to render page: {reason}")]
    RenderFailed { reason: String },

    /// Native bitmap allocation returned nothing
    #[error("Failed to allocate {width}x{height} bitmap")]
    Allocation { width: u32, height: u32 },

    /// The render target is being rendered into or its pixels are borrowed
    #[error("Render target is busy")]
    TargetBusy,

    /// Second form environment on one session
    #[error("Form environment already attached to this document")]
    FormAlreadyAttached,

    /// Native form environment constructor failed
    #[error("Failed to create form environment: {reason}")]
    FormEnvironmentFailed { reason: String },

    /// Failed to extract text
    #[error("Failed to extract text: {reason}")]
    TextExtractionFailed { reason: String },

    /// A host callback failed while the native library was calling it
    #[error(transparent)]
    Callback(#[from] CallbackError),

    /// Native error with no more specific mapping
    #[error("PDFium error: {0}")]
    Native(ErrorCode),

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// String data that cannot cross the C boundary
    #[error("Invalid string data: {0}")]
    InvalidData(String),

    /// PNG encoding error
    #[error("PNG encoding error: {0}")]
    PngEncoding(String),
}

impl PdfError {
    /// Ownership or lifetime violations. These are bugs in the caller and
    /// should not be retried.
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            PdfError::InvalidHandle { .. }
                | PdfError::Lifecycle(_)
                | PdfError::OutstandingPages { .. }
        )
    }

    /// Password problems, which callers commonly answer by retrying.
    pub fn is_password_error(&self) -> bool {
        matches!(self, PdfError::PasswordRequired | PdfError::WrongPassword)
    }

    /// Map a failed document open to the error a caller can act on.
    pub(crate) fn from_open_failure(code: Option<ErrorCode>, password_supplied: bool) -> Self {
        match code {
            Some(ErrorCode::Password) if password_supplied => PdfError::WrongPassword,
            Some(ErrorCode::Password) => PdfError::PasswordRequired,
            Some(code @ (ErrorCode::Security | ErrorCode::XfaLoad | ErrorCode::XfaLayout)) => {
                PdfError::UnsupportedFormat { code }
            }
            Some(code @ (ErrorCode::Format | ErrorCode::File | ErrorCode::Unknown)) => {
                PdfError::MalformedDocument { code }
            }
            Some(code) => PdfError::Native(code),
            // Null document without an error code.
            None => PdfError::MalformedDocument {
                code: ErrorCode::Unknown,
            },
        }
    }
}

/// Lifetime violations detected before they reach native code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("{kind} handle was already destroyed")]
    AlreadyDestroyed { kind: &'static str },

    #[error("Form environment still serves {pages} open pages")]
    FormInUse { pages: usize },
}

/// Normalized `FPDF_GetLastError` codes.
///
/// The numeric values are stable across native builds, including the XFA
/// codes that non-XFA headers leave undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unknown,
    File,
    Format,
    Password,
    Security,
    Page,
    XfaLoad,
    XfaLayout,
    Unrecognized(u32),
}

impl ErrorCode {
    /// `None` for `FPDF_ERR_SUCCESS`.
    pub fn from_raw(raw: c_ulong) -> Option<Self> {
        let code = match raw {
            FPDF_ERR_SUCCESS => return None,
            FPDF_ERR_UNKNOWN => ErrorCode::Unknown,
            FPDF_ERR_FILE => ErrorCode::File,
            FPDF_ERR_FORMAT => ErrorCode::Format,
            FPDF_ERR_PASSWORD => ErrorCode::Password,
            FPDF_ERR_SECURITY => ErrorCode::Security,
            FPDF_ERR_PAGE => ErrorCode::Page,
            FPDF_ERR_XFALOAD => ErrorCode::XfaLoad,
            FPDF_ERR_XFALAYOUT => ErrorCode::XfaLayout,
            other => ErrorCode::Unrecognized(u32::try_from(other).unwrap_or(u32::MAX)),
        };
        Some(code)
    }

    pub fn as_raw(self) -> u32 {
        match self {
            ErrorCode::Unknown => 1,
            ErrorCode::File => 2,
            ErrorCode::Format => 3,
            ErrorCode::Password => 4,
            ErrorCode::Security => 5,
            ErrorCode::Page => 6,
            ErrorCode::XfaLoad => 7,
            ErrorCode::XfaLayout => 8,
            ErrorCode::Unrecognized(raw) => raw,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::Unknown => "unknown error",
            ErrorCode::File => "file not found or could not be opened",
            ErrorCode::Format => "file not in PDF format or corrupted",
            ErrorCode::Password => "password required or incorrect",
            ErrorCode::Security => "unsupported security scheme",
            ErrorCode::Page => "page not found or content error",
            ErrorCode::XfaLoad => "XFA load error",
            ErrorCode::XfaLayout => "XFA layout error",
            ErrorCode::Unrecognized(raw) => return write!(f, "error code {raw}"),
        };
        write!(f, "{} (code {})", name, self.as_raw())
    }
}

/// A host closure failed, or panicked, inside a native callback.
#[derive(Error, Debug)]
#[error("Callback {callback} failed: {message}")]
pub struct CallbackError {
    callback: &'static str,
    message: String,
    panicked: bool,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            callback: "host",
            message: message.into(),
            panicked: false,
            source: None,
        }
    }

    pub fn from_source(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            callback: "host",
            message: source.to_string(),
            panicked: false,
            source: Some(Box::new(source)),
        }
    }

    pub(crate) fn from_panic(callback: &'static str, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with non-string payload".to_string()
        };
        Self {
            callback,
            message,
            panicked: true,
            source: None,
        }
    }

    pub(crate) fn in_callback(mut self, callback: &'static str) -> Self {
        self.callback = callback;
        self
    }

    /// Name of the native callback slot that failed.
    pub fn callback(&self) -> &'static str {
        self.callback
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_panic(&self) -> bool {
        self.panicked
    }
}

impl From<std::io::Error> for CallbackError {
    fn from(err: std::io::Error) -> Self {
        CallbackError::from_source(err)
    }
}

impl From<String> for CallbackError {
    fn from(message: String) -> Self {
        CallbackError::new(message)
    }
}

impl From<&str> for CallbackError {
    fn from(message: &str) -> Self {
        CallbackError::new(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_normalization() {
        assert_eq!(ErrorCode::from_raw(FPDF_ERR_SUCCESS), None);
        assert_eq!(ErrorCode::from_raw(4), Some(ErrorCode::Password));
        assert_eq!(ErrorCode::from_raw(7), Some(ErrorCode::XfaLoad));
        assert_eq!(ErrorCode::from_raw(8), Some(ErrorCode::XfaLayout));
        assert_eq!(ErrorCode::from_raw(42), Some(ErrorCode::Unrecognized(42)));

        for raw in 1..=8u32 {
            let code = ErrorCode::from_raw(raw as c_ulong).unwrap();
            assert_eq!(code.as_raw(), raw);
        }
    }

    #[test]
    fn test_open_failure_distinguishes_password_cases() {
        assert!(matches!(
            PdfError::from_open_failure(Some(ErrorCode::Password), false),
            PdfError::PasswordRequired
        ));
        assert!(matches!(
            PdfError::from_open_failure(Some(ErrorCode::Password), true),
            PdfError::WrongPassword
        ));
    }

    #[test]
    fn test_open_failure_classification() {
        assert!(matches!(
            PdfError::from_open_failure(Some(ErrorCode::Format), false),
            PdfError::MalformedDocument {
                code: ErrorCode::Format
            }
        ));
        assert!(matches!(
            PdfError::from_open_failure(Some(ErrorCode::XfaLayout), false),
            PdfError::UnsupportedFormat {
                code: ErrorCode::XfaLayout
            }
        ));
        assert!(matches!(
            PdfError::from_open_failure(None, false),
            PdfError::MalformedDocument { .. }
        ));
        assert!(matches!(
            PdfError::from_open_failure(Some(ErrorCode::Page), false),
            PdfError::Native(ErrorCode::Page)
        ));
    }

    #[test]
    fn test_programmer_error_classification() {
        assert!(PdfError::InvalidHandle { kind: "page" }.is_programmer_error());
        assert!(PdfError::OutstandingPages { count: 1 }.is_programmer_error());
        let destroyed = LifecycleError::AlreadyDestroyed { kind: "page" };
        assert!(PdfError::from(destroyed).is_programmer_error());
        assert!(!PdfError::WrongPassword.is_programmer_error());
        assert!(!PdfError::PageIndexOutOfRange { index: 3, count: 3 }.is_programmer_error());
    }

    #[test]
    fn test_callback_error_from_panic_payload() {
        let err = CallbackError::from_panic("m_GetBlock", Box::new("reader exploded"));
        assert!(err.is_panic());
        assert_eq!(err.callback(), "m_GetBlock");
        assert_eq!(err.message(), "reader exploded");
        assert!(err.to_string().contains("m_GetBlock"));

        let err = CallbackError::from_panic("FFI_Invalidate", Box::new(String::from("owned")));
        assert_eq!(err.message(), "owned");
    }
}
