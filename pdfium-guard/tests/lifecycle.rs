//! Lifecycle tests for pdfium-guard, driven through the mock engine.
//!
//! Tests cover:
//! - Runtime reference counting and shutdown
//! - Session open errors (passwords, formats, files, cancellation)
//! - Page tokens outliving or preceding their session
//! - Host streams: lazy reads, failures, panics
//! - Form environments and page notifications
//! - Text extraction

use pdfium_guard::mock::{MockDocument, MockEngine};
use pdfium_guard::sys::{FPDFPAGE_AACTION_CLOSE, FPDFPAGE_AACTION_OPEN};
use pdfium_guard::{
    CallbackError, CallbackResult, CancelFlag, DocumentSession, ErrorCode, FormCallbacks,
    FormConfig, LibraryConfig, LifecycleError, MetadataTag, OpenOptions, PageRect, PdfError,
    Runtime, TextRun, Version,
};
use serial_test::serial;
use std::cell::{Cell, RefCell};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::rc::Rc;
use std::sync::Arc;

fn setup() -> (Arc<MockEngine>, Runtime) {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("pdfium_guard=debug")
        .try_init();
    let engine = MockEngine::new();
    let runtime = Runtime::acquire_with(engine.clone(), &LibraryConfig::new()).unwrap();
    (engine, runtime)
}

/// Shut everything down and check the engine saw a clean run.
fn assert_clean(engine: &MockEngine) {
    assert_eq!(Runtime::reference_count(), 0);
    assert!(!engine.is_initialized());
    assert_eq!(engine.live_handles(), 0);
    let stats = engine.stats();
    assert!(stats.violations.is_empty(), "violations: {:?}", stats.violations);
}

fn three_pages() -> Vec<u8> {
    MockDocument::new()
        .with_text_page(200.0, 300.0, &["first page"])
        .with_text_page(200.0, 300.0, &["second page"])
        .with_text_page(200.0, 300.0, &["third page"])
        .to_bytes()
}

// ============================================================================
// Runtime
// ============================================================================

#[test]
#[serial]
fn test_session_keeps_runtime_alive() {
    let (engine, runtime) = setup();
    let doc = DocumentSession::open_from_bytes(&runtime, three_pages(), None).unwrap();

    runtime.release();
    assert_eq!(Runtime::reference_count(), 1);
    assert!(engine.is_initialized());

    doc.close().unwrap();
    assert_clean(&engine);
    assert_eq!(engine.stats().destroy_calls, 1);
}

#[test]
#[serial]
fn test_second_engine_is_refused_while_active() {
    let (engine, runtime) = setup();
    let other = MockEngine::new();
    let err = Runtime::acquire_with(other.clone(), &LibraryConfig::new()).unwrap_err();
    assert!(matches!(err, PdfError::InitializationFailed { .. }));
    assert_eq!(other.stats().init_calls, 0);

    drop(runtime);
    assert_clean(&engine);
}

#[test]
#[serial]
fn test_failed_init_leaves_library_down() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let engine = MockEngine::new();
    engine.fail_next_init();

    let err = Runtime::acquire_with(engine.clone(), &LibraryConfig::new()).unwrap_err();
    assert!(matches!(err, PdfError::InitializationFailed { .. }));
    assert_eq!(Runtime::reference_count(), 0);

    // The next attempt starts over.
    let runtime = Runtime::acquire_with(engine.clone(), &LibraryConfig::new()).unwrap();
    drop(runtime);
    assert_clean(&engine);
}

#[test]
#[serial]
fn test_font_paths_reach_init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let engine = MockEngine::new();
    let config = LibraryConfig::new()
        .with_font_path("/usr/share/fonts")
        .with_font_path("/opt/fonts");
    let runtime = Runtime::acquire_with(engine.clone(), &config).unwrap();
    assert_eq!(engine.font_paths(), vec!["/usr/share/fonts", "/opt/fonts"]);
    drop(runtime);
    assert_clean(&engine);
}

// ============================================================================
// Opening documents
// ============================================================================

#[test]
#[serial]
fn test_password_required_vs_wrong_password() {
    let (engine, runtime) = setup();
    let bytes = MockDocument::new()
        .with_password("secret")
        .with_page(100.0, 100.0)
        .to_bytes();

    let err = DocumentSession::open_from_bytes(&runtime, bytes.clone(), None).unwrap_err();
    assert!(matches!(err, PdfError::PasswordRequired));
    assert!(err.is_password_error());

    let err = DocumentSession::open_from_bytes(&runtime, bytes.clone(), Some("")).unwrap_err();
    assert!(matches!(err, PdfError::PasswordRequired));

    let err = DocumentSession::open_from_bytes(&runtime, bytes.clone(), Some("guess")).unwrap_err();
    assert!(matches!(err, PdfError::WrongPassword));

    let options = OpenOptions::new().with_password("secret");
    let doc = DocumentSession::open_from_bytes_with(&runtime, bytes, &options).unwrap();
    assert_eq!(doc.page_count(), 1);
    doc.close().unwrap();

    drop(runtime);
    assert_clean(&engine);
    assert_eq!(engine.stats().documents_opened, 1);
}

#[test]
#[serial]
fn test_open_failures_are_classified() {
    let (engine, runtime) = setup();

    let err = DocumentSession::open_from_bytes(&runtime, b"not a pdf".to_vec(), None).unwrap_err();
    assert!(matches!(
        err,
        PdfError::MalformedDocument {
            code: ErrorCode::Format
        }
    ));

    let secured = MockDocument::new().with_unsupported_security().to_bytes();
    let err = DocumentSession::open_from_bytes(&runtime, secured, None).unwrap_err();
    assert!(matches!(
        err,
        PdfError::UnsupportedFormat {
            code: ErrorCode::Security
        }
    ));

    let xfa = MockDocument::new().with_broken_xfa().to_bytes();
    let err = DocumentSession::open_from_bytes(&runtime, xfa, None).unwrap_err();
    assert!(matches!(
        err,
        PdfError::UnsupportedFormat {
            code: ErrorCode::XfaLoad
        }
    ));

    drop(runtime);
    assert_clean(&engine);
    assert_eq!(engine.stats().documents_opened, 0);
}

#[test]
#[serial]
fn test_open_from_file() {
    let (engine, runtime) = setup();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&three_pages()).unwrap();
    file.flush().unwrap();

    let doc = DocumentSession::open_from_file(&runtime, file.path(), None).unwrap();
    assert_eq!(doc.page_count(), 3);
    let page = doc.load_page(2).unwrap();
    assert_eq!(page.text().unwrap(), "third page");
    drop(page);
    doc.close().unwrap();

    let missing = file.path().with_extension("missing");
    let err = DocumentSession::open_from_file(&runtime, &missing, None).unwrap_err();
    assert!(matches!(err, PdfError::FileNotFound(_)));

    drop(runtime);
    assert_clean(&engine);
}

#[test]
#[serial]
fn test_cancelled_open_does_not_reach_native_code() {
    let (engine, runtime) = setup();
    let cancel = CancelFlag::new();
    cancel.cancel();
    let options = OpenOptions::new().with_cancel_flag(cancel);

    let err = DocumentSession::open_from_bytes_with(&runtime, three_pages(), &options).unwrap_err();
    assert!(matches!(err, PdfError::Cancelled));
    let err = DocumentSession::open_from_stream_with(&runtime, Cursor::new(three_pages()), &options)
        .unwrap_err();
    assert!(matches!(err, PdfError::Cancelled));

    drop(runtime);
    assert_clean(&engine);
    assert_eq!(engine.stats().documents_opened, 0);
}

#[test]
#[serial]
fn test_version_and_metadata() {
    let (engine, runtime) = setup();
    let bytes = MockDocument::new()
        .with_version(Some((2, 0)))
        .with_metadata("Title", "Quarterly Report")
        .with_metadata("Author", "Zoë Ångström")
        .with_metadata("ModDate", "D:20240229120000Z")
        .with_page(100.0, 100.0)
        .to_bytes();
    let doc = DocumentSession::open_from_bytes(&runtime, bytes, None).unwrap();

    assert_eq!(doc.version().unwrap(), Version::Pdf2_0);
    assert_eq!(
        doc.metadata(MetadataTag::Title).unwrap().as_deref(),
        Some("Quarterly Report")
    );
    assert_eq!(
        doc.metadata(MetadataTag::Author).unwrap().as_deref(),
        Some("Zoë Ångström")
    );
    assert_eq!(
        doc.metadata(MetadataTag::ModificationDate).unwrap().as_deref(),
        Some("D:20240229120000Z")
    );
    assert_eq!(doc.metadata(MetadataTag::Subject).unwrap(), None);
    doc.close().unwrap();

    let unversioned = MockDocument::new()
        .with_version(None)
        .with_page(100.0, 100.0)
        .to_bytes();
    let doc = DocumentSession::open_from_bytes(&runtime, unversioned, None).unwrap();
    assert_eq!(doc.version().unwrap(), Version::Unset);
    drop(doc);

    drop(runtime);
    assert_clean(&engine);
}

// ============================================================================
// Pages
// ============================================================================

#[test]
#[serial]
fn test_session_close_invalidates_pages() {
    let (engine, runtime) = setup();
    let doc = DocumentSession::open_from_bytes(&runtime, three_pages(), None).unwrap();
    let first = doc.load_page(0).unwrap();
    let second = doc.load_page(1).unwrap();
    assert!(first.is_valid());
    assert_eq!(doc.open_page_count(), 2);

    doc.close().unwrap();

    assert!(!first.is_valid());
    assert!(matches!(
        first.size(),
        Err(PdfError::InvalidHandle { kind: "page" })
    ));
    assert!(matches!(
        second.text(),
        Err(PdfError::InvalidHandle { kind: "page" })
    ));
    let err = second.close().unwrap_err();
    assert!(err.is_programmer_error());
    drop(first);
    drop(second);

    drop(runtime);
    assert_clean(&engine);
    let stats = engine.stats();
    assert_eq!(stats.pages_loaded, 2);
    assert_eq!(stats.pages_closed, 2);
    assert_eq!(stats.documents_closed, 1);
}

#[test]
#[serial]
fn test_page_close_twice_is_lifecycle_error() {
    let (engine, runtime) = setup();
    let doc = DocumentSession::open_from_bytes(&runtime, three_pages(), None).unwrap();
    let page = doc.load_page(0).unwrap();
    let size = page.size().unwrap();
    assert_eq!((size.width, size.height), (200.0, 300.0));

    page.close().unwrap();
    assert!(!page.is_valid());
    assert_eq!(doc.open_page_count(), 0);
    assert!(matches!(
        page.close(),
        Err(PdfError::Lifecycle(LifecycleError::AlreadyDestroyed { kind: "page" }))
    ));
    assert!(matches!(page.size(), Err(PdfError::InvalidHandle { .. })));
    drop(page);

    doc.close().unwrap();
    drop(runtime);
    assert_clean(&engine);
    assert_eq!(engine.stats().pages_closed, 1);
}

#[test]
#[serial]
fn test_page_size_and_label_without_loading() {
    let (engine, runtime) = setup();
    let bytes = MockDocument::new()
        .with_page(612.0, 792.0)
        .with_page_label("iv")
        .with_page(842.0, 595.0)
        .to_bytes();
    let doc = DocumentSession::open_from_bytes(&runtime, bytes, None).unwrap();

    let size = doc.page_size(1).unwrap();
    assert_eq!((size.width, size.height), (842.0, 595.0));
    assert_eq!(doc.page_label(0).unwrap().as_deref(), Some("iv"));
    assert_eq!(doc.page_label(1).unwrap(), None);
    assert!(matches!(
        doc.page_size(2),
        Err(PdfError::PageIndexOutOfRange { index: 2, count: 2 })
    ));
    assert!(matches!(
        doc.page_label(5),
        Err(PdfError::PageIndexOutOfRange { index: 5, count: 2 })
    ));
    assert_eq!(engine.stats().pages_loaded, 0);

    doc.close().unwrap();
    drop(runtime);
    assert_clean(&engine);
}

#[test]
#[serial]
fn test_load_page_out_of_range() {
    let (engine, runtime) = setup();
    let doc = DocumentSession::open_from_bytes(&runtime, three_pages(), None).unwrap();
    assert!(matches!(
        doc.load_page(3),
        Err(PdfError::PageIndexOutOfRange { index: 3, count: 3 })
    ));
    assert_eq!(engine.stats().pages_loaded, 0);
    drop(doc);

    drop(runtime);
    assert_clean(&engine);
}

#[test]
#[serial]
fn test_dropped_page_is_closed_before_session() {
    let (engine, runtime) = setup();
    let doc = DocumentSession::open_from_bytes(&runtime, three_pages(), None).unwrap();
    {
        let _page = doc.load_page(1).unwrap();
        assert_eq!(doc.open_page_count(), 1);
    }
    assert_eq!(doc.open_page_count(), 0);
    assert_eq!(engine.stats().pages_closed, 1);

    // The same index can be loaded twice; each token is independent.
    let a = doc.load_page(0).unwrap();
    let b = doc.load_page(0).unwrap();
    a.close().unwrap();
    assert!(b.is_valid());
    drop(b);

    drop(doc);
    drop(runtime);
    assert_clean(&engine);
}

#[test]
#[serial]
fn test_close_strict_hands_session_back() {
    let (engine, runtime) = setup();
    let doc = DocumentSession::open_from_bytes(&runtime, three_pages(), None).unwrap();
    let page = doc.load_page(0).unwrap();

    let err = doc.close_strict().unwrap_err();
    assert!(matches!(
        err.error(),
        PdfError::OutstandingPages { count: 1 }
    ));
    let doc = err.into_session().unwrap();
    assert!(page.is_valid());
    assert_eq!(page.text().unwrap(), "first page");

    page.close().unwrap();
    doc.close_strict().unwrap();

    drop(runtime);
    assert_clean(&engine);
}

// ============================================================================
// Host streams
// ============================================================================

/// Cursor whose reads can be made to fail or panic on demand.
struct FlakyReader {
    inner: Cursor<Vec<u8>>,
    fail: Rc<Cell<bool>>,
    panic: Rc<Cell<bool>>,
}

impl FlakyReader {
    fn new(bytes: Vec<u8>) -> (Self, Rc<Cell<bool>>, Rc<Cell<bool>>) {
        let fail = Rc::new(Cell::new(false));
        let panic = Rc::new(Cell::new(false));
        let reader = Self {
            inner: Cursor::new(bytes),
            fail: fail.clone(),
            panic: panic.clone(),
        };
        (reader, fail, panic)
    }
}

impl Read for FlakyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.panic.get() {
            panic!("reader exploded");
        }
        if self.fail.get() {
            return Err(io::Error::new(io::ErrorKind::Other, "disk went away"));
        }
        self.inner.read(buf)
    }
}

impl Seek for FlakyReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

#[test]
#[serial]
fn test_stream_pages_load_lazily() {
    let (engine, runtime) = setup();
    let doc = runtime.open_from_stream(Cursor::new(three_pages()), None).unwrap();
    assert_eq!(doc.page_count(), 3);

    for (index, expected) in ["first page", "second page", "third page"].iter().enumerate() {
        let page = doc.load_page(index).unwrap();
        assert_eq!(page.text().unwrap(), *expected);
    }
    doc.close().unwrap();

    drop(runtime);
    assert_clean(&engine);
}

#[test]
#[serial]
fn test_stream_failure_surfaces_from_load_page() {
    let (engine, runtime) = setup();
    let (reader, fail, panic) = FlakyReader::new(three_pages());
    let doc = DocumentSession::open_from_stream(&runtime, reader, None).unwrap();

    fail.set(true);
    match doc.load_page(0) {
        Err(PdfError::Callback(err)) => {
            assert_eq!(err.callback(), "m_GetBlock");
            assert!(!err.is_panic());
            assert!(err.message().contains("disk went away"));
        }
        other => panic!("expected a callback error, got {other:?}"),
    }
    assert_eq!(doc.open_page_count(), 0);

    fail.set(false);
    let page = doc.load_page(0).unwrap();
    page.close().unwrap();

    panic.set(true);
    match doc.load_page(1) {
        Err(PdfError::Callback(err)) => {
            assert!(err.is_panic());
            assert_eq!(err.message(), "reader exploded");
        }
        other => panic!("expected a caught panic, got {other:?}"),
    }
    panic.set(false);

    doc.close().unwrap();
    drop(runtime);
    assert_clean(&engine);
}

#[test]
#[serial]
fn test_stream_failure_during_open() {
    let (engine, runtime) = setup();
    let (reader, fail, _) = FlakyReader::new(three_pages());
    fail.set(true);

    let err = DocumentSession::open_from_stream(&runtime, reader, None).unwrap_err();
    assert!(matches!(err, PdfError::Callback(_)));

    drop(runtime);
    assert_clean(&engine);
    assert_eq!(engine.stats().documents_opened, 0);
}

#[test]
#[serial]
fn test_cancel_flag_stops_lazy_reads() {
    let (engine, runtime) = setup();
    let cancel = CancelFlag::new();
    let options = OpenOptions::new().with_cancel_flag(cancel.clone());
    let reader = Cursor::new(three_pages());
    let doc = DocumentSession::open_from_stream_with(&runtime, reader, &options).unwrap();

    cancel.cancel();
    assert!(matches!(doc.load_page(0), Err(PdfError::Cancelled)));

    cancel.reset();
    let page = doc.load_page(0).unwrap();
    drop(page);
    doc.close().unwrap();

    drop(runtime);
    assert_clean(&engine);
}

// ============================================================================
// Form environments
// ============================================================================

#[derive(Default, Clone)]
struct Invalidations {
    seen: Rc<RefCell<Vec<(Option<usize>, PageRect)>>>,
}

impl FormCallbacks for Invalidations {
    fn invalidate(&mut self, page: Option<usize>, area: PageRect) -> CallbackResult<()> {
        self.seen.borrow_mut().push((page, area));
        Ok(())
    }
}

#[test]
#[serial]
fn test_form_sees_page_open_and_close() {
    let (engine, runtime) = setup();
    let doc = DocumentSession::open_from_bytes(&runtime, three_pages(), None).unwrap();
    let early = doc.load_page(2).unwrap();

    let form = doc.attach_form_environment(FormConfig::default()).unwrap();
    assert!(form.is_active());
    assert!(doc.has_form_environment());
    assert!(matches!(
        doc.attach_form_environment(FormConfig::default()),
        Err(PdfError::FormAlreadyAttached)
    ));

    let page = doc.load_page(0).unwrap();
    page.close().unwrap();
    early.close().unwrap();

    let actions = engine.stats().page_actions;
    assert_eq!(
        actions,
        vec![
            (2, FPDFPAGE_AACTION_OPEN),
            (0, FPDFPAGE_AACTION_OPEN),
            (0, FPDFPAGE_AACTION_CLOSE),
            (2, FPDFPAGE_AACTION_CLOSE),
        ]
    );

    doc.close().unwrap();
    assert!(!form.is_active());
    drop(runtime);
    assert_clean(&engine);
    let stats = engine.stats();
    assert_eq!(stats.forms_initialized, 1);
    assert_eq!(stats.forms_exited, 1);
}

#[test]
#[serial]
fn test_form_close_refused_while_pages_open() {
    let (engine, runtime) = setup();
    let doc = DocumentSession::open_from_bytes(&runtime, three_pages(), None).unwrap();
    let form = doc.attach_form_environment(FormConfig::default()).unwrap();
    let page = doc.load_page(1).unwrap();

    assert!(matches!(
        form.close(),
        Err(PdfError::Lifecycle(LifecycleError::FormInUse { pages: 1 }))
    ));
    assert!(form.is_active());

    page.close().unwrap();
    form.close().unwrap();
    assert!(!form.is_active());
    assert!(!doc.has_form_environment());
    assert!(matches!(
        form.close(),
        Err(PdfError::Lifecycle(LifecycleError::AlreadyDestroyed { .. }))
    ));

    // Detached: pages load without notifications, and a new one may attach.
    let page = doc.load_page(0).unwrap();
    assert_eq!(engine.stats().page_actions.len(), 2);
    drop(page);
    let _again = doc.attach_form_environment(FormConfig::default()).unwrap();

    doc.close().unwrap();
    drop(runtime);
    assert_clean(&engine);
    assert_eq!(engine.stats().forms_exited, 2);
}

#[test]
#[serial]
fn test_session_close_with_form_and_pages() {
    let (engine, runtime) = setup();
    let callbacks = Invalidations::default();
    let doc = DocumentSession::open_from_bytes(&runtime, three_pages(), None).unwrap();
    let form = doc.attach_form_environment(FormConfig::new(callbacks)).unwrap();
    let pages: Vec<_> = (0..3).map(|i| doc.load_page(i).unwrap()).collect();
    let text = pages[0].extract_text().unwrap();

    doc.close().unwrap();

    assert!(!form.is_active());
    assert!(pages.iter().all(|page| !page.is_valid()));
    drop(text);
    drop(pages);
    drop(runtime);
    assert_clean(&engine);
    let stats = engine.stats();
    assert_eq!(stats.text_pages_closed, 1);
    assert_eq!(stats.pages_closed, 3);
    assert_eq!(
        stats
            .page_actions
            .iter()
            .filter(|(_, action)| *action == FPDFPAGE_AACTION_CLOSE)
            .count(),
        3
    );
}

struct RejectChanges;

impl FormCallbacks for RejectChanges {
    fn on_change(&mut self) -> CallbackResult<()> {
        Err(CallbackError::new("field is read-only"))
    }
}

#[test]
#[serial]
fn test_failed_attach_rolls_back_page_notifications() {
    let (engine, runtime) = setup();
    let doc = DocumentSession::open_from_bytes(&runtime, three_pages(), None).unwrap();
    let first = doc.load_page(0).unwrap();
    let last = doc.load_page(2).unwrap();

    engine.change_on_page_load(2);
    match doc.attach_form_environment(FormConfig::new(RejectChanges)) {
        Err(PdfError::Callback(err)) => {
            assert_eq!(err.callback(), "FFI_OnChange");
            assert!(err.message().contains("read-only"));
        }
        other => panic!("expected a callback error, got {other:?}"),
    }
    assert!(!doc.has_form_environment());

    let stats = engine.stats();
    assert_eq!(stats.forms_initialized, 1);
    assert_eq!(stats.forms_exited, 1);
    assert_eq!(
        stats.page_actions,
        vec![
            (0, FPDFPAGE_AACTION_OPEN),
            (2, FPDFPAGE_AACTION_OPEN),
            (2, FPDFPAGE_AACTION_CLOSE),
            (0, FPDFPAGE_AACTION_CLOSE),
        ]
    );
    assert!(stats.violations.is_empty(), "violations: {:?}", stats.violations);

    // Pages are untouched and a later attach sees them again.
    let form = doc.attach_form_environment(FormConfig::default()).unwrap();
    assert!(form.is_active());
    assert_eq!(engine.stats().page_actions.len(), 6);
    first.close().unwrap();
    last.close().unwrap();

    doc.close().unwrap();
    drop(runtime);
    assert_clean(&engine);
    assert_eq!(engine.stats().forms_exited, 2);
}

// ============================================================================
// Text
// ============================================================================

#[test]
#[serial]
fn test_text_runs_split_lines() {
    let (engine, runtime) = setup();
    let bytes = MockDocument::new()
        .with_text_page(612.0, 792.0, &["Hello", "World", "", "last"])
        .to_bytes();
    let doc = DocumentSession::open_from_bytes(&runtime, bytes, None).unwrap();
    let page = doc.load_page(0).unwrap();

    let runs = page.extract_text().unwrap();
    assert_eq!(runs.char_count(), 20);
    let runs: Vec<TextRun> = runs.collect::<Result<_, _>>().unwrap();
    assert_eq!(
        runs,
        vec![
            TextRun {
                text: "Hello".into(),
                char_start: 0,
                char_count: 5
            },
            TextRun {
                text: "World".into(),
                char_start: 7,
                char_count: 5
            },
            TextRun {
                text: String::new(),
                char_start: 14,
                char_count: 0
            },
            TextRun {
                text: "last".into(),
                char_start: 16,
                char_count: 4
            },
        ]
    );
    assert_eq!(page.text().unwrap(), "Hello\nWorld\n\nlast");

    drop(page);
    doc.close().unwrap();
    drop(runtime);
    assert_clean(&engine);
    let stats = engine.stats();
    assert_eq!(stats.text_pages_loaded, 2);
    assert_eq!(stats.text_pages_closed, 2);
}

#[test]
#[serial]
fn test_text_across_chunks_keeps_surrogate_pairs() {
    let (engine, runtime) = setup();
    // 255 units, then a pair straddling the first 256-unit chunk boundary.
    let long = format!("{}\u{1F600}tail", "a".repeat(255));
    let bytes = MockDocument::new()
        .with_text_page(612.0, 792.0, &[long.as_str(), "второй"])
        .to_bytes();
    let doc = DocumentSession::open_from_bytes(&runtime, bytes, None).unwrap();
    let page = doc.load_page(0).unwrap();

    let runs: Vec<TextRun> = page.extract_text().unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].text, long);
    assert_eq!(runs[0].char_count, 261);
    assert_eq!(runs[1].text, "второй");
    assert_eq!(runs[1].char_start, 263);

    drop(page);
    drop(doc);
    drop(runtime);
    assert_clean(&engine);
}

#[test]
#[serial]
fn test_text_runs_fail_once_page_closes() {
    let (engine, runtime) = setup();
    let doc = DocumentSession::open_from_bytes(&runtime, three_pages(), None).unwrap();
    let page = doc.load_page(0).unwrap();

    let mut runs = page.extract_text().unwrap();
    page.close().unwrap();
    assert!(matches!(
        runs.next(),
        Some(Err(PdfError::InvalidHandle { kind: "page" }))
    ));
    assert!(runs.next().is_none());
    drop(runs);

    doc.close().unwrap();
    drop(runtime);
    assert_clean(&engine);
    let stats = engine.stats();
    assert_eq!(stats.text_pages_loaded, 1);
    assert_eq!(stats.text_pages_closed, 1);
}

#[test]
#[serial]
fn test_empty_page_has_no_runs() {
    let (engine, runtime) = setup();
    let bytes = MockDocument::new().with_page(100.0, 100.0).to_bytes();
    let doc = DocumentSession::open_from_bytes(&runtime, bytes, None).unwrap();
    let page = doc.load_page(0).unwrap();

    let mut runs = page.extract_text().unwrap();
    assert_eq!(runs.char_count(), 0);
    assert!(runs.next().is_none());
    drop(runs);
    assert_eq!(page.text().unwrap(), "");

    drop(page);
    drop(doc);
    drop(runtime);
    assert_clean(&engine);
}
