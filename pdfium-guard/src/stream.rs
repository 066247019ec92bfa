//! `FPDF_FILEACCESS` bridge for documents read from a host stream.
//!
//! PDFium keeps the file-access pointer for the whole life of the document
//! and reads pages lazily, so the bridge is owned by the document session and
//! dropped only after the native document is closed.

use crate::bridge::{ErrorSlot, Pinned};
use crate::cancel::CancelFlag;
use crate::error::{CallbackError, PdfError, Result};
use pdfium_guard_sys::{c_int, c_uchar, c_ulong, c_void, FPDF_FILEACCESS};
use std::cell::{Cell, RefCell};
use std::io::{Read, Seek, SeekFrom};

trait ReadAndSeek: Read + Seek {}
impl<T> ReadAndSeek for T where T: Read + Seek {}

#[repr(C)]
struct StreamRecord {
    sys: FPDF_FILEACCESS,
    reader: RefCell<Box<dyn ReadAndSeek>>,
    cancel: Option<CancelFlag>,
    cancelled: Cell<bool>,
    reads: Cell<u64>,
    errors: ErrorSlot,
}

/// Owns a seekable reader and the file-access table PDFium reads it through.
pub(crate) struct StreamAccess {
    record: Pinned<StreamRecord>,
}

impl StreamAccess {
    pub(crate) fn new<R>(mut reader: R, cancel: Option<CancelFlag>) -> Result<Self>
    where
        R: Read + Seek + 'static,
    {
        let len = reader.seek(SeekFrom::End(0))?;
        let file_len = c_ulong::try_from(len).map_err(|_| {
            PdfError::InvalidParameter(format!("stream of {len} bytes exceeds file access range"))
        })?;

        let record = Pinned::new(StreamRecord {
            sys: FPDF_FILEACCESS {
                m_FileLen: file_len,
                m_GetBlock: Some(get_block),
                m_Param: std::ptr::null_mut(),
            },
            reader: RefCell::new(Box::new(reader)),
            cancel,
            cancelled: Cell::new(false),
            reads: Cell::new(0),
            errors: ErrorSlot::default(),
        });
        // SAFETY: nothing else has seen the record yet.
        unsafe { (*record.as_ptr()).sys.m_Param = record.as_ptr().cast() };

        Ok(Self { record })
    }

    pub(crate) fn as_sys_ptr(&self) -> *mut FPDF_FILEACCESS {
        // `sys` is the first field of a #[repr(C)] record.
        self.record.as_ptr().cast()
    }

    pub(crate) fn len(&self) -> u64 {
        self.record.get().sys.m_FileLen as u64
    }

    /// Number of successful block reads so far.
    pub(crate) fn reads(&self) -> u64 {
        self.record.get().reads.get()
    }

    /// Failure raised by the last native call that read through this bridge.
    pub(crate) fn take_error(&self) -> Option<PdfError> {
        let record = self.record.get();
        if record.cancelled.replace(false) {
            record.errors.take();
            return Some(PdfError::Cancelled);
        }
        record.errors.take().map(PdfError::Callback)
    }
}

unsafe extern "C" fn get_block(
    param: *mut c_void,
    position: c_ulong,
    buf: *mut c_uchar,
    size: c_ulong,
) -> c_int {
    if param.is_null() {
        return 0;
    }
    // SAFETY: `param` is the record installed in `StreamAccess::new`, alive
    // while PDFium can read from the document.
    let record = &*(param as *const StreamRecord);

    if record.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
        record.cancelled.set(true);
        return 0;
    }

    record.errors.guard("m_GetBlock", 0, || {
        if size == 0 {
            return Ok(1);
        }
        if buf.is_null() {
            return Err(CallbackError::new("null destination buffer"));
        }
        let buf = std::slice::from_raw_parts_mut(buf, size as usize);
        let mut reader = record
            .reader
            .try_borrow_mut()
            .map_err(|_| CallbackError::new("stream reader re-entered"))?;
        reader.seek(SeekFrom::Start(position as u64))?;
        reader.read_exact(buf)?;
        record.reads.set(record.reads.get() + 1);
        Ok(1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    unsafe fn read(access: &StreamAccess, position: c_ulong, buf: &mut [u8]) -> c_int {
        let sys = &*access.as_sys_ptr();
        (sys.m_GetBlock.unwrap())(sys.m_Param, position, buf.as_mut_ptr(), buf.len() as c_ulong)
    }

    #[test]
    fn test_reads_at_offset() {
        let access = StreamAccess::new(Cursor::new(b"0123456789".to_vec()), None).unwrap();
        assert_eq!(access.len(), 10);

        let mut buf = [0u8; 4];
        assert_eq!(unsafe { read(&access, 3, &mut buf) }, 1);
        assert_eq!(&buf, b"3456");
        assert_eq!(access.reads(), 1);
        assert!(access.take_error().is_none());
    }

    #[test]
    fn test_short_read_is_recorded() {
        let access = StreamAccess::new(Cursor::new(b"abc".to_vec()), None).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(unsafe { read(&access, 0, &mut buf) }, 0);
        match access.take_error() {
            Some(PdfError::Callback(err)) => assert_eq!(err.callback(), "m_GetBlock"),
            other => panic!("Expected callback error, got {:?}", other),
        }
    }

    #[test]
    fn test_reader_panic_is_contained() {
        struct Exploding;
        impl Read for Exploding {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                panic!("reader exploded")
            }
        }
        impl Seek for Exploding {
            fn seek(&mut self, _: SeekFrom) -> io::Result<u64> {
                Ok(16)
            }
        }

        let access = StreamAccess::new(Exploding, None).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(unsafe { read(&access, 0, &mut buf) }, 0);
        match access.take_error() {
            Some(PdfError::Callback(err)) => assert!(err.is_panic()),
            other => panic!("Expected callback error, got {:?}", other),
        }
    }

    #[test]
    fn test_cancelled_read_fails() {
        let flag = CancelFlag::new();
        let access = StreamAccess::new(Cursor::new(vec![0u8; 32]), Some(flag.clone())).unwrap();
        flag.cancel();

        let mut buf = [0u8; 4];
        assert_eq!(unsafe { read(&access, 0, &mut buf) }, 0);
        assert!(matches!(access.take_error(), Some(PdfError::Cancelled)));
        assert_eq!(access.reads(), 0);
    }
}
