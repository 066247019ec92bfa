//! Shared machinery for C callback tables.
//!
//! Each bridge keeps a `#[repr(C)]` record whose first field is the struct
//! PDFium calls through. The record lives in a [`Pinned`] allocation, so the
//! `pThis` pointer PDFium hands back can be cast to the record for as long as
//! the bridge is alive. Trampolines run host code through [`guarded`], so no
//! panic crosses the C boundary and every failure is kept for the host side.

use crate::error::CallbackError;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;

/// Heap value with a fixed address for its whole life.
///
/// Only shared references are ever handed out; records mutate through
/// `Cell`/`RefCell` fields, which keeps them sound while PDFium holds the raw
/// pointer.
pub(crate) struct Pinned<T> {
    ptr: NonNull<T>,
}

impl<T> Pinned<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            ptr: NonNull::from(Box::leak(Box::new(value))),
        }
    }

    pub(crate) fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    pub(crate) fn get(&self) -> &T {
        // SAFETY: the allocation is owned by `self` and freed only in `drop`.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> Drop for Pinned<T> {
    fn drop(&mut self) {
        // SAFETY: `ptr` came from `Box::leak` in `new` and is released once.
        drop(unsafe { Box::from_raw(self.ptr.as_ptr()) });
    }
}

/// First host failure seen by a single-threaded bridge.
#[derive(Default)]
pub(crate) struct ErrorSlot {
    pending: RefCell<Option<CallbackError>>,
}

impl ErrorSlot {
    pub(crate) fn record(&self, err: CallbackError) {
        if let Ok(mut pending) = self.pending.try_borrow_mut() {
            if pending.is_none() {
                *pending = Some(err);
            }
        }
    }

    pub(crate) fn take(&self) -> Option<CallbackError> {
        self.pending.try_borrow_mut().ok().and_then(|mut p| p.take())
    }

    /// Run a trampoline body, translating failure into `sentinel`.
    pub(crate) fn guard<T>(
        &self,
        callback: &'static str,
        sentinel: T,
        f: impl FnOnce() -> Result<T, CallbackError>,
    ) -> T {
        guarded(callback, sentinel, |err| self.record(err), f)
    }
}

/// Run host code on behalf of native code.
///
/// An `Err` or a panic from `f` is handed to `record` and `sentinel` is
/// returned to the caller instead.
pub(crate) fn guarded<T>(
    callback: &'static str,
    sentinel: T,
    record: impl FnOnce(CallbackError),
    f: impl FnOnce() -> Result<T, CallbackError>,
) -> T {
    let err = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => return value,
        Ok(Err(err)) => err.in_callback(callback),
        Err(payload) => CallbackError::from_panic(callback, payload),
    };
    tracing::warn!("Host callback {} failed: {}", callback, err.message());
    record(err);
    sentinel
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_pinned_address_is_stable() {
        let pinned = Pinned::new([0u8; 64]);
        let before = pinned.as_ptr();
        let moved = pinned;
        assert_eq!(before, moved.as_ptr());
    }

    #[test]
    fn test_pinned_drops_value_once() {
        struct Counted(Rc<Cell<u32>>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let drops = Rc::new(Cell::new(0));
        let pinned = Pinned::new(Counted(drops.clone()));
        assert_eq!(drops.get(), 0);
        drop(pinned);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_guard_passes_value_through() {
        let slot = ErrorSlot::default();
        assert_eq!(slot.guard("cb", 0, || Ok(7)), 7);
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_guard_records_error_and_returns_sentinel() {
        let slot = ErrorSlot::default();
        let value = slot.guard("m_GetBlock", 0, || Err(CallbackError::new("short read")));
        assert_eq!(value, 0);

        let err = slot.take().expect("recorded error");
        assert_eq!(err.callback(), "m_GetBlock");
        assert_eq!(err.message(), "short read");
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_guard_catches_panic() {
        let slot = ErrorSlot::default();
        let value = slot.guard("FFI_Invalidate", -1, || -> Result<i32, CallbackError> {
            panic!("host bug")
        });
        assert_eq!(value, -1);
        let err = slot.take().unwrap();
        assert!(err.is_panic());
        assert_eq!(err.message(), "host bug");
    }

    #[test]
    fn test_slot_keeps_first_error() {
        let slot = ErrorSlot::default();
        slot.record(CallbackError::new("first"));
        slot.record(CallbackError::new("second"));
        assert_eq!(slot.take().unwrap().message(), "first");
    }
}
