//! Pooled job cells.
//!
//! A job is a user callable written into memory served by its target
//! queue's pool, together with a header recording how to run it, how to
//! drop it unrun, the concrete cell layout and the index of the queue that
//! owns the memory. `JobRef` is the type-erased handle the queues and
//! workers pass around: a deconstructed trait object of pointer plus fn
//! pointers, so no heap box is involved.

use std::alloc::Layout;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;

pub(crate) struct JobHeader {
    invoke_fn: unsafe fn(NonNull<JobHeader>),
    drop_fn: unsafe fn(NonNull<JobHeader>),
    layout: Layout,
    origin: usize,
}

#[repr(C)]
struct JobCell<F> {
    header: JobHeader,
    func: ManuallyDrop<F>,
}

/// Type-erased handle to a pooled job cell.
///
/// Every `JobRef` must be settled exactly once: either `invoke` (run the
/// callable) or `drop_payload` (discard it unrun), followed in both cases
/// by freeing the cell against the origin queue's pool.
#[derive(Clone, Copy)]
pub(crate) struct JobRef {
    ptr: NonNull<JobHeader>,
}

// The cell only ever wraps `F: Send`, and settling a job consumes it on a
// single thread.
unsafe impl Send for JobRef {}

impl JobRef {
    /// Layout of the concrete cell holding a callable of type `F`.
    pub(crate) fn layout_for<F: FnOnce() + Send>() -> Layout {
        Layout::new::<JobCell<F>>()
    }

    /// Writes a job cell into `mem`.
    ///
    /// # Safety
    ///
    /// `mem` must satisfy `layout_for::<F>()` and stay valid until the job
    /// is settled.
    pub(crate) unsafe fn write<F>(mem: NonNull<u8>, origin: usize, func: F) -> JobRef
    where
        F: FnOnce() + Send,
    {
        let cell = mem.cast::<JobCell<F>>();
        cell.as_ptr().write(JobCell {
            header: JobHeader {
                invoke_fn: invoke_cell::<F>,
                drop_fn: drop_cell::<F>,
                layout: Layout::new::<JobCell<F>>(),
                origin,
            },
            func: ManuallyDrop::new(func),
        });
        JobRef { ptr: cell.cast() }
    }

    /// Runs the callable exactly once. The cell memory is untouched and
    /// must still be freed afterwards, even if the callable panics.
    ///
    /// # Safety
    ///
    /// Must be the job's single settlement.
    pub(crate) unsafe fn invoke(self) {
        ((*self.ptr.as_ptr()).invoke_fn)(self.ptr);
    }

    /// Drops a callable that will never run.
    ///
    /// # Safety
    ///
    /// Must be the job's single settlement.
    pub(crate) unsafe fn drop_payload(self) {
        ((*self.ptr.as_ptr()).drop_fn)(self.ptr);
    }

    /// Index of the queue whose pool owns this cell.
    pub(crate) fn origin(self) -> usize {
        unsafe { (*self.ptr.as_ptr()).origin }
    }

    /// Layout the cell was allocated with.
    pub(crate) fn layout(self) -> Layout {
        unsafe { (*self.ptr.as_ptr()).layout }
    }

    pub(crate) fn as_block(self) -> NonNull<u8> {
        self.ptr.cast()
    }
}

unsafe fn invoke_cell<F: FnOnce()>(ptr: NonNull<JobHeader>) {
    let cell = &mut *ptr.cast::<JobCell<F>>().as_ptr();
    // Move the callable out; if it panics it is dropped by unwinding and
    // the cell can still be freed.
    let func = ManuallyDrop::take(&mut cell.func);
    func();
}

unsafe fn drop_cell<F>(ptr: NonNull<JobHeader>) {
    let cell = &mut *ptr.cast::<JobCell<F>>().as_ptr();
    ManuallyDrop::drop(&mut cell.func);
}
