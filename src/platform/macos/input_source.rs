//! Input source switching via Text Input Sources.
//!
//! HIToolbox asserts these calls run on the main queue, so the tap thread
//! only queues the request with `dispatch_async_f`; the binary's main thread
//! drains the queue in `run_main_loop`.

use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use super::imp::{CFRelease, CFStringRef};

type CFArrayRef = *const c_void;
type CFDictionaryRef = *const c_void;
type TISInputSourceRef = *const c_void;

/// kCFStringEncodingUTF8
const CF_STRING_ENCODING_UTF8: u32 = 0x0800_0100;

#[repr(C)]
struct DispatchQueue {
    _private: [u8; 0],
}

#[link(name = "Carbon", kind = "framework")]
extern "C" {
    /// Input sources matching `properties`; caller releases the array.
    fn TISCreateInputSourceList(properties: CFDictionaryRef, include_all_installed: bool)
        -> CFArrayRef;

    /// Makes `source` the active keyboard input source.
    fn TISSelectInputSource(source: TISInputSourceRef) -> i32;

    /// Dictionary key for an input source's reverse-DNS id.
    static kTISPropertyInputSourceID: CFStringRef;
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    /// CFString from raw bytes in the given encoding.
    fn CFStringCreateWithBytes(
        allocator: *const c_void,
        bytes: *const u8,
        num_bytes: isize,
        encoding: u32,
        is_external_representation: bool,
    ) -> CFStringRef;

    /// Immutable CFDictionary from parallel key and value arrays.
    fn CFDictionaryCreate(
        allocator: *const c_void,
        keys: *const *const c_void,
        values: *const *const c_void,
        num_values: isize,
        key_callbacks: *const c_void,
        value_callbacks: *const c_void,
    ) -> CFDictionaryRef;

    /// Number of elements in a CFArray.
    fn CFArrayGetCount(array: CFArrayRef) -> isize;

    /// Borrowed element of a CFArray.
    fn CFArrayGetValueAtIndex(array: CFArrayRef, idx: isize) -> *const c_void;

    /// Retaining key callbacks for CF-typed keys.
    static kCFTypeDictionaryKeyCallBacks: c_void;

    /// Retaining value callbacks for CF-typed values.
    static kCFTypeDictionaryValueCallBacks: c_void;
}

#[link(name = "System", kind = "dylib")]
extern "C" {
    /// The main dispatch queue, drained by the main run loop.
    static _dispatch_main_q: DispatchQueue;

    /// Queues `work(context)` on `queue` and returns at once.
    fn dispatch_async_f(
        queue: *const DispatchQueue,
        context: *mut c_void,
        work: extern "C" fn(*mut c_void),
    );
}

/// Selects the input source whose identifier equals `source_id`. Main thread only.
fn select(source_id: &str) -> Result<(), String> {
    unsafe {
        let id = CFStringCreateWithBytes(
            ptr::null(),
            source_id.as_ptr(),
            source_id.len() as isize,
            CF_STRING_ENCODING_UTF8,
            false,
        );
        if id.is_null() {
            return Err("CFStringCreateWithBytes returned null".into());
        }

        let keys = [kTISPropertyInputSourceID];
        let values = [id];
        let filter = CFDictionaryCreate(
            ptr::null(),
            keys.as_ptr(),
            values.as_ptr(),
            1,
            ptr::addr_of!(kCFTypeDictionaryKeyCallBacks),
            ptr::addr_of!(kCFTypeDictionaryValueCallBacks),
        );
        CFRelease(id);
        if filter.is_null() {
            return Err("CFDictionaryCreate returned null".into());
        }

        let sources = TISCreateInputSourceList(filter, false);
        CFRelease(filter);
        if sources.is_null() {
            return Err("TISCreateInputSourceList returned null".into());
        }
        if CFArrayGetCount(sources) <= 0 {
            CFRelease(sources);
            return Err(format!("input source not found: {source_id}"));
        }

        let status = TISSelectInputSource(CFArrayGetValueAtIndex(sources, 0));
        CFRelease(sources);
        if status != 0 {
            return Err(format!("TISSelectInputSource failed with status {status}"));
        }
    }
    Ok(())
}

extern "C" fn select_on_main(context: *mut c_void) {
    let source_id = unsafe { Box::from_raw(context.cast::<String>()) };
    match panic::catch_unwind(AssertUnwindSafe(|| select(&source_id))) {
        Ok(Ok(())) => log::info!("executor: input source switched to {source_id}"),
        Ok(Err(e)) => log::warn!("executor: input source switch failed: {e}"),
        Err(_) => log::error!("executor: input source switch panicked ({source_id})"),
    }
}

/// Queues a switch to `source_id` on the main dispatch queue and returns.
pub(super) fn queue_select(source_id: String) {
    log::debug!("executor: queueing input source switch to {source_id}");
    let context = Box::into_raw(Box::new(source_id)).cast::<c_void>();
    unsafe { dispatch_async_f(ptr::addr_of!(_dispatch_main_q), context, select_on_main) };
}
