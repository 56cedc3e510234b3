//! Synthetic event guard.
//!
//! Every event the executors inject carries `SENTINEL` in a side-channel field
//! the OS preserves on the event object (`kCGEventSourceUserData` on macOS,
//! `dwExtraInfo` on Windows). The engine checks the tag before doing anything
//! else and passes stamped events straight through, so our own output is never
//! reinterpreted as user input.

/// Tag value stamped on injected events ("CPSL").
pub const SENTINEL: i64 = 0x4350_534C;

/// Value to write into the side-channel field of an injected event.
pub const fn stamp() -> i64 {
    SENTINEL
}

/// True if `tag` was read from an event this process injected.
pub const fn is_synthetic(tag: i64) -> bool {
    tag == SENTINEL
}
