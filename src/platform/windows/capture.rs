//! Low-level keyboard hook (WH_KEYBOARD_LL) feeding the chord engine.
//!
//! `start()` spawns a background thread that installs the hook and runs a
//! `GetMessageW` loop (required for low-level hooks to deliver events).
//! `stop()` posts `WM_QUIT` to that thread and joins it; the thread unhooks
//! itself on the way out.
//!
//! Injected events are not filtered by `LLKHF_INJECTED`: other tools inject
//! too, and only events carrying our `dwExtraInfo` stamp may bypass the
//! engine. The engine's guard makes that decision.
//!
//! Suppression: returning a non-zero `LRESULT` without calling
//! `CallNextHookEx` drops the event for every application.
//!
//! Windows silently removes a hook whose proc exceeds `LowLevelHooksTimeout`
//! and does not notify the owner, so `on_interruption` is never called here.

use std::ptr;
use std::sync::{mpsc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use windows_sys::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows_sys::Win32::System::Threading::GetCurrentThreadId;
use windows_sys::Win32::UI::Input::KeyboardAndMouse::{
    GetAsyncKeyState, VK_CONTROL, VK_LWIN, VK_MENU, VK_RWIN, VK_SHIFT,
};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, GetMessageW, PostThreadMessageW, SetWindowsHookExW, UnhookWindowsHookEx,
    HC_ACTION, KBDLLHOOKSTRUCT, MSG, WH_KEYBOARD_LL, WM_KEYDOWN, WM_KEYUP, WM_QUIT,
    WM_SYSKEYDOWN, WM_SYSKEYUP,
};

use super::keycodes::vkcode_to_keycode;
use crate::keycode::{KeyState, Modifiers};
use crate::platform::{deliver, Disposition, EventHandler, InputCapture, InputEvent, PlatformError};

// ---------------------------------------------------------------------------
// Process-global handler storage
// ---------------------------------------------------------------------------

/// `WH_KEYBOARD_LL` hook procs receive no user pointer, so the handler lives
/// in a global. At most one `WindowsCapture` may be active.
static HOOK_HANDLER: Mutex<Option<Box<dyn EventHandler>>> = Mutex::new(None);

fn set_handler(handler: Option<Box<dyn EventHandler>>) {
    *HOOK_HANDLER.lock().unwrap_or_else(PoisonError::into_inner) = handler;
}

// ---------------------------------------------------------------------------
// Public struct
// ---------------------------------------------------------------------------

pub struct WindowsCapture {
    /// Thread ID of the message-loop thread, target of `WM_QUIT`.
    thread_id: u32,
    thread: Option<JoinHandle<()>>,
}

impl WindowsCapture {
    pub fn new() -> Self {
        Self {
            thread_id: 0,
            thread: None,
        }
    }
}

impl InputCapture for WindowsCapture {
    fn start(&mut self, handler: Box<dyn EventHandler>) -> Result<(), PlatformError> {
        if self.thread.is_some() {
            return Err(PlatformError::Other("capture already started".into()));
        }
        set_handler(Some(handler));

        let (ready_tx, ready_rx) = mpsc::channel::<Result<u32, PlatformError>>();

        let spawned = thread::Builder::new()
            .name("keyboard-hook".into())
            .spawn(move || {
                let hook =
                    unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, Some(hook_proc), ptr::null_mut(), 0) };
                if hook.is_null() {
                    let _ = ready_tx.send(Err(PlatformError::Unavailable(
                        "SetWindowsHookExW(WH_KEYBOARD_LL) failed".into(),
                    )));
                    return;
                }

                let _ = ready_tx.send(Ok(unsafe { GetCurrentThreadId() }));
                log::info!("capture: keyboard hook installed");

                // 0 on WM_QUIT, -1 on error; both end the loop.
                unsafe {
                    let mut msg: MSG = std::mem::zeroed();
                    while GetMessageW(&mut msg, ptr::null_mut(), 0, 0) > 0 {}
                    UnhookWindowsHookEx(hook);
                }
                log::info!("capture: message loop exited, hook removed");
            });

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                set_handler(None);
                return Err(PlatformError::Other(format!("spawn capture thread: {e}")));
            }
        };

        match ready_rx.recv() {
            Ok(Ok(thread_id)) => {
                self.thread_id = thread_id;
                self.thread = Some(thread);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                set_handler(None);
                Err(e)
            }
            Err(_) => {
                set_handler(None);
                Err(PlatformError::Other(
                    "keyboard-hook thread ended during setup".into(),
                ))
            }
        }
    }

    fn stop(&mut self) -> Result<(), PlatformError> {
        if self.thread_id != 0 {
            unsafe { PostThreadMessageW(self.thread_id, WM_QUIT, 0, 0) };
            self.thread_id = 0;
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("capture: hook thread panicked");
            }
            // The thread has unhooked; no hook_proc call can be in flight.
            set_handler(None);
        }
        Ok(())
    }
}

impl Drop for WindowsCapture {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

// ---------------------------------------------------------------------------
// Hook procedure
// ---------------------------------------------------------------------------

fn is_down(vk: u16) -> bool {
    // High bit set: key currently down.
    unsafe { GetAsyncKeyState(i32::from(vk)) < 0 }
}

fn current_modifiers() -> Modifiers {
    Modifiers {
        shift: is_down(VK_SHIFT),
        ctrl: is_down(VK_CONTROL),
        alt: is_down(VK_MENU),
        meta: is_down(VK_LWIN) || is_down(VK_RWIN),
    }
}

/// Runs on the message-loop thread for every keyboard event in the session.
unsafe extern "system" fn hook_proc(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if n_code != HC_ACTION as i32 {
        return CallNextHookEx(ptr::null_mut(), n_code, w_param, l_param);
    }

    let state = match w_param as u32 {
        WM_KEYDOWN | WM_SYSKEYDOWN => KeyState::Down,
        WM_KEYUP | WM_SYSKEYUP => KeyState::Up,
        _ => return CallNextHookEx(ptr::null_mut(), n_code, w_param, l_param),
    };

    let kb = &*(l_param as *const KBDLLHOOKSTRUCT);
    let event = InputEvent {
        key: vkcode_to_keycode(kb.vkCode as u16),
        state,
        modifiers: current_modifiers(),
        tag: kb.dwExtraInfo as i64,
    };

    let disposition = {
        let mut slot = HOOK_HANDLER.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_mut() {
            Some(handler) => deliver(handler.as_mut(), event),
            None => Disposition::Pass,
        }
    };

    match disposition {
        Disposition::Swallow => 1,
        Disposition::Pass => CallNextHookEx(ptr::null_mut(), n_code, w_param, l_param),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_before_start_is_harmless() {
        let mut hook = WindowsCapture::new();
        assert!(hook.thread_id == 0 && hook.thread.is_none());
        assert!(hook.stop().is_ok());
        assert!(hook.stop().is_ok());
    }

    #[test]
    fn clearing_the_slot_drops_the_handler() {
        set_handler(None);
        assert!(HOOK_HANDLER.lock().unwrap().is_none());
    }
}
