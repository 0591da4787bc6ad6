/// The UI thread's message loop.
///
/// The thread that owns the session windows must be an OLE single-threaded
/// apartment and must pump Win32 messages for the RDP control to work. The
/// loop interleaves that pump with the jobs posted through the
/// [`UiDispatcher`](crate::UiDispatcher).
use std::sync::Arc;

use windows::Win32::Foundation::{LPARAM, WPARAM};
use windows::Win32::System::Ole::{OleInitialize, OleUninitialize};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::*;

use crate::dispatcher::{DispatchQueue, QueueStatus, Waker};
use crate::error::SessionError;

/// Thread message that only interrupts the wait; the queue is drained after
/// every pump pass anyway.
const WM_DISPATCH_WAKE: u32 = WM_APP + 0x51;

/// Upper bound on how long a posted job waits if a wake message is lost.
const WAIT_SLICE_MS: u32 = 50;

/// Keeps the calling thread in an OLE apartment until dropped.
pub struct OleApartment {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl OleApartment {
    pub fn enter() -> Result<Self, SessionError> {
        unsafe { OleInitialize(None) }
            .map_err(|error| SessionError::Platform(format!("OleInitialize: {error}")))?;
        Ok(Self {
            _not_send: std::marker::PhantomData,
        })
    }
}

impl Drop for OleApartment {
    fn drop(&mut self) {
        unsafe { OleUninitialize() };
    }
}

/// Wakes the calling thread's message loop from any other thread.
pub fn current_thread_waker() -> Waker {
    let thread_id = unsafe { GetCurrentThreadId() };
    Arc::new(move || unsafe {
        let _ = PostThreadMessageW(thread_id, WM_DISPATCH_WAKE, WPARAM(0), LPARAM(0));
    })
}

/// Pumps messages and runs queued jobs until `WM_QUIT` or a dispatcher
/// shutdown.
pub fn run<S>(queue: &DispatchQueue<S>, state: &mut S) {
    // Jobs posted before the loop started.
    if queue.drain(state) == QueueStatus::Closed {
        return;
    }

    loop {
        unsafe {
            let _ = MsgWaitForMultipleObjects(None, false, WAIT_SLICE_MS, QS_ALLINPUT);

            let mut msg = MSG::default();
            while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                if msg.message == WM_QUIT {
                    tracing::info!("WM_QUIT received; leaving ui loop");
                    return;
                }
                if msg.hwnd.is_invalid() && msg.message == WM_DISPATCH_WAKE {
                    continue;
                }
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }

        if queue.drain(state) == QueueStatus::Closed {
            tracing::info!("ui dispatcher shut down; leaving ui loop");
            return;
        }
    }
}
