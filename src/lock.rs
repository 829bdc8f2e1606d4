//! # Update Lock
//!
//! The two PATH stores are OS-wide mutable state with no locking of their own.
//! Two concurrent installer runs could each read the old value, each append,
//! and the second write would silently drop the first one's entry. A named
//! Win32 mutex held across the whole read-modify-write sequence closes that
//! window.

use anyhow::{Result, bail};
use log::debug;
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_ABANDONED, WAIT_OBJECT_0};
use windows::Win32::System::Threading::{CreateMutexW, ReleaseMutex, WaitForSingleObject};
use windows::core::w;

/// How long a second instance waits for the first one to finish.
const ACQUIRE_TIMEOUT_MS: u32 = 30_000;

/// RAII guard over the machine-wide update mutex. Released on drop.
pub struct UpdateLock {
    handle: HANDLE,
}

impl UpdateLock {
    /// Acquires the named update mutex, waiting up to 30 seconds.
    ///
    /// `WAIT_ABANDONED` counts as acquired: it means a previous holder died
    /// mid-run, and our own read-modify-write is safe to proceed regardless of
    /// what it left in the stores.
    pub fn acquire() -> Result<Self> {
        unsafe {
            let handle = CreateMutexW(None, false, w!(r"Local\WaypostPathUpdate"))?;
            let wait = WaitForSingleObject(handle, ACQUIRE_TIMEOUT_MS);
            if wait != WAIT_OBJECT_0 && wait != WAIT_ABANDONED {
                let _ = CloseHandle(handle);
                bail!("another waypost instance is updating the PATH (gave up after 30s)");
            }
            debug!("Acquired PATH update lock");
            Ok(UpdateLock { handle })
        }
    }
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        unsafe {
            let _ = ReleaseMutex(self.handle);
            let _ = CloseHandle(self.handle);
        }
        debug!("Released PATH update lock");
    }
}
