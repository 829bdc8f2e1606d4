//! # Elevation Module
//!
//! Handles User Account Control (UAC) privileges on Windows.
//!
//! The user-scope PATH lives under `HKCU` and is writable by a standard user,
//! but the machine-scope PATH lives under `HKLM` and rejects writes from a
//! non-elevated process. Since waypost updates both in one run, it checks its
//! privileges up front and can relaunch itself through the UAC prompt so the
//! machine write has a chance of succeeding.

use std::ffi::CString;
use windows::Win32::Security::{GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY};
use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};
use windows::Win32::UI::Shell::ShellExecuteA;
use windows::Win32::UI::WindowsAndMessaging::SW_SHOW;
use log::info;

/// Checks if the current process has administrative privileges.
///
/// Opens the current process token and queries `TokenElevation`.
pub fn is_elevated() -> bool {
    let mut token = windows::Win32::Foundation::HANDLE::default();
    unsafe {
        if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token).is_ok() {
            let mut elevation = TOKEN_ELEVATION::default();
            let mut size = 0;
            if GetTokenInformation(
                token,
                TokenElevation,
                Some(&mut elevation as *mut _ as *mut _),
                std::mem::size_of::<TOKEN_ELEVATION>() as u32,
                &mut size,
            ).is_ok() {
                return elevation.TokenIsElevated != 0;
            }
        }
    }
    false
}

/// Relaunches the current executable with administrative privileges using the
/// "runas" verb, which triggers the Windows UAC prompt.
///
/// Returns `true` if the elevated process was spawned, `false` if the user
/// declined the prompt or the call failed. On `true` the caller should exit
/// and let the new process do the work.
///
/// # Safety
/// Uses `unsafe` Win32 calls: C-compatible strings are built from Rust strings
/// and raw pointers handed to the Windows shell API.
pub fn relaunch_as_admin() -> bool {
    if let Ok(exe_path) = std::env::current_exe() {
        // CString::new fails on interior null bytes; bail out instead of panicking.
        let exe_path_str = match CString::new(exe_path.to_string_lossy().as_bytes()) {
            Ok(s) => s,
            Err(_) => return false,
        };

        // Forward whatever arguments we were started with.
        let args: Vec<String> = std::env::args().skip(1).collect();
        let args_str = match CString::new(args.join(" ")) {
            Ok(s) => s,
            Err(_) => return false,
        };

        info!("Relaunching as admin: {:?} {:?}", exe_path, args);

        let operation = CString::new("runas").unwrap();

        unsafe {
            let result = ShellExecuteA(
                None, // Parent window (None = Desktop)
                windows::core::PCSTR(operation.as_ptr() as *const _),
                windows::core::PCSTR(exe_path_str.as_ptr() as *const _),
                windows::core::PCSTR(args_str.as_ptr() as *const _),
                windows::core::PCSTR(std::ptr::null()), // Working directory (NULL = current)
                SW_SHOW,
            );

            // ShellExecute returns an HINSTANCE > 32 on success;
            // values <= 32 are error codes (e.g. SE_ERR_ACCESSDENIED).
            if result.0 as isize > 32 {
                return true;
            }
        }
    }
    false
}
