use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use anyhow::{Result, bail};
use windows_registry::{CURRENT_USER, LOCAL_MACHINE};

/// Which of the two persisted PATH stores an operation targets.
///
/// Windows keeps two separate `Path` values: one per user under
/// `HKCU\Environment`, and one machine-wide under the Session Manager key in
/// `HKLM`. They are independent stores; a login shell sees their concatenation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    User,
    Machine,
}

impl Scope {
    /// Registry hive path holding this scope's `Path` value.
    pub fn registry_key(&self) -> &'static str {
        match self {
            Scope::User => r"Environment",
            Scope::Machine => r"SYSTEM\CurrentControlSet\Control\Session Manager\Environment",
        }
    }

    /// Hive name as it appears in a `.reg` backup file.
    pub fn reg_file_hive(&self) -> &'static str {
        match self {
            Scope::User => r"HKEY_CURRENT_USER\Environment",
            Scope::Machine => {
                r"HKEY_LOCAL_MACHINE\SYSTEM\CurrentControlSet\Control\Session Manager\Environment"
            }
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::User => write!(f, "user"),
            Scope::Machine => write!(f, "machine"),
        }
    }
}

/// Abstraction for System interactions (Registry, File System, Environment).
/// This allows us to mock the dangerous Windows Registry interactions for testing.
pub trait SystemOps {
    /// Read the persisted PATH for a scope. A missing `Path` value reads as
    /// an empty string; failure to open the key itself is an error.
    fn read_path(&self, scope: Scope) -> Result<String>;

    /// Write the persisted PATH for a scope. The Machine scope requires
    /// Administrator privileges; the OS error propagates unchanged if we
    /// don't have them.
    fn write_path(&self, scope: Scope, value: &str) -> Result<()>;

    /// Broadcast the "Environment Changed" message to the system.
    fn broadcast_environment_change(&self) -> Result<()>;

    /// Write a backup file to disk.
    fn write_backup_file(&self, path: &Path, content: &str) -> Result<()>;
}

/// The Real System implementation (Production).
pub struct WindowsSystem;

impl SystemOps for WindowsSystem {
    fn read_path(&self, scope: Scope) -> Result<String> {
        use windows::Win32::Foundation::ERROR_FILE_NOT_FOUND;

        let key = match scope {
            Scope::User => CURRENT_USER.open(scope.registry_key())?,
            Scope::Machine => LOCAL_MACHINE.open(scope.registry_key())?,
        };
        // The Environment key always exists; the Path value may not (fresh
        // accounts sometimes have no user Path at all). Only that exact case
        // reads as empty. Any other read failure must abort the run: treating
        // it as an empty PATH would make the upsert replace the whole store
        // with a single entry.
        match key.get_string("Path") {
            Ok(value) => Ok(value),
            Err(e) if e.code() == ERROR_FILE_NOT_FOUND.to_hresult() => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_path(&self, scope: Scope, value: &str) -> Result<()> {
        let key = match scope {
            Scope::User => CURRENT_USER.create(scope.registry_key())?,
            Scope::Machine => LOCAL_MACHINE.create(scope.registry_key())?,
        };
        key.set_string("Path", value)?;
        Ok(())
    }

    fn broadcast_environment_change(&self) -> Result<()> {
        use windows::Win32::UI::WindowsAndMessaging::{
            SendMessageTimeoutA, HWND_BROADCAST, WM_SETTINGCHANGE, SMTO_ABORTIFHUNG,
        };
        use windows::Win32::Foundation::{LPARAM, WPARAM};

        unsafe {
            let env_str = std::ffi::CString::new("Environment").unwrap();
            let mut result: usize = 0;
            SendMessageTimeoutA(
                HWND_BROADCAST,
                WM_SETTINGCHANGE,
                WPARAM(0),
                LPARAM(env_str.as_ptr() as isize),
                SMTO_ABORTIFHUNG,
                5000,
                Some(&mut result),
            );
        }
        Ok(())
    }

    fn write_backup_file(&self, path: &Path, content: &str) -> Result<()> {
        use std::io::Write;
        let mut f = std::fs::File::create(path)?;
        f.write_all(content.as_bytes())?;
        Ok(())
    }
}

/// A Mock System for Testing.
#[derive(Debug, Default)]
pub struct MockSystem {
    /// In-memory stand-in for the two registry stores.
    pub registry: std::sync::Mutex<HashMap<Scope, String>>,
    /// Every write that went through, in order.
    pub writes: std::sync::Mutex<Vec<(Scope, String)>>,
    /// Backup files "written", by path.
    pub backups: std::sync::Mutex<Vec<PathBuf>>,
    pub broadcast_called: std::sync::Mutex<bool>,
    /// Simulate a non-elevated process: Machine-scope writes are rejected.
    pub deny_machine_writes: bool,
    /// Simulate a corrupt store: every read fails.
    pub deny_reads: bool,
}

impl MockSystem {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn with_path(scope: Scope, value: &str) -> Self {
        let mut map = HashMap::new();
        map.insert(scope, value.to_string());
        Self {
            registry: std::sync::Mutex::new(map),
            ..Default::default()
        }
    }

    #[allow(dead_code)]
    pub fn path(&self, scope: Scope) -> String {
        self.registry.lock().unwrap().get(&scope).cloned().unwrap_or_default()
    }

    #[allow(dead_code)]
    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

impl SystemOps for MockSystem {
    fn read_path(&self, scope: Scope) -> Result<String> {
        if self.deny_reads {
            bail!("The configuration registry database is corrupt. (os error 1009)");
        }
        // Like the real store: an absent value is an empty PATH, not an error.
        Ok(self.path(scope))
    }

    fn write_path(&self, scope: Scope, value: &str) -> Result<()> {
        if scope == Scope::Machine && self.deny_machine_writes {
            bail!("Access is denied. (os error 5)");
        }
        self.registry.lock().unwrap().insert(scope, value.to_string());
        self.writes.lock().unwrap().push((scope, value.to_string()));
        Ok(())
    }

    fn broadcast_environment_change(&self) -> Result<()> {
        *self.broadcast_called.lock().unwrap() = true;
        Ok(())
    }

    fn write_backup_file(&self, path: &Path, _content: &str) -> Result<()> {
        self.backups.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}
