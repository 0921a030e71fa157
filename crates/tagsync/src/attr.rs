//! Attribute Store: get/set/remove the identity attribute on a path.
//!
//! [`XattrStore`] talks to the kernel through `libc` first and falls back to the
//! `getfattr`/`setfattr` tools when the direct call is unavailable.
//! [`MemoryStore`] keeps values in a map and backs the engine tests.

use crate::error::{Result, TagSyncError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use tracing::debug;

/// Default extended attribute carrying the tag.
pub const DEFAULT_ATTRIBUTE: &str = "user.backup_id";

/// Pluggable attribute backend.
pub trait AttributeStore {
    /// Current attribute value, or `None` if the object carries none.
    fn get(&self, path: &Path) -> Result<Option<String>>;

    fn set(&self, path: &Path, value: &str) -> Result<()>;

    fn remove(&self, path: &Path) -> Result<()>;
}

impl<S: AttributeStore + ?Sized> AttributeStore for &S {
    fn get(&self, path: &Path) -> Result<Option<String>> {
        (**self).get(path)
    }

    fn set(&self, path: &Path, value: &str) -> Result<()> {
        (**self).set(path, value)
    }

    fn remove(&self, path: &Path) -> Result<()> {
        (**self).remove(path)
    }
}

/// Extended-attribute store.
#[derive(Debug, Clone)]
pub struct XattrStore {
    attribute: String,
    follow_symlinks: bool,
}

impl XattrStore {
    pub fn new(attribute: impl Into<String>, follow_symlinks: bool) -> Self {
        Self {
            attribute: attribute.into(),
            follow_symlinks,
        }
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    fn fallback_get(&self, path: &Path) -> Result<Option<String>> {
        let mut cmd = Command::new("getfattr");
        if !self.follow_symlinks {
            cmd.arg("-h");
        }
        let output = cmd
            .arg("--only-values")
            .arg("-n")
            .arg(&self.attribute)
            .arg(path)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| store_error(path, format!("failed to run getfattr: {e}")))?;

        // getfattr exits non-zero when the attribute is absent.
        if !output.status.success() {
            return Ok(None);
        }
        let value = String::from_utf8(output.stdout)
            .map_err(|_| store_error(path, "attribute value is not valid UTF-8"))?;
        let value = value.trim();
        Ok((!value.is_empty()).then(|| value.to_string()))
    }

    fn fallback_set(&self, path: &Path, value: Option<&str>) -> Result<()> {
        let mut cmd = Command::new("setfattr");
        if !self.follow_symlinks {
            cmd.arg("-h");
        }
        match value {
            Some(value) => cmd.arg("-n").arg(&self.attribute).arg("-v").arg(value),
            None => cmd.arg("-x").arg(&self.attribute),
        };
        let status = cmd
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| store_error(path, format!("failed to run setfattr: {e}")))?;
        if !status.success() {
            return Err(store_error(path, format!("setfattr exited with {status}")));
        }
        Ok(())
    }
}

impl Default for XattrStore {
    fn default() -> Self {
        Self::new(DEFAULT_ATTRIBUTE, false)
    }
}

impl AttributeStore for XattrStore {
    fn get(&self, path: &Path) -> Result<Option<String>> {
        match sys::get(path, &self.attribute, self.follow_symlinks) {
            Ok(Some(bytes)) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| store_error(path, "attribute value is not valid UTF-8")),
            Ok(None) => Ok(None),
            Err(err) if is_unsupported(&err) => {
                debug!(path = %path.display(), error = %err, "xattr syscall unavailable, using getfattr");
                self.fallback_get(path)
            }
            Err(err) => Err(store_error(path, err.to_string())),
        }
    }

    fn set(&self, path: &Path, value: &str) -> Result<()> {
        match sys::set(path, &self.attribute, value.as_bytes(), self.follow_symlinks) {
            Ok(()) => Ok(()),
            Err(err) if is_unsupported(&err) => {
                debug!(path = %path.display(), error = %err, "xattr syscall unavailable, using setfattr");
                self.fallback_set(path, Some(value))
            }
            Err(err) => Err(store_error(path, err.to_string())),
        }
    }

    fn remove(&self, path: &Path) -> Result<()> {
        match sys::remove(path, &self.attribute, self.follow_symlinks) {
            Ok(()) => Ok(()),
            Err(err) if is_unsupported(&err) => {
                debug!(path = %path.display(), error = %err, "xattr syscall unavailable, using setfattr");
                self.fallback_set(path, None)
            }
            Err(err) => Err(store_error(path, err.to_string())),
        }
    }
}

fn is_unsupported(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::Unsupported
}

fn store_error(path: &Path, message: impl Into<String>) -> TagSyncError {
    TagSyncError::AttributeStore {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

#[cfg(target_os = "linux")]
mod sys {
    use std::ffi::CString;
    use std::io;
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    fn c_path(path: &Path) -> io::Result<CString> {
        CString::new(path.as_os_str().as_bytes())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL byte"))
    }

    fn c_name(name: &str) -> io::Result<CString> {
        CString::new(name)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "attribute name contains NUL byte"))
    }

    fn map_errno(err: io::Error) -> io::Error {
        match err.raw_os_error() {
            Some(libc::ENOTSUP) | Some(libc::ENOSYS) => {
                io::Error::new(io::ErrorKind::Unsupported, err)
            }
            _ => err,
        }
    }

    pub fn get(path: &Path, name: &str, follow: bool) -> io::Result<Option<Vec<u8>>> {
        let c_path = c_path(path)?;
        let c_name = c_name(name)?;
        let mut buf = vec![0u8; 256];
        loop {
            // SAFETY: both C strings are NUL-terminated and `buf` is valid for `buf.len()` bytes.
            let len = unsafe {
                if follow {
                    libc::getxattr(
                        c_path.as_ptr(),
                        c_name.as_ptr(),
                        buf.as_mut_ptr().cast(),
                        buf.len(),
                    )
                } else {
                    libc::lgetxattr(
                        c_path.as_ptr(),
                        c_name.as_ptr(),
                        buf.as_mut_ptr().cast(),
                        buf.len(),
                    )
                }
            };
            if len >= 0 {
                buf.truncate(len as usize);
                return Ok(Some(buf));
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::ENODATA) => return Ok(None),
                Some(libc::ERANGE) if buf.len() < 64 * 1024 => {
                    let new_len = buf.len() * 4;
                    buf.resize(new_len, 0);
                }
                _ => return Err(map_errno(err)),
            }
        }
    }

    pub fn set(path: &Path, name: &str, value: &[u8], follow: bool) -> io::Result<()> {
        let c_path = c_path(path)?;
        let c_name = c_name(name)?;
        // SAFETY: both C strings are NUL-terminated and `value` is valid for `value.len()` bytes.
        let rc = unsafe {
            if follow {
                libc::setxattr(
                    c_path.as_ptr(),
                    c_name.as_ptr(),
                    value.as_ptr().cast(),
                    value.len(),
                    0,
                )
            } else {
                libc::lsetxattr(
                    c_path.as_ptr(),
                    c_name.as_ptr(),
                    value.as_ptr().cast(),
                    value.len(),
                    0,
                )
            }
        };
        if rc == 0 {
            Ok(())
        } else {
            Err(map_errno(io::Error::last_os_error()))
        }
    }

    pub fn remove(path: &Path, name: &str, follow: bool) -> io::Result<()> {
        let c_path = c_path(path)?;
        let c_name = c_name(name)?;
        // SAFETY: both C strings are NUL-terminated.
        let rc = unsafe {
            if follow {
                libc::removexattr(c_path.as_ptr(), c_name.as_ptr())
            } else {
                libc::lremovexattr(c_path.as_ptr(), c_name.as_ptr())
            }
        };
        if rc == 0 {
            Ok(())
        } else {
            Err(map_errno(io::Error::last_os_error()))
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod sys {
    use std::io;
    use std::path::Path;

    fn unsupported() -> io::Error {
        io::Error::new(io::ErrorKind::Unsupported, "xattr syscalls not wired for this platform")
    }

    pub fn get(_path: &Path, _name: &str, _follow: bool) -> io::Result<Option<Vec<u8>>> {
        Err(unsupported())
    }

    pub fn set(_path: &Path, _name: &str, _value: &[u8], _follow: bool) -> io::Result<()> {
        Err(unsupported())
    }

    pub fn remove(_path: &Path, _name: &str, _follow: bool) -> io::Result<()> {
        Err(unsupported())
    }
}

/// In-memory attribute store keyed by path.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<PathBuf, String>>,
    unreadable: Mutex<Vec<PathBuf>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `get` on `path` fail, to exercise per-object error handling.
    pub fn poison(&self, path: impl Into<PathBuf>) {
        if let Ok(mut unreadable) = self.unreadable.lock() {
            unreadable.push(path.into());
        }
    }

    /// Carry the value of `from` over to `to`, as a move on disk would.
    pub fn rename(&self, from: &Path, to: &Path) {
        if let Ok(mut values) = self.values.lock() {
            if let Some(value) = values.remove(from) {
                values.insert(to.to_path_buf(), value);
            }
        }
    }

    fn lock(&self, path: &Path) -> Result<std::sync::MutexGuard<'_, HashMap<PathBuf, String>>> {
        self.values
            .lock()
            .map_err(|_| store_error(path, "memory store lock poisoned"))
    }
}

impl AttributeStore for MemoryStore {
    fn get(&self, path: &Path) -> Result<Option<String>> {
        let poisoned = self
            .unreadable
            .lock()
            .map(|u| u.iter().any(|p| p == path))
            .unwrap_or(false);
        if poisoned {
            return Err(store_error(path, "permission denied"));
        }
        Ok(self.lock(path)?.get(path).cloned())
    }

    fn set(&self, path: &Path, value: &str) -> Result<()> {
        self.lock(path)?.insert(path.to_path_buf(), value.to_string());
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        match self.lock(path)?.remove(path) {
            Some(_) => Ok(()),
            None => Err(store_error(path, "no such attribute")),
        }
    }
}
