//! Filesystem boundary: the sole I/O site in the crate.
//!
//! Everything above this module manipulates paths as pure forward-slash
//! strings; only a [`Workspace`] implementation touches the disk. Tests (and
//! the purity properties of the pipeline) run against the in-memory
//! [`MemWorkspace`].

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io;

/// Abstract byte I/O plus path resolution. Implementations must keep
/// `list_dir` output stably sorted so downstream ordering stays
/// deterministic.
pub trait Workspace {
    fn exists(&self, path: &Utf8Path) -> bool;

    fn is_file(&self, path: &Utf8Path) -> bool;

    /// Read a file as UTF-8. Failures surface as `FS_READ` diagnostics at the
    /// call site.
    fn read_to_string(&self, path: &Utf8Path) -> io::Result<String>;

    /// Write a UTF-8 file, creating parent directories. Failures surface as
    /// `EMIT_WRITE_FAIL` diagnostics at the call site.
    fn write(&self, path: &Utf8Path, contents: &str) -> io::Result<()>;

    /// Immediate children of a directory, as full paths, sorted.
    fn list_dir(&self, path: &Utf8Path) -> io::Result<Vec<Utf8PathBuf>>;

    /// Absolute forward-slash form of `path`, resolved lexically (the target
    /// does not have to exist).
    fn absolutize(&self, path: &Utf8Path) -> io::Result<Utf8PathBuf>;
}

/// The real filesystem.
#[derive(Debug, Default)]
pub struct OsWorkspace;

impl OsWorkspace {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Workspace for OsWorkspace {
    fn exists(&self, path: &Utf8Path) -> bool {
        path.as_std_path().exists()
    }

    fn is_file(&self, path: &Utf8Path) -> bool {
        path.as_std_path().is_file()
    }

    fn read_to_string(&self, path: &Utf8Path) -> io::Result<String> {
        fs::read_to_string(path.as_std_path())
    }

    fn write(&self, path: &Utf8Path, contents: &str) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())?;
        }
        fs::write(path.as_std_path(), contents)
    }

    fn list_dir(&self, path: &Utf8Path) -> io::Result<Vec<Utf8PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path.as_std_path())? {
            let entry = entry?;
            let child = Utf8PathBuf::from_path_buf(entry.path())
                .map_err(|p| io::Error::other(format!("non-UTF-8 path: {}", p.display())))?;
            entries.push(to_posix(&child));
        }
        entries.sort();
        Ok(entries)
    }

    fn absolutize(&self, path: &Utf8Path) -> io::Result<Utf8PathBuf> {
        let posix = to_posix(path);
        if posix.is_absolute() {
            return Ok(normalize(&posix));
        }
        let cwd = std::env::current_dir()?;
        let cwd = Utf8PathBuf::from_path_buf(cwd)
            .map_err(|p| io::Error::other(format!("non-UTF-8 cwd: {}", p.display())))?;
        Ok(normalize(&to_posix(&cwd).join(posix)))
    }
}

/// In-memory tree keyed by absolute posix path. Directories exist implicitly
/// whenever a file lives under them.
#[derive(Debug, Default)]
pub struct MemWorkspace {
    files: RefCell<BTreeMap<Utf8PathBuf, String>>,
    read_only: RefCell<bool>,
}

impl MemWorkspace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file, normalizing the path to absolute posix form.
    pub fn add_file(&self, path: impl AsRef<Utf8Path>, contents: impl Into<String>) {
        let key = self.abs_key(path.as_ref());
        self.files.borrow_mut().insert(key, contents.into());
    }

    /// Make every subsequent `write` fail, for exercising emit error paths.
    pub fn set_read_only(&self, read_only: bool) {
        *self.read_only.borrow_mut() = read_only;
    }

    #[must_use]
    pub fn file(&self, path: impl AsRef<Utf8Path>) -> Option<String> {
        self.files.borrow().get(&self.abs_key(path.as_ref())).cloned()
    }

    #[must_use]
    pub fn paths(&self) -> Vec<Utf8PathBuf> {
        self.files.borrow().keys().cloned().collect()
    }

    fn abs_key(&self, path: &Utf8Path) -> Utf8PathBuf {
        let posix = to_posix(path);
        if posix.is_absolute() {
            normalize(&posix)
        } else {
            normalize(&Utf8PathBuf::from("/").join(posix))
        }
    }
}

impl Workspace for MemWorkspace {
    fn exists(&self, path: &Utf8Path) -> bool {
        let key = self.abs_key(path);
        let files = self.files.borrow();
        if files.contains_key(&key) {
            return true;
        }
        let prefix = format!("{key}/");
        files.keys().any(|k| k.as_str().starts_with(&prefix))
    }

    fn is_file(&self, path: &Utf8Path) -> bool {
        self.files.borrow().contains_key(&self.abs_key(path))
    }

    fn read_to_string(&self, path: &Utf8Path) -> io::Result<String> {
        self.files
            .borrow()
            .get(&self.abs_key(path))
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no such file: {path}")))
    }

    fn write(&self, path: &Utf8Path, contents: &str) -> io::Result<()> {
        if *self.read_only.borrow() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("read-only workspace: {path}"),
            ));
        }
        let key = self.abs_key(path);
        self.files.borrow_mut().insert(key, contents.to_owned());
        Ok(())
    }

    fn list_dir(&self, path: &Utf8Path) -> io::Result<Vec<Utf8PathBuf>> {
        let dir = self.abs_key(path);
        let prefix = if dir.as_str() == "/" {
            "/".to_owned()
        } else {
            format!("{dir}/")
        };
        let mut children = std::collections::BTreeSet::new();
        for key in self.files.borrow().keys() {
            if let Some(rest) = key.as_str().strip_prefix(&prefix) {
                if let Some(first) = rest.split('/').next() {
                    if !first.is_empty() {
                        children.insert(dir.join(first));
                    }
                }
            }
        }
        Ok(children.into_iter().collect())
    }

    fn absolutize(&self, path: &Utf8Path) -> io::Result<Utf8PathBuf> {
        Ok(self.abs_key(path))
    }
}

/// Replace backslashes with forward slashes without touching the disk.
#[must_use]
pub fn to_posix(path: &Utf8Path) -> Utf8PathBuf {
    if path.as_str().contains('\\') {
        Utf8PathBuf::from(path.as_str().replace('\\', "/"))
    } else {
        path.to_owned()
    }
}

/// Resolve `.` and `..` segments lexically.
#[must_use]
pub fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut out = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_str()),
        }
    }
    if out.as_str().is_empty() {
        Utf8PathBuf::from(".")
    } else {
        out
    }
}

/// Express `path` relative to `base`, walking up with `..` where needed.
/// Both inputs should already be normalized.
#[must_use]
pub fn relative_from(path: &Utf8Path, base: &Utf8Path) -> Utf8PathBuf {
    if base.as_str() == "." || base.as_str().is_empty() {
        return path.to_owned();
    }
    if let Ok(stripped) = path.strip_prefix(base) {
        return if stripped.as_str().is_empty() {
            Utf8PathBuf::from(".")
        } else {
            stripped.to_owned()
        };
    }
    let path_parts: Vec<&str> = path.components().map(|c| c.as_str()).collect();
    let base_parts: Vec<&str> = base.components().map(|c| c.as_str()).collect();
    let common = path_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();
    let mut out = Utf8PathBuf::new();
    for _ in common..base_parts.len() {
        out.push("..");
    }
    for part in &path_parts[common..] {
        out.push(part);
    }
    out
}
