use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One node of a recursive directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub kind: EntryKind,
    pub children: Vec<DirectoryEntry>,
}

impl DirectoryEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
            children: Vec::new(),
        }
    }

    pub fn dir(name: impl Into<String>, children: Vec<DirectoryEntry>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
            children,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

pub trait Filesystem {
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    /// Lists `path` and everything below it. The returned root is `path` itself.
    fn list_recursive(&self, path: &Path) -> io::Result<DirectoryEntry>;
    /// First file below `path` whose name `accept` rejects, or `None` when
    /// every file passes. Implementations may stop walking at the first hit.
    fn find_rejected_file(
        &self,
        path: &Path,
        accept: &dyn Fn(&str) -> bool,
    ) -> io::Result<Option<String>> {
        let listing = self.list_recursive(path)?;
        Ok(first_rejected(&listing, accept))
    }
    fn is_writable(&self, path: &Path) -> bool;
    fn remove_recursive(&self, path: &Path) -> io::Result<()>;
}

pub type FilesystemHandle = Box<dyn Filesystem>;

fn first_rejected(dir: &DirectoryEntry, accept: &dyn Fn(&str) -> bool) -> Option<String> {
    dir.children.iter().find_map(|entry| match entry.kind {
        EntryKind::File if !accept(&entry.name) => Some(entry.name.clone()),
        EntryKind::File => None,
        EntryKind::Directory => first_rejected(entry, accept),
    })
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("access to {} denied: {source}", path.display())]
    AccessDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("filesystem credentials unavailable: {0}")]
    Unavailable(String),
}

/// Obtains a filesystem handle scoped to a cache zone path.
pub trait FilesystemProvider: Send + Sync {
    fn acquire(&self, path: &Path) -> Result<FilesystemHandle, CredentialError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem;

impl Filesystem for LocalFilesystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_recursive(&self, path: &Path) -> io::Result<DirectoryEntry> {
        // Pre-order walk; `stack[d]` is the open directory at depth `d`.
        let mut stack: Vec<DirectoryEntry> = Vec::new();

        for entry in walk(path)? {
            let entry = entry.map_err(io::Error::from)?;
            let depth = entry.depth();
            fold_to_depth(&mut stack, depth);

            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().is_dir() {
                stack.push(DirectoryEntry::dir(name, Vec::new()));
            } else if let Some(parent) = stack.last_mut() {
                parent.children.push(DirectoryEntry::file(name));
            } else {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{} is not a directory", path.display()),
                ));
            }
        }

        fold_to_depth(&mut stack, 1);
        stack
            .pop()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "empty listing"))
    }

    fn find_rejected_file(
        &self,
        path: &Path,
        accept: &dyn Fn(&str) -> bool,
    ) -> io::Result<Option<String>> {
        for entry in walk(path)? {
            let entry = entry.map_err(io::Error::from)?;
            if entry.depth() == 0 {
                if !entry.file_type().is_dir() {
                    return Err(io::Error::new(
                        io::ErrorKind::Other,
                        format!("{} is not a directory", path.display()),
                    ));
                }
                continue;
            }
            if entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !accept(name.as_ref()) {
                return Ok(Some(name.into_owned()));
            }
        }
        Ok(None)
    }

    fn is_writable(&self, path: &Path) -> bool {
        writable(path)
    }

    /// Removes the directory `path` resolves to, so a zone configured
    /// through a symlink loses its contents rather than just the link.
    fn remove_recursive(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(std::fs::canonicalize(path)?)
    }
}

/// Walks the resolved zone root without following links below it.
fn walk(path: &Path) -> io::Result<walkdir::IntoIter> {
    let root = std::fs::canonicalize(path)?;
    Ok(WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter())
}

/// Closes every open directory deeper than `depth - 1`, attaching it to its parent.
fn fold_to_depth(stack: &mut Vec<DirectoryEntry>, depth: usize) {
    while stack.len() > depth.max(1) {
        if let Some(done) = stack.pop() {
            if let Some(parent) = stack.last_mut() {
                parent.children.push(done);
            }
        }
    }
}

#[cfg(unix)]
fn writable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    let ret = unsafe { libc::access(c_path.as_ptr(), libc::W_OK) };
    ret == 0
}

#[cfg(not(unix))]
fn writable(path: &Path) -> bool {
    path.metadata()
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}

/// Hands out [`LocalFilesystem`] once the process can read where the zone lives.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystemProvider;

impl FilesystemProvider for LocalFilesystemProvider {
    fn acquire(&self, path: &Path) -> Result<FilesystemHandle, CredentialError> {
        if let Some(anchor) = nearest_existing_ancestor(path) {
            if let Err(source) = std::fs::read_dir(&anchor) {
                if source.kind() == io::ErrorKind::PermissionDenied {
                    return Err(CredentialError::AccessDenied {
                        path: anchor,
                        source,
                    });
                }
            }
        }
        Ok(Box::new(LocalFilesystem))
    }
}

fn nearest_existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .skip(1)
        .find(|p| !p.as_os_str().is_empty() && p.is_dir())
        .map(Path::to_path_buf)
}
