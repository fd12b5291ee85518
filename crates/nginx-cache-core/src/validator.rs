//! Decides whether a configured path is safe to treat as a cache zone root.
//!
//! Nginx's FastCGI, proxy and uWSGI cache modules store every response in a
//! file named after the MD5 of its cache key, spread over `levels=`
//! subdirectories. Anything else in the tree means the path is not a cache
//! zone, and the purge must not touch it.

use crate::fs::{CredentialError, DirectoryEntry, EntryKind, Filesystem};
use std::fmt;
use std::path::Path;

const CACHE_FILE_NAME_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationReason {
    PathEmpty,
    PathNotFound,
    NotADirectory,
    NotACacheZoneShape,
    NotWritable,
    FilesystemUnavailable,
}

impl ValidationReason {
    /// Only an unset path is a configuration gap rather than a mistake.
    pub fn is_configuration(self) -> bool {
        self == ValidationReason::PathEmpty
    }

    pub fn code(self) -> &'static str {
        match self {
            ValidationReason::PathEmpty => "empty",
            ValidationReason::PathNotFound => "not-found",
            ValidationReason::NotADirectory => "not-a-directory",
            ValidationReason::NotACacheZoneShape => "wrong-shape",
            ValidationReason::NotWritable => "not-writable",
            ValidationReason::FilesystemUnavailable => "fs-unavailable",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ValidationReason::PathEmpty => "\"Cache Zone Path\" is not set.",
            ValidationReason::PathNotFound => "\"Cache Zone Path\" does not exist.",
            ValidationReason::NotADirectory => "\"Cache Zone Path\" is not a directory.",
            ValidationReason::NotACacheZoneShape => {
                "\"Cache Zone Path\" does not appear to be a Nginx cache zone directory."
            }
            ValidationReason::NotWritable => "\"Cache Zone Path\" is not writable.",
            ValidationReason::FilesystemUnavailable => {
                "Filesystem API could not be initialized."
            }
        }
    }
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(ValidationReason),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn into_result(self) -> Result<(), ValidationReason> {
        match self {
            ValidationResult::Valid => Ok(()),
            ValidationResult::Invalid(reason) => Err(reason),
        }
    }
}

/// True for a 32 character hexadecimal name, e.g. `d41d8cd98f00b204e9800998ecf8427e`.
pub fn is_cache_zone_name(name: &str) -> bool {
    name.len() == CACHE_FILE_NAME_LEN && name.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Walks `root`'s children; every file at any depth must carry a cache file name.
///
/// Directory names are not checked. Empty trees pass.
pub fn is_cache_zone_shape(root: &DirectoryEntry) -> bool {
    root.children.iter().all(|entry| match entry.kind {
        EntryKind::File => is_cache_zone_name(&entry.name),
        EntryKind::Directory => is_cache_zone_shape(entry),
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PathValidator;

impl PathValidator {
    pub fn new() -> Self {
        Self
    }

    /// Runs every check in order and stops at the first failure.
    ///
    /// `fs` is the outcome of acquiring filesystem access for `path`; a
    /// failed acquisition only matters once a path is actually configured.
    pub fn validate(
        &self,
        path: &str,
        fs: Result<&dyn Filesystem, &CredentialError>,
    ) -> ValidationResult {
        if path.is_empty() {
            return ValidationResult::Invalid(ValidationReason::PathEmpty);
        }

        let fs = match fs {
            Ok(fs) => fs,
            Err(err) => {
                tracing::warn!(path, error = %err, "filesystem access unavailable");
                return ValidationResult::Invalid(ValidationReason::FilesystemUnavailable);
            }
        };

        let zone = Path::new(path);
        if !fs.exists(zone) {
            return ValidationResult::Invalid(ValidationReason::PathNotFound);
        }
        if !fs.is_dir(zone) {
            return ValidationResult::Invalid(ValidationReason::NotADirectory);
        }

        match fs.find_rejected_file(zone, &is_cache_zone_name) {
            Ok(None) => {}
            Ok(Some(stray)) => {
                tracing::warn!(path, file = %stray, "file outside cache zone naming");
                return ValidationResult::Invalid(ValidationReason::NotACacheZoneShape);
            }
            Err(err) => {
                tracing::warn!(path, error = %err, "cache zone listing failed");
                return ValidationResult::Invalid(ValidationReason::NotACacheZoneShape);
            }
        }

        if !fs.is_writable(zone) {
            return ValidationResult::Invalid(ValidationReason::NotWritable);
        }

        ValidationResult::Valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io;

    const HASH_A: &str = "d41d8cd98f00b204e9800998ecf8427e";
    const HASH_B: &str = "0CC175B9C0F1B6A831C399E269772661";

    #[test]
    fn names_must_be_32_hex_digits() {
        assert!(is_cache_zone_name(HASH_A));
        assert!(is_cache_zone_name(HASH_B));
        assert!(!is_cache_zone_name("d41d8cd98f00b204e9800998ecf8427"));
        assert!(!is_cache_zone_name("d41d8cd98f00b204e9800998ecf8427ee"));
        assert!(!is_cache_zone_name("g41d8cd98f00b204e9800998ecf8427e"));
        assert!(!is_cache_zone_name("not-a-hash.txt"));
    }

    #[test]
    fn one_bad_file_deep_down_invalidates_tree() {
        let tree = DirectoryEntry::dir(
            "zone",
            vec![
                DirectoryEntry::file(HASH_A),
                DirectoryEntry::dir(
                    "a",
                    vec![DirectoryEntry::dir(
                        "b",
                        vec![DirectoryEntry::dir(
                            "c",
                            vec![DirectoryEntry::file("not-a-hash.txt")],
                        )],
                    )],
                ),
            ],
        );
        assert!(!is_cache_zone_shape(&tree));
    }

    #[test]
    fn directories_only_and_single_hash_are_valid() {
        let dirs_only = DirectoryEntry::dir(
            "zone",
            vec![DirectoryEntry::dir("e", vec![DirectoryEntry::dir("27", vec![])])],
        );
        assert!(is_cache_zone_shape(&dirs_only));
        assert!(is_cache_zone_shape(&DirectoryEntry::dir("zone", vec![])));
        assert!(is_cache_zone_shape(&DirectoryEntry::dir(
            "zone",
            vec![DirectoryEntry::file(HASH_A)]
        )));
    }

    /// Scripted filesystem that records which checks ran.
    struct Scripted {
        exists: bool,
        is_dir: bool,
        listing: Option<DirectoryEntry>,
        writable: bool,
        calls: RefCell<Vec<&'static str>>,
    }

    impl Scripted {
        fn healthy() -> Self {
            Self {
                exists: true,
                is_dir: true,
                listing: Some(DirectoryEntry::dir("zone", vec![DirectoryEntry::file(HASH_A)])),
                writable: true,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl Filesystem for Scripted {
        fn exists(&self, _: &Path) -> bool {
            self.calls.borrow_mut().push("exists");
            self.exists
        }
        fn is_dir(&self, _: &Path) -> bool {
            self.calls.borrow_mut().push("is_dir");
            self.is_dir
        }
        fn list_recursive(&self, _: &Path) -> io::Result<DirectoryEntry> {
            self.calls.borrow_mut().push("list");
            self.listing
                .clone()
                .ok_or_else(|| io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        }
        fn is_writable(&self, _: &Path) -> bool {
            self.calls.borrow_mut().push("writable");
            self.writable
        }
        fn remove_recursive(&self, _: &Path) -> io::Result<()> {
            panic!("validation must never remove anything");
        }
    }

    #[test]
    fn empty_path_wins_over_missing_filesystem() {
        let err = CredentialError::Unavailable("prompt declined".into());
        assert_eq!(
            PathValidator.validate("", Err(&err)),
            ValidationResult::Invalid(ValidationReason::PathEmpty)
        );
        assert_eq!(
            PathValidator.validate("/var/cache/nginx", Err(&err)),
            ValidationResult::Invalid(ValidationReason::FilesystemUnavailable)
        );
    }

    #[test]
    fn missing_path_stops_before_other_checks() {
        let fs = Scripted {
            exists: false,
            writable: false,
            ..Scripted::healthy()
        };
        assert_eq!(
            PathValidator.validate("/zone", Ok(&fs)),
            ValidationResult::Invalid(ValidationReason::PathNotFound)
        );
        assert_eq!(*fs.calls.borrow(), vec!["exists"]);
    }

    #[test]
    fn shape_is_checked_before_writability() {
        let fs = Scripted {
            listing: Some(DirectoryEntry::dir("zone", vec![DirectoryEntry::file("index.php")])),
            writable: false,
            ..Scripted::healthy()
        };
        assert_eq!(
            PathValidator.validate("/zone", Ok(&fs)),
            ValidationResult::Invalid(ValidationReason::NotACacheZoneShape)
        );
        assert_eq!(*fs.calls.borrow(), vec!["exists", "is_dir", "list"]);
    }

    #[test]
    fn unreadable_listing_fails_closed() {
        let fs = Scripted {
            listing: None,
            ..Scripted::healthy()
        };
        assert_eq!(
            PathValidator.validate("/zone", Ok(&fs)),
            ValidationResult::Invalid(ValidationReason::NotACacheZoneShape)
        );
    }

    #[test]
    fn every_stage_passing_is_valid() {
        let fs = Scripted::healthy();
        assert!(PathValidator.validate("/zone", Ok(&fs)).is_valid());
        assert_eq!(
            *fs.calls.borrow(),
            vec!["exists", "is_dir", "list", "writable"]
        );

        let read_only = Scripted {
            writable: false,
            ..Scripted::healthy()
        };
        assert_eq!(
            PathValidator.validate("/zone", Ok(&read_only)),
            ValidationResult::Invalid(ValidationReason::NotWritable)
        );
    }
}
