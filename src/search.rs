use std::{
    collections::HashMap,
    env,
    ffi::OsStr,
    fmt::Debug,
    io,
    path::PathBuf,
    sync::Arc,
};

use thiserror::Error;
use tracing::{debug, warn};

use crate::class;

mod traverse;

pub use traverse::{Candidate, CandidateLocation, Candidates};

pub(crate) const CLASS_EXTENSION: &str = "class";
pub(crate) const ARCHIVE_EXTENSION: &str = "jar";

pub const BOOT_CLASS_PATH_ENV: &str = "JVM_BOOTCLASSPATH";
pub const EXT_DIRS_ENV: &str = "JVM_EXTDIRS";
pub const CLASS_PATH_ENV: &str = "CLASSPATH";

#[derive(Debug, Clone, Error)]
pub enum SearchError {
    #[error("class {0} not found on the class path")]
    NotFound(String),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("failed to read archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: Arc<zip::result::ZipError>,
    },
}

/// Maps a logical class name (`java/lang/Object`) to the bytes of its class file.
pub trait ClassSearch: Debug + Send + Sync {
    fn find(&self, class_name: &str) -> Result<Vec<u8>, SearchError>;
}

/// Search order of a class path root. Roots of an earlier kind always win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RootKind {
    Bootstrap,
    Extension,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassPathRoot {
    pub kind: RootKind,
    /// A directory searched recursively or a single archive.
    pub path: PathBuf,
}

/// Ordered class path roots: bootstrap, then extension, then user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassPath {
    roots: Vec<ClassPathRoot>,
}

impl ClassPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `JVM_BOOTCLASSPATH`, `JVM_EXTDIRS` and `CLASSPATH`. Missing variables contribute no
    /// roots.
    pub fn from_env() -> Self {
        let mut class_path = ClassPath::new();
        for (kind, variable) in [
            (RootKind::Bootstrap, BOOT_CLASS_PATH_ENV),
            (RootKind::Extension, EXT_DIRS_ENV),
            (RootKind::User, CLASS_PATH_ENV),
        ] {
            if let Some(value) = env::var_os(variable) {
                debug!("{variable}={}", value.to_string_lossy());
                class_path.push_search_path(kind, &value);
            }
        }
        class_path
    }

    pub fn with_root(mut self, kind: RootKind, path: impl Into<PathBuf>) -> Self {
        self.push(kind, path);
        self
    }

    /// Adds a root after every root of the same or an earlier kind.
    pub fn push(&mut self, kind: RootKind, path: impl Into<PathBuf>) {
        let position = self.roots.partition_point(|root| root.kind <= kind);
        self.roots.insert(
            position,
            ClassPathRoot {
                kind,
                path: path.into(),
            },
        );
    }

    /// Adds every entry of a platform search path string (`a:b` on unix). Empty entries are
    /// ignored.
    pub fn push_search_path(&mut self, kind: RootKind, paths: &OsStr) {
        for path in env::split_paths(paths) {
            if path.as_os_str().is_empty() {
                continue;
            }
            self.push(kind, path);
        }
    }

    pub fn roots(&self) -> &[ClassPathRoot] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn candidates(&self) -> Candidates<'_> {
        Candidates::new(&self.roots)
    }
}

/// Searches directories and archives on disk.
#[derive(Debug, Clone, Default)]
pub struct ClassPathSearch {
    class_path: ClassPath,
}

impl ClassPathSearch {
    pub fn new(class_path: ClassPath) -> Self {
        ClassPathSearch { class_path }
    }

    pub fn class_path(&self) -> &ClassPath {
        &self.class_path
    }

    /// The first candidate holding `class_name`, with its bytes. A loose file found only by
    /// path suffix counts when its class file declares `class_name`; otherwise the search goes on.
    pub fn locate(&self, class_name: &str) -> Result<(Candidate, Vec<u8>), SearchError> {
        for candidate in self.class_path.candidates() {
            if candidate.logical_name == class_name {
                let bytes = candidate.read_bytes()?;
                return Ok((candidate, bytes));
            }
            if !candidate.matches(class_name) {
                continue;
            }
            match candidate.read_bytes() {
                Ok(bytes) if declares(&bytes, class_name) => return Ok((candidate, bytes)),
                Ok(_) => debug!(
                    "{:?} does not declare {class_name}, searching on",
                    candidate.location
                ),
                Err(err) => warn!("skipping {:?}: {err}", candidate.location),
            }
        }
        Err(SearchError::NotFound(class_name.to_string()))
    }
}

fn declares(bytes: &[u8], class_name: &str) -> bool {
    class::parse(bytes).is_ok_and(|descriptor| {
        descriptor
            .class_name()
            .is_ok_and(|name| &**name == class_name)
    })
}

impl ClassSearch for ClassPathSearch {
    fn find(&self, class_name: &str) -> Result<Vec<u8>, SearchError> {
        let (candidate, bytes) = self.locate(class_name)?;
        debug!(
            "found {class_name} in {:?} root at {:?}",
            candidate.root, candidate.location
        );
        Ok(bytes)
    }
}

/// Class files held in memory, keyed by logical name.
#[derive(Debug, Clone, Default)]
pub struct MemorySearch {
    classes: HashMap<String, Arc<[u8]>>,
}

impl MemorySearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, class_name: &str, bytes: Vec<u8>) {
        self.classes.insert(class_name.to_string(), bytes.into());
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.classes.contains_key(class_name)
    }
}

impl ClassSearch for MemorySearch {
    fn find(&self, class_name: &str) -> Result<Vec<u8>, SearchError> {
        self.classes
            .get(class_name)
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| SearchError::NotFound(class_name.to_string()))
    }
}

impl<T: ClassSearch + ?Sized> ClassSearch for Arc<T> {
    fn find(&self, class_name: &str) -> Result<Vec<u8>, SearchError> {
        (**self).find(class_name)
    }
}
