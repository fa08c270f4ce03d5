use std::{
    collections::HashSet,
    fs::{self, File, ReadDir},
    io::Read,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, warn};
use zip::ZipArchive;

use crate::search::{ARCHIVE_EXTENSION, CLASS_EXTENSION, ClassPathRoot, RootKind, SearchError};

/// A class file found while walking the class path. Nothing has been read yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub root: RootKind,
    /// Slash separated path of the entry without the class extension. For loose files this is
    /// relative to the directory root the walk started from.
    pub logical_name: String,
    pub location: CandidateLocation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateLocation {
    File(PathBuf),
    ArchiveEntry { archive: PathBuf, entry: String },
}

impl Candidate {
    /// Archive entries must match exactly. Loose files may sit below extra directories, so they
    /// match when the logical name is a whole-component suffix of their path.
    pub fn matches(&self, class_name: &str) -> bool {
        match self.location {
            CandidateLocation::ArchiveEntry { .. } => self.logical_name == class_name,
            CandidateLocation::File(_) => {
                self.logical_name == class_name
                    || self
                        .logical_name
                        .strip_suffix(class_name)
                        .is_some_and(|prefix| prefix.ends_with('/'))
            }
        }
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>, SearchError> {
        match &self.location {
            CandidateLocation::File(path) => fs::read(path).map_err(|source| SearchError::Io {
                path: path.clone(),
                source: Arc::new(source),
            }),
            CandidateLocation::ArchiveEntry { archive, entry } => {
                let zip_error = |source| SearchError::Archive {
                    path: archive.clone(),
                    source: Arc::new(source),
                };
                let file = File::open(archive).map_err(|source| SearchError::Io {
                    path: archive.clone(),
                    source: Arc::new(source),
                })?;
                let mut archive_reader = ZipArchive::new(file).map_err(zip_error)?;
                let mut class_file = archive_reader.by_name(entry).map_err(zip_error)?;
                let mut content = Vec::with_capacity(initial_capacity(class_file.size()));
                class_file
                    .read_to_end(&mut content)
                    .map_err(|source| SearchError::Io {
                        path: archive.join(entry),
                        source: Arc::new(source),
                    })?;
                Ok(content)
            }
        }
    }
}

enum Pending {
    Directory {
        kind: RootKind,
        base: Arc<Path>,
        entries: ReadDir,
    },
    Archive {
        kind: RootKind,
        path: PathBuf,
        entries: std::vec::IntoIter<String>,
    },
}

/// Depth-first walk over class path roots, in root order. Finite and not restartable.
/// Directories and archives that cannot be opened are skipped with a warning.
pub struct Candidates<'a> {
    roots: std::slice::Iter<'a, ClassPathRoot>,
    stack: Vec<Pending>,
    /// Canonical paths of every directory entered so far, so symlink loops end.
    visited: HashSet<PathBuf>,
}

impl<'a> Candidates<'a> {
    pub(crate) fn new(roots: &'a [ClassPathRoot]) -> Self {
        Candidates {
            roots: roots.iter(),
            stack: vec![],
            visited: HashSet::new(),
        }
    }

    fn push_root(&mut self, root: &ClassPathRoot) {
        if root.path.is_dir() {
            self.push_directory(root.kind, Arc::from(root.path.as_path()), &root.path);
        } else if root.path.is_file() {
            self.push_archive(root.kind, &root.path);
        } else {
            debug!("class path root {} does not exist", root.path.display());
        }
    }

    fn push_directory(&mut self, kind: RootKind, base: Arc<Path>, path: &Path) {
        match fs::canonicalize(path) {
            Ok(canonical) => {
                if !self.visited.insert(canonical) {
                    debug!("skipping {}: directory already searched", path.display());
                    return;
                }
            }
            Err(err) => {
                warn!("skipping unresolvable directory {}: {err}", path.display());
                return;
            }
        }
        match fs::read_dir(path) {
            Ok(entries) => self.stack.push(Pending::Directory {
                kind,
                base,
                entries,
            }),
            Err(err) => warn!("skipping unreadable directory {}: {err}", path.display()),
        }
    }

    fn push_archive(&mut self, kind: RootKind, path: &Path) {
        let names = File::open(path)
            .map_err(zip::result::ZipError::from)
            .and_then(ZipArchive::new)
            .map(|archive| {
                archive
                    .file_names()
                    .filter(|name| !name.ends_with('/'))
                    .map(String::from)
                    .collect::<Vec<_>>()
            });
        match names {
            Ok(names) => self.stack.push(Pending::Archive {
                kind,
                path: path.to_path_buf(),
                entries: names.into_iter(),
            }),
            Err(err) => warn!("skipping unreadable archive {}: {err}", path.display()),
        }
    }
}

impl Iterator for Candidates<'_> {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        loop {
            let Some(pending) = self.stack.last_mut() else {
                let root = self.roots.next()?;
                self.push_root(root);
                continue;
            };

            match pending {
                Pending::Directory {
                    kind,
                    base,
                    entries,
                } => {
                    let Some(entry) = entries.next() else {
                        self.stack.pop();
                        continue;
                    };
                    let (kind, base) = (*kind, Arc::clone(base));
                    let path = match entry {
                        Ok(entry) => entry.path(),
                        Err(err) => {
                            warn!("skipping unreadable entry under {}: {err}", base.display());
                            continue;
                        }
                    };
                    if path.is_dir() {
                        self.push_directory(kind, base, &path);
                        continue;
                    }
                    if !path.is_file() {
                        continue;
                    }
                    let extension = path.extension().and_then(|ext| ext.to_str());
                    if extension == Some(ARCHIVE_EXTENSION) {
                        self.push_archive(kind, &path);
                        continue;
                    }
                    if extension != Some(CLASS_EXTENSION) {
                        continue;
                    }
                    let Some(logical_name) = relative_logical_name(&base, &path) else {
                        continue;
                    };
                    return Some(Candidate {
                        root: kind,
                        logical_name,
                        location: CandidateLocation::File(path),
                    });
                }
                Pending::Archive {
                    kind,
                    path,
                    entries,
                } => {
                    let Some(entry) = entries.next() else {
                        self.stack.pop();
                        continue;
                    };
                    let Some(logical_name) = entry
                        .strip_suffix(CLASS_EXTENSION)
                        .and_then(|name| name.strip_suffix('.'))
                    else {
                        continue;
                    };
                    return Some(Candidate {
                        root: *kind,
                        logical_name: logical_name.to_string(),
                        location: CandidateLocation::ArchiveEntry {
                            archive: path.clone(),
                            entry: entry.clone(),
                        },
                    });
                }
            }
        }
    }
}

/// Archive headers declare entry sizes; a lying header must not drive the allocation.
const MAX_PREALLOCATION: usize = 1 << 20;

fn initial_capacity(declared_size: u64) -> usize {
    usize::try_from(declared_size).map_or(MAX_PREALLOCATION, |size| size.min(MAX_PREALLOCATION))
}

fn relative_logical_name(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?.with_extension("");
    let components = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(components.join("/"))
}
