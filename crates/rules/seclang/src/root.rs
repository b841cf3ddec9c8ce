//! Filesystems that configuration files and includes are read from.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};

use regex::Regex;

/// A source of configuration files.
///
/// Paths handed to a root are already normalized (no `.` or inner `..`
/// components) and joined with the including file's directory when the
/// include was relative.
pub trait ConfigRoot: Send + Sync + fmt::Debug {
    /// Read a whole file.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Names of the entries of a directory.
    fn list_dir(&self, dir: &Path) -> io::Result<Vec<String>>;

    /// Whether `path` names a regular file.
    fn is_file(&self, path: &Path) -> bool;
}

/// The local filesystem; relative paths resolve against the working directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl ConfigRoot for LocalFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn list_dir(&self, dir: &Path) -> io::Result<Vec<String>> {
        let dir = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };
        std::fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// A directory of the local filesystem acting as `/`.
///
/// Absolute and relative paths both resolve below the directory.
#[derive(Debug, Clone)]
pub struct DirRoot {
    base: PathBuf,
}

impl DirRoot {
    /// Serve files below `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.base.join(relative(path))
    }
}

impl ConfigRoot for DirRoot {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(self.resolve(path))
    }

    fn list_dir(&self, dir: &Path) -> io::Result<Vec<String>> {
        LocalFs.list_dir(&self.resolve(dir))
    }

    fn is_file(&self, path: &Path) -> bool {
        self.resolve(path).is_file()
    }
}

/// Files held in memory, keyed by their path below the root.
#[derive(Debug, Clone, Default)]
pub struct MemoryRoot {
    files: BTreeMap<PathBuf, String>,
}

impl MemoryRoot {
    /// An empty root.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file.
    #[must_use]
    pub fn with_file(mut self, path: impl AsRef<Path>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    /// Add or replace a file.
    pub fn insert(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        self.files
            .insert(relative(&normalize(path.as_ref())), content.into());
    }
}

impl ConfigRoot for MemoryRoot {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files
            .get(&relative(path))
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file in memory root"))
    }

    fn list_dir(&self, dir: &Path) -> io::Result<Vec<String>> {
        let dir = relative(dir);
        let mut names: Vec<String> = self
            .files
            .keys()
            .filter_map(|path| path.strip_prefix(&dir).ok())
            .filter_map(|rest| rest.components().next())
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        names.dedup();
        if names.is_empty() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such directory in memory root"));
        }
        Ok(names)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.files.contains_key(&relative(path))
    }
}

/// Strip the root and prefix components so the path is relative to a root.
fn relative(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_) | Component::ParentDir))
        .collect()
}

/// Remove `.` components and fold `..` into its parent where possible.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(out.components().next_back(), Some(Component::Normal(_)));
                if can_pop {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn has_glob(component: &str) -> bool {
    component.contains(['*', '?', '['])
}

/// Translate one glob path component into an anchored regex.
fn glob_regex(component: &str) -> Option<Regex> {
    let mut pattern = String::from("^");
    let mut chars = component.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => pattern.push_str("[^/]*"),
            '?' => pattern.push_str("[^/]"),
            '[' => {
                pattern.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    pattern.push('^');
                }
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    if c == '\\' || c == '[' {
                        pattern.push('\\');
                    }
                    pattern.push(c);
                }
                if !closed {
                    return None;
                }
                pattern.push(']');
            }
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).ok()
}

/// Expand `pattern` into the files it names, sorted lexically.
///
/// Any path component may contain `*`, `?` or `[...]`. A pattern without
/// glob characters yields itself when it names a file. Unreadable
/// directories are skipped.
pub fn expand(root: &dyn ConfigRoot, pattern: &Path) -> Vec<PathBuf> {
    let pattern = normalize(pattern);
    let is_glob = pattern
        .components()
        .any(|c| has_glob(&c.as_os_str().to_string_lossy()));
    if !is_glob {
        return if root.is_file(&pattern) {
            vec![pattern]
        } else {
            Vec::new()
        };
    }

    let mut candidates = vec![PathBuf::new()];
    for component in pattern.components() {
        let text = component.as_os_str().to_string_lossy();
        if !has_glob(&text) {
            for candidate in &mut candidates {
                candidate.push(component.as_os_str());
            }
            continue;
        }
        let Some(re) = glob_regex(&text) else {
            return Vec::new();
        };
        let mut next = Vec::new();
        for dir in &candidates {
            let Ok(names) = root.list_dir(dir) else {
                continue;
            };
            next.extend(
                names
                    .into_iter()
                    .filter(|name| !name.starts_with('.') && re.is_match(name))
                    .map(|name| dir.join(name)),
            );
        }
        candidates = next;
    }

    let mut files: Vec<PathBuf> = candidates.into_iter().filter(|p| root.is_file(p)).collect();
    files.sort();
    files
}
