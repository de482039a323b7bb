//! Path resolution
//!
//! Turns client-supplied strings into sandboxed virtual paths. This is the
//! only place that knows the sandbox root; every other component works on
//! [`VirtualPath`] values and asks the resolver for real locations.

use log::warn;
use serde::{Serialize, Serializer};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::FsError;

/// Directory at the sandbox root holding in-flight writes. Clients can
/// neither see nor address it.
pub const STAGING_DIR: &str = ".roxy-staging";

fn reserved(name: &str) -> FsError {
    FsError::InvalidPath(format!("{} is reserved", name))
}

/// A normalized location relative to the sandbox root.
///
/// Always starts with `/`, never ends with one (except the root itself) and
/// contains no empty, `.` or `..` segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualPath(String);

impl VirtualPath {
    pub fn root() -> Self {
        VirtualPath("/".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Last segment, `None` for the root
    pub fn file_name(&self) -> Option<&str> {
        self.segments().last()
    }

    pub fn parent(&self) -> Option<VirtualPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(VirtualPath::root()),
            Some(idx) => Some(VirtualPath(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Appends a single validated name.
    pub fn join(&self, name: &str) -> Result<VirtualPath, FsError> {
        validate_name(name)?;
        if self.is_root() {
            if name == STAGING_DIR {
                return Err(reserved(name));
            }
            Ok(VirtualPath(format!("/{}", name)))
        } else {
            Ok(VirtualPath(format!("{}/{}", self.0, name)))
        }
    }

    /// Segment-wise prefix test: `/a` contains `/a/b` but not `/ab`.
    pub fn starts_with(&self, base: &VirtualPath) -> bool {
        base.is_root()
            || self.0 == base.0
            || (self.0.starts_with(&base.0) && self.0.as_bytes().get(base.0.len()) == Some(&b'/'))
    }

    /// Path of `self` below `base`, without a leading slash.
    pub fn relative_to(&self, base: &VirtualPath) -> Option<&str> {
        if !self.starts_with(base) || self == base {
            return None;
        }
        let rest = if base.is_root() {
            &self.0[1..]
        } else {
            &self.0[base.0.len() + 1..]
        };
        Some(rest)
    }

    /// Moves `self` from below `from` to the same place below `to`.
    pub fn rebase(&self, from: &VirtualPath, to: &VirtualPath) -> Option<VirtualPath> {
        if self == from {
            return Some(to.clone());
        }
        let rest = self.relative_to(from)?;
        let mut out = to.clone();
        for segment in rest.split('/') {
            out = out.join(segment).ok()?;
        }
        Some(out)
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for VirtualPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Validates a single path segment supplied by a client.
pub fn validate_name(name: &str) -> Result<(), FsError> {
    if name.is_empty() {
        return Err(FsError::InvalidPath("empty name".into()));
    }
    if name == "." || name == ".." {
        return Err(FsError::InvalidPath(name.into()));
    }
    if name.contains(['/', '\\']) {
        return Err(FsError::InvalidPath(format!("name contains a separator: {}", name)));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(FsError::InvalidPath("name contains control characters".into()));
    }
    Ok(())
}

/// Lexical normalization of a raw client path. Touches no storage.
/// Surrounding whitespace is kept, since names may legitimately carry it.
pub fn normalize(raw: &str) -> Result<VirtualPath, FsError> {
    if raw.is_empty() {
        return Err(FsError::InvalidPath("empty path".into()));
    }
    if raw.chars().any(|c| c.is_control()) {
        return Err(FsError::InvalidPath("path contains control characters".into()));
    }
    if raw.contains('\\') || raw.starts_with("//") {
        return Err(FsError::InvalidPath(raw.into()));
    }
    // Drive letter prefixes such as `C:`
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return Err(FsError::InvalidPath(raw.into()));
    }

    let mut segments = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(FsError::InvalidPath(raw.into())),
            s => segments.push(s),
        }
    }

    match segments.first() {
        None => Ok(VirtualPath::root()),
        Some(&first) if first == STAGING_DIR => Err(reserved(first)),
        Some(_) => Ok(VirtualPath(format!("/{}", segments.join("/")))),
    }
}

/// Owns the sandbox root and maps virtual paths onto it.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Builds a resolver over an existing directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, FsError> {
        let root = root
            .as_ref()
            .canonicalize()
            .map_err(|e| FsError::from_io(e, "sandbox root"))?;
        if !root.is_dir() {
            return Err(FsError::InvalidPath("sandbox root is not a directory".into()));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validates `raw` lexically, then confirms through canonicalization that
    /// it stays inside the sandbox.
    pub fn resolve(&self, raw: &str) -> Result<VirtualPath, FsError> {
        let path = normalize(raw)?;
        self.confine(&path)?;
        Ok(path)
    }

    /// Real location of a virtual path.
    pub fn locate(&self, path: &VirtualPath) -> PathBuf {
        let mut real = self.root.clone();
        for segment in path.segments() {
            real.push(segment);
        }
        real
    }

    /// Walks up to the deepest existing ancestor and checks that its
    /// canonical form is still below the root. Dangling symlinks are refused
    /// since creating through them would land wherever they point.
    fn confine(&self, path: &VirtualPath) -> Result<(), FsError> {
        let mut probe = self.locate(path);
        loop {
            match probe.canonicalize() {
                Ok(canonical) => {
                    if canonical.starts_with(&self.root) {
                        return Ok(());
                    }
                    warn!("Rejected sandbox escape through {}", path);
                    return Err(FsError::InvalidPath(format!("{} escapes the sandbox", path)));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    if probe.symlink_metadata().is_ok() {
                        warn!("Rejected dangling symlink in {}", path);
                        return Err(FsError::InvalidPath(format!("{} is a dangling link", path)));
                    }
                    if !probe.pop() || !probe.starts_with(&self.root) {
                        return Err(FsError::InvalidPath(path.to_string()));
                    }
                }
                Err(e) => return Err(FsError::from_io(e, path)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn normalize_drops_empty_and_dot_segments() {
        assert_eq!(normalize("a//b/./c/").unwrap().as_str(), "/a/b/c");
        assert_eq!(normalize("/").unwrap(), VirtualPath::root());
        assert_eq!(normalize("/ a/b ").unwrap().as_str(), "/ a/b ");
    }

    #[test]
    fn staging_area_cannot_be_addressed() {
        for raw in ["/.roxy-staging", ".roxy-staging/1-0.part", "/./.roxy-staging/"] {
            assert!(matches!(normalize(raw), Err(FsError::InvalidPath(_))), "accepted {:?}", raw);
        }
        assert!(VirtualPath::root().join(STAGING_DIR).is_err());
        assert!(normalize("/a/.roxy-staging").is_ok());
    }

    #[test]
    fn normalize_rejects_traversal_and_os_prefixes() {
        for raw in ["", "../etc", "/a/../../b", "a/..", "C:/windows", "//server/share", "a\\b", "a\0b"] {
            assert!(
                matches!(normalize(raw), Err(FsError::InvalidPath(_))),
                "accepted {:?}",
                raw
            );
        }
    }

    #[test]
    fn dotted_names_are_not_traversal() {
        assert_eq!(normalize("/a/..b/c..").unwrap().as_str(), "/a/..b/c..");
    }

    #[test]
    fn resolve_is_idempotent() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        let resolver = PathResolver::new(dir.path()).unwrap();

        let once = resolver.resolve("a/./new/").unwrap();
        let twice = resolver.resolve(once.as_str()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(resolver.locate(&once), resolver.root().join("a").join("new"));
    }

    #[cfg(unix)]
    #[test]
    fn resolve_rejects_symlink_escape() {
        let outside = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("gone"), dir.path().join("dangling"))
            .unwrap();
        let resolver = PathResolver::new(dir.path()).unwrap();

        assert!(matches!(resolver.resolve("/link/file"), Err(FsError::InvalidPath(_))));
        assert!(matches!(resolver.resolve("/dangling"), Err(FsError::InvalidPath(_))));
        assert!(resolver.resolve("/missing/file").is_ok());
    }

    #[test]
    fn virtual_path_relations() {
        let a = normalize("/a").unwrap();
        let ab = normalize("/a/b/c").unwrap();
        let other = normalize("/ab").unwrap();

        assert!(ab.starts_with(&a));
        assert!(!other.starts_with(&a));
        assert_eq!(ab.relative_to(&a), Some("b/c"));
        assert_eq!(ab.parent().unwrap().as_str(), "/a/b");
        assert_eq!(a.parent().unwrap(), VirtualPath::root());
        assert_eq!(ab.rebase(&a, &normalize("/z").unwrap()).unwrap().as_str(), "/z/b/c");
        assert_eq!(VirtualPath::root().join("x").unwrap().as_str(), "/x");
        assert!(a.join("..").is_err());
    }
}
