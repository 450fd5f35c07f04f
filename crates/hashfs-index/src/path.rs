//! Path resolution and canonical key encoding.
//!
//! Every path is normalized to an absolute, `/`-separated form with no `.`,
//! `..` or empty components. A record is stored under the key
//! `parent ++ 0x00 ++ name`, which gives two useful properties:
//!
//! - direct children of `/a` share the prefix `/a\0`
//! - deeper descendants of `/a` share the prefix `/a/`
//!
//! so the full subtree of a directory is two LMDB prefix scans. The root has
//! an empty parent and name and is stored under the single byte `0x00`, which
//! sorts before (and never matches) any descendant prefix.

use std::fmt;

use thiserror::Error;

/// Separator between the parent path and the base name inside a key.
pub const KEY_SEPARATOR: u8 = 0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path escapes the root: {0}")]
    EscapesRoot(String),

    #[error("path contains a NUL byte: {0:?}")]
    NulByte(String),
}

/// A normalized absolute path inside the virtual filesystem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VfsPath(String);

impl VfsPath {
    pub fn root() -> Self {
        VfsPath("/".to_string())
    }

    /// Normalize `raw` into a `VfsPath`.
    ///
    /// Relative paths are resolved against the root. A `..` that would climb
    /// above the root is rejected rather than clamped.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.contains('\0') {
            return Err(PathError::NulByte(raw.to_string()));
        }

        let mut parts: Vec<&str> = Vec::new();
        for component in raw.split('/') {
            match component {
                "" | "." => {}
                ".." => {
                    if parts.pop().is_none() {
                        return Err(PathError::EscapesRoot(raw.to_string()));
                    }
                }
                name => parts.push(name),
            }
        }

        if parts.is_empty() {
            return Ok(Self::root());
        }
        Ok(VfsPath(format!("/{}", parts.join("/"))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Base name; `/` for the root.
    pub fn name(&self) -> &str {
        if self.is_root() {
            return "/";
        }
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// Parent directory, `None` for the root.
    pub fn parent(&self) -> Option<VfsPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) | None => Some(Self::root()),
            Some(idx) => Some(VfsPath(self.0[..idx].to_string())),
        }
    }

    /// Append a single component.
    pub fn join(&self, name: &str) -> VfsPath {
        if self.is_root() {
            VfsPath(format!("/{}", name))
        } else {
            VfsPath(format!("{}/{}", self.0, name))
        }
    }

    /// Ancestors from the root down to the immediate parent (root first).
    pub fn ancestors(&self) -> Vec<VfsPath> {
        let mut chain = Vec::new();
        let mut current = self.parent();
        while let Some(dir) = current {
            current = dir.parent();
            chain.push(dir);
        }
        chain.reverse();
        chain
    }

    /// True if `self` lies strictly below `dir`.
    pub fn is_descendant_of(&self, dir: &VfsPath) -> bool {
        if dir.is_root() {
            return !self.is_root();
        }
        self.0
            .strip_prefix(dir.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Re-home `self` from under `from` to under `to`.
    ///
    /// Returns `None` when `self` is neither `from` nor one of its descendants.
    pub fn rebase(&self, from: &VfsPath, to: &VfsPath) -> Option<VfsPath> {
        if self == from {
            return Some(to.clone());
        }
        if !self.is_descendant_of(from) {
            return None;
        }
        let rest = if from.is_root() {
            &self.0[1..]
        } else {
            &self.0[from.0.len() + 1..]
        };
        Some(to.join(rest))
    }

    pub fn key(&self) -> CanonicalKey {
        CanonicalKey::for_path(self)
    }

    /// Key prefixes covering every record strictly below this directory.
    pub fn descendant_prefixes(&self) -> Vec<Vec<u8>> {
        if self.is_root() {
            return vec![b"/".to_vec()];
        }
        let mut children = self.0.as_bytes().to_vec();
        children.push(KEY_SEPARATOR);
        let mut nested = self.0.as_bytes().to_vec();
        nested.push(b'/');
        vec![children, nested]
    }

    /// Key prefix covering only the direct children of this directory.
    pub fn children_prefix(&self) -> Vec<u8> {
        let mut prefix = self.0.as_bytes().to_vec();
        prefix.push(KEY_SEPARATOR);
        prefix
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VfsPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The `(parent, name)` pair a record is stored under.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalKey {
    pub parent: String,
    pub name: String,
}

impl CanonicalKey {
    pub fn for_path(path: &VfsPath) -> Self {
        match path.parent() {
            None => CanonicalKey {
                parent: String::new(),
                name: String::new(),
            },
            Some(parent) => CanonicalKey {
                parent: parent.0,
                name: path.name().to_string(),
            },
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.parent.len() + self.name.len() + 1);
        bytes.extend_from_slice(self.parent.as_bytes());
        bytes.push(KEY_SEPARATOR);
        bytes.extend_from_slice(self.name.as_bytes());
        bytes
    }

    /// Decode a stored key. `None` if the bytes are not a valid key.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let split = bytes.iter().position(|b| *b == KEY_SEPARATOR)?;
        let parent = std::str::from_utf8(&bytes[..split]).ok()?;
        let name = std::str::from_utf8(&bytes[split + 1..]).ok()?;
        Some(CanonicalKey {
            parent: parent.to_string(),
            name: name.to_string(),
        })
    }

    /// Reassemble the full path this key indexes.
    pub fn path(&self) -> VfsPath {
        if self.parent.is_empty() {
            return VfsPath::root();
        }
        VfsPath(self.parent.clone()).join(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(raw: &str) -> VfsPath {
        VfsPath::parse(raw).unwrap()
    }

    #[test]
    fn test_normalization() {
        assert_eq!(p("/a/b/c").as_str(), "/a/b/c");
        assert_eq!(p("a//b/./c/").as_str(), "/a/b/c");
        assert_eq!(p("/a/b/../c").as_str(), "/a/c");
        assert_eq!(p("").as_str(), "/");
        assert_eq!(p("/./").as_str(), "/");
        assert_eq!(p("/a/..").as_str(), "/");
    }

    #[test]
    fn test_escape_rejected() {
        assert!(matches!(VfsPath::parse("/.."), Err(PathError::EscapesRoot(_))));
        assert!(matches!(
            VfsPath::parse("a/../../b"),
            Err(PathError::EscapesRoot(_))
        ));
        assert!(matches!(VfsPath::parse("/a\0b"), Err(PathError::NulByte(_))));
    }

    #[test]
    fn test_parent_and_name() {
        let path = p("/a/b/c");
        assert_eq!(path.name(), "c");
        assert_eq!(path.parent(), Some(p("/a/b")));
        assert_eq!(p("/a").parent(), Some(VfsPath::root()));
        assert_eq!(VfsPath::root().parent(), None);
        assert_eq!(VfsPath::root().name(), "/");
    }

    #[test]
    fn test_ancestors_root_first() {
        let chain = p("/a/b/c").ancestors();
        assert_eq!(chain, vec![VfsPath::root(), p("/a"), p("/a/b")]);
        assert!(VfsPath::root().ancestors().is_empty());
    }

    #[test]
    fn test_key_roundtrip() {
        for raw in ["/", "/a", "/a/b/c"] {
            let path = p(raw);
            let key = path.key();
            let decoded = CanonicalKey::from_bytes(&key.to_bytes()).unwrap();
            assert_eq!(decoded, key);
            assert_eq!(decoded.path(), path);
        }
        assert_eq!(VfsPath::root().key().to_bytes(), vec![KEY_SEPARATOR]);
    }

    #[test]
    fn test_descendant_prefixes_cover_subtree_only() {
        let dir = p("/a");
        let prefixes = dir.descendant_prefixes();
        let covered = |path: &str| {
            let key = p(path).key().to_bytes();
            prefixes.iter().any(|prefix| key.starts_with(prefix))
        };

        assert!(covered("/a/x"));
        assert!(covered("/a/x/y/z"));
        assert!(!covered("/a"));
        assert!(!covered("/ab"));
        assert!(!covered("/ab/x"));
    }

    #[test]
    fn test_root_prefix_excludes_root_key() {
        let prefixes = VfsPath::root().descendant_prefixes();
        let root_key = VfsPath::root().key().to_bytes();
        assert!(!prefixes.iter().any(|prefix| root_key.starts_with(prefix)));
        assert!(p("/x").key().to_bytes().starts_with(&prefixes[0]));
    }

    #[test]
    fn test_rebase() {
        let from = p("/a/b");
        let to = p("/z");
        assert_eq!(p("/a/b").rebase(&from, &to), Some(p("/z")));
        assert_eq!(p("/a/b/c/d").rebase(&from, &to), Some(p("/z/c/d")));
        assert_eq!(p("/a/bc").rebase(&from, &to), None);
        assert_eq!(p("/x/y").rebase(&VfsPath::root(), &to), Some(p("/z/x/y")));
    }

    #[test]
    fn test_is_descendant_of() {
        assert!(p("/a/b").is_descendant_of(&p("/a")));
        assert!(!p("/a").is_descendant_of(&p("/a")));
        assert!(!p("/ab").is_descendant_of(&p("/a")));
        assert!(p("/a").is_descendant_of(&VfsPath::root()));
    }
}
