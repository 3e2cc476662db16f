use crate::error::{PathError, PathResult};
use crate::translit::transliterate;

/// Default component separator.
pub const SEPARATOR: char = '/';

/// Builds, splits and sanitizes storage paths.
///
/// The builder is a small value type; construct one per component that
/// needs it rather than sharing a global.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathBuilder {
    separator: char,
}

impl Default for PathBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PathBuilder {
    pub fn new() -> Self {
        Self {
            separator: SEPARATOR,
        }
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    /// The root path (a lone separator).
    pub fn root(&self) -> String {
        self.separator.to_string()
    }

    /// Compose a path from components.
    ///
    /// Components may themselves contain separators; they are split and
    /// empty pieces are dropped. With `transliterate` set, each piece is
    /// passed through [`transliterate`] and pieces that end up empty, `.` or
    /// `..` are dropped as well.
    pub fn build_storage_path<S: AsRef<str>>(
        &self,
        components: &[S],
        leading_separator: bool,
        trailing_separator: bool,
        transliterate_components: bool,
    ) -> String {
        let mut parts: Vec<String> = Vec::new();
        for component in components {
            for piece in component.as_ref().split(|c| c == self.separator || c == '\\') {
                let piece = if transliterate_components {
                    transliterate(piece)
                } else {
                    piece.to_string()
                };
                if piece.is_empty() || (transliterate_components && (piece == "." || piece == "..")) {
                    continue;
                }
                parts.push(piece);
            }
        }

        let sep = self.separator.to_string();
        let mut path = parts.join(&sep);
        if parts.is_empty() {
            return if leading_separator || trailing_separator {
                sep
            } else {
                String::new()
            };
        }
        if leading_separator {
            path.insert(0, self.separator);
        }
        if trailing_separator {
            path.push(self.separator);
        }
        path
    }

    /// Split a path into its non-empty components.
    pub fn storage_path_components(&self, path: &str) -> Vec<String> {
        path.split(self.separator)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// The canonical form of `path`.
    pub fn sanitize(&self, path: &str) -> String {
        self.build_storage_path(&[path], true, false, true)
    }

    pub fn is_canonical(&self, path: &str) -> bool {
        !path.is_empty() && self.sanitize(path) == path
    }

    /// Check that `path` is already canonical.
    pub fn validate(&self, path: &str) -> PathResult<()> {
        if path.is_empty() {
            return Err(PathError::Empty);
        }
        let expected = self.sanitize(path);
        if expected != path {
            return Err(PathError::NotCanonical {
                path: path.to_string(),
                expected,
            });
        }
        Ok(())
    }

    /// Check that `name` is usable as a single path component.
    pub fn validate_name(&self, name: &str) -> PathResult<()> {
        if name.is_empty() {
            return Err(PathError::InvalidName {
                name: name.to_string(),
                reason: "name must not be empty".into(),
            });
        }
        if name.contains(self.separator) {
            return Err(PathError::InvalidName {
                name: name.to_string(),
                reason: format!("name must not contain {:?}", self.separator),
            });
        }
        if name == "." || name == ".." || transliterate(name) != name {
            return Err(PathError::InvalidName {
                name: name.to_string(),
                reason: "name contains disallowed characters".into(),
            });
        }
        Ok(())
    }

    /// Append `name` to `base`.
    pub fn join(&self, base: &str, name: &str) -> String {
        self.build_storage_path(&[base, name], true, false, false)
    }

    /// The parent path, or `None` for the root.
    pub fn parent(&self, path: &str) -> Option<String> {
        let mut components = self.storage_path_components(path);
        if components.pop().is_none() {
            return None;
        }
        Some(self.build_storage_path(&components, true, false, false))
    }

    /// The last component of `path`, or `None` for the root.
    pub fn name<'a>(&self, path: &'a str) -> Option<&'a str> {
        path.split(self.separator).filter(|c| !c.is_empty()).last()
    }

    /// `true` if `path` lies strictly below `ancestor`.
    pub fn is_descendant(&self, path: &str, ancestor: &str) -> bool {
        let ancestor = ancestor.trim_end_matches(self.separator);
        path.len() > ancestor.len() + 1
            && path.starts_with(ancestor)
            && path[ancestor.len()..].starts_with(self.separator)
    }

    /// Number of components in `path`.
    pub fn depth(&self, path: &str) -> usize {
        path.split(self.separator).filter(|c| !c.is_empty()).count()
    }
}
