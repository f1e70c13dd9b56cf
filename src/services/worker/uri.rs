//! Normalized file identity.
//!
//! Every worker map is keyed on the normalized form: lower-cased scheme,
//! forward slashes, lexically resolved `.`/`..` segments. Normalizing at
//! the boundary means equality is plain string equality everywhere else.

use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uri(String);

impl Uri {
    pub fn new(raw: &str) -> Self {
        let (scheme, rest) = match raw.split_once(':') {
            Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
            None => (String::new(), raw),
        };
        let path = rest.replace('\\', "/");
        if scheme.is_empty() {
            Uri(normalize_segments(&path))
        } else {
            Uri(format!("{scheme}:{}", normalize_segments(&path)))
        }
    }

    pub fn from_path(path: &Path) -> Self {
        Uri::new(&format!("file://{}", path.display()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem path for `file:` URIs; `None` for anything else.
    pub fn to_path(&self) -> Option<PathBuf> {
        let path = self.0.strip_prefix("file://")?;
        if path.is_empty() {
            return None;
        }
        Some(PathBuf::from(path))
    }

    /// Directory the file lives in, for resolving relative imports.
    pub fn parent_dir(&self) -> Option<PathBuf> {
        self.to_path()?.parent().map(Path::to_path_buf)
    }
}

impl Display for Uri {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lexically resolve `.` and `..`. Files referenced by imports may not
/// exist yet, so filesystem canonicalization is not an option here.
fn normalize_segments(path: &str) -> String {
    let leading_slashes: String = path.chars().take_while(|&ch| ch == '/').collect();
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if out.last().is_some_and(|last| *last != "..") {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    format!("{leading_slashes}{}", out.join("/"))
}

#[cfg(test)]
#[path = "../../tests/worker/t_uri.rs"]
mod tests;
