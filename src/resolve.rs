//! Library reference resolution.
//!
//! Mach-O binaries reference their libraries by literal strings that may
//! start with a loader placeholder (`@executable_path/`, `@rpath/`,
//! `@loader_path/`). Resolution turns such a string into the absolute,
//! symlink-free location of the library on disk, given the binary holding
//! the reference and the top-level executable being bundled.

use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::tools::Inspector;

/// Prefix for references relative to the top-level executable's directory.
pub const EXECUTABLE_PATH: &str = "@executable_path/";
/// Prefix for references resolved against the executable's runtime search paths.
pub const RPATH: &str = "@rpath/";
/// Prefix for references relative to the directory of the referencing binary.
pub const LOADER_PATH: &str = "@loader_path/";

/// A raw reference string, classified by its placeholder prefix.
///
/// Classification happens once per reference; the resolution branches below
/// match on the variant, so adding a placeholder kind is a compile error
/// until every branch handles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawReference<'a> {
    /// `@executable_path/<rest>`
    ExecutableRelative(&'a str),
    /// `@rpath/<rest>`
    SearchPathRelative(&'a str),
    /// `@loader_path/<rest>`
    LoaderRelative(&'a str),
    /// An ordinary absolute or relative filesystem path.
    Plain(&'a str),
}

impl<'a> RawReference<'a> {
    /// Classify a raw reference by its leading placeholder, if any.
    pub fn classify(raw: &'a str) -> Self {
        if let Some(rest) = raw.strip_prefix(EXECUTABLE_PATH) {
            RawReference::ExecutableRelative(rest)
        } else if let Some(rest) = raw.strip_prefix(RPATH) {
            RawReference::SearchPathRelative(rest)
        } else if let Some(rest) = raw.strip_prefix(LOADER_PATH) {
            RawReference::LoaderRelative(rest)
        } else {
            RawReference::Plain(raw)
        }
    }
}

/// Resolve a raw library reference to an absolute, symlink-resolved path.
///
/// `requester` is the binary whose metadata holds the reference and anchors
/// `@loader_path/`; `anchor` is the top-level executable, which anchors
/// `@executable_path/` and supplies the `@rpath/` search list. A
/// placeholder whose anchor is unknown falls through to plain resolution of
/// the literal string, which fails since no such file exists.
///
/// `@rpath/` candidates are built from the anchor's search paths in their
/// declared order and resolved recursively, so a search path entry may
/// itself start with a placeholder. The first candidate naming an existing
/// file wins; if none does the reference is reported unresolvable.
///
/// # Errors
///
/// Returns [`Error::ReferenceNotFound`] carrying the original raw string if
/// no existing file matches, or [`Error::ToolInvocation`] if the anchor's
/// search paths cannot be read.
pub fn resolve<I: Inspector + ?Sized>(
    tools: &I,
    raw: &str,
    requester: Option<&Path>,
    anchor: Option<&Path>,
) -> Result<PathBuf, Error> {
    match RawReference::classify(raw) {
        RawReference::ExecutableRelative(rest) => match anchor {
            Some(exec) => canonical(&parent_dir(exec).join(rest), raw),
            None => canonical(Path::new(raw), raw),
        },
        RawReference::SearchPathRelative(rest) => {
            let Some(exec) = anchor else {
                return canonical(Path::new(raw), raw);
            };
            for entry in tools.runtime_search_paths(exec)? {
                let candidate = format!("{}/{}", entry.trim_end_matches('/'), rest);
                match resolve(tools, &candidate, requester, anchor) {
                    Ok(path) => return Ok(path),
                    Err(Error::ReferenceNotFound { .. }) => continue,
                    Err(e) => return Err(e),
                }
            }
            Err(Error::ReferenceNotFound {
                raw: raw.to_string(),
            })
        }
        RawReference::LoaderRelative(rest) => match requester {
            Some(binary) => canonical(&parent_dir(binary).join(rest), raw),
            None => canonical(Path::new(raw), raw),
        },
        RawReference::Plain(path) => canonical(Path::new(path), raw),
    }
}

fn parent_dir(binary: &Path) -> &Path {
    binary.parent().unwrap_or_else(|| Path::new("."))
}

fn canonical(path: &Path, raw: &str) -> Result<PathBuf, Error> {
    std::fs::canonicalize(path).map_err(|_| Error::ReferenceNotFound {
        raw: raw.to_string(),
    })
}
