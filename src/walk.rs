//! Transitive dependency discovery.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::resolve::resolve;
use crate::tools::Inspector;

/// One discovered library reference.
///
/// `raw_path` is the literal string embedded in the requesting binary;
/// `real_path` is its resolved location on disk. Two references are the
/// same edge only if all three fields match, so the same library reached
/// through different raw strings (or from different requesters) is reported
/// once per distinct route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LibraryRef {
    /// The binary whose metadata holds the reference.
    pub requester: PathBuf,
    /// The reference string as embedded, placeholder prefix included.
    pub raw_path: String,
    /// Canonical filesystem location of the referenced library.
    pub real_path: PathBuf,
}

impl LibraryRef {
    /// Basename under which the library is deployed.
    pub fn deployed_name(&self) -> &std::ffi::OsStr {
        self.real_path
            .file_name()
            .unwrap_or_else(|| self.real_path.as_os_str())
    }
}

/// Depth-first traversal of the library reference graph rooted at `root`.
///
/// Yields each edge exactly once, the first time it is discovered, parents
/// before children and siblings in declaration order. A reference whose raw
/// string starts with one of `exclude_prefixes` prunes that branch before
/// any resolution, so excluded subtrees are never inspected. The traversal
/// owns a single visited-edge set for its whole lifetime, which makes it
/// terminate on cyclic and diamond-shaped graphs.
///
/// References of a binary are enumerated only when the walk descends into
/// it, so consuming the iterator lazily inspects one binary at a time. The
/// first error (unresolvable reference, uninspectable binary) is yielded
/// once and ends the traversal.
pub fn walk<'a, I: Inspector + ?Sized>(
    tools: &'a I,
    root: &Path,
    anchor: &'a Path,
    exclude_prefixes: &'a [String],
) -> Walk<'a, I> {
    Walk {
        tools,
        anchor,
        exclude_prefixes,
        seen: HashSet::new(),
        stack: vec![Frame {
            binary: root.to_path_buf(),
            refs: None,
        }],
        failed: false,
    }
}

/// Iterator state for [`walk`]. Exhausted after one full consumption.
pub struct Walk<'a, I: Inspector + ?Sized> {
    tools: &'a I,
    anchor: &'a Path,
    exclude_prefixes: &'a [String],
    seen: HashSet<LibraryRef>,
    stack: Vec<Frame>,
    failed: bool,
}

struct Frame {
    binary: PathBuf,
    refs: Option<std::vec::IntoIter<String>>,
}

impl<I: Inspector + ?Sized> Iterator for Walk<'_, I> {
    type Item = Result<LibraryRef, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let frame = self.stack.last_mut()?;

            if frame.refs.is_none() {
                tracing::debug!(binary = %frame.binary.display(), "inspecting");
                match self.tools.direct_references(&frame.binary) {
                    Ok(refs) => frame.refs = Some(refs.into_iter()),
                    Err(e) => {
                        self.failed = true;
                        return Some(Err(e));
                    }
                }
            }

            let Some(raw) = frame.refs.as_mut().and_then(|refs| refs.next()) else {
                self.stack.pop();
                continue;
            };

            if self
                .exclude_prefixes
                .iter()
                .any(|prefix| raw.starts_with(prefix.as_str()))
            {
                tracing::debug!(reference = %raw, "excluded");
                continue;
            }

            let requester = frame.binary.clone();
            let real_path =
                match resolve(self.tools, &raw, Some(&requester), Some(self.anchor)) {
                    Ok(path) => path,
                    Err(e) => {
                        self.failed = true;
                        return Some(Err(e));
                    }
                };

            let edge = LibraryRef {
                requester,
                raw_path: raw,
                real_path,
            };
            if !self.seen.insert(edge.clone()) {
                continue;
            }

            self.stack.push(Frame {
                binary: edge.real_path.clone(),
                refs: None,
            });
            return Some(Ok(edge));
        }
    }
}
