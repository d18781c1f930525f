//! Failure taxonomy for resolution, inspection and relocation.

use std::path::PathBuf;

/// Errors surfaced by the walker and the relocation engine.
///
/// Every variant is fatal for the current run: there are no retries, and a
/// failure during relocation leaves whatever was already copied or rewritten
/// on disk. Callers that need to distinguish failure classes match on the
/// variant; the `Display` output is the user-facing message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A library reference did not resolve to an existing file. For
    /// `@rpath/` references this means no runtime search path held a
    /// matching candidate.
    #[error("library reference '{raw}' does not resolve to an existing file")]
    ReferenceNotFound { raw: String },

    /// An inspection tool was missing, exited non-zero, or produced output
    /// that is not in the expected record structure.
    #[error("{tool} failed on {}: {message}", .path.display())]
    ToolInvocation {
        tool: &'static str,
        path: PathBuf,
        message: String,
    },

    /// Copying a library into the destination directory failed, including
    /// failure to create the destination directory itself.
    #[error("failed to copy '{}' to '{}': {source}", .src.display(), .dest.display())]
    Copy {
        src: PathBuf,
        dest: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `install_name_tool` refused a metadata edit (unwritable binary,
    /// malformed load command, signature lock).
    #[error("failed to rewrite {}: {message}", .binary.display())]
    Rewrite { binary: PathBuf, message: String },

    /// Two distinct libraries in the closure share a deployed filename.
    /// Deployed names are basenames, so the second copy would overwrite the
    /// first while both requesters still reference it.
    #[error(
        "deployed name collision: '{name}' is provided by both '{}' and '{}'",
        .first.display(),
        .second.display()
    )]
    DuplicateName {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
}
