//! Mach-O dependency bundling utilities.
//!
//! Uses `otool` to discover the shared libraries an executable depends on,
//! directly and transitively, then copies the non-system ones into a
//! directory next to the executable and rewrites install names with
//! `install_name_tool` so the deployed tree is self-contained.
//!
//! The traversal and rewriting logic is independent of the platform tools:
//! it talks to binaries through the [`Inspector`] and [`Editor`] traits,
//! with [`SystemTools`] as the production implementation.

mod error;
mod relocate;
mod resolve;
mod tools;
mod walk;

pub use error::Error;
pub use relocate::Relocator;
pub use resolve::{resolve, RawReference, EXECUTABLE_PATH, LOADER_PATH, RPATH};
pub use tools::{parse_reference_list, parse_search_paths, Editor, Inspector, SystemTools};
pub use walk::{walk, LibraryRef, Walk};
