//! Copying the dependency closure and rewriting install names.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::resolve::{EXECUTABLE_PATH, LOADER_PATH, RPATH};
use crate::tools::{Editor, Inspector};
use crate::walk::LibraryRef;

/// Relocates a resolved dependency closure next to its executable.
///
/// Relocation is one-shot: it expects the executable and its libraries in
/// their pristine build-output state, and a failure part-way leaves the
/// copies and rewrites performed so far on disk. Re-running over an already
/// relocated executable is outside the contract, since rewritten references
/// no longer resolve to their original locations.
pub struct Relocator<'a, T: Inspector + Editor + ?Sized> {
    tools: &'a T,
    executable: &'a Path,
    dest_dir: PathBuf,
    keep_search_paths: bool,
}

impl<'a, T: Inspector + Editor + ?Sized> Relocator<'a, T> {
    /// Set up relocation of `executable`'s libraries into `lib_dir`.
    ///
    /// A relative `lib_dir` is anchored at the executable's directory.
    pub fn new(
        tools: &'a T,
        executable: &'a Path,
        lib_dir: &Path,
        keep_search_paths: bool,
    ) -> Self {
        let dest_dir = if lib_dir.is_absolute() {
            lib_dir.to_path_buf()
        } else {
            exec_dir(executable).join(lib_dir)
        };
        Relocator {
            tools,
            executable,
            dest_dir,
            keep_search_paths,
        }
    }

    /// Directory the libraries are deployed into.
    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    /// Copy every library once, rewrite every reference, then replace the
    /// executable's runtime search paths with a single entry pointing at
    /// the destination directory.
    ///
    /// # Errors
    ///
    /// Any copy or rewrite failure aborts immediately; see [`Error`] for
    /// the failure classes. Nothing is rolled back.
    pub fn run(&self, closure: &[LibraryRef]) -> Result<(), Error> {
        self.copy_libraries(closure)?;
        self.rewrite_references(closure)?;
        self.finalize_search_paths()
    }

    /// Copy each distinct library into the destination directory and give
    /// the copy a loader-relative install name.
    ///
    /// The directory is created on the first actual copy, so an executable
    /// with no bundlable dependencies leaves no empty directory behind.
    fn copy_libraries(&self, closure: &[LibraryRef]) -> Result<(), Error> {
        // Deployed basename -> source library it was copied from.
        let mut deployed: HashMap<OsString, PathBuf> = HashMap::new();
        let mut created_dir = false;

        for edge in closure {
            let name = edge.deployed_name().to_os_string();
            match deployed.get(&name) {
                Some(first) if *first == edge.real_path => continue,
                Some(first) => {
                    return Err(Error::DuplicateName {
                        name: name.to_string_lossy().into_owned(),
                        first: first.clone(),
                        second: edge.real_path.clone(),
                    });
                }
                None => {}
            }

            if !created_dir {
                fs::create_dir_all(&self.dest_dir).map_err(|e| Error::Copy {
                    src: edge.real_path.clone(),
                    dest: self.dest_dir.clone(),
                    source: e,
                })?;
                created_dir = true;
            }

            let copy_path = self.dest_dir.join(&name);
            tracing::info!(
                from = %edge.real_path.display(),
                to = %copy_path.display(),
                "copying library"
            );
            fs::copy(&edge.real_path, &copy_path).map_err(|e| Error::Copy {
                src: edge.real_path.clone(),
                dest: copy_path.clone(),
                source: e,
            })?;

            let id = format!("{}{}", LOADER_PATH, name.to_string_lossy());
            tracing::info!(library = %copy_path.display(), id = %id, "setting install name");
            self.tools.set_self_identity(&copy_path, &id)?;

            deployed.insert(name, edge.real_path.clone());
        }

        Ok(())
    }

    /// Point every reference in the closure at the deployed copies.
    ///
    /// References held by the executable become search-path-relative;
    /// references held by a library become loader-relative and are
    /// rewritten on the library's deployed copy, since the copy is what
    /// ships. Runs strictly after the copy phase so every rewrite target
    /// exists.
    fn rewrite_references(&self, closure: &[LibraryRef]) -> Result<(), Error> {
        for edge in closure {
            let name = edge.deployed_name().to_string_lossy();
            let (target, new_ref) = if edge.requester == self.executable {
                (self.executable.to_path_buf(), format!("{RPATH}{name}"))
            } else {
                let requester_name = edge
                    .requester
                    .file_name()
                    .unwrap_or_else(|| edge.requester.as_os_str());
                (
                    self.dest_dir.join(requester_name),
                    format!("{LOADER_PATH}{name}"),
                )
            };

            tracing::info!(
                binary = %target.display(),
                old = %edge.raw_path,
                new = %new_ref,
                "rewriting reference"
            );
            self.tools.rewrite_reference(&target, &edge.raw_path, &new_ref)?;
        }

        Ok(())
    }

    /// Replace the executable's search paths with one entry reaching the
    /// destination directory relative to the executable.
    fn finalize_search_paths(&self) -> Result<(), Error> {
        if !self.keep_search_paths {
            for path in self.tools.runtime_search_paths(self.executable)? {
                tracing::info!(path = %path, "removing search path");
                self.tools.remove_search_path(self.executable, &path)?;
            }
        }

        let relative = pathdiff::diff_paths(&self.dest_dir, exec_dir(self.executable))
            .unwrap_or_else(|| self.dest_dir.clone());
        let entry = format!("{}{}", EXECUTABLE_PATH, relative.display());
        tracing::info!(entry = %entry, "adding search path");
        self.tools.add_search_path(self.executable, &entry)
    }
}

fn exec_dir(executable: &Path) -> &Path {
    executable.parent().unwrap_or_else(|| Path::new("."))
}
