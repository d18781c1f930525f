//! Mach-O inspection and patching via otool and install_name_tool.

use std::path::Path;
use std::process::Command;

use crate::error::Error;

/// Read-only binary inspection.
///
/// The walker and the path resolver only ever look at binaries through this
/// trait, so they can be exercised against in-memory fakes where no Mach-O
/// tooling exists.
pub trait Inspector {
    /// All shared-library references embedded in `binary`, in declaration
    /// order, excluding the binary's own install name.
    fn direct_references(&self, binary: &Path) -> Result<Vec<String>, Error>;

    /// The `LC_RPATH` entries of `binary`, in declaration order.
    fn runtime_search_paths(&self, binary: &Path) -> Result<Vec<String>, Error>;
}

/// Install-name metadata edits.
pub trait Editor {
    /// Change one library reference of `binary` from `old` to `new`.
    fn rewrite_reference(&self, binary: &Path, old: &str, new: &str) -> Result<(), Error>;

    /// Set the install name of a shared library.
    fn set_self_identity(&self, library: &Path, id: &str) -> Result<(), Error>;

    /// Add a runtime search path entry to `binary`.
    fn add_search_path(&self, binary: &Path, path: &str) -> Result<(), Error>;

    /// Remove a runtime search path entry from `binary`.
    fn remove_search_path(&self, binary: &Path, path: &str) -> Result<(), Error>;
}

/// Production implementation shelling out to the Xcode command line tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTools;

impl SystemTools {
    /// The install name of a shared library, or `None` for binaries that
    /// carry no `LC_ID_DYLIB` (plain executables).
    fn self_identity(&self, binary: &Path) -> Result<Option<String>, Error> {
        let stdout = otool("-D", binary)?;
        // First line repeats the file name, the id follows on its own line.
        Ok(stdout
            .lines()
            .skip(1)
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string))
    }
}

impl Inspector for SystemTools {
    fn direct_references(&self, binary: &Path) -> Result<Vec<String>, Error> {
        if !binary.exists() {
            return Err(Error::ToolInvocation {
                tool: "otool",
                path: binary.to_path_buf(),
                message: "file does not exist".to_string(),
            });
        }

        let id = self.self_identity(binary)?;
        let stdout = otool("-L", binary)?;
        let mut refs = parse_reference_list(&stdout);
        // A dylib lists its own install name ahead of its dependencies.
        if let Some(id) = id {
            refs.retain(|r| r != &id);
        }
        Ok(refs)
    }

    fn runtime_search_paths(&self, binary: &Path) -> Result<Vec<String>, Error> {
        let stdout = otool("-l", binary)?;
        parse_search_paths(&stdout, binary)
    }
}

impl Editor for SystemTools {
    fn rewrite_reference(&self, binary: &Path, old: &str, new: &str) -> Result<(), Error> {
        install_name_tool(&["-change", old, new], binary)
    }

    fn set_self_identity(&self, library: &Path, id: &str) -> Result<(), Error> {
        install_name_tool(&["-id", id], library)
    }

    fn add_search_path(&self, binary: &Path, path: &str) -> Result<(), Error> {
        install_name_tool(&["-add_rpath", path], binary)
    }

    fn remove_search_path(&self, binary: &Path, path: &str) -> Result<(), Error> {
        install_name_tool(&["-delete_rpath", path], binary)
    }
}

fn otool(flag: &str, binary: &Path) -> Result<String, Error> {
    let output = Command::new("otool")
        .arg(flag)
        .arg(binary)
        .output()
        .map_err(|e| Error::ToolInvocation {
            tool: "otool",
            path: binary.to_path_buf(),
            message: if e.kind() == std::io::ErrorKind::NotFound {
                "otool command not found - install the Xcode command line tools".to_string()
            } else {
                e.to_string()
            },
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::ToolInvocation {
            tool: "otool",
            path: binary.to_path_buf(),
            message: stderr.trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn install_name_tool(args: &[&str], binary: &Path) -> Result<(), Error> {
    tracing::debug!(?args, binary = %binary.display(), "install_name_tool");

    let output = Command::new("install_name_tool")
        .args(args)
        .arg(binary)
        .output()
        .map_err(|e| Error::ToolInvocation {
            tool: "install_name_tool",
            path: binary.to_path_buf(),
            message: if e.kind() == std::io::ErrorKind::NotFound {
                "install_name_tool command not found - install the Xcode command line tools"
                    .to_string()
            } else {
                e.to_string()
            },
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Rewrite {
            binary: binary.to_path_buf(),
            message: stderr.trim().to_string(),
        });
    }

    Ok(())
}

/// Parse `otool -L` output into the referenced library paths.
///
/// Example output:
/// ```text
/// /usr/local/bin/app:
///     @rpath/libfoo.dylib (compatibility version 1.0.0, current version 1.2.3)
///     /usr/lib/libSystem.B.dylib (compatibility version 1.0.0, current version 1319.0.0)
/// ```
/// The first line only repeats the inspected file and is skipped; every
/// following line holds one reference and its version annotation.
pub fn parse_reference_list(output: &str) -> Vec<String> {
    let mut refs = Vec::new();

    for line in output.lines().skip(1) {
        let line = line.trim();
        if let Some(pos) = line.rfind(" (") {
            if line.ends_with(')') {
                refs.push(line[..pos].to_string());
            }
        }
    }

    refs
}

/// Parse `LC_RPATH` records out of `otool -l` output.
///
/// Each record looks like:
/// ```text
/// Load command 13
///           cmd LC_RPATH
///       cmdsize 40
///          path @loader_path/../Frameworks (offset 12)
/// ```
/// A `cmd LC_RPATH` line whose path line does not match this shape is a
/// parse failure, not a silently dropped entry.
pub fn parse_search_paths(output: &str, binary: &Path) -> Result<Vec<String>, Error> {
    let mut paths = Vec::new();
    let mut lines = output.lines();

    while let Some(line) = lines.next() {
        if line.trim() != "cmd LC_RPATH" {
            continue;
        }
        // Skip the "cmdsize ..." line between cmd and path.
        lines.next();
        let path_line = lines.next().unwrap_or("").trim();
        let entry = path_line
            .strip_prefix("path ")
            .and_then(|rest| rest.rfind(" (").map(|pos| &rest[..pos]))
            .filter(|_| path_line.ends_with(')'));
        match entry {
            Some(p) => paths.push(p.to_string()),
            None => {
                return Err(Error::ToolInvocation {
                    tool: "otool",
                    path: binary.to_path_buf(),
                    message: format!("could not extract rpath from: '{path_line}'"),
                });
            }
        }
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference_list() {
        let output = "\
/usr/local/bin/app:
\t@rpath/libfoo.dylib (compatibility version 1.0.0, current version 1.2.3)
\t/usr/lib/libSystem.B.dylib (compatibility version 1.0.0, current version 1319.0.0)
";
        let refs = parse_reference_list(output);
        assert_eq!(refs, vec!["@rpath/libfoo.dylib", "/usr/lib/libSystem.B.dylib"]);
    }

    #[test]
    fn test_parse_reference_list_parenthesized_name() {
        // A path containing " (" splits at the version annotation, not at
        // the path's own parenthesis.
        let output = "\
bin:
\t/opt/weird (x86) libs/liba.dylib (compatibility version 1.0.0, current version 1.0.0)
";
        let refs = parse_reference_list(output);
        assert_eq!(refs, vec!["/opt/weird (x86) libs/liba.dylib"]);
    }

    #[test]
    fn test_parse_reference_list_header_only() {
        let refs = parse_reference_list("/usr/local/bin/static-app:\n");
        assert!(refs.is_empty());
    }

    #[test]
    fn test_parse_search_paths() {
        let output = "\
Load command 12
          cmd LC_LOAD_DYLIB
      cmdsize 56
         name /usr/lib/libSystem.B.dylib (offset 24)
Load command 13
          cmd LC_RPATH
      cmdsize 40
         path @loader_path/../Frameworks (offset 12)
Load command 14
          cmd LC_RPATH
      cmdsize 32
         path /usr/local/lib (offset 12)
";
        let paths = parse_search_paths(output, Path::new("bin")).unwrap();
        assert_eq!(paths, vec!["@loader_path/../Frameworks", "/usr/local/lib"]);
    }

    #[test]
    fn test_parse_search_paths_none() {
        let output = "\
Load command 0
          cmd LC_SEGMENT_64
      cmdsize 72
";
        let paths = parse_search_paths(output, Path::new("bin")).unwrap();
        assert!(paths.is_empty());
    }

    #[test]
    fn test_parse_search_paths_malformed() {
        let output = "\
Load command 13
          cmd LC_RPATH
      cmdsize 40
         garbage line
";
        let err = parse_search_paths(output, Path::new("bin")).unwrap_err();
        assert!(matches!(err, Error::ToolInvocation { tool: "otool", .. }));
        assert!(err.to_string().contains("could not extract rpath"));
    }
}
