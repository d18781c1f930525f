//! Command-line driver.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use dylib_deploy::{walk, Relocator, SystemTools};

const DEFAULT_EXCLUDES: [&str; 2] = ["/usr/lib", "/System/Library/Frameworks/"];

/// Copy all shared libraries required for running the given executable
/// (system libraries are excluded by default) to the specified directory
/// and adjust the search paths to find these libraries. Search paths are
/// set relative to the executable, so the libraries can be deployed with
/// it. Libraries required only indirectly are bundled too, and libraries
/// cross-referencing other libraries are adjusted to use the deployed
/// copies.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Executable to adjust search paths for and bundle libraries with.
    #[arg(value_name = "EXEC")]
    executable: PathBuf,

    /// Only list shared libraries, does not modify anything.
    #[arg(short, long)]
    list: bool,

    /// Be verbose.
    #[arg(short, long)]
    verbose: bool,

    /// Exclude shared libraries whose reference starts with these prefixes.
    #[arg(
        short = 'x',
        long = "exclude",
        value_name = "PREFIX",
        num_args = 0..,
        default_values_t = DEFAULT_EXCLUDES.map(String::from)
    )]
    exclude: Vec<String>,

    /// Directory to install libraries to, relative to the executable.
    #[arg(
        short = 'L',
        long = "lib-dir",
        value_name = "DIR",
        default_value = "../Libraries"
    )]
    lib_dir: PathBuf,

    /// Keep existing rpaths of the executable.
    #[arg(long = "keep-rpaths")]
    keep_rpaths: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .with_target(false)
        .init();

    let executable = fs::canonicalize(&cli.executable).with_context(|| {
        format!("failed to locate executable: {}", cli.executable.display())
    })?;

    let tools = SystemTools;

    if cli.list {
        return list_closure(&tools, &executable, &cli.exclude, cli.verbose);
    }

    let closure: Vec<_> =
        walk(&tools, &executable, &executable, &cli.exclude).collect::<Result<_, _>>()?;

    Relocator::new(&tools, &executable, &cli.lib_dir, cli.keep_rpaths).run(&closure)?;
    Ok(())
}

/// Print the dependency closure without modifying anything.
///
/// By default prints each distinct library location once, in discovery
/// order; verbose mode prints the full requester / raw reference / real
/// path triple for every edge.
fn list_closure(
    tools: &SystemTools,
    executable: &Path,
    exclude: &[String],
    verbose: bool,
) -> Result<()> {
    if verbose {
        println!("requesting binary\trelative librarypath\treal librarypath");
    } else {
        println!("real librarypath");
    }

    let mut printed = HashSet::new();
    for edge in walk(tools, executable, executable, exclude) {
        let edge = edge?;
        if verbose {
            println!(
                "{}\t{}\t{}",
                edge.requester.display(),
                edge.raw_path,
                edge.real_path.display()
            );
        } else if printed.insert(edge.real_path.clone()) {
            println!("{}", edge.real_path.display());
        }
    }

    Ok(())
}
