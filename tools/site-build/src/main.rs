//! Static site build step for the NoteWave notes app.
//!
//! Clears the publish directory and copies the source asset directory into
//! it verbatim, files and subdirectories alike. There is no transformation
//! pass; the source tree is already the deployable site.
//!
//! ## Usage
//!
//! ```bash
//! # Copy home/ into build/, replacing whatever was there
//! site-build --source home --dest build
//! ```

use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Parser)]
#[command(name = "site-build")]
#[command(about = "Static site build step for the NoteWave notes app")]
struct Cli {
    /// Source asset directory
    #[arg(short, long, default_value = "home")]
    source: PathBuf,

    /// Publish directory, replaced on every build
    #[arg(short, long, default_value = "build")]
    dest: PathBuf,
}

#[derive(Error, Debug)]
enum BuildError {
    #[error("Source folder \"{0}\" not found. Nothing to build.")]
    MissingSource(String),

    #[error("Copy failed for {path}: {source}")]
    CopyFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn main() {
    let cli = Cli::parse();

    match build(&cli.source, &cli.dest) {
        Ok(copied) => {
            println!(
                "Build completed: copied \"{}\" -> \"{}\" ({copied} files)",
                cli.source.display(),
                cli.dest.display()
            );
        }
        Err(error @ BuildError::MissingSource(_)) => {
            eprintln!("{error}");
            std::process::exit(1);
        }
        Err(error) => {
            eprintln!("Build failed: {error}");
            std::process::exit(2);
        }
    }
}

/// Replace `dest` with a verbatim copy of `source`. Returns the number of
/// files copied.
fn build(source: &Path, dest: &Path) -> Result<usize, BuildError> {
    if !source.is_dir() {
        return Err(BuildError::MissingSource(source.display().to_string()));
    }

    // Stale output from a previous build must not survive.
    if dest.exists() {
        fs::remove_dir_all(dest).map_err(|e| BuildError::CopyFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;
    }

    copy_dir(source, dest)
}

fn copy_dir(source: &Path, dest: &Path) -> Result<usize, BuildError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |e: std::io::Error| BuildError::CopyFailed { path, source: e }
    };

    fs::create_dir_all(dest).map_err(io_err(dest))?;

    let mut copied = 0;
    let entries = fs::read_dir(source).map_err(io_err(source))?;
    for entry in entries {
        let entry = entry.map_err(io_err(source))?;
        let src_path = entry.path();
        let dest_path = dest.join(entry.file_name());
        let file_type = entry.file_type().map_err(io_err(&src_path))?;

        if file_type.is_dir() {
            copied += copy_dir(&src_path, &dest_path)?;
        } else if file_type.is_file() {
            fs::copy(&src_path, &dest_path).map_err(io_err(&src_path))?;
            copied += 1;
        }
        // Symlinks and other specials are skipped, as the original did.
    }
    Ok(copied)
}
