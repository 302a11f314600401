//! Command line interface definition using clap.

use camino::Utf8PathBuf;
use clap::{ArgAction, Parser};

/// Translate a GNU Make build description into a modern CMake project.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Root directory containing the Makefiles to convert.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub source_dir: Utf8PathBuf,

    /// Entry Makefile name; defaults to the first of Makefile, makefile,
    /// GNUmakefile found in the source directory.
    #[arg(short = 'f', long, value_name = "FILE")]
    pub entry_makefile: Option<String>,

    /// Directory the generated CMake files are written to.
    #[arg(long, value_name = "DIR", default_value = "cmake-out")]
    pub output_dir: Utf8PathBuf,

    /// YAML configuration file with conversion settings.
    #[arg(long, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Compute and list the outputs without writing any file.
    #[arg(long)]
    pub dry_run: bool,

    /// Generate install/export/package rules alongside the build files.
    #[arg(long)]
    pub with_packaging: bool,

    /// Increase diagnostic logging (-v, -vv, -vvv).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Treat configuration schema warnings as errors.
    #[arg(long)]
    pub strict: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let cli = Cli::parse_from(["mk2cmake"]);
        assert_eq!(cli.source_dir, Utf8PathBuf::from("."));
        assert_eq!(cli.output_dir, Utf8PathBuf::from("cmake-out"));
        assert!(!cli.dry_run);
        assert!(!cli.with_packaging);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn flags_parse() {
        let cli = Cli::parse_from([
            "mk2cmake",
            "--source-dir",
            "proj",
            "-f",
            "build.mk",
            "--output-dir",
            "out",
            "--dry-run",
            "--with-packaging",
            "-vv",
            "--strict",
        ]);
        assert_eq!(cli.entry_makefile.as_deref(), Some("build.mk"));
        assert!(cli.dry_run);
        assert!(cli.with_packaging);
        assert_eq!(cli.verbose, 2);
        assert!(cli.strict);
    }
}
