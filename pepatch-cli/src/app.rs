use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use pepatch::Architecture;

/// Default GitHub repository hosting the helper library releases.
pub const DEFAULT_REPO: &str = "matu6968/progwrp-patcher";

/// pepatch - rename PE imports so applications load on Windows XP
#[derive(Debug, Parser)]
#[command(name = "pepatch", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Architectures that helper libraries are published for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ArchArg {
    /// 32-bit x86
    X86,
    /// AMD64
    #[value(name = "x86_64")]
    X86_64,
}

impl From<ArchArg> for Architecture {
    fn from(arch: ArchArg) -> Self {
        match arch {
            ArchArg::X86 => Architecture::X86,
            ArchArg::X86_64 => Architecture::X86_64,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Patch .exe/.dll files and deploy the helper libraries they now import.
    Patch {
        /// File to patch, or directory to scan for .exe/.dll files.
        #[arg(value_name = "PATH", default_value = ".")]
        path: PathBuf,

        /// INI file mapping original libraries to their replacements.
        #[arg(long, value_name = "FILE", default_value = "progwrp.ini")]
        ini: PathBuf,

        /// GitHub repository (owner/repo) to download helper libraries from.
        #[arg(long, value_name = "OWNER/REPO", default_value = DEFAULT_REPO)]
        repo: String,

        /// Recurse into sub-directories.
        #[arg(short, long)]
        recursive: bool,

        /// Suffix inserted before the extension of patched files.
        #[arg(long, default_value = pepatch::session::DEFAULT_SUFFIX)]
        suffix: String,

        /// Write patched files here instead of next to their inputs.
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Helper library store (default: blobs/ next to the executable).
        #[arg(long, value_name = "DIR")]
        blobs_dir: Option<PathBuf>,

        /// Never download helper libraries; use what the store already has.
        #[arg(long)]
        offline: bool,

        /// Do not copy helper libraries next to patched files.
        #[arg(long)]
        no_deploy: bool,

        /// Patch files concurrently.
        #[arg(long)]
        parallel: bool,

        /// Write a JSON report to this file.
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Show architecture and optional header type of PE files.
    Detect {
        /// PE files to inspect.
        #[arg(value_name = "FILE", required = true)]
        paths: Vec<PathBuf>,
    },

    /// List imported libraries, optionally checked against a replacement map.
    Imports {
        /// PE file to inspect.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// INI file mapping original libraries to their replacements.
        #[arg(long, value_name = "FILE")]
        ini: Option<PathBuf>,
    },

    /// Download helper libraries for an architecture into the store.
    Fetch {
        /// Architecture to fetch.
        #[arg(long, value_enum)]
        arch: ArchArg,

        /// GitHub repository (owner/repo) to download from.
        #[arg(long, value_name = "OWNER/REPO", default_value = DEFAULT_REPO)]
        repo: String,

        /// Helper library store (default: blobs/ next to the executable).
        #[arg(long, value_name = "DIR")]
        blobs_dir: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn patch_defaults() {
        let cli = Cli::try_parse_from(["pepatch", "patch"]).unwrap();
        match cli.command {
            Command::Patch {
                path,
                ini,
                repo,
                suffix,
                recursive,
                ..
            } => {
                assert_eq!(path, PathBuf::from("."));
                assert_eq!(ini, PathBuf::from("progwrp.ini"));
                assert_eq!(repo, DEFAULT_REPO);
                assert_eq!(suffix, "_patched");
                assert!(!recursive);
            }
            other => panic!("Expected patch, got {other:?}"),
        }
    }

    #[test]
    fn fetch_arch_names() {
        let cli = Cli::try_parse_from(["pepatch", "fetch", "--arch", "x86_64", "--json"]).unwrap();
        assert!(cli.global.json);
        match cli.command {
            Command::Fetch { arch, .. } => {
                assert_eq!(Architecture::from(arch), Architecture::X86_64);
            }
            other => panic!("Expected fetch, got {other:?}"),
        }
        assert!(Cli::try_parse_from(["pepatch", "fetch", "--arch", "arm64"]).is_err());
    }
}
