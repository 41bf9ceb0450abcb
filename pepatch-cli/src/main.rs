mod app;
mod commands;
mod output;

use anyhow::Context;
use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .context("failed to set Ctrl+C handler")?;

    let cli = Cli::parse();

    // Show pepatch info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("pepatch", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Patch {
            path,
            ini,
            repo,
            recursive,
            suffix,
            output_dir,
            blobs_dir,
            offline,
            no_deploy,
            parallel,
            report,
        } => commands::patch::run(
            path,
            &commands::patch::PatchOptions {
                ini,
                repo,
                recursive: *recursive,
                suffix,
                output_dir: output_dir.as_deref(),
                blobs_dir: blobs_dir.as_deref(),
                offline: *offline,
                no_deploy: *no_deploy,
                parallel: *parallel,
                report: report.as_deref(),
                global: &cli.global,
            },
        ),
        Command::Detect { paths } => commands::detect::run(paths, &cli.global),
        Command::Imports { path, ini } => commands::imports::run(path, ini.as_deref(), &cli.global),
        Command::Fetch {
            arch,
            repo,
            blobs_dir,
        } => commands::fetch::run(*arch, repo, blobs_dir.as_deref(), &cli.global),
    }
}
