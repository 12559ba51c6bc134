//! `testdrive files`: print the resolved file lists

use std::path::Path;

use clap::Args;

use super::ResolveArgs;
use crate::output::{self, FileRow, OutputFormat};

#[derive(Args, Debug)]
pub struct FilesArgs {
    #[command(flatten)]
    pub resolve: ResolveArgs,

    /// Port used to derive the server address when none is configured
    #[arg(long, env = "TESTDRIVE_PORT")]
    pub port: Option<u16>,
}

pub fn execute(args: FilesArgs, config_path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let flags = args.resolve.flags(args.port, false);
    let config = args.resolve.resolve(config_path, &flags)?;

    let rows = FileRow::from_lists(config.files_list(), config.tests());
    output::print_list(&rows, format);

    if format.is_human() {
        output::print_info(&format!("Server: {}", config.server()));
        output::print_info(&format!("Capture: {}", config.capture_address()));
        for plugin in config.plugins() {
            output::print_info(&format!("Plugin {}: {} ({})", plugin.name, plugin.path, plugin.module));
        }
    }
    Ok(())
}
