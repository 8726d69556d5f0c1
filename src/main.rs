//! tplsync CLI entry point
//!
//! Parses the command line, runs the selected engine operation against a JSON
//! state file, and renders failures through [`user_friendly_error`].
//!
//! - `propagate` - propagate template entities to linked hosts
//! - `sync` - propagate the entities of templates to specific hosts
//! - `check-deps` - validate proposed trigger changes

use anyhow::Result;
use clap::Parser;
use tplsync::cli;
use tplsync::core::error::user_friendly_error;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute() {
        Ok(()) => Ok(()),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
