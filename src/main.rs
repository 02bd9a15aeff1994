use std::env::consts::{ARCH, FAMILY, OS};
use std::path::Path;

use anyhow::Error;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::batch::{init_config, init_logger};
use crate::program::Program;

mod batch;
mod program;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config_manager = init_config(".")?;
    let config = config_manager.get_app_config()?;

    let guard = init_logger(&config.logging, Path::new(&config.paths.log_directory))?;
    log_system_information();

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let program = Program::new(config_manager, cancel)?;
    let code = program.run().await?;

    // flush the file writer before leaving
    drop(guard);
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Cancels the running batch on Ctrl-C.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current step");
            cancel.cancel();
        }
    });
}

/// Logs important information about the system being used.
fn log_system_information() {
    trace!("Printing system information out into log for debug purposes...");
    trace!("ARCH:           \"{}\"", ARCH);
    trace!("FAMILY:         \"{}\"", FAMILY);
    trace!("OS:             \"{}\"", OS);
}
