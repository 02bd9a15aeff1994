use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Error};
use console::Term;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use crate::batch::cli::{CliError, CliResult};
use crate::batch::{
    CliManager, ConfigManager, DownloadPipeline, FeedSource, FetchSession, Orchestrator,
    SqliteStore,
};

/// The name of the cargo package.
const NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the cargo package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The authors who created the package.
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

/// Exit code of a run stopped by the user
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Wires the store, fetch session, download pipeline and orchestrator together.
pub(crate) struct Program {
    orchestrator: Arc<Orchestrator>,
    cli: CliManager,
}

impl Program {
    /// Build every component from the loaded configuration.
    pub(crate) fn new(config_manager: Arc<ConfigManager>, cancel: CancellationToken) -> Result<Self, Error> {
        let config = config_manager.get_app_config()?;

        let store = Arc::new(
            SqliteStore::open(Path::new(&config.paths.database_file))
                .with_context(|| format!("opening database {}", config.paths.database_file))?,
        );
        trace!("Database opened at {}", config.paths.database_file);

        let session = Arc::new(FetchSession::new());
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            session.clone(),
            config.retry_config(),
            &config.paths.root_directory,
            config.list_path(&config.paths.ignore_list),
            cancel,
        ));

        let source = Arc::new(FeedSource::new(&config.paths.feed_directory, session));
        let pipeline = Arc::new(DownloadPipeline::new(
            source,
            store,
            config.filter_config()?,
            config.filter.required_tags.clone(),
            config.check_limit(),
            orchestrator.cancellation_token(),
        ));

        let cli = CliManager::new(config_manager, orchestrator.clone(), pipeline);
        Ok(Self { orchestrator, cli })
    }

    /// Runs the menu, or the configured list when no terminal is attached.
    ///
    /// Returns the error code of the last failed batch, 0 when none failed,
    /// or [`INTERRUPTED_EXIT_CODE`] when the user stopped the run.
    pub(crate) async fn run(&self) -> Result<i32, Error> {
        Term::stdout().set_title(format!("{} v{}", NAME, VERSION));
        info!("{} v{} by {}", NAME, VERSION, AUTHORS);

        let outcome = if CliManager::is_interactive_terminal() {
            self.cli.run().await
        } else {
            self.cli.run_unattended().await
        };

        Ok(exit_code(outcome, self.orchestrator.error_code())?)
    }
}

fn exit_code(outcome: CliResult<()>, error_code: i32) -> CliResult<i32> {
    match outcome {
        Ok(()) => Ok(error_code),
        Err(CliError::Cancelled) => {
            warn!("Run interrupted by user");
            Ok(INTERRUPTED_EXIT_CODE)
        }
        Err(e) => Err(e),
    }
}
