//! Interactive CLI menu for list processing
//! Uses dialoguer for user interaction

use std::io::IsTerminal;
use std::sync::Arc;

use console::style;
use dialoguer::{Input, Select, theme::ColorfulTheme};
use thiserror::Error;
use tracing::{info, warn};

use crate::batch::config_loader::{AppConfig, ConfigError, ConfigManager};
use crate::batch::error::{OrchestratorError, OrchestratorResult};
use crate::batch::fetcher::DownloadPipeline;
use crate::batch::orchestration::{BatchReport, ItemHandler, Orchestrator, WorkSource};

/// Error types for CLI operations
#[derive(Error, Debug)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("UI interaction error: {0}")]
    Dialoguer(#[from] dialoguer::Error),

    #[error("Operation cancelled by user")]
    Cancelled,
}

/// Result type alias for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Main menu options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainMenuOption {
    ProcessListFile,
    ProcessFromDatabase,
    ProcessTagsForMembers,
    ProcessTagsList,
    ImportList,
    Exit,
}

impl MainMenuOption {
    /// Get all menu options
    pub fn variants() -> &'static [MainMenuOption] {
        &[
            MainMenuOption::ProcessListFile,
            MainMenuOption::ProcessFromDatabase,
            MainMenuOption::ProcessTagsForMembers,
            MainMenuOption::ProcessTagsList,
            MainMenuOption::ImportList,
            MainMenuOption::Exit,
        ]
    }

    /// Get the display name for the menu option
    pub fn display_name(&self) -> &'static str {
        match self {
            MainMenuOption::ProcessListFile => "Process members from list file",
            MainMenuOption::ProcessFromDatabase => "Process members from database",
            MainMenuOption::ProcessTagsForMembers => "Search tags for each member",
            MainMenuOption::ProcessTagsList => "Process tag list file",
            MainMenuOption::ImportList => "Import list file into database",
            MainMenuOption::Exit => "Exit",
        }
    }
}

/// CLI manager for interactive menus
pub struct CliManager {
    config_manager: Arc<ConfigManager>,
    orchestrator: Arc<Orchestrator>,
    pipeline: Arc<DownloadPipeline>,
    theme: ColorfulTheme,
}

impl CliManager {
    /// Create a new CLI manager
    pub fn new(
        config_manager: Arc<ConfigManager>,
        orchestrator: Arc<Orchestrator>,
        pipeline: Arc<DownloadPipeline>,
    ) -> Self {
        Self {
            config_manager,
            orchestrator,
            pipeline,
            theme: ColorfulTheme::default(),
        }
    }

    /// Check if we're running in an interactive terminal
    pub fn is_interactive_terminal() -> bool {
        std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
    }

    /// Run the main menu loop, returning `Cancelled` when the user interrupts a run
    pub async fn run(&self) -> CliResult<()> {
        loop {
            let selection = self.show_main_menu()?;
            if selection == MainMenuOption::Exit {
                println!("{}", style("Exiting...").cyan());
                break;
            }

            if let Err(OrchestratorError::Cancelled) = self.dispatch(selection).await {
                println!("{}", style("Interrupted, stopping.").yellow());
                return Err(CliError::Cancelled);
            }
        }

        Ok(())
    }

    /// Run the configured list once without prompting
    pub async fn run_unattended(&self) -> CliResult<()> {
        let config = self.config_manager.get_app_config()?;
        let source = Self::configured_source(&config);
        info!("No interactive terminal, running configured list");

        let result = self
            .orchestrator
            .process_list(&source, ItemHandler::Member(self.pipeline.as_ref()))
            .await;
        Self::report_batch(result).map_err(|_| CliError::Cancelled)
    }

    /// Show the main menu and get user selection
    fn show_main_menu(&self) -> CliResult<MainMenuOption> {
        let options = MainMenuOption::variants();
        let option_names: Vec<&str> = options.iter().map(|o| o.display_name()).collect();

        println!("\n{}", style("List Downloader - Main Menu").cyan().bold());

        let selection = Select::with_theme(&self.theme)
            .items(&option_names)
            .default(0)
            .interact()?;

        Ok(options[selection])
    }

    /// Run one menu action; only cancellation is passed back to the loop
    async fn dispatch(&self, selection: MainMenuOption) -> OrchestratorResult<()> {
        let config = match self.config_manager.get_app_config() {
            Ok(config) => config,
            Err(e) => {
                println!("{}: {}", style("Error").red().bold(), e);
                return Ok(());
            }
        };

        match selection {
            MainMenuOption::ProcessListFile => {
                let list_name = self.prompt_or_default("List file", &config.paths.list_file);
                let source = WorkSource::ListFile(config.list_path(&list_name));
                let result = self
                    .orchestrator
                    .process_list(&source, ItemHandler::Member(self.pipeline.as_ref()))
                    .await;
                Self::report_batch(result)
            }
            MainMenuOption::ProcessFromDatabase => {
                let days = self.prompt_days(config.list.day_last_updated);
                let source = WorkSource::Database { day_last_updated: days };
                let result = self
                    .orchestrator
                    .process_list(&source, ItemHandler::Member(self.pipeline.as_ref()))
                    .await;
                Self::report_batch(result)
            }
            MainMenuOption::ProcessTagsForMembers => {
                let tags = self.prompt_or_default("Tags (space separated)", "");
                if tags.trim().is_empty() {
                    println!("{}", style("No tags entered.").yellow());
                    return Ok(());
                }
                let query = config.tag_query(tags.trim());
                let source = Self::configured_source(&config);
                let handler = ItemHandler::Tags {
                    handler: self.pipeline.as_ref(),
                    query: &query,
                };
                let result = self.orchestrator.process_list(&source, handler).await;
                Self::report_batch(result)
            }
            MainMenuOption::ProcessTagsList => {
                let list_name = self.prompt_or_default("Tag list file", &config.paths.tags_list_file);
                let template = config.tag_query("");
                match self
                    .orchestrator
                    .process_tags_list(&config.list_path(&list_name), &template, self.pipeline.as_ref())
                    .await
                {
                    Ok(count) => {
                        println!("{} Processed {} searches", style("Done.").green(), count);
                        Ok(())
                    }
                    Err(e) => Self::report_error(e),
                }
            }
            MainMenuOption::ImportList => {
                let list_name = self.prompt_or_default("List file", &config.paths.list_file);
                match self.orchestrator.import_list(&config.list_path(&list_name)) {
                    Ok(count) => {
                        println!("{} Imported {} members", style("Done.").green(), count);
                        Ok(())
                    }
                    Err(e) => Self::report_error(e),
                }
            }
            MainMenuOption::Exit => Ok(()),
        }
    }

    fn configured_source(config: &AppConfig) -> WorkSource {
        if config.list.process_from_db {
            WorkSource::Database {
                day_last_updated: config.list.day_last_updated,
            }
        } else {
            WorkSource::ListFile(config.list_path(&config.paths.list_file))
        }
    }

    fn prompt_or_default(&self, prompt: &str, default: &str) -> String {
        let input = Input::<String>::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty(true);
        let input = if default.is_empty() {
            input
        } else {
            input.default(default.to_string())
        };

        match input.interact_text() {
            Ok(value) => value,
            Err(e) => {
                warn!("Prompt failed, using default: {}", e);
                default.to_string()
            }
        }
    }

    fn prompt_days(&self, default: u32) -> u32 {
        Input::<u32>::with_theme(&self.theme)
            .with_prompt("Only members not updated in the last N days (0 = all)")
            .default(default)
            .interact_text()
            .unwrap_or(default)
    }

    fn report_batch(result: OrchestratorResult<BatchReport>) -> OrchestratorResult<()> {
        match result {
            Ok(report) => {
                println!(
                    "{} {} of {} members succeeded",
                    style("Done.").green(),
                    report.succeeded,
                    report.total
                );
                if !report.given_up.is_empty() {
                    println!(
                        "{} {}",
                        style("Given up:").yellow(),
                        report.given_up.join(", ")
                    );
                }
                Ok(())
            }
            Err(e) => Self::report_error(e),
        }
    }

    fn report_error(err: OrchestratorError) -> OrchestratorResult<()> {
        if err.is_cancelled() {
            return Err(err);
        }
        println!("{}: {} (code {})", style("Error").red().bold(), err, err.code());
        Ok(())
    }
}
