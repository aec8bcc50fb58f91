//! Desktop CI Actions - build automation for the desktop application on CI.

use desktop_ci_actions::cli;
use desktop_ci_actions::cli::OutputManager;
use desktop_ci_actions::ActionConfig;
use std::process;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match ActionConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            OutputManager::new(false, false).error(&format!("Cannot read the environment: {e}"));
            process::exit(1);
        }
    };
    log::debug!("{:?}", config);

    match cli::run(&config).await {
        Ok(exit_code) => {
            process::exit(exit_code);
        }
        Err(e) => {
            // Never quiet for fatal errors
            let output = OutputManager::new(false, false);
            output.error(&format!("Fatal error: {e}"));

            let suggestions = e.recovery_suggestions();
            if !suggestions.is_empty() {
                let _ = output.println("\n💡 Recovery suggestions:");
                for suggestion in suggestions {
                    let _ = output.indent(&suggestion);
                }
            }

            process::exit(1);
        }
    }
}
