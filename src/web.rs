#![cfg(not(tarpaulin_include))]

use roster::app;
use roster::config::RosterConfig;

/// Main entry point for the roster web application
///
/// Reads `ROSTER_*` settings (a `.env` file is honoured), loads the roster
/// from the configured sheet and serves the API and directory pages.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = RosterConfig::from_env()?;
    app::run(config).await
}
