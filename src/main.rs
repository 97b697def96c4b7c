//! cloudeye-bridge entry point.

use cloudeye_bridge::cli::{self, Cli};
use cloudeye_bridge::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let cli = Cli::parse_args();

    // Execute the command
    cli::execute(cli).await
}
