//! Managed peering server entry point.
//!
//! Runs inside every pod of a PeeringServer cohort.

use peering_operator::server::{self, Settings};
use peering_operator::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let directives = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::builder().parse_lossy(directives))
        .init();

    let settings = Settings::from_env();
    info!(
        server = %settings.server_name,
        port = settings.port,
        config_path = %settings.config_path.display(),
        "starting peering server v{}",
        env!("CARGO_PKG_VERSION")
    );

    server::run(settings).await
}
