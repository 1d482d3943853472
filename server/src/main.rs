//! Accesslogger Server Binary
//!
//! Entry point for the Envoy access log ingestion server.

#![deny(unsafe_code)]

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; variables may come from the environment.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    accesslogger::run_server().await
}
