//! HTTP server for askdb
//! Serves the ask pipeline over plain HTTP/1.1 on tokio

use anyhow::Result;
use askdb::config::ConfigArgs;
use askdb::pipeline::Pipeline;
use askdb::server::serve;
use askdb::telemetry::init_tracing;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "askdb-server")]
#[command(about = "HTTP API for asking a relational database questions in plain language")]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,

    /// Address to listen on
    #[arg(long, env = "ASKDB_BIND", default_value = "0.0.0.0:8080")]
    bind: String,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.verbose);

    info!("🚀 Starting askdb API server...");
    let config = args.config.into_config()?;
    let pipeline = Arc::new(Pipeline::from_config(config)?);
    info!(
        "✅ Schema loaded: {} tables",
        pipeline.schema().tables().len()
    );

    let listener = TcpListener::bind(&args.bind).await?;
    info!("📡 Listening on http://{}", args.bind);

    serve(listener, pipeline).await?;
    Ok(())
}
