//! HTTP server that builds, deploys and runs playground program templates
//! against a local validator.

mod config;
mod runner;
mod server;

use {
    crate::{config::Cli, runner::Runner},
    clap::Parser,
    playground_runner::{template::FsTemplateLoader, ExecutionEngine},
    std::net::SocketAddr,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    trezoa_logger::setup_with_default("info");

    let cli = Cli::parse();
    let config = cli.engine_config();
    log::info!(
        "Templates from {}, validator on port {}, live templates: {}",
        cli.templates_dir.display(),
        config.validator_port,
        config.supported_templates.join(", ")
    );

    // The engine's RPC client blocks, so it is built off the async threads.
    let loader = Box::new(FsTemplateLoader::new(&cli.templates_dir));
    let engine =
        tokio::task::spawn_blocking(move || ExecutionEngine::from_config(config, loader)).await?;
    let runner = Runner::new(engine, cli.execution_timeout());

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for shutdown signal: {err}");
        }
        log::info!("Shutting down");
    };
    server::serve(addr, runner.clone(), shutdown).await?;

    runner.close(|engine| engine.dispose()).await?;
    Ok(())
}
