// simulation_main.rs
use log::{error, info, warn};
use platoon_bridge::communication::transport::BridgeTransport;
use platoon_bridge::config::BridgeConfig;
use platoon_bridge::engine::tick_driver::TickDriver;
use platoon_bridge::simulation_engine::sandbox::SandboxSimulation;
use tokio::signal;

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, stopping simulation..."),
        _ = terminate => info!("received SIGTERM, stopping simulation..."),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = BridgeConfig::load()?;
    let addr = config.controller_addr();

    let transport = match BridgeTransport::connect(&addr).await {
        Ok(transport) => transport,
        Err(err) => {
            error!("{err}");
            return Err(err.into());
        }
    };
    info!("connected to controller at {addr}");
    let transport = transport
        .with_io_timeout(config.io_timeout())
        .with_max_frame_size(config.max_frame_size);

    let mut driver = TickDriver::new(SandboxSimulation::new(), transport, config)?;
    let summary = driver.run(shutdown_signal()).await?;
    info!(
        "simulation finished: {} ticks, {} vehicles injected, {} arrived, {} command batches applied",
        summary.ticks, summary.injected, summary.arrived, summary.commands_applied
    );
    Ok(())
}
