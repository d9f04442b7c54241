// traffic_controller_main.rs
use log::info;
use platoon_bridge::config::ControllerConfig;
use platoon_bridge::flow_analyzer::{accept_and_serve, bind};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ControllerConfig::load()?;
    let listener = bind(&config).await?;
    let exchanges = accept_and_serve(listener, &config).await?;
    info!("traffic controller stopped after {exchanges} exchanges");
    Ok(())
}
