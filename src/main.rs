use itag_mqtt_bridge::config::BridgeConfig;
use itag_mqtt_bridge::logging;
use log::{error, info};

#[tokio::main]
async fn main() {
    let config = match BridgeConfig::load().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };
    logging::init(&config.log_level);
    info!(
        "Starting iTAG bridge, publishing under '{}'",
        config.mqtt.base_topic
    );

    if let Err(e) = itag_mqtt_bridge::run(config).await {
        error!("Bridge stopped: {:#}", e);
        std::process::exit(1);
    }
}
