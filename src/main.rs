use rategate::{config::GateConfig, init_tracing, serve};
use std::env;
use std::process;

#[tokio::main]
async fn main() {
    // Get config file path from command line or use default
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/rategate.yaml".to_string());

    // Load configuration
    let config = match GateConfig::from_file(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", config_path, e);
            eprintln!("Usage: rategate [config_file]");
            process::exit(1);
        }
    };

    init_tracing(config.logging.format);

    if let Err(e) = serve(config).await {
        eprintln!("rategate error: {}", e);
        process::exit(1);
    }
}
