use std::sync::Arc;

use foodly_session::config::{load_config, print_schema, DEFAULT_CONFIG_PATH};
use foodly_session::startup::run;
use foodly_session::utils::logger::init_logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let mut config_path = DEFAULT_CONFIG_PATH.to_string();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--schema" => {
                print_schema();
                return Ok(());
            }
            "--config" => match args.next() {
                Some(path) => config_path = path,
                None => return Err("--config needs a path".into()),
            },
            other => return Err(format!("Unknown argument '{}'", other).into()),
        }
    }

    let config = Arc::new(load_config(&config_path));
    init_logging(&config.logging)?;
    tracing::info!(
        "Starting {} v{}",
        config.logging.service_name,
        config.logging.service_version
    );

    run(config).await
}
