use serde_json::json;
use std::sync::Arc;

use fanout_log_sink::env::env_or;
use fanout_log_sink::info::{HostInfoProvider, RuntimeInfoProvider};
use fanout_log_sink::{LoggerService, PipelineConfig};

#[tokio::main]
async fn main() {
    let path = env_or("LOG_SINK_CONFIG", "log-config.json");
    let config = match PipelineConfig::from_path(&path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("using default config ({path}: {err})");
            PipelineConfig::default()
        }
    };

    let service = LoggerService::builder()
        .config(config)
        .info_provider(Arc::new(HostInfoProvider))
        .info_provider(Arc::new(RuntimeInfoProvider))
        .build();

    println!("logger state: {:?}", service.initialize().await);

    let http = service.scoped("http");
    http.info("listening", Some(json!({"port": 8080})));
    http.debug("not shown unless debug is allowed", None);
    service.warn("cache miss ratio high", Some(json!({"ratio": 0.42})));

    let err = std::io::Error::new(std::io::ErrorKind::NotFound, "template missing");
    service.error("render failed", Some(fanout_log_sink::record::error_args(&err)));

    service.dispose().await;
}
