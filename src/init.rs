use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

use crate::layer::PipelineLayer;
use crate::service::LoggerService;

/// Configuration of the global `tracing` bridge.
///
/// **Fields**
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   installed next to [`PipelineLayer`] so events are also printed as
///   plain text.
#[derive(Clone, Debug, Default)]
pub struct LayerConfig {
    pub enable_stdout: bool,
}

/// Install a global `tracing` subscriber that routes every event into
/// `service`.
///
/// **Parameters**
/// - `service`: the [`LoggerService`] receiving the converted records.
/// - `config`: [`LayerConfig`] controlling the extra `fmt` layer.
///
/// **Effects**
///
/// This installs a [`Registry`] combined with [`PipelineLayer`] as the
/// global default subscriber. Fails if a global subscriber is already set.
pub fn init_tracing_with_config(service: LoggerService, config: LayerConfig) -> Result<(), SetGlobalDefaultError> {
    let layer = PipelineLayer::new(service);

    // The two subscriber shapes have different types.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)
    }
}

/// Initialize the bridge with [`LayerConfig::default`].
pub fn init_tracing(service: LoggerService) -> Result<(), SetGlobalDefaultError> {
    init_tracing_with_config(service, LayerConfig::default())
}
