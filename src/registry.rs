use std::sync::Arc;

use crate::adapter::Adapter;
use crate::config::{ConfigError, Destination, PipelineConfig};
use crate::console::ConsoleAdapter;
use crate::fallback::Fallback;
use crate::file::FileAdapter;

/// Error type returned when building the adapter registry from a
/// configuration snapshot.
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error("remote feature is not enabled")]
    RemoteFeatureDisabled,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Build the ordered adapter registry for every enabled destination.
///
/// The snapshot is validated first. Destinations that fail later, while
/// creating clients or directories, stay in the registry and report through
/// `fallback` instead.
pub fn build_adapters(
    config: &PipelineConfig,
    fallback: Arc<dyn Fallback>,
) -> Result<Vec<Arc<dyn Adapter>>, BuildError> {
    config.validate()?;

    let mut adapters: Vec<Arc<dyn Adapter>> = Vec::new();
    for destination in config.destinations() {
        match destination {
            Destination::Console(settings) => {
                adapters.push(Arc::new(ConsoleAdapter::stdio(settings.log_levels)));
            }
            Destination::File(settings) => {
                adapters.push(Arc::new(FileAdapter::new(&settings, Arc::clone(&fallback))));
            }
            Destination::Remote(settings) => {
                #[cfg(feature = "remote")]
                {
                    use crate::remote::RemoteAdapter;

                    let settings = settings.with_env();
                    adapters.push(Arc::new(RemoteAdapter::new(&settings, Arc::clone(&fallback))));
                }

                #[cfg(not(feature = "remote"))]
                {
                    let _ = settings;
                    return Err(BuildError::RemoteFeatureDisabled);
                }
            }
            Destination::Worker(settings) => {
                #[cfg(feature = "remote")]
                {
                    use crate::buffer::BatchSettings;
                    use crate::remote::RemoteClient;
                    use crate::sink::LogSink;
                    use crate::worker::WorkerAdapter;

                    let settings = settings.with_env();
                    let delivery = match RemoteClient::new(&settings) {
                        Ok(client) => Some(Arc::new(client) as Arc<dyn LogSink>),
                        Err(err) => {
                            fallback.report("worker: failed to create client", &err);
                            None
                        }
                    };
                    adapters.push(Arc::new(WorkerAdapter::new(
                        settings.log_levels.clone(),
                        BatchSettings::from_secs(settings.batch_size, settings.idle_time_sec),
                        delivery,
                        Arc::clone(&fallback),
                    )));
                }

                #[cfg(not(feature = "remote"))]
                {
                    let _ = settings;
                    return Err(BuildError::RemoteFeatureDisabled);
                }
            }
        }
    }

    tracing::debug!(
        adapters = ?adapters.iter().map(|a| a.name().to_string()).collect::<Vec<_>>(),
        "built adapter registry"
    );
    Ok(adapters)
}
