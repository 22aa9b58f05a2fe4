pub mod default;
pub mod plugin;
pub mod process;
pub mod status;
mod utils;

use std::{sync::Arc, time::Duration};

use anyhow::Context;

use async_trait::async_trait;

pub use crate::{request::HttpRequest, response::HttpResponse};

use crate::{
    config::{Configuration, HandlerDefinition, RouterConfiguration},
    router::Router,
};

pub use utils::{build_status_code_response, build_text_response};

/// The one capability every routed handler offers, however it obtains its
/// logic.
///
/// `Ok` counts as a success and `Err` as a handler-reported failure.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn call(&self, request: &HttpRequest<'_>) -> anyhow::Result<HttpResponse>;

    fn describe(&self) -> String;
}

/// Builds handlers from configured definitions.
pub trait HandlerFactory: Send + Sync {
    fn create(&self, definition: &HandlerDefinition) -> anyhow::Result<Arc<dyn RequestHandler>>;
}

pub struct ConfiguredHandlerFactory {
    process_limiter: Arc<process::ProcessLimiter>,
    process_timeout: Duration,
    plugin_loader: Option<Arc<dyn plugin::PluginLoader>>,
}

impl ConfiguredHandlerFactory {
    pub fn new(
        router_configuration: &RouterConfiguration,
        plugin_loader: Option<Arc<dyn plugin::PluginLoader>>,
    ) -> Self {
        let process_configuration = router_configuration.process_configuration();

        Self {
            process_limiter: process::ProcessLimiter::new(
                *process_configuration.max_concurrent_processes(),
                *process_configuration.semaphore_acquire_timeout(),
            ),
            process_timeout: *process_configuration.process_timeout(),
            plugin_loader,
        }
    }
}

impl HandlerFactory for ConfiguredHandlerFactory {
    fn create(&self, definition: &HandlerDefinition) -> anyhow::Result<Arc<dyn RequestHandler>> {
        match definition {
            HandlerDefinition::Process { command, args } => {
                Ok(Arc::new(process::ProcessHandler::new(
                    command.clone(),
                    args.clone(),
                    definition.description(),
                    Arc::clone(&self.process_limiter),
                    self.process_timeout,
                )))
            }
            HandlerDefinition::Plugin { path } => {
                let loader = self
                    .plugin_loader
                    .as_ref()
                    .with_context(|| format!("no plugin loader available for '{}'", path))?;

                Ok(Arc::new(plugin::PluginHandler::load(loader.as_ref(), path)?))
            }
        }
    }
}

pub fn create_router(
    configuration: &Configuration,
    factory: &dyn HandlerFactory,
) -> anyhow::Result<Arc<Router>> {
    let router = Arc::new(
        Router::new(*configuration.router_configuration().drain_policy())
            .context("error creating router")?,
    );

    status::StatusHandler::register(&router).context("error registering status handler")?;

    router
        .apply_config(configuration.handlers(), factory)
        .context("error applying handler configuration")?;

    Ok(router)
}
