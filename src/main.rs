use std::sync::Arc;

use anyhow::Context;

use log::{error, info, warn};

use tokio::signal::unix::{signal, SignalKind};

use uri_router::{
    config::read_configuration,
    handlers::{create_router, ConfiguredHandlerFactory},
    router::Router,
    server::Server,
};

/// Re-read the configuration on SIGHUP and apply its handler entries.
fn spawn_reload_on_hangup(
    config_file: String,
    router: Arc<Router>,
    factory: Arc<ConfiguredHandlerFactory>,
) -> anyhow::Result<()> {
    let mut hangup = signal(SignalKind::hangup()).context("error installing SIGHUP handler")?;

    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("SIGHUP received, reloading '{}'", config_file);

            let configuration = match read_configuration(&config_file).await {
                Ok(configuration) => configuration,
                Err(err) => {
                    warn!("reload failed: {:#}", err);
                    continue;
                }
            };

            let router = Arc::clone(&router);
            let factory = Arc::clone(&factory);

            // replace may sleep while draining
            let result = tokio::task::spawn_blocking(move || {
                router.apply_config(configuration.handlers(), factory.as_ref())
            })
            .await;

            match result {
                Ok(Ok(())) => info!("reload applied"),
                Ok(Err(err)) => warn!("reload incomplete: {}", err),
                Err(err) => warn!("reload task failed: {}", err),
            }
        }
    });

    Ok(())
}

async fn try_main() -> anyhow::Result<()> {
    let config_file = std::env::args()
        .nth(1)
        .context("config file required as command line argument")?;

    let configuration = read_configuration(&config_file)
        .await
        .context("read_configuration error")?;

    let factory = Arc::new(ConfiguredHandlerFactory::new(
        configuration.router_configuration(),
        None,
    ));

    let router = create_router(&configuration, factory.as_ref())?;

    spawn_reload_on_hangup(config_file, Arc::clone(&router), factory)?;

    let server = Server::new(router, configuration.server_configuration());

    server.run().await
}

#[tokio::main]
async fn main() {
    env_logger::builder().format_timestamp_nanos().init();

    if let Err(err) = try_main().await {
        error!("fatal error in main:\n{:#}", err);
        std::process::exit(1);
    }
}
