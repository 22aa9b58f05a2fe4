use async_trait::async_trait;

use std::sync::Arc;

use anyhow::Context;

use log::{debug, info};

use tokio::net::UnixListener;

use crate::server::processor::ConnectionProcessor;

pub struct UnixServer {
    bind_address: String,
    processor: Arc<ConnectionProcessor>,
}

impl UnixServer {
    pub fn new(
        server_configuration: &crate::config::ServerConfiguration,
        processor: Arc<ConnectionProcessor>,
    ) -> Self {
        Self {
            bind_address: server_configuration.bind_address().clone(),
            processor,
        }
    }

    async fn create_listener(&self) -> anyhow::Result<UnixListener> {
        // do not fail on remove error, the path may not exist.
        let remove_result = tokio::fs::remove_file(&self.bind_address).await;
        debug!("remove_result = {:?}", remove_result);

        let listener = UnixListener::bind(&self.bind_address)
            .with_context(|| format!("UnixListener::bind error path '{}'", self.bind_address))?;

        let local_addr = listener.local_addr().context("local_addr error")?;

        info!("UnixServer listening on {:?}", local_addr);

        Ok(listener)
    }
}

#[async_trait]
impl super::SocketServer for UnixServer {
    async fn run(&self) -> anyhow::Result<()> {
        let listener = self
            .create_listener()
            .await
            .context("UnixServer::create_listener error")?;

        loop {
            let (stream, address) = listener
                .accept()
                .await
                .context("establishing connection failed")?;

            debug!("connection from {:?}", address);

            Arc::clone(&self.processor).start(stream.into_split());
        }
    }
}
