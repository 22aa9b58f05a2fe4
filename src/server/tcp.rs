use async_trait::async_trait;

use std::sync::Arc;

use anyhow::Context;

use log::{debug, info};

use tokio::net::TcpListener;

use crate::server::processor::ConnectionProcessor;

pub struct TcpServer {
    bind_address: String,
    processor: Arc<ConnectionProcessor>,
}

impl TcpServer {
    pub fn new(
        server_configuration: &crate::config::ServerConfiguration,
        processor: Arc<ConnectionProcessor>,
    ) -> Self {
        Self {
            bind_address: server_configuration.bind_address().clone(),
            processor,
        }
    }

    async fn create_listener(&self) -> anyhow::Result<TcpListener> {
        let listener = TcpListener::bind(&self.bind_address)
            .await
            .with_context(|| {
                format!("TcpListener::bind error bind_address '{}'", self.bind_address)
            })?;

        let local_addr = listener.local_addr().context("local_addr error")?;

        info!("TcpServer listening on {:?}", local_addr);

        Ok(listener)
    }
}

#[async_trait]
impl super::SocketServer for TcpServer {
    async fn run(&self) -> anyhow::Result<()> {
        let listener = self
            .create_listener()
            .await
            .context("TcpServer::create_listener error")?;

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
