mod processor;
mod tcp;
mod unix;

use async_trait::async_trait;

use std::sync::Arc;

use crate::{config::ServerType, router::Router};

#[async_trait]
trait SocketServer: Send + Sync {
    async fn run(&self) -> anyhow::Result<()>;
}

/// FastCGI front end feeding parsed requests into a `Router`.
pub struct Server {
    socket_server: Box<dyn SocketServer>,
}

impl Server {
    pub fn new(
        router: Arc<Router>,
        server_configuration: &crate::config::ServerConfiguration,
    ) -> Self {
        let processor = processor::ConnectionProcessor::new(router, server_configuration);

        let socket_server: Box<dyn SocketServer> = match server_configuration.server_type() {
            ServerType::TCP => Box::new(tcp::TcpServer::new(server_configuration, processor)),
            ServerType::UNIX => Box::new(unix::UnixServer::new(server_configuration, processor)),
        };

        Self { socket_server }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        self.socket_server.run().await
    }
}
