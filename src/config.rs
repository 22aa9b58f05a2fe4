use std::time::Duration;

use anyhow::Context;

use getset::Getters;

use log::info;

use serde::{Deserialize, Serialize};

use tokio::{fs::File, io::AsyncReadExt};

use crate::router::{DrainPolicy, Method};

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub enum ServerType {
    TCP,
    UNIX,
}

#[derive(Debug, Clone, Deserialize, Serialize, Getters)]
#[getset(get = "pub")]
pub struct ServerConfiguration {
    server_type: ServerType,
    bind_address: String,
    max_concurrent_connections: u8,
    max_requests_per_connection: u8,
}

#[derive(Debug, Clone, Deserialize, Serialize, Getters)]
#[getset(get = "pub")]
pub struct ProcessConfiguration {
    max_concurrent_processes: usize,
    #[serde(with = "humantime_serde")]
    semaphore_acquire_timeout: Duration,
    #[serde(with = "humantime_serde")]
    process_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize, Serialize, Getters)]
#[getset(get = "pub")]
pub struct RouterConfiguration {
    #[serde(default)]
    drain_policy: DrainPolicy,
    process_configuration: ProcessConfiguration,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HandlerDefinition {
    Process {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
    Plugin {
        path: String,
    },
}

impl HandlerDefinition {
    /// Matches `RequestHandler::describe` of the handler built from this
    /// definition.
    pub fn description(&self) -> String {
        match self {
            Self::Process { command, args } if args.is_empty() => format!("process:{}", command),
            Self::Process { command, args } => format!("process:{} {}", command, args.join(" ")),
            Self::Plugin { path } => format!("plugin:{}", path),
        }
    }
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize, Getters)]
#[getset(get = "pub")]
pub struct HandlerConfiguration {
    method: Method,
    pattern: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
    handler: HandlerDefinition,
}

impl HandlerConfiguration {
    pub fn new(
        method: Method,
        pattern: impl Into<String>,
        enabled: bool,
        handler: HandlerDefinition,
    ) -> Self {
        Self {
            method,
            pattern: pattern.into(),
            enabled,
            handler,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Getters)]
#[getset(get = "pub")]
pub struct Configuration {
    server_configuration: ServerConfiguration,
    router_configuration: RouterConfiguration,
    #[serde(default)]
    handlers: Vec<HandlerConfiguration>,
}

pub async fn read_configuration(config_file: &str) -> anyhow::Result<Configuration> {
    info!("reading {}", config_file);

    let mut file = File::open(config_file)
        .await
        .with_context(|| format!("error opening config file '{}'", config_file))?;

    let mut file_contents = Vec::new();

    file.read_to_end(&mut file_contents)
        .await
        .with_context(|| format!("error reading config file '{}'", config_file))?;

    let configuration: Configuration = ::serde_json::from_slice(&file_contents)
        .with_context(|| format!("error unmarshalling config file '{}'", config_file))?;

    info!("configuration\n{:#?}", configuration);

    Ok(configuration)
}
