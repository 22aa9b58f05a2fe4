use std::sync::Arc;

use anyhow::Context;

use async_trait::async_trait;

use crate::handlers::{HttpRequest, HttpResponse, RequestHandler};

/// Handler code living in a dynamically loaded module.
pub trait PluginModule: Send + Sync {
    fn name(&self) -> &str;

    fn invoke(&self, request: &HttpRequest<'_>) -> anyhow::Result<HttpResponse>;
}

/// Loads plugin modules. Unloading happens when the last `Arc` to a module
/// is dropped, which must not be before `Router::replace` returned `Ok`.
pub trait PluginLoader: Send + Sync {
    fn load(&self, path: &str) -> anyhow::Result<Arc<dyn PluginModule>>;
}

pub struct PluginHandler {
    path: String,
    module: Arc<dyn PluginModule>,
}

impl PluginHandler {
    pub fn load(loader: &dyn PluginLoader, path: &str) -> anyhow::Result<Self> {
        let module = loader
            .load(path)
            .with_context(|| format!("error loading plugin '{}'", path))?;

        Ok(Self {
            path: path.to_string(),
            module,
        })
    }
}

#[async_trait]
impl RequestHandler for PluginHandler {
    async fn call(&self, request: &HttpRequest<'_>) -> anyhow::Result<HttpResponse> {
        self.module
            .invoke(request)
            .with_context(|| format!("plugin '{}' failed", self.module.name()))
    }

    fn describe(&self) -> String {
        format!("plugin:{}", self.path)
    }
}
