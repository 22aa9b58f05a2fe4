use std::sync::{Arc, Weak};

use anyhow::Context;

use async_trait::async_trait;

use serde::Serialize;

use crate::{
    handlers::{
        utils::{build_json_response, current_time_string},
        {HttpRequest, HttpResponse, RequestHandler},
    },
    router::{HandlerStatus, Mutability, RouteError, Router},
};

pub const STATUS_PATTERN: &str = "/internal/status";

#[derive(Debug, Serialize)]
struct StatusResponse {
    now: String,
    handlers: Vec<HandlerStatus>,
}

/// Reports the state of every routed handler as JSON.
pub struct StatusHandler {
    router: Weak<Router>,
}

impl StatusHandler {
    pub fn register(router: &Arc<Router>) -> Result<(), RouteError> {
        router.register_get(
            STATUS_PATTERN,
            Arc::new(Self {
                router: Arc::downgrade(router),
            }),
            Mutability::Immutable,
        )
    }
}

#[async_trait]
impl RequestHandler for StatusHandler {
    async fn call(&self, _request: &HttpRequest<'_>) -> anyhow::Result<HttpResponse> {
        let router = self.router.upgrade().context("router has been dropped")?;

        build_json_response(StatusResponse {
            now: current_time_string(),
            handlers: router.snapshot(),
        })
    }

    fn describe(&self) -> String {
        "builtin:status".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::router::{DrainPolicy, Method};

    #[tokio::test]
    async fn test_status_lists_handlers() {
        let router = Arc::new(Router::new(DrainPolicy::default()).unwrap());
        StatusHandler::register(&router).unwrap();

        let request = HttpRequest::new("GET", STATUS_PATTERN);
        let response = router
            .dispatch(Method::Get, request.path())
            .unwrap()
            .call(&request)
            .await
            .unwrap();

        let json: serde_json::Value =
            serde_json::from_str(response.body().as_deref().unwrap()).unwrap();
        let handlers = json["handlers"].as_array().unwrap();

        assert_eq!(handlers.len(), 2);
        assert_eq!(handlers[1]["pattern"], STATUS_PATTERN);
        assert_eq!(handlers[1]["mutability"], "Immutable");
        assert_eq!(handlers[1]["live_calls"], 1);
    }
}
