use async_trait::async_trait;

use crate::handlers::{
    utils::build_text_response,
    {HttpRequest, HttpResponse, RequestHandler},
};

/// Built-in handler for the root path.
#[derive(Default)]
pub struct DefaultHandler {}

impl DefaultHandler {
    pub fn new() -> Self {
        Self {}
    }
}

#[async_trait]
impl RequestHandler for DefaultHandler {
    async fn call(&self, _request: &HttpRequest<'_>) -> anyhow::Result<HttpResponse> {
        Ok(build_text_response(
            http::StatusCode::OK,
            concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"), "\n"),
        ))
    }

    fn describe(&self) -> String {
        "builtin:default".to_string()
    }
}
