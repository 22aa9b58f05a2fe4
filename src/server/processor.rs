use std::{io::Read, sync::Arc};

use log::{debug, warn};

use tokio::io::{AsyncRead, AsyncWrite};

use tokio_fastcgi::{Request, Requests};

use crate::{
    handlers::{build_status_code_response, process::ProcessLimitError},
    request::HttpRequest,
    response::{HttpResponse, ResponseWriter},
    router::{Method, RouteError, Router},
};

fn status_for_handler_error(err: &anyhow::Error) -> http::StatusCode {
    match err.downcast_ref::<ProcessLimitError>() {
        Some(ProcessLimitError::AcquireTimeout(_)) => http::StatusCode::SERVICE_UNAVAILABLE,
        _ => http::StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// HEAD is routed like GET but answered without a body.
fn strip_head_body(request_method: &str, mut response: HttpResponse) -> HttpResponse {
    if request_method.eq_ignore_ascii_case("HEAD") {
        *response.body_mut() = None;
    }
    response
}

pub struct ConnectionProcessor {
    router: Arc<Router>,
    max_concurrent_connections: u8,
    max_requests_per_connection: u8,
}

impl ConnectionProcessor {
    pub fn new(
        router: Arc<Router>,
        server_configuration: &crate::config::ServerConfiguration,
    ) -> Arc<Self> {
        Arc::new(Self {
            router,
            max_concurrent_connections: *server_configuration.max_concurrent_connections(),
            max_requests_per_connection: *server_configuration.max_requests_per_connection(),
        })
    }

    async fn route<W: AsyncWrite + Unpin>(&self, request: &Request<W>) -> HttpResponse {
        let mut body = Vec::new();
        let read_result = request.get_stdin().read_to_end(&mut body);
        if let Err(err) = read_result {
            warn!("error reading request body: {}", err);
            return build_status_code_response(http::StatusCode::BAD_REQUEST);
        }

        let http_request = HttpRequest::from_fastcgi(request, &body);

        let method = match Method::from_request_method(http_request.request_method()) {
            Some(method) => method,
            None => return build_status_code_response(http::StatusCode::METHOD_NOT_ALLOWED),
        };

        let live_call = match self.router.dispatch(method, http_request.path()) {
            Ok(live_call) => live_call,
            Err(RouteError::NotFound) => {
                debug!("no {} handler for '{}'", method, http_request.path());
                return build_status_code_response(http::StatusCode::NOT_FOUND);
            }
            Err(err) => {
                warn!("dispatch error for '{}': {}", http_request.path(), err);
                return build_status_code_response(http::StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        let description = live_call.describe();

        let response = match live_call.call(&http_request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    "{} '{}' handler {} failed: {:#}",
                    method,
                    http_request.request_uri(),
                    description,
                    err
                );
                build_status_code_response(status_for_handler_error(&err))
            }
        };

        strip_head_body(http_request.request_method(), response)
    }

    async fn process_one_request<W>(self: Arc<Self>, request: Request<W>)
    where
        W: AsyncWrite + Unpin + Send + Sync + 'static,
    {
        if let Err(err) = request
            .process(|request| async move {
                let response = self.route(request.as_ref()).await;

                ResponseWriter::new(request, response).respond().await
            })
            .await
        {
            warn!("request.process failed: err = {}", err);
        }
    }

    pub fn start<R, W>(self: Arc<Self>, split_socket: (R, W))
    where
        R: AsyncRead + Unpin + Send + Sync + 'static,
        W: AsyncWrite + Unpin + Send + Sync + 'static,
    {
        tokio::spawn(async move {
            let mut requests = Requests::from_split_socket(
                split_socket,
                self.max_concurrent_connections,
                self.max_requests_per_connection,
            );

            // one task per request so slow handlers do not stall the connection
            while let Ok(Some(request)) = requests.next().await {
                tokio::spawn(Arc::clone(&self).process_one_request(request));
            }
        });
    }
}
