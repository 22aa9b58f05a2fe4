use getset::{CopyGetters, Getters};

use tokio::io::AsyncWrite;

pub type ParamKeyValue<'a> = (&'a str, &'a str);

/// An already-parsed request as seen by handlers.
#[derive(Debug, Getters, CopyGetters)]
pub struct HttpRequest<'a> {
    #[getset(get_copy = "pub")]
    role: &'a str,
    #[getset(get_copy = "pub")]
    request_id: u16,
    #[getset(get_copy = "pub")]
    request_method: &'a str,
    #[getset(get_copy = "pub")]
    request_uri: &'a str,
    #[getset(get = "pub")]
    params: Vec<ParamKeyValue<'a>>,
    #[getset(get_copy = "pub")]
    body: &'a [u8],
}

impl<'a> HttpRequest<'a> {
    pub fn new(request_method: &'a str, request_uri: &'a str) -> Self {
        Self {
            role: "Responder",
            request_id: 0,
            request_method,
            request_uri,
            params: Vec::new(),
            body: &[],
        }
    }

    pub fn with_body(mut self, body: &'a [u8]) -> Self {
        self.body = body;
        self
    }

    pub fn with_params(mut self, params: Vec<ParamKeyValue<'a>>) -> Self {
        self.params = params;
        self
    }

    /// Build from a FastCGI request whose stdin has been read into `body`.
    pub fn from_fastcgi<W: AsyncWrite + Unpin>(
        request: &'a tokio_fastcgi::Request<W>,
        body: &'a [u8],
    ) -> Self {
        let role = match request.role {
            tokio_fastcgi::Role::Authorizer => "Authorizer",
            tokio_fastcgi::Role::Filter => "Filter",
            tokio_fastcgi::Role::Responder => "Responder",
        };

        let params: Vec<ParamKeyValue> = match request.str_params_iter() {
            Some(iter) => iter
                .filter(|v| v.0 != "request_uri" && v.0 != "request_method")
                .map(|v| (v.0, v.1.unwrap_or("[Invalid UTF8]")))
                .collect(),
            None => Vec::new(),
        };

        Self {
            role,
            request_id: request.get_request_id(),
            request_method: request.get_str_param("request_method").unwrap_or("GET"),
            request_uri: request.get_str_param("request_uri").unwrap_or(""),
            params,
            body,
        }
    }

    /// Request URI without its query string.
    pub fn path(&self) -> &'a str {
        match self.request_uri.split_once('?') {
            Some((path, _)) => path,
            None => self.request_uri,
        }
    }

    pub fn query_string(&self) -> &'a str {
        match self.request_uri.split_once('?') {
            Some((_, query)) => query,
            None => "",
        }
    }

    pub fn param(&self, key: &str) -> Option<&'a str> {
        self.params
            .iter()
            .find(|(param_key, _)| *param_key == key)
            .map(|(_, value)| *value)
    }
}
