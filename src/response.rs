use std::{fmt::Write, sync::Arc};

use log::{debug, warn};

use tokio::io::AsyncWrite;

use tokio_fastcgi::{Request, RequestResult};

pub type HttpResponse = http::Response<Option<String>>;

#[derive(thiserror::Error, Debug)]
enum SendResponseError {
    #[error("build header string error: {0}")]
    BuildHeaderStringError(#[from] std::fmt::Error),

    #[error("tokio_fastcgi write error: {0}")]
    TokioFastCGIWriteError(#[from] tokio_fastcgi::Error),
}

/// CGI response head: the `Status:` line, header lines, and a blank line.
pub fn render_head(response: &HttpResponse) -> Result<String, std::fmt::Error> {
    let mut head = String::new();

    writeln!(
        head,
        "Status: {} {}",
        response.status().as_u16(),
        response.status().canonical_reason().unwrap_or("[Unknown]")
    )?;

    for (key, value) in response.headers() {
        writeln!(
            head,
            "{}: {}",
            key.as_str(),
            value.to_str().unwrap_or("[Unknown]")
        )?;
    }

    head.push('\n');

    Ok(head)
}

/// Writes a routed response back to the FastCGI peer.
pub struct ResponseWriter<W>
where
    W: AsyncWrite + Unpin,
{
    request: Arc<Request<W>>,
    response: HttpResponse,
}

impl<W> ResponseWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(request: Arc<Request<W>>, response: HttpResponse) -> Self {
        Self { request, response }
    }

    async fn write_response(self) -> Result<(), SendResponseError> {
        let head = render_head(&self.response)?;

        let mut stdout = self.request.get_stdout();

        stdout.write(head.as_bytes()).await?;

        if let Some(body) = self.response.into_body() {
            stdout.write(body.as_bytes()).await?;
        }

        Ok(())
    }

    pub async fn respond(self) -> RequestResult {
        debug!("respond status = {}", self.response.status());

        match self.write_response().await {
            Ok(_) => RequestResult::Complete(0),
            Err(err) => {
                warn!("send response failed: {}", err);
                RequestResult::Complete(1)
            }
        }
    }
}
