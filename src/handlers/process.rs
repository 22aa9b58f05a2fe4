use std::{process::Stdio, sync::Arc, time::Duration};

use anyhow::Context;

use async_trait::async_trait;

use http::{header::HeaderName, HeaderValue, StatusCode};

use log::debug;

use tokio::{
    io::AsyncWriteExt,
    process::Command,
    sync::{Semaphore, SemaphorePermit},
};

use crate::handlers::{HttpRequest, HttpResponse, RequestHandler};

#[derive(thiserror::Error, Debug)]
pub enum ProcessLimitError {
    #[error("timeout acquiring process permit after {0:?}")]
    AcquireTimeout(Duration),

    #[error("process semaphore closed: {0}")]
    Closed(#[from] tokio::sync::AcquireError),
}

/// Bounds how many handler processes run at once.
pub struct ProcessLimiter {
    semaphore: Semaphore,
    acquire_timeout: Duration,
}

impl ProcessLimiter {
    pub fn new(max_concurrent_processes: usize, acquire_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            semaphore: Semaphore::new(max_concurrent_processes),
            acquire_timeout,
        })
    }

    async fn acquire(&self) -> Result<SemaphorePermit<'_>, ProcessLimitError> {
        let permit = tokio::time::timeout(self.acquire_timeout, self.semaphore.acquire())
            .await
            .map_err(|_| ProcessLimitError::AcquireTimeout(self.acquire_timeout))??;

        Ok(permit)
    }
}

/// Runs an external program per request, CGI style.
///
/// The POST body goes to the child's stdin and its stdout is read back as a
/// CGI response.
pub struct ProcessHandler {
    command: String,
    args: Vec<String>,
    description: String,
    limiter: Arc<ProcessLimiter>,
    timeout: Duration,
}

impl ProcessHandler {
    pub fn new(
        command: String,
        args: Vec<String>,
        description: String,
        limiter: Arc<ProcessLimiter>,
        timeout: Duration,
    ) -> Self {
        Self {
            command,
            args,
            description,
            limiter,
            timeout,
        }
    }

    fn build_command(&self, request: &HttpRequest<'_>) -> Command {
        let mut command = Command::new(&self.command);

        command
            .args(&self.args)
            .env("GATEWAY_INTERFACE", "CGI/1.1")
            .env("REQUEST_METHOD", request.request_method())
            .env("REQUEST_URI", request.request_uri())
            .env("PATH_INFO", request.path())
            .env("QUERY_STRING", request.query_string())
            .env("CONTENT_LENGTH", request.body().len().to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        command
    }

    async fn run(&self, request: &HttpRequest<'_>) -> anyhow::Result<Vec<u8>> {
        let mut child = self
            .build_command(request)
            .spawn()
            .with_context(|| format!("error spawning '{}'", self.command))?;

        let stdin = child.stdin.take();
        let body = request.body();

        let write_body = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(body).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };

        let (write_result, output) = tokio::time::timeout(self.timeout, async move {
            tokio::join!(write_body, child.wait_with_output())
        })
        .await
        .with_context(|| format!("'{}' timed out after {:?}", self.command, self.timeout))?;

        let output = output.with_context(|| format!("error waiting for '{}'", self.command))?;

        // the child may exit without reading its stdin
        if let Err(err) = write_result {
            debug!("'{}' stdin write error: {}", self.command, err);
        }

        if !output.status.success() {
            anyhow::bail!(
                "'{}' exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl RequestHandler for ProcessHandler {
    async fn call(&self, request: &HttpRequest<'_>) -> anyhow::Result<HttpResponse> {
        let _permit = self.limiter.acquire().await?;

        let stdout = self.run(request).await?;

        parse_cgi_output(&stdout)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// Split CGI output into header lines and body.
///
/// A `Status:` header sets the response status, defaulting to 200.
pub fn parse_cgi_output(stdout: &[u8]) -> anyhow::Result<HttpResponse> {
    let output = String::from_utf8_lossy(stdout);

    // headers end at the first blank line, whichever line ending it uses
    let (head_end, body_start) = match (output.find("\n\n"), output.find("\r\n\r\n")) {
        (Some(lf), Some(crlf)) if crlf < lf => (crlf, crlf + 4),
        (Some(lf), _) => (lf, lf + 2),
        (None, Some(crlf)) => (crlf, crlf + 4),
        (None, None) => anyhow::bail!("CGI output has no header terminator"),
    };
    let (head, body) = (&output[..head_end], &output[body_start..]);

    let mut response = HttpResponse::new(Some(body.to_string()));

    for line in head.lines() {
        let (name, value) = line
            .split_once(':')
            .with_context(|| format!("malformed CGI header line '{}'", line))?;
        let value = value.trim();

        if name.eq_ignore_ascii_case("status") {
            let code = value.split_whitespace().next().unwrap_or_default();
            *response.status_mut() = StatusCode::from_bytes(code.as_bytes())
                .with_context(|| format!("invalid CGI status '{}'", value))?;
        } else {
            let name = HeaderName::from_bytes(name.trim().as_bytes())
                .with_context(|| format!("invalid CGI header name '{}'", name))?;
            let value = HeaderValue::from_str(value)
                .with_context(|| format!("invalid CGI header value '{}'", value))?;
            response.headers_mut().append(name, value);
        }
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_handler(script: &str, timeout: Duration) -> ProcessHandler {
        ProcessHandler::new(
            "/bin/sh".to_string(),
            vec!["-c".to_string(), script.to_string()],
            "process:test".to_string(),
            ProcessLimiter::new(2, Duration::from_secs(1)),
            timeout,
        )
    }

    #[test]
    fn test_parse_cgi_output() {
        let response =
            parse_cgi_output(b"Status: 201 Created\r\nContent-Type: text/plain\r\n\r\nmade it")
                .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(http::header::CONTENT_TYPE).unwrap(),
            "text/plain"
        );
        assert_eq!(response.body().as_deref(), Some("made it"));
    }

    #[test]
    fn test_parse_cgi_output_defaults_to_ok() {
        let response = parse_cgi_output(b"X-Test: 1\n\n").unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_deref(), Some(""));
    }

    #[test]
    fn test_parse_cgi_output_first_blank_line_ends_headers() {
        let response =
            parse_cgi_output(b"Content-Type: text/plain\n\nline1\r\n\r\nline2").unwrap();
        assert_eq!(response.body().as_deref(), Some("line1\r\n\r\nline2"));

        let response =
            parse_cgi_output(b"Content-Type: text/plain\r\n\r\nline1\n\nline2").unwrap();
        assert_eq!(response.body().as_deref(), Some("line1\n\nline2"));
    }

    #[test]
    fn test_parse_cgi_output_rejects_missing_terminator() {
        assert!(parse_cgi_output(b"just a body").is_err());
        assert!(parse_cgi_output(b"no colon here\n\nbody").is_err());
    }

    #[tokio::test]
    async fn test_process_echoes_body() {
        let handler = shell_handler(
            r#"printf 'Content-Type: text/plain\n\n'; printf '%s ' "$REQUEST_METHOD" "$QUERY_STRING"; cat"#,
            Duration::from_secs(5),
        );
        let request = HttpRequest::new("POST", "/echo?x=1").with_body(b"payload");

        let response = handler.call(&request).await.unwrap();

        assert_eq!(response.body().as_deref(), Some("POST x=1 payload"));
    }

    #[tokio::test]
    async fn test_process_nonzero_exit_is_failure() {
        let handler = shell_handler("exit 3", Duration::from_secs(5));

        let result = handler.call(&HttpRequest::new("GET", "/fail")).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_process_timeout_is_failure() {
        let handler = shell_handler("sleep 5", Duration::from_millis(50));

        let result = handler.call(&HttpRequest::new("GET", "/slow")).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_limiter_timeout_is_typed() {
        let limiter = ProcessLimiter::new(1, Duration::from_millis(20));
        let handler = ProcessHandler::new(
            "/bin/true".to_string(),
            Vec::new(),
            "process:/bin/true".to_string(),
            Arc::clone(&limiter),
            Duration::from_secs(5),
        );

        let held = limiter.acquire().await.unwrap();

        let err = handler
            .call(&HttpRequest::new("GET", "/busy"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProcessLimitError>(),
            Some(ProcessLimitError::AcquireTimeout(_))
        ));

        drop(held);
        assert!(limiter.acquire().await.is_ok());
    }
}
