use chrono::prelude::Local;

use http::{header, HeaderValue, StatusCode};

use serde::Serialize;

use crate::response::HttpResponse;

pub fn current_time_string() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.9f %z").to_string()
}

pub fn build_status_code_response(status_code: StatusCode) -> HttpResponse {
    let mut response = HttpResponse::new(None);
    *response.status_mut() = status_code;
    response
}

pub fn build_text_response(status_code: StatusCode, text: impl Into<String>) -> HttpResponse {
    let mut response = HttpResponse::new(Some(text.into()));
    *response.status_mut() = status_code;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

pub fn build_json_response(response_dto: impl Serialize) -> anyhow::Result<HttpResponse> {
    let json_string = serde_json::to_string(&response_dto)?;

    let mut response = HttpResponse::new(Some(json_string));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    Ok(response)
}
