use axum::body::{Body, HttpBody};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::attachments::MAX_ATTACHMENT_BYTES;
use crate::err::Error;

/// Multipart requests: one attachment plus its form fields.
pub const MAX_REQUEST_BYTES: u64 = MAX_ATTACHMENT_BYTES as u64 + 64 * 1024;
/// Every other request body.
pub const MAX_JSON_BYTES: u64 = 64 * 1024;
/// A single text field of a multipart form.
pub const MAX_TEXT_FIELD_BYTES: usize = 4 * 1024;

fn limit_for(req: &Request<Body>) -> u64 {
    let multipart = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("multipart/form-data"))
        .unwrap_or(false);
    if multipart {
        MAX_REQUEST_BYTES
    } else {
        MAX_JSON_BYTES
    }
}

/// Refuses bodies over the limit with 413, whether or not the client sent
/// `Content-Length`. Bodies are buffered before they reach the handlers.
pub async fn limit_body(req: Request<Body>, next: Next<Body>) -> Result<Response, Error> {
    let limit = limit_for(&req);
    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    if declared.map(|length| length > limit).unwrap_or(false) {
        return Err(Error::payload_too_large());
    }

    let (parts, mut body) = req.into_parts();
    let mut buffered = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(|err| Error::validation(vec![format!("body: {}", err)]))?;
        if (buffered.len() + chunk.len()) as u64 > limit {
            log::debug!("Refusing {} {}: body over {} bytes", parts.method, parts.uri, limit);
            return Err(Error::payload_too_large());
        }
        buffered.extend_from_slice(&chunk);
    }
    Ok(next.run(Request::from_parts(parts, Body::from(buffered))).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_type(content_type: &str) -> Request<Body> {
        Request::builder()
            .header(CONTENT_TYPE, content_type)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn multipart_gets_room_for_an_attachment() {
        let req = with_type("multipart/form-data; boundary=X");
        assert_eq!(limit_for(&req), MAX_REQUEST_BYTES);
        assert!(limit_for(&req) > MAX_ATTACHMENT_BYTES as u64);
    }

    #[test]
    fn other_bodies_get_the_json_limit() {
        assert_eq!(limit_for(&with_type("application/json")), MAX_JSON_BYTES);
        let bare = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(limit_for(&bare), MAX_JSON_BYTES);
    }
}
