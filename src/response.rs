//! Collects what a handler writes and turns it into an outbound event.

use std::io;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use http::header::{CONTENT_ENCODING, CONTENT_TYPE, SET_COOKIE};
use http::{HeaderMap, HeaderValue, StatusCode};
use tracing::debug;

use crate::error::GatewayError;
use crate::event::OutboundEvent;

pub const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf8";

/// The sink a handler writes its response into.
///
/// Bytes go through [`io::Write`], so `write!`/`writeln!` work directly.
pub trait ResponseWriter: io::Write {
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Sets the status code. Only the first call counts, and only before
    /// any body bytes have been written.
    fn write_header(&mut self, status: StatusCode);
}

/// When the outbound body is base64-encoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BinaryPolicy {
    /// Encode when the content type is not textual, a content encoding is
    /// set, the bytes are not UTF-8, or the inbound body was base64.
    #[default]
    Detect,
    /// Encode every non-empty body.
    Always,
}

impl FromStr for BinaryPolicy {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "detect" => Ok(BinaryPolicy::Detect),
            "always" => Ok(BinaryPolicy::Always),
            other => Err(GatewayError::Config(format!(
                "unknown binary policy {other:?}, expected \"detect\" or \"always\""
            ))),
        }
    }
}

/// In-memory [`ResponseWriter`] created fresh for every invocation.
#[derive(Debug, Default)]
pub struct ResponseCollector {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
    body_started: bool,
}

impl ResponseCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Serializes the collected response as a Function URL response event.
    ///
    /// `request_was_base64` is the inbound event's base64 flag.
    pub fn finish(self, policy: BinaryPolicy, request_was_base64: bool) -> OutboundEvent {
        let is_base64_encoded = !self.body.is_empty()
            && match policy {
                BinaryPolicy::Always => true,
                BinaryPolicy::Detect => {
                    request_was_base64
                        || is_binary(&self.headers)
                        || std::str::from_utf8(&self.body).is_err()
                }
            };

        let body = if is_base64_encoded {
            STANDARD.encode(&self.body)
        } else {
            // is_base64_encoded is false only when the bytes are valid UTF-8
            // or the body is empty.
            String::from_utf8_lossy(&self.body).into_owned()
        };

        let mut cookies = Vec::new();
        let mut headers = std::collections::BTreeMap::new();
        for name in self.headers.keys() {
            let values = self.headers.get_all(name).iter().map(header_str);
            if name == SET_COOKIE {
                cookies.extend(values);
            } else {
                headers.insert(name.as_str().to_string(), values.collect::<Vec<_>>().join(", "));
            }
        }

        OutboundEvent {
            status_code: self.status().as_u16(),
            headers,
            body,
            is_base64_encoded,
            cookies,
        }
    }

    /// Converts the collected response into an `http::Response` for server mode.
    pub fn into_response(self) -> http::Response<Bytes> {
        let status = self.status();
        let mut res = http::Response::new(Bytes::from(self.body));
        *res.status_mut() = status;
        *res.headers_mut() = self.headers;
        res
    }
}

impl ResponseWriter for ResponseCollector {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if let Some(committed) = self.status {
            debug!(%status, %committed, "status already written, ignoring");
            return;
        }
        if self.body_started {
            debug!(%status, "status written after body, ignoring");
            return;
        }
        self.status = Some(status);
    }
}

impl io::Write for ResponseCollector {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.body_started {
            self.body_started = true;
            if !self.headers.contains_key(CONTENT_TYPE) {
                self.headers
                    .insert(CONTENT_TYPE, HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
            }
        }
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn header_str(value: &HeaderValue) -> String {
    String::from_utf8_lossy(value.as_bytes()).into_owned()
}

fn is_binary(headers: &HeaderMap) -> bool {
    let encoded = headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| !v.trim().is_empty() && !v.trim().eq_ignore_ascii_case("identity"))
        .unwrap_or(false);
    let text = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(is_text_mime)
        .unwrap_or(false);
    encoded || !text
}

fn is_text_mime(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("text/")
        || mime.ends_with("+json")
        || mime.ends_with("+xml")
        || matches!(
            mime.as_str(),
            "application/json" | "application/xml" | "application/javascript" | "image/svg+xml"
        )
}
