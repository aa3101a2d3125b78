//! Builds an HTTP request from an inbound Function URL event.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, COOKIE, HOST};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use tracing::{debug, warn};
use url::{form_urlencoded, Position, Url};

use crate::context::{InvocationContext, EVENT_KEY};
use crate::error::{GatewayError, Result};
use crate::event::InboundEvent;

/// The request handed to handlers. The body is fully buffered and cheap to clone.
pub type Request = http::Request<Bytes>;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const TRACE_ID_HEADER: &str = "x-amzn-trace-id";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Connection-level fields a server would normally fill in from the socket.
#[derive(Debug, Clone, Default)]
pub(crate) struct RequestInfo {
    pub(crate) remote_addr: String,
    pub(crate) request_uri: String,
    pub(crate) host: Option<String>,
}

/// Returns a new request from the given event.
///
/// The returned request's context is `ctx` with the event attached under
/// [`EVENT_KEY`](crate::context::EVENT_KEY).
pub fn new_request(ctx: &InvocationContext, event: InboundEvent) -> Result<Request> {
    let http_ctx = &event.request_context.http;

    let uri = request_target(&event.raw_path, &event.raw_query_string)?;

    let body = if event.is_base64_encoded {
        Bytes::from(STANDARD.decode(event.body.as_bytes())?)
    } else {
        Bytes::from(event.body.clone())
    };

    let method = if http_ctx.method.is_empty() {
        Method::GET
    } else {
        Method::from_bytes(http_ctx.method.as_bytes())
            .map_err(|_| GatewayError::InvalidMethod(http_ctx.method.clone()))?
    };

    let request_uri = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| String::from("/"));

    let mut req = http::Request::builder()
        .method(method)
        .uri(uri)
        .body(body)?;

    apply_headers(req.headers_mut(), &event);

    let body_len = req.body().len();
    if !req.headers().contains_key(CONTENT_LENGTH) && body_len > 0 {
        req.headers_mut()
            .insert(CONTENT_LENGTH, HeaderValue::from(body_len));
    }

    set_header(
        req.headers_mut(),
        REQUEST_ID_HEADER,
        &event.request_context.request_id,
    );

    if let Some(trace_id) = ctx.trace_id() {
        set_header(req.headers_mut(), TRACE_ID_HEADER, trace_id);
    }

    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if let Some(host) = host.as_deref() {
        match with_authority(req.uri(), req.headers(), host) {
            Ok(uri) => *req.uri_mut() = uri,
            Err(e) => warn!(%host, error = %e, "host header is not a valid authority"),
        }
    }

    debug!(
        request_id = %event.request_context.request_id,
        method = %req.method(),
        uri = %request_uri,
        "built request from event"
    );

    let info = RequestInfo {
        remote_addr: http_ctx.source_ip.clone(),
        request_uri,
        host,
    };
    req.extensions_mut().insert(info);
    req.extensions_mut().insert(ctx.with_value(EVENT_KEY, event));

    Ok(req)
}

/// Joins path and query into an origin-form URI.
///
/// Bytes outside the URI character set are percent-encoded rather than
/// rejected; control characters and broken escapes in the path are errors.
fn request_target(raw_path: &str, raw_query: &str) -> Result<Uri> {
    let mut path = String::with_capacity(raw_path.len() + 1);
    if !raw_path.starts_with('/') {
        path.push('/');
    }
    path.push_str(raw_path);

    if let Some(reason) = malformed(&path, raw_query) {
        let mut input = path;
        if !raw_query.is_empty() {
            input.push('?');
            input.push_str(raw_query);
        }
        return Err(GatewayError::MalformedTarget { input, reason });
    }

    // Non-special scheme: backslashes stay literal
    let mut url = Url::parse("gateway://localhost/")?;
    url.set_path(&path);
    url.set_query(Some(raw_query).filter(|q| !q.is_empty()));

    let target = &url[Position::BeforePath..];
    target.parse().map_err(|source| GatewayError::InvalidUrl {
        input: target.to_string(),
        source,
    })
}

fn malformed(path: &str, query: &str) -> Option<&'static str> {
    if path.bytes().chain(query.bytes()).any(|b| b.is_ascii_control()) {
        return Some("control character in url");
    }
    for (i, _) in path.match_indices('%') {
        let escape = path.as_bytes().get(i + 1..i + 3);
        if !matches!(escape, Some([a, b]) if a.is_ascii_hexdigit() && b.is_ascii_hexdigit()) {
            return Some("invalid percent escape in path");
        }
    }
    None
}

// Scheme follows X-Forwarded-Proto; Function URLs are https otherwise
fn with_authority(uri: &Uri, headers: &HeaderMap, host: &str) -> std::result::Result<Uri, http::Error> {
    let scheme = match headers.get(X_FORWARDED_PROTO).and_then(|v| v.to_str().ok()) {
        Some(proto) if proto.eq_ignore_ascii_case("http") => "http",
        _ => "https",
    };
    Uri::builder()
        .scheme(scheme)
        .authority(host)
        .path_and_query(uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/"))
        .build()
}

/// Copies the event's headers and cookies into `headers`, replacing existing
/// values. Applying the same event twice leaves the same header set.
pub(crate) fn apply_headers(headers: &mut HeaderMap, event: &InboundEvent) {
    for (name, value) in &event.headers {
        set_header(headers, name, value);
    }
    if !event.cookies.is_empty() && !headers.contains_key(COOKIE) {
        set_header(headers, COOKIE.as_str(), &event.cookies.join("; "));
    }
}

fn set_header(headers: &mut HeaderMap, name: &str, value: &str) {
    match (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        (Ok(name), Ok(value)) => {
            headers.insert(name, value);
        }
        _ => warn!(header = %name, "dropping header that is not valid HTTP"),
    }
}

/// Accessors for the fields a request built by this crate carries.
pub trait RequestExt {
    /// Decoded query pairs in appearance order.
    fn query_pairs(&self) -> Vec<(String, String)>;

    /// Every value given for `key`, in appearance order.
    fn query_values(&self, key: &str) -> Vec<String>;

    fn query_first(&self, key: &str) -> Option<String>;

    /// Source IP of the caller (or peer address in server mode).
    fn remote_addr(&self) -> &str;

    /// Path and query as they appeared on the request line.
    fn request_uri(&self) -> &str;

    /// Value of the `Host` header, if one was sent.
    fn host(&self) -> Option<&str>;

    fn invocation_context(&self) -> Option<&InvocationContext>;

    /// The raw event the request was built from.
    fn inbound_event(&self) -> Option<&InboundEvent>;
}

impl RequestExt for Request {
    fn query_pairs(&self) -> Vec<(String, String)> {
        self.uri()
            .query()
            .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default()
    }

    fn query_values(&self, key: &str) -> Vec<String> {
        self.query_pairs()
            .into_iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v)
            .collect()
    }

    fn query_first(&self, key: &str) -> Option<String> {
        self.query_values(key).into_iter().next()
    }

    fn remote_addr(&self) -> &str {
        self.extensions()
            .get::<RequestInfo>()
            .map(|i| i.remote_addr.as_str())
            .unwrap_or_default()
    }

    fn request_uri(&self) -> &str {
        self.extensions()
            .get::<RequestInfo>()
            .map(|i| i.request_uri.as_str())
            .unwrap_or("/")
    }

    fn host(&self) -> Option<&str> {
        self.extensions()
            .get::<RequestInfo>()
            .and_then(|i| i.host.as_deref())
    }

    fn invocation_context(&self) -> Option<&InvocationContext> {
        self.extensions().get::<InvocationContext>()
    }

    fn inbound_event(&self) -> Option<&InboundEvent> {
        self.invocation_context()
            .and_then(|ctx| ctx.value::<InboundEvent>(EVENT_KEY))
    }
}
