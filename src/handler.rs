use lambda_gateway::{Request, RequestExt, ResponseWriter};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use serde::Serialize;

#[derive(Serialize)]
pub struct EchoResponse<'a> {
    method: &'a str, path: &'a str, query: Vec<(String, String)>,
    host: Option<&'a str>, remote_addr: &'a str,
    body: String,
    request_id: Option<&'a str>,  // Only set when invoked through Lambda
}

// Plain-text greeting; exercises the default status and content type
pub fn hello(w: &mut dyn ResponseWriter, _r: &Request) {
    let _ = writeln!(w, "Hello World from Rust");
}

// Reflects the request back as JSON
pub fn echo(w: &mut dyn ResponseWriter, r: &Request) {
    let response = EchoResponse {
        method: r.method().as_str(),
        path: r.uri().path(),
        query: r.query_pairs(),
        host: r.host(),
        remote_addr: r.remote_addr(),
        body: String::from_utf8_lossy(r.body()).into_owned(),
        request_id: r.inbound_event().map(|e| e.request_context.request_id.as_str()),
    };

    match serde_json::to_vec(&response) {
        Ok(json) => {
            w.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            let _ = w.write_all(&json);
        }
        Err(e) => {
            w.write_header(StatusCode::INTERNAL_SERVER_ERROR);
            let _ = writeln!(w, "encoding echo response: {e}");
        }
    }
}

// Demo entry point - routes on path only
pub fn router(w: &mut dyn ResponseWriter, r: &Request) {
    match r.uri().path() {
        "/" => hello(w, r),
        "/echo" => echo(w, r),
        _ => {
            w.write_header(StatusCode::NOT_FOUND);
            let _ = writeln!(w, "not found");
        }
    }
}
