use std::sync::{Arc, Mutex};

use lambda_gateway::{
    Gateway, InvocationContext, OutboundEvent, Request, RequestExt, ResponseWriter, TRACE_ID_KEY,
};
use serde_json::json;

fn hello(w: &mut dyn ResponseWriter, _r: &Request) {
    let _ = writeln!(w, "Hello World from Rust");
}

fn invoke<H: lambda_gateway::Handler>(gw: &Gateway<H>, ctx: &InvocationContext, event: serde_json::Value) -> OutboundEvent {
    let payload = serde_json::to_vec(&event).unwrap();
    let out = gw.invoke(ctx, &payload).unwrap();
    serde_json::from_slice(&out).unwrap()
}

/// Records what the handler saw so the test can inspect it afterwards.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Option<Request>>>);

impl lambda_gateway::Handler for Capture {
    fn serve(&self, w: &mut dyn ResponseWriter, req: &Request) {
        *self.0.lock().unwrap() = Some(req.clone());
        let _ = w.write_all(b"ok");
    }
}

impl Capture {
    fn take(&self) -> Request {
        self.0.lock().unwrap().take().unwrap()
    }
}

#[test]
fn hello_world() {
    let gw = Gateway::new(hello);
    let res = invoke(
        &gw,
        &InvocationContext::background(),
        json!({"version": "2.0", "rawPath": "/pets/luna", "requestContext": {"http": {"method": "POST"}}}),
    );
    assert_eq!(res.body, "Hello World from Rust\n");
    assert_eq!(res.headers["content-type"], "text/plain; charset=utf8");
    assert_eq!(res.status_code, 200);
    assert!(!res.is_base64_encoded);
    assert!(res.cookies.is_empty());
}

#[test]
fn handler_sees_translated_request() {
    let capture = Capture::default();
    let gw = Gateway::new(capture.clone());
    let ctx = InvocationContext::background().with_trace_id("Root=1-abc");

    invoke(
        &gw,
        &ctx,
        json!({
            "version": "2.0",
            "rawPath": "/pets",
            "rawQueryString": "fields=name&fields=species&sort=a,b",
            "headers": { "Host": "example.com", "Content-Type": "application/json" },
            "requestContext": {
                "requestId": "1234",
                "http": { "method": "POST", "sourceIp": "1.2.3.4" }
            },
            "body": "{ \"name\": \"Tobi\" }"
        }),
    );

    let req = capture.take();
    assert_eq!(req.method(), http::Method::POST);
    assert_eq!(req.host(), Some("example.com"));
    assert_eq!(req.uri().host(), Some("example.com"));
    assert_eq!(req.request_uri(), "/pets?fields=name&fields=species&sort=a,b");
    assert_eq!(req.remote_addr(), "1.2.3.4");
    assert_eq!(req.headers()["content-length"], "18");
    assert_eq!(req.headers()["x-request-id"], "1234");
    assert_eq!(req.headers()["x-amzn-trace-id"], "Root=1-abc");
    assert_eq!(req.query_values("fields"), vec!["name", "species"]);
    assert_eq!(req.query_values("sort"), vec!["a,b"]);
    assert_eq!(req.body().as_ref(), br#"{ "name": "Tobi" }"#);

    let ctx = req.invocation_context().unwrap();
    assert_eq!(ctx.value::<String>(TRACE_ID_KEY).map(String::as_str), Some("Root=1-abc"));
    assert_eq!(req.inbound_event().unwrap().request_context.request_id, "1234");
}

#[test]
fn base64_request_round_trip() {
    let capture = Capture::default();
    let gw = Gateway::new(capture.clone());

    let res = invoke(
        &gw,
        &InvocationContext::background(),
        json!({ "rawPath": "/upload", "body": "aGVsbG8gd29ybGQK", "isBase64Encoded": true }),
    );

    assert_eq!(capture.take().body().as_ref(), b"hello world\n");
    assert!(res.is_base64_encoded);
    assert_eq!(res.body, "b2s=");
}

#[test]
fn invalid_base64_never_reaches_handler() {
    let capture = Capture::default();
    let gw = Gateway::new(capture.clone());
    let payload = serde_json::to_vec(&json!({ "rawPath": "/", "body": "!!", "isBase64Encoded": true })).unwrap();

    let err = gw.invoke(&InvocationContext::background(), &payload).unwrap_err();
    assert_eq!(err.kind(), lambda_gateway::ErrorKind::Decode);
    assert!(capture.0.lock().unwrap().is_none());
}

#[test]
fn context_values_survive_translation() {
    let capture = Capture::default();
    let gw = Gateway::new(capture.clone());
    let ctx = InvocationContext::background().with_value("key", "value");

    invoke(&gw, &ctx, json!({}));

    let req = capture.take();
    assert_eq!(req.invocation_context().and_then(|c| c.value::<&str>("key")), Some(&"value"));
}
