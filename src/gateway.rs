//! Invocation adapter: event bytes in, event bytes out.

use std::sync::Arc;

use lambda_runtime::{service_fn, LambdaEvent};
use tokio::sync::watch;
use tracing::{info, info_span, warn};

use crate::config::GatewayConfig;
use crate::context::InvocationContext;
use crate::error::{GatewayError, Result};
use crate::event::{InboundEvent, OutboundEvent};
use crate::request::{new_request, Request};
use crate::response::{BinaryPolicy, ResponseCollector, ResponseWriter};
use crate::server::Server;

/// Application request-processing logic.
///
/// Implemented for any `Fn(&mut dyn ResponseWriter, &Request)`, so plain
/// functions can be passed directly.
pub trait Handler: Send + Sync + 'static {
    fn serve(&self, w: &mut dyn ResponseWriter, req: &Request);
}

impl<F> Handler for F
where
    F: Fn(&mut dyn ResponseWriter, &Request) + Send + Sync + 'static,
{
    fn serve(&self, w: &mut dyn ResponseWriter, req: &Request) {
        self(w, req)
    }
}

/// Wraps a [`Handler`] so it can answer Function URL invocations.
pub struct Gateway<H> {
    handler: Arc<H>,
    policy: BinaryPolicy,
}

impl<H> Clone for Gateway<H> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            policy: self.policy,
        }
    }
}

impl<H: Handler> Gateway<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            policy: BinaryPolicy::default(),
        }
    }

    pub fn with_binary_policy(mut self, policy: BinaryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn binary_policy(&self) -> BinaryPolicy {
        self.policy
    }

    pub(crate) fn handler(&self) -> Arc<H> {
        self.handler.clone()
    }

    /// Decodes `payload`, runs the handler and encodes its response.
    pub fn invoke(&self, ctx: &InvocationContext, payload: &[u8]) -> Result<Vec<u8>> {
        let event: InboundEvent =
            serde_json::from_slice(payload).map_err(GatewayError::MalformedEvent)?;
        let out = self.invoke_event(ctx, event)?;
        serde_json::to_vec(&out).map_err(GatewayError::Encode)
    }

    /// Runs the handler for an already decoded event.
    ///
    /// The handler is not called if the request cannot be built.
    pub fn invoke_event(&self, ctx: &InvocationContext, event: InboundEvent) -> Result<OutboundEvent> {
        let request_was_base64 = event.is_base64_encoded;
        let span = info_span!(
            "invoke",
            request_id = %event.request_context.request_id,
            method = %event.request_context.http.method,
            path = %event.raw_path,
        );
        let _enter = span.enter();

        let req = new_request(ctx, event)?;
        let mut w = ResponseCollector::new();
        self.handler.serve(&mut w, &req);

        let out = w.finish(self.policy, request_was_base64);
        info!(
            status = out.status_code,
            base64 = out.is_base64_encoded,
            "invocation complete"
        );
        Ok(out)
    }
}

/// Runs the Lambda runtime loop, answering each Function URL event with `gateway`.
pub async fn run_lambda<H: Handler>(gateway: Gateway<H>) -> std::result::Result<(), lambda_runtime::Error> {
    lambda_runtime::run(service_fn(move |event: LambdaEvent<InboundEvent>| {
        let gateway = gateway.clone();
        async move {
            let ctx = InvocationContext::from(&event.context);
            let out = tokio::task::spawn_blocking(move || gateway.invoke_event(&ctx, event.payload))
                .await??;
            Ok::<_, lambda_runtime::Error>(out)
        }
    }))
    .await
}

/// Serves `handler` through Lambda when running inside Lambda, and through a
/// local HTTP server on `config.addr` otherwise. The local server stops on ctrl-c.
pub async fn listen_and_serve<H: Handler>(
    config: GatewayConfig,
    handler: H,
) -> std::result::Result<(), lambda_runtime::Error> {
    let gateway = Gateway::new(handler).with_binary_policy(config.binary_policy);

    if config.lambda {
        info!("starting lambda runtime loop");
        return run_lambda(gateway).await;
    }

    let server = Server::bind(config.addr, config.workers).await?;
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "listening for ctrl-c");
        }
        let _ = tx.send(true);
    });
    server.serve(gateway.handler(), rx).await?;
    Ok(())
}
