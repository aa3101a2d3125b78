//! Run ordinary synchronous HTTP handlers behind AWS Lambda Function URLs.
//!
//! A [`Gateway`] decodes a Function URL event into an [`http::Request`], hands
//! it to a [`Handler`] together with a [`ResponseCollector`], and encodes what
//! the handler wrote as the response event. Outside Lambda,
//! [`listen_and_serve`] serves the same handler from a local HTTP server.
//!
//! ```no_run
//! use lambda_gateway::{listen_and_serve, GatewayConfig, Request, ResponseWriter};
//!
//! fn hello(w: &mut dyn ResponseWriter, _r: &Request) {
//!     let _ = writeln!(w, "Hello World from Rust");
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), lambda_runtime::Error> {
//!     listen_and_serve(GatewayConfig::from_env()?, hello).await
//! }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod gateway;
pub mod request;
pub mod response;
pub mod server;

pub use config::GatewayConfig;
pub use context::{InvocationContext, TRACE_ID_KEY};
pub use error::{ErrorKind, GatewayError, Result};
pub use event::{InboundEvent, OutboundEvent};
pub use gateway::{listen_and_serve, run_lambda, Gateway, Handler};
pub use request::{new_request, Request, RequestExt};
pub use response::{BinaryPolicy, ResponseCollector, ResponseWriter};
pub use server::Server;
