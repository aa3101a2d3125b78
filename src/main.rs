use lambda_gateway::{listen_and_serve, GatewayConfig};
use lambda_runtime::Error;
use tracing_subscriber::EnvFilter;
mod handler;
use handler::router;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // CloudWatch adds its own timestamps
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .without_time()
        .init();

    let config = GatewayConfig::from_env()?;
    listen_and_serve(config, router).await
}
