//! Local development server.
//!
//! `Server` binds a TCP listener and serves each HTTP/1.1 request with the
//! same [`Handler`] the Lambda path uses, without any event translation.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::HOST;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

use crate::context::InvocationContext;
use crate::error::Result;
use crate::gateway::Handler;
use crate::request::{Request, RequestInfo};
use crate::response::ResponseCollector;

pub struct Server {
    listener: TcpListener,
    permits: Arc<Semaphore>,
}

impl Server {
    /// Binds `addr`; at most `workers` handlers run at once.
    pub async fn bind(addr: SocketAddr, workers: usize) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves connections until `shutdown` changes or its sender is dropped.
    pub async fn serve<H: Handler>(
        self,
        handler: Arc<H>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        info!(addr = %self.local_addr()?, "listening");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let handler = handler.clone();
                    let permits = self.permits.clone();

                    tokio::spawn(async move {
                        let svc = service_fn(move |req: hyper::Request<Incoming>| {
                            let handler = handler.clone();
                            let permits = permits.clone();
                            async move {
                                Ok::<_, Infallible>(dispatch(handler, permits, peer, req).await)
                            }
                        });

                        if let Err(e) = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), svc)
                            .await
                        {
                            debug!(%peer, error = %e, "connection closed with error");
                        }
                    });
                }
                _ = shutdown.changed() => {
                    info!("shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn dispatch<H: Handler>(
    handler: Arc<H>,
    permits: Arc<Semaphore>,
    peer: SocketAddr,
    req: hyper::Request<Incoming>,
) -> hyper::Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(%peer, error = %e, "reading request body");
            return plain(StatusCode::BAD_REQUEST, "Bad Request");
        }
    };

    let mut req = Request::from_parts(parts, body);
    let info = request_info(&req, peer);
    req.extensions_mut().insert(info);
    req.extensions_mut().insert(InvocationContext::background());

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let _permit = match permits.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return plain(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable"),
    };

    let served = tokio::task::spawn_blocking(move || {
        let mut w = ResponseCollector::new();
        handler.serve(&mut w, &req);
        w.into_response()
    })
    .await;

    match served {
        Ok(res) => {
            info!(%peer, %method, %path, status = res.status().as_u16(), "served");
            res.map(Full::new)
        }
        Err(e) => {
            error!(%peer, %method, %path, error = %e, "handler panicked");
            plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn request_info(req: &Request, peer: SocketAddr) -> RequestInfo {
    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.to_string()));

    RequestInfo {
        remote_addr: peer.to_string(),
        request_uri: req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| String::from("/")),
        host,
    }
}

fn plain(status: StatusCode, body: &'static str) -> hyper::Response<Full<Bytes>> {
    let mut res = hyper::Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *res.status_mut() = status;
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestExt;
    use crate::response::ResponseWriter;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn who(w: &mut dyn ResponseWriter, r: &Request) {
        let _ = write!(w, "{} {} {}", r.method(), r.request_uri(), r.host().unwrap_or("-"));
    }

    #[tokio::test]
    async fn serves_and_shuts_down() {
        let server = Server::bind("127.0.0.1:0".parse().unwrap(), 2).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(server.serve(Arc::new(who), rx));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /pets?a=1 HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();

        assert!(raw.starts_with("HTTP/1.1 200 OK"), "{raw}");
        assert!(raw.to_ascii_lowercase().contains("content-type: text/plain; charset=utf8"));
        assert!(raw.ends_with("GET /pets?a=1 example.com"), "{raw}");

        tx.send(true).unwrap();
        assert!(task.await.unwrap().is_ok());
    }

    #[test]
    fn request_info_falls_back_to_authority() {
        let req = http::Request::builder()
            .uri("http://example.org/x?y=1")
            .body(Bytes::new())
            .unwrap();
        let info = request_info(&req, "10.0.0.1:5555".parse().unwrap());
        assert_eq!(info.host.as_deref(), Some("example.org"));
        assert_eq!(info.request_uri, "/x?y=1");
        assert_eq!(info.remote_addr, "10.0.0.1:5555");
    }
}
