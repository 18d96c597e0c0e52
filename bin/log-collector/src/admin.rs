//! Admin HTTP endpoint: health and metrics

use crate::metrics::CollectorMetrics;
use anyhow::Result;
use http_body_util::Full;
use hyper::{
    body::Bytes,
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::http1,
    service::service_fn,
    Method, Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Serve admin requests until the listener fails
pub async fn serve(addr: SocketAddr, metrics: Arc<CollectorMetrics>) -> Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("Admin server listening on {}", addr);

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let metrics = metrics.clone();
                async move { Ok::<_, Infallible>(route(&req, &metrics)) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Error serving admin connection from {}: {}", peer_addr, e);
            }
        });
    }
}

fn route<B>(req: &Request<B>, metrics: &CollectorMetrics) -> Response<Full<Bytes>> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/healthz") => text(StatusCode::OK, "OK\n".to_string()),
        (&Method::GET, "/metrics") => match metrics.gather() {
            Ok(body) => {
                let mut response = text(StatusCode::OK, body);
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; version=0.0.4"),
                );
                response
            }
            Err(e) => {
                warn!("Failed to gather metrics: {}", e);
                text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to gather metrics\n".to_string())
            }
        },
        _ => text(StatusCode::NOT_FOUND, "Not Found\n".to_string()),
    }
}

fn text(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    fn request(method: Method, path: &str) -> Request<()> {
        Request::builder().method(method).uri(path).body(()).unwrap()
    }

    async fn body_of(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_healthz() {
        let metrics = CollectorMetrics::new().unwrap();
        let response = route(&request(Method::GET, "/healthz"), &metrics);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, "OK\n");
    }

    #[tokio::test]
    async fn test_metrics() {
        let metrics = CollectorMetrics::new().unwrap();
        metrics.installs_total.inc();

        let response = route(&request(Method::GET, "/metrics"), &metrics);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain; version=0.0.4"
        );
        assert!(body_of(response).await.contains("serve_db_installs_total 1"));
    }

    #[test]
    fn test_unknown_route() {
        let metrics = CollectorMetrics::new().unwrap();
        assert_eq!(route(&request(Method::GET, "/nope"), &metrics).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            route(&request(Method::POST, "/healthz"), &metrics).status(),
            StatusCode::NOT_FOUND
        );
    }
}
