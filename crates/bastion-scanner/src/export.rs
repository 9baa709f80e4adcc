//! Read-only HTTP endpoint serving the published rule set.
//!
//! The handler works on plain `http` types so any framework can mount it.
//! [`RuleExportEndpoint::serve`] runs it standalone on a hyper listener.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bastion_config::ServiceSettings;
use bytes::Bytes;
use http::header::{ALLOW, CONTENT_TYPE};
use http::{HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::error::ScanResult;
use crate::scanner::PublishedRules;

/// Serves a service's [`ServiceRuleSet`](bastion_core::ServiceRuleSet) as JSON.
#[derive(Debug, Clone)]
pub struct RuleExportEndpoint {
    path: String,
    rules: PublishedRules,
}

impl RuleExportEndpoint {
    /// Creates an endpoint on `path`.
    pub fn new(path: impl Into<String>, rules: PublishedRules) -> Self {
        Self {
            path: path.into(),
            rules,
        }
    }

    /// Creates the endpoint if the service opted in with `expose_metadata`.
    pub fn from_settings(settings: &ServiceSettings, rules: PublishedRules) -> Option<Self> {
        settings
            .expose_metadata
            .then(|| Self::new(&settings.rules_path, rules))
    }

    /// Path the endpoint answers on.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether `path` addresses this endpoint. A trailing slash is tolerated.
    pub fn matches(&self, path: &str) -> bool {
        let wanted = self.path.trim_end_matches('/');
        let got = path.trim_end_matches('/');
        wanted == got
    }

    /// Handles a request, or returns `None` if it is for another path.
    pub fn handle<B>(&self, request: &Request<B>) -> Option<Response<Full<Bytes>>> {
        if !self.matches(request.uri().path()) {
            return None;
        }

        let method = request.method();
        if method != Method::GET && method != Method::HEAD {
            let mut response = error_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
            return Some(response);
        }

        let Some(body) = self.rules.body() else {
            return Some(error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "rules have not been published yet",
            ));
        };

        let body = if method == Method::HEAD {
            Bytes::new()
        } else {
            body
        };
        Some(json_response(StatusCode::OK, body))
    }

    /// Binds `addr` and serves until `shutdown` resolves.
    pub async fn bind_and_serve<F>(self, addr: SocketAddr, shutdown: F) -> ScanResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serves the endpoint on `listener` until `shutdown` resolves.
    ///
    /// Requests for any other path get `404`.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> ScanResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        let endpoint = Arc::new(self);
        info!(addr = ?listener.local_addr().ok(), path = %endpoint.path, "rule export endpoint listening");

        tokio::pin!(shutdown);
        loop {
            let (stream, peer) = tokio::select! {
                () = &mut shutdown => {
                    info!("rule export endpoint shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                        continue;
                    }
                },
            };

            let endpoint = Arc::clone(&endpoint);
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let endpoint = Arc::clone(&endpoint);
                    async move {
                        let response = endpoint.handle(&req).unwrap_or_else(|| {
                            error_response(StatusCode::NOT_FOUND, "not found")
                        });
                        Ok::<_, Infallible>(response)
                    }
                });

                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    debug!(peer = %peer, error = %e, "connection error");
                }
            });
        }
    }
}

fn json_response(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": status.canonical_reason().unwrap_or("error"),
        "message": message,
    });
    json_response(status, Bytes::from(body.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RuleScanner, RouteTable, SecurityDeclaration};
    use http_body_util::BodyExt;

    fn published() -> PublishedRules {
        let slot = PublishedRules::new();
        RuleScanner::new("orders", "")
            .scan_and_publish(
                RouteTable::new("")
                    .post("/orders", SecurityDeclaration::Public)
                    .into_routes(),
                &slot,
            )
            .unwrap();
        slot
    }

    fn request(method: Method, path: &str) -> Request<()> {
        Request::builder().method(method).uri(path).body(()).unwrap()
    }

    async fn body_of(response: Response<Full<Bytes>>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_get_returns_rules() {
        let endpoint = RuleExportEndpoint::new("/security/rules", published());
        let response = endpoint.handle(&request(Method::GET, "/security/rules")).unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let json: serde_json::Value = serde_json::from_slice(&body_of(response).await).unwrap();
        assert_eq!(json["serviceName"], "orders");
        assert_eq!(json["endpoints"][0]["isPublic"], true);
    }

    #[tokio::test]
    async fn test_head_has_empty_body() {
        let endpoint = RuleExportEndpoint::new("/security/rules", published());
        let response = endpoint.handle(&request(Method::HEAD, "/security/rules/")).unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_of(response).await.is_empty());
    }

    #[test]
    fn test_other_methods_rejected() {
        let endpoint = RuleExportEndpoint::new("/security/rules", published());
        let response = endpoint.handle(&request(Method::POST, "/security/rules")).unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, HEAD");
    }

    #[test]
    fn test_unpublished_is_unavailable() {
        let endpoint = RuleExportEndpoint::new("/security/rules", PublishedRules::new());
        let response = endpoint.handle(&request(Method::GET, "/security/rules")).unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_other_paths_fall_through() {
        let endpoint = RuleExportEndpoint::new("/security/rules", published());
        assert!(endpoint.handle(&request(Method::GET, "/orders")).is_none());
        assert!(endpoint.handle(&request(Method::GET, "/security/rules/x")).is_none());
    }

    #[test]
    fn test_from_settings_requires_opt_in() {
        let mut settings = ServiceSettings {
            name: "orders".into(),
            ..ServiceSettings::default()
        };
        assert!(RuleExportEndpoint::from_settings(&settings, PublishedRules::new()).is_none());

        settings.expose_metadata = true;
        settings.rules_path = "/meta/rules".into();
        let endpoint = RuleExportEndpoint::from_settings(&settings, PublishedRules::new()).unwrap();
        assert_eq!(endpoint.path(), "/meta/rules");
    }
}
