//! The gateway's HTTP surface.
//!
//! - `GET {authorize_path}`: forward-auth check. The request to authorize is
//!   described by `X-Forwarded-Method` and `X-Forwarded-Uri`; the answer is
//!   `200` to allow or `403` to deny.
//! - `GET {admin_reload_path}`: manual reload, itself subject to the rules.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use bastion_config::{BastionConfig, CredentialMode, GatewaySettings};
use bastion_core::{
    parse_method, AnonymousResolver, Caller, CredentialResolver, RequestContext,
    TrustedHeaderResolver,
};
use bytes::Bytes;
use http::header::{ALLOW, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri};
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::admin;
use crate::cache::RuleCache;
use crate::discovery::{Discovery, StaticDiscovery};
use crate::engine::AuthorizationEngine;
use crate::error::GatewayResult;
use crate::loader::{LoaderConfig, RuleDistributionLoader};
use crate::source::{HttpRuleSource, RuleSource};

/// Header naming the method of the request being authorized.
pub const FORWARDED_METHOD: &str = "x-forwarded-method";

/// Header carrying the URI of the request being authorized.
pub const FORWARDED_URI: &str = "x-forwarded-uri";

/// Picks the credential resolver for a configured mode.
pub fn resolver_for(mode: CredentialMode) -> Arc<dyn CredentialResolver> {
    match mode {
        CredentialMode::TrustedHeaders => Arc::new(TrustedHeaderResolver),
        CredentialMode::Anonymous => Arc::new(AnonymousResolver),
    }
}

#[derive(Serialize)]
struct DecisionBody {
    decision: &'static str,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
    request_id: String,
}

/// A composed gateway: cache, loader, engine and credential resolver.
pub struct Gateway {
    settings: GatewaySettings,
    engine: AuthorizationEngine,
    loader: RuleDistributionLoader,
    resolver: Arc<dyn CredentialResolver>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("settings", &self.settings)
            .field("loader", &self.loader)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Wires a gateway from its collaborators.
    pub fn new(
        settings: GatewaySettings,
        discovery: Arc<dyn Discovery>,
        source: Arc<dyn RuleSource>,
        resolver: Arc<dyn CredentialResolver>,
    ) -> GatewayResult<Self> {
        let cache = RuleCache::new();
        let engine = AuthorizationEngine::from_settings(cache.clone(), &settings)?;
        let loader = RuleDistributionLoader::new(
            discovery,
            source,
            cache,
            LoaderConfig::from_settings(&settings),
        );
        Ok(Self {
            settings,
            engine,
            loader,
            resolver,
        })
    }

    /// Wires a gateway from configuration, using static discovery and HTTP
    /// rule fetches.
    pub fn from_config(config: &BastionConfig) -> GatewayResult<Self> {
        let discovery = Arc::new(StaticDiscovery::from_settings(&config.discovery));
        let source = Arc::new(HttpRuleSource::from_settings(&config.gateway, &config.discovery)?);
        Self::new(
            config.gateway.clone(),
            discovery,
            source,
            resolver_for(config.credentials.mode),
        )
    }

    /// The decision engine.
    pub fn engine(&self) -> &AuthorizationEngine {
        &self.engine
    }

    /// The rule loader.
    pub fn loader(&self) -> &RuleDistributionLoader {
        &self.loader
    }

    /// Starts background rule loading.
    pub fn start(&self) -> GatewayResult<()> {
        self.loader.start()
    }

    /// Stops background rule loading.
    pub async fn stop(&self) {
        self.loader.stop().await;
    }

    /// Resolves the caller and attaches a fresh [`RequestContext`] to the
    /// request's extensions, where [`RequestContext::of`] finds it.
    pub fn prepare<B>(&self, request: Request<B>) -> Request<B> {
        let (mut parts, body) = request.into_parts();

        let mut context = RequestContext::new();
        match self.resolver.resolve(&parts.headers) {
            Ok(Some(identity)) => context = context.with_identity(identity),
            Ok(None) => {}
            Err(e) => {
                warn!(request_id = %context.request_id(), error = %e, "ignoring invalid credential headers");
            }
        }
        context.attach(&mut parts.extensions);
        Request::from_parts(parts, body)
    }

    /// Handles one HTTP request.
    pub async fn handle<B>(&self, request: Request<B>) -> Response<Full<Bytes>> {
        let (parts, _body) = self.prepare(request).into_parts();
        let context = parts.extensions.get::<RequestContext>().cloned().unwrap_or_default();
        let caller = context.caller(&self.settings.role_prefix);

        let span = info_span!(
            "request",
            request_id = %context.request_id(),
            method = %parts.method,
            path = %parts.uri.path(),
            subject = context.identity().map_or("-", |id| id.subject_id.as_str()),
        );

        async {
            let path = parts.uri.path();
            let response = if path == self.settings.authorize_path {
                self.authorize(&parts.headers, &caller, &context)
            } else if path == self.settings.admin_reload_path {
                self.admin_reload(&parts.method, &caller, &context).await
            } else {
                error_response(StatusCode::NOT_FOUND, "no such endpoint", &context)
            };
            debug!(
                status = response.status().as_u16(),
                duration_ms = context.elapsed().as_millis() as u64,
                "request completed"
            );
            response
        }
        .instrument(span)
        .await
    }

    fn authorize(&self, headers: &HeaderMap, caller: &Caller, context: &RequestContext) -> Response<Full<Bytes>> {
        let Some(method) = header_str(headers, FORWARDED_METHOD) else {
            return error_response(StatusCode::BAD_REQUEST, "missing X-Forwarded-Method", context);
        };
        let Ok(method) = parse_method(method) else {
            return error_response(StatusCode::BAD_REQUEST, "invalid X-Forwarded-Method", context);
        };
        let Some(uri) = header_str(headers, FORWARDED_URI) else {
            return error_response(StatusCode::BAD_REQUEST, "missing X-Forwarded-Uri", context);
        };
        let Ok(uri) = uri.parse::<Uri>() else {
            return error_response(StatusCode::BAD_REQUEST, "invalid X-Forwarded-Uri", context);
        };

        let decision = self.engine.decide(&method, uri.path(), caller);
        if decision.is_allowed() {
            json_response(StatusCode::OK, &DecisionBody { decision: "allow" })
        } else {
            info!(
                forwarded_method = %method,
                forwarded_path = %uri.path(),
                reason = %decision.reason(),
                "access denied"
            );
            json_response(StatusCode::FORBIDDEN, &DecisionBody { decision: "deny" })
        }
    }

    async fn admin_reload(&self, method: &Method, caller: &Caller, context: &RequestContext) -> Response<Full<Bytes>> {
        if method != Method::GET {
            let mut response = error_response(StatusCode::METHOD_NOT_ALLOWED, "use GET", context);
            response.headers_mut().insert(ALLOW, HeaderValue::from_static("GET"));
            return response;
        }

        if !self.engine.is_allowed(&Method::GET, &self.settings.admin_reload_path, caller) {
            let status = if caller.is_authenticated() {
                StatusCode::FORBIDDEN
            } else {
                StatusCode::UNAUTHORIZED
            };
            return error_response(status, "not allowed to reload security rules", context);
        }

        let body = admin::reload(&self.loader).await;
        json_response(StatusCode::OK, &body)
    }

    /// Serves HTTP on `listener` until `shutdown` resolves.
    pub async fn serve<F>(self: Arc<Self>, listener: TcpListener, shutdown: F) -> GatewayResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        info!(addr = ?listener.local_addr().ok(), "bastion gateway listening");

        tokio::pin!(shutdown);
        loop {
            let (stream, peer) = tokio::select! {
                () = &mut shutdown => {
                    info!("gateway shutting down");
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

            let gateway = Arc::clone(&self);
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let gateway = Arc::clone(&gateway);
                    async move { Ok::<_, Infallible>(gateway.handle(req).await) }
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

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn error_response(status: StatusCode, message: &str, context: &RequestContext) -> Response<Full<Bytes>> {
    json_response(
        status,
        &ErrorBody {
            error: status.canonical_reason().unwrap_or("error"),
            message,
            request_id: context.request_id().to_string(),
        },
    )
}
