//! Request/response connector over HTTP/1.1.

use crate::config::{Connection, Endpoint, Protocol};
use crate::error::{ConnectorError, ProcessError};
use crate::message::{Context, InboundMessage, SharedHandler};
use crate::router::{parse_query_string, Router};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{
    HeaderName, HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN,
};
use hyper::http::request::Parts;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Default request body limit.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Prefix of context keys holding request headers.
pub const HEADER_PREFIX: &str = "header.";

/// Serves the endpoints of one HTTP connection.
pub struct HttpConnector {
    name: String,
    address: String,
    max_body_bytes: usize,
    router: Option<Arc<Router>>,
    handler: Option<SharedHandler>,
    listener: Option<TcpListener>,
    connected: bool,
}

impl HttpConnector {
    /// Create a connector for `connection`.
    ///
    /// Recognized properties: `maxBodyBytes`.
    pub fn new(connection: &Connection) -> anyhow::Result<Self> {
        Ok(Self {
            name: connection.name.clone(),
            address: format!("{}:{}", connection.host, connection.port),
            max_body_bytes: connection.numeric_property("maxBodyBytes", DEFAULT_MAX_BODY_BYTES)?,
            router: None,
            handler: None,
            listener: None,
            connected: false,
        })
    }

    /// Bind the listening socket ahead of [`Connector::connect`].
    ///
    /// [`Connector::connect`]: super::Connector::connect
    pub async fn bind(&mut self) -> Result<SocketAddr, ConnectorError> {
        if let Some(listener) = &self.listener {
            return Ok(listener.local_addr()?);
        }
        let listener = TcpListener::bind(&self.address).await?;
        let local = listener.local_addr()?;
        self.listener = Some(listener);
        Ok(local)
    }
}

#[async_trait]
impl super::Connector for HttpConnector {
    fn protocol(&self) -> Protocol {
        Protocol::Http
    }

    fn set_endpoints(
        &mut self,
        endpoints: &[Endpoint],
        handler: SharedHandler,
    ) -> Result<(), ConnectorError> {
        if self.connected {
            return Err(ConnectorError::AlreadyConnected);
        }

        let mut router = Router::new()?;
        for endpoint in endpoints {
            if endpoint.method.is_empty() {
                return Err(ConnectorError::MissingField {
                    endpoint: endpoint.name.clone(),
                    field: "method",
                });
            }
            if endpoint.url.is_empty() {
                return Err(ConnectorError::MissingField {
                    endpoint: endpoint.name.clone(),
                    field: "url",
                });
            }
            router.add(&endpoint.method, &endpoint.url, &endpoint.name)?;
        }

        debug!(connection = %self.name, routes = router.len(), "HTTP routes registered");
        self.router = Some(Arc::new(router));
        self.handler = Some(handler);
        Ok(())
    }

    async fn connect(&mut self) -> Result<(), ConnectorError> {
        let (Some(router), Some(handler)) = (self.router.clone(), self.handler.clone()) else {
            return Err(ConnectorError::NoEndpoints);
        };
        self.connected = true;

        self.bind().await?;
        let Some(listener) = self.listener.take() else {
            return Err(ConnectorError::NoEndpoints);
        };
        info!(
            connection = %self.name,
            address = %listener.local_addr()?,
            "HTTP connector listening"
        );

        let state = Arc::new(ServiceState {
            router,
            handler,
            max_body_bytes: self.max_body_bytes,
        });

        loop {
            let (stream, remote) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(connection = %self.name, error = %e, "Failed to accept connection");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            };

            let state = state.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| serve_request(state.clone(), remote, req));
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(remote = %remote, error = %e, "HTTP connection closed with error");
                }
            });
        }
    }
}

struct ServiceState {
    router: Arc<Router>,
    handler: SharedHandler,
    max_body_bytes: usize,
}

async fn serve_request(
    state: Arc<ServiceState>,
    remote: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    debug!(method = %parts.method, uri = %parts.uri, remote = %remote, "Request received");

    let origin = parts.headers.get(ORIGIN).cloned();
    let mut response = handle_request(&state, parts, body).await;

    if let Some(origin) = origin {
        let headers = response.headers_mut();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("Content-Type"));
    }
    Ok(response)
}

async fn handle_request(
    state: &ServiceState,
    parts: Parts,
    body: Incoming,
) -> Response<Full<Bytes>> {
    if parts.method == Method::OPTIONS {
        return empty_response(StatusCode::OK);
    }

    let Some(found) = state.router.resolve(parts.method.as_str(), parts.uri.path()) else {
        debug!(method = %parts.method, path = %parts.uri.path(), "No route found");
        return empty_response(StatusCode::NOT_FOUND);
    };

    let content = match Limited::new(body, state.max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            warn!(uri = %parts.uri, limit = state.max_body_bytes, "Request body too large");
            return empty_response(StatusCode::PAYLOAD_TOO_LARGE);
        }
        Err(e) => {
            warn!(uri = %parts.uri, error = %e, "Failed to read request body");
            return empty_response(StatusCode::BAD_REQUEST);
        }
    };

    let context = request_context(found.params, &parts);
    let message = InboundMessage {
        endpoint: found.endpoint,
        content,
        context,
    };
    let endpoint = message.endpoint.clone();

    match state.handler.handle(message).await {
        Ok(out) => {
            let mut response = Response::new(Full::new(out.content));
            for (name, value) in &out.context {
                match (HeaderName::try_from(name.as_str()), HeaderValue::from_str(value)) {
                    (Ok(name), Ok(value)) => {
                        response.headers_mut().insert(name, value);
                    }
                    _ => warn!(endpoint = %endpoint, header = %name, "Skipping invalid reply header"),
                }
            }
            response
        }
        Err(e) => {
            warn!(endpoint = %endpoint, error = %e, "Processing error");
            empty_response(status_for(&e))
        }
    }
}

fn request_context(params: Context, parts: &Parts) -> Context {
    let mut context = params;
    if let Some(query) = parts.uri.query() {
        context.extend(parse_query_string(query));
    }
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            context.insert(format!("{HEADER_PREFIX}{}", name.as_str()), value.to_string());
        }
    }
    context
}

/// HTTP status reported for a processing failure.
pub fn status_for(error: &ProcessError) -> StatusCode {
    match error {
        ProcessError::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
        ProcessError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}
