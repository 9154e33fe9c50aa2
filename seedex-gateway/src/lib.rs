// SPDX-License-Identifier: MIT
//
// Seedex: Network Entropy Exchange
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara
//
// https://github.com/vbocan/qrng-data-diode

//! Seedex Gateway - HTTP(S) binding of the entropy exchange
//!
//! Every request carries one `challenge` (query string or urlencoded form
//! field). The challenge is mixed into the local pool and the reply body is
//! two hex lines: the challenge digest and the freshly derived seed.
//!
//! | Situation            | Status | Body                                |
//! |----------------------|--------|-------------------------------------|
//! | challenge mixed      | 200    | `<challenge digest>\n<seed>\n`      |
//! | no challenge         | 400    | fixed instructional message         |
//! | pool read fault      | 500    | `Failed to read from random device` |

use axum::{
    body::Bytes,
    extract::{ConnectInfo, RawQuery, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use seedex_core::{
    metrics::Metrics,
    protocol::{
        find_challenge, ExchangeReply, MISSING_CHALLENGE_MESSAGE, READ_FAILURE_MESSAGE,
        TEXT_CONTENT_TYPE,
    },
    EntropyExchange, EventLog,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    exchange: EntropyExchange,
    log: Arc<dyn EventLog>,
    metrics: Metrics,
}

impl AppState {
    pub fn new(exchange: EntropyExchange, log: Arc<dyn EventLog>) -> Self {
        Self {
            exchange,
            log,
            metrics: Metrics::new(),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// Build the gateway router
///
/// Every path answers challenges; `/metrics` is reserved when metrics are enabled.
pub fn router(state: AppState, metrics_enabled: bool) -> Router {
    let mut app = Router::new();
    if metrics_enabled {
        app = app.route("/metrics", get(get_metrics));
    }
    app.fallback(handle_challenge)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Whether the body of this request is an urlencoded form worth searching
fn carries_form(method: &Method, headers: &HeaderMap) -> bool {
    let has_body = matches!(*method, Method::POST | Method::PUT | Method::PATCH);
    has_body
        && headers
            .get(hyper::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with(FORM_CONTENT_TYPE))
}

fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// `<address>, <user agent>` as it appears in log records
fn describe_peer(connect_info: Option<ConnectInfo<SocketAddr>>, headers: &HeaderMap) -> String {
    let addr = connect_info
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let agent = headers
        .get(hyper::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    format!("{}, {}", addr, agent)
}

fn text_response(status: StatusCode, body: impl Into<String>) -> Response {
    (
        status,
        [(hyper::header::CONTENT_TYPE, TEXT_CONTENT_TYPE)],
        body.into(),
    )
        .into_response()
}

/// Any path - mix a challenge and return the two digests
async fn handle_challenge(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    method: Method,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    let start = Instant::now();

    // A posted form field wins over the query string
    let from_form = if carries_form(&method, &headers) {
        find_challenge(&body)
    } else {
        None
    };
    let challenge = from_form.or_else(|| query.and_then(|q| find_challenge(q.as_bytes())));

    let Some(challenge) = challenge else {
        state.metrics.record_rejected();
        return text_response(StatusCode::BAD_REQUEST, MISSING_CHALLENGE_MESSAGE);
    };

    let peer = describe_peer(connect_info, &headers);
    let exchange = state.exchange.clone();
    let mixed = tokio::task::spawn_blocking(move || exchange.mix(&challenge)).await;
    let outcome = match mixed {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Exchange task failed: {}", e);
            return text_response(StatusCode::INTERNAL_SERVER_ERROR, READ_FAILURE_MESSAGE);
        }
    };
    state
        .metrics
        .record_exchange(&outcome, start.elapsed().as_micros() as u64);

    if let Some(e) = &outcome.write_error {
        state
            .log
            .error(&format!("Cannot write to random device at [{}]: {}", now_nanos(), e));
    }
    state.log.info(&format!(
        "Server received challenge from [{}] at [{}]",
        peer,
        now_nanos()
    ));

    match outcome.response {
        Ok(seed) => {
            let reply = ExchangeReply::new(outcome.challenge_digest, seed.digest);
            let response = text_response(StatusCode::OK, reply.to_body());
            state.log.info(&format!(
                "Server sent response to [{}] at [{}] in [{:?}]",
                peer,
                now_nanos(),
                start.elapsed()
            ));
            response
        }
        Err(e) => {
            state
                .log
                .error(&format!("Cannot read from random device at [{}]: {}", now_nanos(), e));
            text_response(StatusCode::INTERNAL_SERVER_ERROR, READ_FAILURE_MESSAGE)
        }
    }
}

/// GET /metrics - Prometheus metrics
async fn get_metrics(State(state): State<AppState>) -> String {
    state.metrics.prometheus_format()
}

/// Serve plain HTTP until `shutdown` is cancelled
pub async fn serve_http(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    info!("Serving HTTP on {}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
}

/// Serve HTTPS with the given PEM material until `shutdown` is cancelled
///
/// Unreadable certificate or key material is an error, never a silent skip.
pub async fn serve_https(
    addr: SocketAddr,
    cert_path: &Path,
    key_path: &Path,
    app: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;

    let handle = axum_server::Handle::new();
    let watcher = handle.clone();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        watcher.graceful_shutdown(Some(Duration::from_secs(5)));
    });

    info!("Serving HTTPS on {}", addr);
    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await
}
