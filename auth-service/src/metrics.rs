use anyhow::Result;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct AuthMetrics {
    registry: Registry,
    login_attempts: IntCounterVec,
    refresh_attempts: IntCounterVec,
    logouts: IntCounterVec,
    sessions_swept: IntCounter,
    http_errors: IntCounterVec,
}

impl AuthMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let login_attempts = IntCounterVec::new(
            Opts::new(
                "auth_login_attempts_total",
                "Count of login attempts grouped by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(login_attempts.clone()))?;

        let refresh_attempts = IntCounterVec::new(
            Opts::new(
                "auth_refresh_attempts_total",
                "Count of refresh credential exchanges grouped by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(refresh_attempts.clone()))?;

        let logouts = IntCounterVec::new(
            Opts::new("auth_logouts_total", "Count of logouts grouped by scope"),
            &["scope"],
        )?;
        registry.register(Box::new(logouts.clone()))?;

        let sessions_swept = IntCounter::new(
            "auth_sessions_swept_total",
            "Expired session records removed by the background sweeper",
        )?;
        registry.register(Box::new(sessions_swept.clone()))?;

        let http_errors = IntCounterVec::new(
            Opts::new("http_errors_total", "HTTP error responses by code and status"),
            &["code", "status"],
        )?;
        registry.register(Box::new(http_errors.clone()))?;

        Ok(Self {
            registry,
            login_attempts,
            refresh_attempts,
            logouts,
            sessions_swept,
            http_errors,
        })
    }

    pub fn login_attempt(&self, outcome: &str) {
        self.login_attempts.with_label_values(&[outcome]).inc();
    }

    pub fn refresh_attempt(&self, outcome: &str) {
        self.refresh_attempts.with_label_values(&[outcome]).inc();
    }

    pub fn logout(&self, scope: &str) {
        self.logouts.with_label_values(&[scope]).inc();
    }

    pub fn sessions_swept(&self, count: u64) {
        self.sessions_swept.inc_by(count);
    }

    pub fn http_error(&self, code: &str, status: StatusCode) {
        self.http_errors
            .with_label_values(&[code, status.as_str()])
            .inc();
    }

    pub fn render(&self) -> Result<Response> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            )
            .body(Body::from(buffer))?;
        Ok(response)
    }
}
