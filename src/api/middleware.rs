use axum::{
    body::Body,
    http::{Request, Uri},
    middleware::Next,
    response::Response,
};
use tracing::Span;

pub async fn enrich_current_span_middleware(req: Request<Body>, next: Next) -> Response {
    let uri: &Uri = req.uri();

    let host = req
        .headers()
        .get("host")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("UNKNOWN");

    let current_span = Span::current();

    current_span.record("http.method", req.method().as_str());
    current_span.record("http.uri", uri.path());
    current_span.record("http.host", host);
    if let Some(query) = uri.query() {
        current_span.record("http.query", query);
    }

    next.run(req).await
}

/// Rewrite `/api/agents/` to `/api/agents` in place. A redirect would drop
/// POST bodies, so the URI is patched before routing instead.
pub async fn strip_trailing_slash(mut req: Request<Body>, next: Next) -> Response {
    let uri = req.uri();

    if uri.path().len() > 1 && uri.path().ends_with('/') {
        let path = uri.path().trim_end_matches('/').to_string();
        let mut parts = uri.clone().into_parts();
        parts.path_and_query = Some(if let Some(query) = uri.query() {
            format!("{path}?{query}").parse().unwrap()
        } else {
            path.parse().unwrap()
        });
        *req.uri_mut() = Uri::from_parts(parts).unwrap();
    }

    next.run(req).await
}
