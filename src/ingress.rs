//! HTTP ingress.
//!
//! Thin adapter between HTTP and the [`EventQueue`]: it validates the request,
//! builds an [`Event`] with a fresh UUID and receipt timestamp, calls
//! [`EventQueue::add`], and answers `202 Accepted`. It never waits for
//! processing.
//!
//! | Route            | Event type | Notes                               |
//! |------------------|------------|-------------------------------------|
//! | `POST /event`    | `CREATE`   | body `{"type"?, "detail"?}` optional |
//! | `PUT /event`     | `UPDATE`   |                                     |
//! | `PATCH /event`   | `PATCH`    |                                     |
//! | `DELETE /event`  | `DELETE`   |                                     |
//! | `GET /event`     | -          | backlog snapshot                    |
//! | `GET /health`    | -          | no auth                             |
//! | `GET /metrics`   | -          | no auth                             |

use crate::dispatcher::Dispatcher;
use crate::event::Event;
use crate::metrics::{format_uptime, RelayMetrics};
use crate::queue::EventQueue;
use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{Json, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct AppState {
    queue: Arc<EventQueue>,
    dispatcher: Arc<Dispatcher>,
    api_key: Option<String>,
}

impl AppState {
    pub fn new(queue: Arc<EventQueue>, dispatcher: Arc<Dispatcher>, api_key: Option<String>) -> Self {
        Self {
            queue,
            dispatcher,
            api_key,
        }
    }

    fn metrics(&self) -> &RelayMetrics {
        self.dispatcher.metrics()
    }
}

/// Optional request body for the write routes.
#[derive(Debug, Default, Deserialize)]
struct IngressRequest {
    #[serde(rename = "type")]
    event_type: Option<String>,
    detail: Option<Value>,
}

type ApiResult = Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)>;

/// Build the HTTP router with auth middleware.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .route(
            "/event",
            get(get_backlog)
                .post(post_event)
                .put(put_event)
                .patch(patch_event)
                .delete(delete_event),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let path = req.uri().path();
    if path == "/health" || path == "/metrics" {
        return Ok(next.run(req).await);
    }

    let Some(api_key) = &state.api_key else {
        return Ok(next.run(req).await);
    };

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match token {
        Some(token) if token == api_key.as_str() => {}
        Some(_) => {
            warn!("Invalid API Key attempt");
            return Err(StatusCode::UNAUTHORIZED);
        }
        None => {
            warn!("Missing or malformed Authorization header");
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    Ok(next.run(req).await)
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<Value> {
    let uptime = state.metrics().uptime_seconds();
    let queue_depth = state.queue.len().ok();

    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime,
        "uptime": format_uptime(uptime),
        "events": state.metrics().snapshot(),
        "queue_depth": queue_depth,
        "workers_in_flight": state.dispatcher.in_flight(),
        "status": "running"
    }))
}

async fn get_backlog(State(state): State<Arc<AppState>>) -> ApiResult {
    let events = state.queue.snapshot().map_err(|e| {
        error!(error = %e, "Failed to snapshot event queue");
        reject(StatusCode::INTERNAL_SERVER_ERROR, "queue unavailable")
    })?;

    Ok((
        StatusCode::OK,
        Json(json!({ "pending": events.len(), "events": events })),
    ))
}

async fn post_event(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult {
    ingest(&state, "CREATE", "Details of the POST event", &body)
}

async fn put_event(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult {
    ingest(&state, "UPDATE", "Details of the PUT event", &body)
}

async fn patch_event(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult {
    ingest(&state, "PATCH", "Details of the PATCH event", &body)
}

async fn delete_event(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult {
    ingest(&state, "DELETE", "Details of the DELETE event", &body)
}

/// Validate the body, build the event, and buffer it.
fn ingest(state: &AppState, default_type: &str, default_detail: &str, body: &[u8]) -> ApiResult {
    let request = parse_request(body)?;

    let event_type = match request.event_type {
        Some(t) if t.trim().is_empty() => {
            return Err(reject(StatusCode::BAD_REQUEST, "event type must not be empty"));
        }
        Some(t) => t,
        None => default_type.to_string(),
    };
    let detail = request
        .detail
        .unwrap_or_else(|| Value::String(default_detail.to_string()));

    let event = Event::generate(event_type, detail).with_timestamp(Utc::now().to_rfc3339());

    info!(
        event_id = %event.id(),
        event_type = %event.event_type(),
        "Received new event"
    );

    state.queue.add(event.clone()).map_err(|e| {
        error!(event_id = %event.id(), error = %e, "Failed to enqueue event");
        reject(StatusCode::INTERNAL_SERVER_ERROR, "queue unavailable")
    })?;
    state.metrics().record_received();

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "Event received", "event": event })),
    ))
}

fn parse_request(body: &[u8]) -> Result<IngressRequest, (StatusCode, Json<Value>)> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(IngressRequest::default());
    }

    serde_json::from_slice(body).map_err(|e| {
        debug!(error = %e, "Rejecting malformed event body");
        reject(StatusCode::BAD_REQUEST, &format!("invalid JSON body: {}", e))
    })
}

fn reject(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "status": "rejected", "error": message })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::EventProcessor;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt; // for `oneshot`

    fn test_app(api_key: Option<&str>) -> (Router, Arc<EventQueue>, Arc<Dispatcher>) {
        let metrics = Arc::new(RelayMetrics::new());
        let processor = Arc::new(EventProcessor::new(
            Arc::new(crate::Router::with_defaults()),
            metrics,
        ));
        let dispatcher = Arc::new(Dispatcher::new(processor).unwrap());
        let queue = EventQueue::new(dispatcher.clone());
        let state = Arc::new(AppState::new(
            queue.clone(),
            dispatcher.clone(),
            api_key.map(str::to_string),
        ));
        (app(state), queue, dispatcher)
    }

    async fn body_json(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _, _) = test_app(Some("secret"));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_post_without_body_creates_create_event() {
        let (app, queue, dispatcher) = test_app(None);

        let response = app.oneshot(request("POST", "/event", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let body = body_json(response).await;
        assert_eq!(body["status"], "Event received");
        assert_eq!(body["event"]["type"], "CREATE");
        assert_eq!(body["event"]["detail"], "Details of the POST event");
        assert!(body["event"]["id"].as_str().is_some());
        assert!(body["event"]["timestamp"].as_str().is_some());

        dispatcher.wait_idle().await;
        assert!(queue.is_empty().unwrap());
        assert_eq!(dispatcher.metrics().snapshot().events_processed, 1);
    }

    #[tokio::test]
    async fn test_method_selects_event_type() {
        for (method, expected) in [("PUT", "UPDATE"), ("PATCH", "PATCH"), ("DELETE", "DELETE")] {
            let (app, _, _) = test_app(None);
            let response = app.oneshot(request(method, "/event", "")).await.unwrap();

            assert_eq!(response.status(), StatusCode::ACCEPTED);
            assert_eq!(body_json(response).await["event"]["type"], expected);
        }
    }

    #[tokio::test]
    async fn test_body_overrides_type_and_detail() {
        let (app, _, _) = test_app(None);

        let response = app
            .oneshot(request(
                "POST",
                "/event",
                r#"{"type": "WHATEVER", "detail": {"sku": 7}}"#,
            ))
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["event"]["type"], "WHATEVER");
        assert_eq!(body["event"]["detail"]["sku"], 7);
    }

    #[tokio::test]
    async fn test_empty_type_rejected() {
        let (app, queue, _) = test_app(None);

        let response = app
            .oneshot(request("POST", "/event", r#"{"type": "  "}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(queue.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_malformed_json_rejected() {
        let (app, _, dispatcher) = test_app(None);

        let response = app.oneshot(request("POST", "/event", "{not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(dispatcher.metrics().snapshot().events_received, 0);
    }

    #[tokio::test]
    async fn test_unbuffered_event_is_not_counted() {
        let (app, queue, dispatcher) = test_app(None);
        queue.poison();

        let response = app.oneshot(request("POST", "/event", "")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let snap = dispatcher.metrics().snapshot();
        assert_eq!(snap.events_received, 0);
        assert_eq!(snap.workers_dispatched, 0);
    }

    #[tokio::test]
    async fn test_auth_required_when_key_set() {
        let (app, _, _) = test_app(Some("secret"));

        let response = app
            .clone()
            .oneshot(request("POST", "/event", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut authed = request("POST", "/event", "");
        authed
            .headers_mut()
            .insert(header::AUTHORIZATION, "Bearer secret".parse().unwrap());
        let response = app.oneshot(authed).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_get_backlog_and_metrics() {
        let (app, _, dispatcher) = test_app(None);

        app.clone()
            .oneshot(request("POST", "/event", ""))
            .await
            .unwrap();
        dispatcher.wait_idle().await;

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/event").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["pending"], 0);
        assert_eq!(body["events"], json!([]));

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["events"]["events_received"], 1);
        assert_eq!(body["events"]["events_processed"], 1);
        assert_eq!(body["queue_depth"], 0);
        assert_eq!(body["workers_in_flight"], 0);
    }
}
