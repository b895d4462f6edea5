use super::dispatch::{Dispatch, dispatch_guarded};
use crate::error::IngressError;
use crate::utils::logging::pretty_json_if_debug;
use axum::{
    Form, Router,
    body::Bytes,
    extract::{FromRequest, Request, State},
    http::{HeaderMap, Method, StatusCode, header::CONTENT_TYPE},
    middleware::{self, Next},
    response::Response,
};
use mysql_broadcast_schema::ChangeNotification;
use serde_json::{Map, Value};
use std::{sync::Arc, time::Instant};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct IngressState {
    dispatcher: Arc<dyn Dispatch>,
}

impl IngressState {
    pub fn new(dispatcher: Arc<dyn Dispatch>) -> Self {
        Self { dispatcher }
    }
}

/// Every path is accepted; only POST is.
pub fn ingress_router(state: IngressState) -> Router {
    Router::new()
        .fallback(receive_change)
        .with_state(state)
        .layer(middleware::from_fn(access_log))
}

async fn receive_change(
    State(state): State<IngressState>,
    req: Request,
) -> Result<StatusCode, IngressError> {
    if req.method() != Method::POST {
        return Ok(StatusCode::FORBIDDEN);
    }

    let notification = decode_notification(req).await.inspect_err(|e| {
        debug!(error = %e, "Rejected change notification body");
    })?;

    if let Some(json) = pretty_json_if_debug(&notification) {
        debug!("Dispatching change notification:\n{json}");
    }
    dispatch_guarded(state.dispatcher.as_ref(), notification);

    Ok(StatusCode::OK)
}

/// JSON by default; urlencoded forms decode into string-valued fields.
async fn decode_notification(req: Request) -> Result<ChangeNotification, IngressError> {
    if is_form(req.headers()) {
        let Form(fields) = Form::<Map<String, Value>>::from_request(req, &()).await?;
        return Ok(ChangeNotification::from_value(Value::Object(fields))?);
    }

    let body = Bytes::from_request(req, &()).await?;
    // An empty POST decodes as an empty record.
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ChangeNotification::from_value(Value::Object(Map::new()))?);
    }
    Ok(ChangeNotification::from_slice(&body)?)
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| {
            mime.trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
}

async fn access_log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let start = Instant::now();
    let resp = next.run(req).await;

    let status = resp.status();
    let latency_ms = start.elapsed().as_millis() as u64;

    if status.is_client_error() || status.is_server_error() {
        warn!(
            "| {:>3} | {:^7} | {} | {}ms",
            status.as_u16(),
            method.as_str(),
            path,
            latency_ms
        );
    } else {
        info!(
            "| {:>3} | {:^7} | {} | {}ms",
            status.as_u16(),
            method.as_str(),
            path,
            latency_ms
        );
    }

    resp
}
