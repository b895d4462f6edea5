use axum::{
    extract::rejection::{BytesRejection, FormRejection},
    http::StatusCode,
    response::IntoResponse,
};
use mysql_broadcast_schema::NotificationError;
use std::net::SocketAddr;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum IngressError {
    #[error("failed to bind change listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("change listener server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("change listener shutdown failed: {0}")]
    Shutdown(String),

    #[error(transparent)]
    Notification(#[from] NotificationError),

    #[error("malformed form body: {0}")]
    Form(#[from] FormRejection),

    #[error("failed to read request body: {0}")]
    Body(#[from] BytesRejection),
}

impl IntoResponse for IngressError {
    // Triggers never read the response, so rejections carry no body.
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            IngressError::Notification(_) | IngressError::Form(_) | IngressError::Body(_) => {
                StatusCode::BAD_REQUEST
            }
            IngressError::Bind { .. } | IngressError::Serve(_) | IngressError::Shutdown(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        status.into_response()
    }
}
