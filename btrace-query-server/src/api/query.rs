// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use btrace_query_core::{
    drain_into, DrainOptions, QueryError, ServiceDataAggregate, ServiceDataBuilder,
    ServicesAggregate, ServicesBuilder, StreamDrainer,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::storage::StorageBackend;

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Query(QueryError::Connection(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Query(QueryError::Stream { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Query(QueryError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Query(QueryError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Query(err) => err.kind(),
            ApiError::NotFound(_) => "not_found",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Query(QueryError::Stream { .. }) | ApiError::Internal(_) => {
                error!("Request failed: {}", self)
            }
            ApiError::Query(_) => warn!("Storage query failed: {}", self),
            ApiError::NotFound(_) => debug!("{}", self),
        }

        let body = ErrorResponse {
            error: ErrorBody {
                kind: self.kind().into(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: std::borrow::Cow<'static, str>,
    pub message: String,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Long-lived storage handle shared by all requests
    pub storage: Arc<dyn StorageBackend>,
    /// Per-record receive timeout applied to every drain
    pub recv_timeout: Option<Duration>,
    /// Cancelled on shutdown; each request drains under a child token
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(storage: Arc<dyn StorageBackend>, recv_timeout: Option<Duration>) -> Self {
        Self {
            storage,
            recv_timeout,
            shutdown: CancellationToken::new(),
        }
    }

    fn drain_options(&self) -> DrainOptions {
        DrainOptions {
            idle_timeout: self.recv_timeout,
            cancel: Some(self.shutdown.child_token()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServicesResponse {
    pub services: ServicesAggregate,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceDataResponse {
    pub traces: ServiceDataAggregate,
}

/// GET /api/services - List every service known to storage
pub async fn list_services(
    State(state): State<AppState>,
) -> Result<Json<ServicesResponse>, ApiError> {
    let source = state.storage.list_services().await?;
    let drainer = StreamDrainer::with_options(source, state.drain_options());
    let (services, summary) = drain_into(drainer, ServicesBuilder::new()).await?;

    debug!(
        records = summary.records,
        termination = ?summary.termination,
        "listed services"
    );
    Ok(Json(ServicesResponse { services }))
}

/// GET /api/service/:name/data - All traces recorded for one service
///
/// An unknown service yields an empty `traces` object.
pub async fn get_service_data(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ServiceDataResponse>, ApiError> {
    let source = state.storage.get_service_data(&name).await?;
    let drainer = StreamDrainer::with_options(source, state.drain_options());
    let (traces, summary) = drain_into(drainer, ServiceDataBuilder::new()).await?;

    debug!(
        service = %name,
        records = summary.records,
        traces = traces.len(),
        termination = ?summary.termination,
        "collected service data"
    );
    Ok(Json(ServiceDataResponse { traces }))
}

/// Fallback for unknown routes
pub async fn not_found(uri: axum::http::Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}
