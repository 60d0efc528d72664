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

//! btrace storage gRPC client
//!
//! One lazily connected [`Channel`] is created at startup and shared by every
//! request. tonic multiplexes concurrent streaming calls over the underlying
//! HTTP/2 connection, so each call only clones the cheap client handle.

use async_trait::async_trait;
use btrace_query_core::proto::{self, STORAGE_SERVICE};
use btrace_query_core::{BoxRecordSource, QueryError};
use std::error::Error as _;
use tonic::codec::Streaming;
use tonic::transport::{Channel, Endpoint};
use tonic::IntoRequest;

use crate::config::StorageConfig;

/// Source of the two storage streams consumed by the API.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Open a `GetServices` stream.
    async fn list_services(&self) -> Result<BoxRecordSource<proto::Service>, QueryError>;

    /// Open a `GetServiceData` stream for `name`.
    async fn get_service_data(
        &self,
        name: &str,
    ) -> Result<BoxRecordSource<proto::TraceData>, QueryError>;
}

/// Typed client for the `btrace_storage.Storage` service.
#[derive(Debug, Clone)]
pub struct StorageClient {
    inner: tonic::client::Grpc<Channel>,
}

impl StorageClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    pub async fn get_services(
        &mut self,
        request: impl IntoRequest<proto::Empty>,
    ) -> Result<tonic::Response<Streaming<proto::Service>>, tonic::Status> {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static("/btrace_storage.Storage/GetServices");
        let mut req = request.into_request();
        req.extensions_mut()
            .insert(tonic::GrpcMethod::new(STORAGE_SERVICE, "GetServices"));
        self.inner.server_streaming(req, path, codec).await
    }

    pub async fn get_service_data(
        &mut self,
        request: impl IntoRequest<proto::ServiceName>,
    ) -> Result<tonic::Response<Streaming<proto::TraceData>>, tonic::Status> {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static("/btrace_storage.Storage/GetServiceData");
        let mut req = request.into_request();
        req.extensions_mut()
            .insert(tonic::GrpcMethod::new(STORAGE_SERVICE, "GetServiceData"));
        self.inner.server_streaming(req, path, codec).await
    }

    async fn ready(&mut self) -> Result<(), tonic::Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| tonic::Status::unavailable(format!("storage service was not ready: {}", e)))
    }
}

/// Storage backend reached over gRPC.
#[derive(Debug, Clone)]
pub struct GrpcStorage {
    client: StorageClient,
    endpoint: String,
}

impl GrpcStorage {
    /// Build the shared channel without dialing. Connection failures surface
    /// per request as [`QueryError::Connection`].
    pub fn connect_lazy(config: &StorageConfig) -> anyhow::Result<Self> {
        let endpoint = config.endpoint();
        let channel = Endpoint::from_shared(endpoint.clone())?
            .connect_timeout(config.connect_timeout())
            .connect_lazy();

        Ok(Self {
            client: StorageClient::new(channel),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Classify a failure to open a streaming call.
fn call_error(status: tonic::Status) -> QueryError {
    let transport_failure = status
        .source()
        .is_some_and(|source| source.is::<tonic::transport::Error>());

    if transport_failure {
        QueryError::Connection(status.message().to_string())
    } else {
        QueryError::from_call_status(status)
    }
}

#[async_trait]
impl StorageBackend for GrpcStorage {
    async fn list_services(&self) -> Result<BoxRecordSource<proto::Service>, QueryError> {
        let mut client = self.client.clone();
        let stream = client
            .get_services(proto::Empty {})
            .await
            .map_err(call_error)?
            .into_inner();
        Ok(Box::new(stream))
    }

    async fn get_service_data(
        &self,
        name: &str,
    ) -> Result<BoxRecordSource<proto::TraceData>, QueryError> {
        let mut client = self.client.clone();
        let request = proto::ServiceName {
            name: name.to_string(),
        };
        let stream = client
            .get_service_data(request)
            .await
            .map_err(call_error)?
            .into_inner();
        Ok(Box::new(stream))
    }
}
