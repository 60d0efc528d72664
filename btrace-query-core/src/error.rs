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

//! Error taxonomy of the query layer.
//!
//! Every variant is scoped to the single request that produced it; nothing in
//! this crate aborts the process.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueryError>;

#[derive(Debug, Error)]
pub enum QueryError {
    /// The storage backend could not be reached when opening a call.
    #[error("storage backend unreachable: {0}")]
    Connection(String),

    /// A receive on an open stream failed for a reason other than a clean
    /// end of stream.
    #[error("stream failed after {received} records: {status}")]
    Stream {
        received: usize,
        #[source]
        status: tonic::Status,
    },

    /// No record arrived within the per-receive idle timeout, or the whole
    /// request ran past its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the drain.
    #[error("stream drain cancelled")]
    Cancelled,
}

impl QueryError {
    /// Classify a status returned while opening a streaming call.
    pub fn from_call_status(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::Unavailable => QueryError::Connection(status.message().to_string()),
            _ => QueryError::Stream {
                received: 0,
                status,
            },
        }
    }

    /// Taxonomy tag reported to HTTP clients.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::Connection(_) => "connection_error",
            QueryError::Stream { .. } => "stream_error",
            QueryError::Timeout(_) => "timeout",
            QueryError::Cancelled => "cancelled",
        }
    }
}
