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

//! btrace Query Core
//!
//! Streaming-to-aggregate translation for the btrace query gateway: drains
//! server-streamed storage records and folds them into the JSON aggregates
//! served over HTTP.

pub mod aggregate;
pub mod drain;
pub mod error;
pub mod model;
pub mod proto;

pub use aggregate::{Aggregate, ServiceDataBuilder, ServicesBuilder};
pub use drain::{
    drain_into, BoxRecordSource, DrainOptions, DrainSummary, Drained, Frame, RecordSource,
    StreamDrainer, Termination,
};
pub use error::{QueryError, Result};
pub use model::{KeyValue, ServiceDataAggregate, ServicesAggregate, Span, Timestamp};
