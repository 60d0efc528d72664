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

//! Wire messages of the `btrace_storage.Storage` gRPC service.
//!
//! Kept in sync by hand with `proto/storage.proto`; the layout matches what
//! `prost-build` emits so the messages plug straight into tonic's
//! `ProstCodec`.

/// Request body of `GetServices`.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Empty {}

/// One record of the `GetServices` stream.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Service {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
}

/// Request body of `GetServiceData`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceName {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Timestamp {
    #[prost(string, tag = "1")]
    pub started: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub ended: ::prost::alloc::string::String,
    #[prost(float, tag = "3")]
    pub duration: f32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyValue {
    #[prost(string, tag = "1")]
    pub r#type: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub value: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Span {
    #[prost(string, tag = "1")]
    pub span_id: ::prost::alloc::string::String,
    /// Empty for root spans.
    #[prost(string, tag = "2")]
    pub parent_span_id: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub span_name: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "4")]
    pub timestamp: ::core::option::Option<Timestamp>,
    #[prost(message, repeated, tag = "5")]
    pub logs: ::prost::alloc::vec::Vec<KeyValue>,
}

/// One record of the `GetServiceData` stream: every span of one trace.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TraceData {
    #[prost(string, tag = "1")]
    pub trace_id: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub spans: ::prost::alloc::vec::Vec<Span>,
}

/// Fully qualified gRPC service name.
pub const STORAGE_SERVICE: &str = "btrace_storage.Storage";
