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

//! Stream Drainer
//!
//! Turns an open server-streaming call into a lazy, fused sequence of records.
//! The sequence ends only when the source reports a clean end of stream or a
//! null payload; any other receive failure is returned as
//! [`QueryError::Stream`] and poisons the drainer.
//!
//! ```text
//! RecordSource::recv ─► StreamDrainer::next ─► Aggregate::fold
//!        ▲                     │
//!        └── idle timeout / cancellation token
//! ```

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::aggregate::Aggregate;
use crate::error::{QueryError, Result};

/// One receive outcome of a record source.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame<T> {
    Record(T),
    /// The backend delivered a message slot with no payload.
    Null,
    /// Clean end of stream.
    Eof,
}

/// A server-to-client stream of typed records.
#[async_trait]
pub trait RecordSource: Send {
    type Record: Send;

    /// Wait for the next frame. Suspends until the backend sends a record,
    /// ends the stream or the transport fails.
    async fn recv(&mut self) -> std::result::Result<Frame<Self::Record>, tonic::Status>;
}

pub type BoxRecordSource<T> = Box<dyn RecordSource<Record = T>>;

#[async_trait]
impl<T> RecordSource for tonic::codec::Streaming<T>
where
    T: Send + 'static,
{
    type Record = T;

    async fn recv(&mut self) -> std::result::Result<Frame<T>, tonic::Status> {
        Ok(match self.message().await? {
            Some(record) => Frame::Record(record),
            None => Frame::Eof,
        })
    }
}

#[async_trait]
impl<S> RecordSource for Box<S>
where
    S: RecordSource + ?Sized,
{
    type Record = S::Record;

    async fn recv(&mut self) -> std::result::Result<Frame<S::Record>, tonic::Status> {
        (**self).recv().await
    }
}

/// Why a drained sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    EndOfStream,
    NullRecord,
}

#[derive(Debug, PartialEq)]
pub enum Drained<T> {
    Record(T),
    Finished(Termination),
}

/// Caller-supplied limits for each receive.
#[derive(Debug, Clone, Default)]
pub struct DrainOptions {
    /// Maximum wait for a single record. `None` waits forever.
    pub idle_timeout: Option<Duration>,
    /// Aborts a pending receive when cancelled.
    pub cancel: Option<CancellationToken>,
}

impl DrainOptions {
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrainState {
    Open,
    Finished(Termination),
    Failed,
}

/// Counts and termination of a completed drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainSummary {
    pub records: usize,
    pub termination: Termination,
}

pub struct StreamDrainer<S: RecordSource> {
    source: S,
    options: DrainOptions,
    received: usize,
    state: DrainState,
}

impl<S: RecordSource> StreamDrainer<S> {
    pub fn new(source: S) -> Self {
        Self::with_options(source, DrainOptions::default())
    }

    pub fn with_options(source: S, options: DrainOptions) -> Self {
        Self {
            source,
            options,
            received: 0,
            state: DrainState::Open,
        }
    }

    /// Records yielded so far.
    pub fn received(&self) -> usize {
        self.received
    }

    /// Receive the next record, or the termination once the stream is done.
    ///
    /// Once finished every later call returns the same termination without
    /// touching the source. Once failed every later call fails.
    pub async fn next(&mut self) -> Result<Drained<S::Record>> {
        match self.state {
            DrainState::Finished(termination) => return Ok(Drained::Finished(termination)),
            DrainState::Failed => {
                return Err(QueryError::Stream {
                    received: self.received,
                    status: tonic::Status::aborted("stream drain already failed"),
                })
            }
            DrainState::Open => {}
        }

        let frame = match self.recv_frame().await {
            Ok(frame) => frame,
            Err(err) => {
                self.state = DrainState::Failed;
                return Err(err);
            }
        };

        match frame {
            Frame::Record(record) => {
                self.received += 1;
                Ok(Drained::Record(record))
            }
            Frame::Null => Ok(self.finish(Termination::NullRecord)),
            Frame::Eof => Ok(self.finish(Termination::EndOfStream)),
        }
    }

    fn finish(&mut self, termination: Termination) -> Drained<S::Record> {
        debug!(
            records = self.received,
            ?termination,
            "stream drained"
        );
        self.state = DrainState::Finished(termination);
        Drained::Finished(termination)
    }

    async fn recv_frame(&mut self) -> Result<Frame<S::Record>> {
        let Self {
            source,
            options,
            received,
            ..
        } = self;
        let received = *received;
        let idle_timeout = options.idle_timeout;

        let recv = async {
            let pending = source.recv();
            let outcome = match idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, pending).await {
                    Ok(outcome) => outcome,
                    Err(_) => return Err(QueryError::Timeout(limit)),
                },
                None => pending.await,
            };
            outcome.map_err(|status| QueryError::Stream { received, status })
        };

        match &options.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(QueryError::Cancelled),
                outcome = recv => outcome,
            },
            None => recv.await,
        }
    }
}

/// Drive `drainer` to completion, folding every record into `aggregate`.
///
/// On failure the partially built aggregate is dropped.
pub async fn drain_into<S, A>(
    mut drainer: StreamDrainer<S>,
    mut aggregate: A,
) -> Result<(A::Output, DrainSummary)>
where
    S: RecordSource,
    A: Aggregate<Record = S::Record>,
{
    loop {
        match drainer.next().await? {
            Drained::Record(record) => aggregate.fold(record),
            Drained::Finished(termination) => {
                let summary = DrainSummary {
                    records: drainer.received(),
                    termination,
                };
                return Ok((aggregate.finish(), summary));
            }
        }
    }
}
