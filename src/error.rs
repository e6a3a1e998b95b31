// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Error type shared by every readback path.

use crate::engine::RequestId;
use crate::request::RequestState;

/// Errors reported by readback requests, the dispatcher and the queue.
///
/// Copy failures on the render thread never cross the thread boundary as control
/// flow. They are latched by the engine and surface here when the issuing thread
/// polls or reads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Neither the host nor the fallback copy engine can service a readback.
    #[error("asynchronous GPU readback is not supported on this platform")]
    UnsupportedPlatform,
    /// The copy failed after it was submitted.
    #[error("readback request {id:?} failed on the render thread")]
    RequestFailed { id: Option<RequestId> },
    /// Data was requested before the request reached `Done`.
    #[error("readback data requested while the request is {state:?}")]
    PrematureRead { state: RequestState },
    /// The request was already disposed.
    #[error("readback request used after dispose")]
    UseAfterDispose,
    /// The render command stream no longer accepts commands.
    #[error("render command stream is closed")]
    CommandStreamClosed,
    /// The render thread could not be started.
    #[error("failed to spawn render thread: {0}")]
    RenderThreadSpawn(String),
    /// The engine reported completion but has no bytes for the request.
    #[error("staging data for request {id:?} is unavailable")]
    StagingUnavailable { id: Option<RequestId> },
    /// The request stayed pending longer than the queue allows.
    #[error("readback request expired after {ticks} ticks")]
    Expired { ticks: u32 },
}
