// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Readback request handles.

A [`ReadbackRequest`] wraps one readback behind a uniform polling surface,
whichever backend services it:

* [`BackendKind::HostNative`] delegates to the host's own asynchronous readback.
* [`BackendKind::NativeFallback`] drives a copy engine through a
  [`Dispatcher`](crate::dispatch::Dispatcher).

The backend is chosen once, when the request is created, and never changes.

# Lifecycle

```text
Created -> Pending -> Done  -> Disposed
                   \-> Error -> Disposed
```

`Done` and `Error` are latched: once observed, [`ReadbackRequest::poll`] keeps
returning them. Both still need disposal, which happens exactly once, either
through [`ReadbackRequest::dispose`] or when the handle is dropped.

# Reading data

Bytes are available only in `Done`. [`ReadbackRequest::ready`] hands out a
[`Ready`] witness that exists only for a completed request; reading through
[`ReadbackRequest::read_raw`] instead fails fast with
[`Error::PrematureRead`] while the request is still pending.

```
use async_gpu_readback::{Platform, RequestState};
use async_gpu_readback::dispatch::Dispatcher;
use async_gpu_readback::engine::SoftwareCopyEngine;
use async_gpu_readback::texture::{TexelFormat, TextureDescriptor};
use std::sync::Arc;

let engine = Arc::new(SoftwareCopyEngine::new());
let texture = engine.add_texture(TextureDescriptor::new_2d(2, 1, TexelFormat::R8Unorm), vec![7, 9]);
let (dispatcher, render_queue) = Dispatcher::host_driven(engine);
let platform = Platform::new().with_fallback(dispatcher);

let mut request = platform.request(texture).unwrap();
assert_eq!(request.poll(), RequestState::Pending);
request.advance();
render_queue.execute_pending();
let ready = request.ready().expect("copy finished");
assert_eq!(ready.read_raw().unwrap(), vec![7, 9]);
request.dispose();
```
*/

use crate::Error;
use crate::dispatch::Dispatcher;
use crate::engine::RequestId;
use crate::host::HostRequest;
use crate::platform::Platform;
use crate::sys::time::{Duration, Instant};
use crate::texture::TextureHandle;
use std::cell::Cell;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

/// Which implementation services a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    HostNative,
    NativeFallback,
}

/// Observable state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    Pending,
    Done,
    Error,
}

enum Backend {
    Host(Box<dyn HostRequest>),
    Fallback { dispatcher: Dispatcher, id: RequestId },
    Unsupported,
}

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Handle to one readback.
pub struct ReadbackRequest {
    backend: Backend,
    failure: Option<Error>,
    latched: Cell<Option<RequestState>>,
    disposed: bool,
    pending_ticks: u32,
    created: Instant,
    sequence: u64,
}

impl Debug for ReadbackRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadbackRequest")
            .field("sequence", &self.sequence)
            .field("backend", &self.backend())
            .field("id", &self.id())
            .field("latched", &self.latched.get())
            .field("disposed", &self.disposed)
            .field("failure", &self.failure)
            .finish()
    }
}

impl ReadbackRequest {
    fn with_backend(backend: Backend, failure: Option<Error>) -> Self {
        ReadbackRequest {
            backend,
            failure,
            latched: Cell::new(None),
            disposed: false,
            pending_ticks: 0,
            created: Instant::now(),
            sequence: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn failed(error: Error) -> Self {
        Self::with_backend(Backend::Unsupported, Some(error))
    }

    /// Starts a readback of `mip_level` of `texture`.
    ///
    /// Prefers the host's native readback, falls back to the platform's copy
    /// engine, and otherwise returns a handle that is already failed: it polls
    /// `Error` and [`ReadbackRequest::failure`] reports why. With the fallback
    /// this submits the copy command, so call it from the thread that owns the
    /// request queue.
    pub fn create(platform: &Platform, texture: TextureHandle, mip_level: u32) -> Self {
        if let Some(host) = platform.host() {
            if host.supports_async_readback() {
                return Self::with_backend(Backend::Host(host.request(texture, mip_level)), None);
            }
        }
        if let Some(dispatcher) = platform.fallback() {
            if dispatcher.is_compatible() {
                return match dispatcher.make_request(texture, mip_level) {
                    Ok(id) => Self::with_backend(
                        Backend::Fallback {
                            dispatcher: dispatcher.clone(),
                            id,
                        },
                        None,
                    ),
                    Err(e) => {
                        logwise::error_sync!(
                            "readback of {texture} could not be scheduled: {err}",
                            texture = logwise::privacy::LogIt(&texture),
                            err = logwise::privacy::LogIt(&e)
                        );
                        Self::failed(e)
                    }
                };
            }
        }
        logwise::error_sync!(
            "asynchronous GPU readback is not supported on this platform; readback of {texture} will fail",
            texture = logwise::privacy::LogIt(&texture)
        );
        Self::failed(Error::UnsupportedPlatform)
    }

    /// The backend servicing this request, or `None` if it could not be created.
    pub fn backend(&self) -> Option<BackendKind> {
        match self.backend {
            Backend::Host(_) => Some(BackendKind::HostNative),
            Backend::Fallback { .. } => Some(BackendKind::NativeFallback),
            Backend::Unsupported => None,
        }
    }

    /// The engine id of a fallback request.
    pub fn id(&self) -> Option<RequestId> {
        match self.backend {
            Backend::Fallback { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Why the request failed before reaching the GPU, if it did.
    pub fn failure(&self) -> Option<&Error> {
        self.failure.as_ref()
    }

    /// Creation order across all requests in the process.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Advances made while the request was pending.
    pub fn pending_ticks(&self) -> u32 {
        self.pending_ticks
    }

    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Current state. Never blocks.
    ///
    /// A request disposed before reaching a terminal state reports `Error`.
    pub fn poll(&self) -> RequestState {
        if let Some(state) = self.latched.get() {
            return state;
        }
        if self.disposed || self.failure.is_some() {
            return RequestState::Error;
        }
        let observed = match &self.backend {
            Backend::Host(request) => {
                if request.has_error() {
                    RequestState::Error
                } else if request.done() {
                    RequestState::Done
                } else {
                    RequestState::Pending
                }
            }
            Backend::Fallback { dispatcher, id } => {
                if dispatcher.poll_error(*id) {
                    RequestState::Error
                } else if dispatcher.poll_done(*id) {
                    RequestState::Done
                } else {
                    RequestState::Pending
                }
            }
            Backend::Unsupported => RequestState::Error,
        };
        if observed != RequestState::Pending {
            logwise::trace_sync!(
                "request {sequence} is {state}",
                sequence = self.sequence,
                state = logwise::privacy::LogIt(&observed)
            );
            self.latched.set(Some(observed));
        }
        observed
    }

    /// Moves the request along. Call once per tick while it is pending.
    ///
    /// For the fallback this schedules a fence check on the render thread. For
    /// the host backend it does nothing; see [`ReadbackRequest::advance_forced`].
    pub fn advance(&mut self) {
        self.advance_with(false);
    }

    /// Like [`ReadbackRequest::advance`], but also asks a host readback to check
    /// for completion immediately.
    pub fn advance_forced(&mut self) {
        self.advance_with(true);
    }

    pub(crate) fn advance_with(&mut self, force: bool) {
        if self.disposed {
            logwise::trace_sync!("advance of disposed request {sequence} ignored", sequence = self.sequence);
            return;
        }
        if self.latched.get().is_some() || self.failure.is_some() {
            return;
        }
        self.pending_ticks = self.pending_ticks.saturating_add(1);
        match &mut self.backend {
            Backend::Host(request) => {
                if force {
                    request.update();
                }
            }
            Backend::Fallback { dispatcher, id } => {
                if let Err(e) = dispatcher.advance(*id) {
                    self.failure = Some(e);
                }
            }
            Backend::Unsupported => {}
        }
    }

    /// A witness for reading the data, available only once the request is `Done`.
    pub fn ready(&mut self) -> Option<Ready<'_>> {
        if self.disposed || self.poll() != RequestState::Done {
            return None;
        }
        Some(Ready { request: self })
    }

    /// Copies the read-back bytes out of the backend.
    ///
    /// Fails with [`Error::PrematureRead`] while pending, with the request's
    /// failure once it errored, and with [`Error::UseAfterDispose`] after disposal.
    pub fn read_raw(&self) -> Result<Vec<u8>, Error> {
        if self.disposed {
            return Err(Error::UseAfterDispose);
        }
        match self.poll() {
            RequestState::Done => self.fetch(),
            RequestState::Pending => Err(Error::PrematureRead {
                state: RequestState::Pending,
            }),
            RequestState::Error => Err(self.error()),
        }
    }

    /// The error a failed request reports.
    pub(crate) fn error(&self) -> Error {
        self.failure
            .clone()
            .unwrap_or(Error::RequestFailed { id: self.id() })
    }

    fn fetch(&self) -> Result<Vec<u8>, Error> {
        match &self.backend {
            Backend::Host(request) => Ok(request.data()),
            Backend::Fallback { dispatcher, id } => dispatcher
                .fetch_data(*id)
                .ok_or(Error::StagingUnavailable { id: Some(*id) }),
            Backend::Unsupported => Err(self.error()),
        }
    }

    /// Releases the backend's resources. Returns false if already disposed.
    pub fn dispose(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        self.disposed = true;
        if let Backend::Fallback { dispatcher, id } = &self.backend {
            if let Err(e) = dispatcher.dispose(*id) {
                logwise::warn_sync!(
                    "dispose of request {sequence} was not delivered: {err}",
                    sequence = self.sequence,
                    err = logwise::privacy::LogIt(&e)
                );
            }
        }
        logwise::trace_sync!("request {sequence} disposed", sequence = self.sequence);
        true
    }
}

impl Drop for ReadbackRequest {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }
        if self.poll() == RequestState::Pending {
            logwise::warn_sync!(
                "request {sequence} dropped while still pending",
                sequence = self.sequence
            );
        }
        self.dispose();
    }
}

/// Proof that a request is `Done` and not disposed.
#[derive(Debug)]
pub struct Ready<'a> {
    request: &'a ReadbackRequest,
}

impl Ready<'_> {
    /// Copies the read-back bytes, sized to the readback length.
    pub fn read_raw(&self) -> Result<Vec<u8>, Error> {
        self.request.fetch()
    }

    pub fn backend(&self) -> Option<BackendKind> {
        self.request.backend()
    }

    pub fn sequence(&self) -> u64 {
        self.request.sequence
    }
}
