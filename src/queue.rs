// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Bounded FIFO of outstanding readbacks.

[`ReadbackQueue`] throttles how much readback work is in flight. Producers
offer new requests with [`ReadbackQueue::try_enqueue`], which refuses instead
of blocking when the queue is full. Once per frame the owner calls
[`ReadbackQueue::tick`], which looks only at the head:

* `Error`: the failure is reported and the head is disposed and dequeued.
* `Done`: the bytes go to the consumer, then the head is disposed and dequeued.
* `Pending`: the tick stops, leaving later requests untouched even if they
  have already finished. Results are delivered in request order.

A head that stays pending past the configured maximum age is expired and
disposed, so one lost fence cannot wedge the queue forever.

```
use async_gpu_readback::{Platform, ReadbackQueue};
use async_gpu_readback::dispatch::Dispatcher;
use async_gpu_readback::engine::SoftwareCopyEngine;
use async_gpu_readback::texture::{TexelFormat, TextureDescriptor};
use std::sync::Arc;

let engine = Arc::new(SoftwareCopyEngine::new());
let texture = engine.add_texture(TextureDescriptor::new_2d(1, 1, TexelFormat::Rgba8Unorm), vec![1, 2, 3, 4]);
let (dispatcher, render_queue) = Dispatcher::host_driven(engine);
let platform = Platform::new().with_fallback(dispatcher);

let mut queue = ReadbackQueue::new(2);
queue.try_enqueue(platform.request(texture).unwrap()).unwrap();

let mut frames = Vec::new();
for _ in 0..2 {
    queue.tick(|readback| frames.push(readback.bytes));
    render_queue.execute_pending();
}
assert_eq!(frames, vec![vec![1, 2, 3, 4]]);
assert!(queue.is_empty());
```
*/

use crate::Error;
use crate::config::ReadbackConfig;
use crate::request::{BackendKind, ReadbackRequest, RequestState};
use crate::sys::time::Duration;
use std::collections::VecDeque;

/// A request refused by a full queue, handed back to the caller.
#[derive(Debug)]
pub struct QueueFull(pub ReadbackRequest);

impl QueueFull {
    pub fn into_inner(self) -> ReadbackRequest {
        self.0
    }
}

/// Data delivered to a tick's consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readback {
    pub sequence: u64,
    pub backend: BackendKind,
    pub bytes: Vec<u8>,
}

/// What one [`ReadbackQueue::tick`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Requests delivered to the consumer.
    pub completed: usize,
    /// Requests that errored, or whose data could not be read.
    pub failed: usize,
    /// Requests expired while pending.
    pub expired: usize,
    /// Requests still queued after the tick.
    pub outstanding: usize,
    /// Errors for every failed and expired request, in queue order.
    pub errors: Vec<Error>,
}

#[derive(Debug)]
pub struct ReadbackQueue {
    entries: VecDeque<ReadbackRequest>,
    capacity: usize,
    max_pending_ticks: Option<u32>,
    max_pending_age: Option<Duration>,
    force_host_update: bool,
}

impl ReadbackQueue {
    /// A queue admitting at most `capacity` requests, with no maximum age.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        ReadbackQueue {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            max_pending_ticks: None,
            max_pending_age: None,
            force_host_update: false,
        }
    }

    pub fn with_config(config: &ReadbackConfig) -> Self {
        let mut queue = ReadbackQueue::new(config.queue_capacity);
        queue.max_pending_ticks = config.max_pending_ticks;
        queue.max_pending_age = config.max_pending_age;
        queue.force_host_update = config.force_host_update;
        queue
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Appends `request`, or hands it back if the queue is full.
    pub fn try_enqueue(&mut self, request: ReadbackRequest) -> Result<(), QueueFull> {
        if self.is_full() {
            logwise::warn_sync!(
                "readback queue full ({capacity} outstanding); request {sequence} rejected",
                capacity = self.capacity,
                sequence = request.sequence()
            );
            return Err(QueueFull(request));
        }
        self.entries.push_back(request);
        Ok(())
    }

    /// Drains finished requests from the head, delivering data to `consumer`.
    pub fn tick(&mut self, mut consumer: impl FnMut(Readback)) -> TickReport {
        let mut report = TickReport::default();
        let (max_ticks, max_age) = (self.max_pending_ticks, self.max_pending_age);
        while let Some(head) = self.entries.front_mut() {
            head.advance_with(self.force_host_update);
            match head.poll() {
                RequestState::Pending => {
                    let expired = max_ticks.is_some_and(|max| head.pending_ticks() > max)
                        || max_age.is_some_and(|max| head.age() > max);
                    if !expired {
                        break;
                    }
                    let ticks = head.pending_ticks();
                    logwise::error_sync!(
                        "readback request {sequence} expired after {ticks} ticks",
                        sequence = head.sequence(),
                        ticks = ticks
                    );
                    report.expired += 1;
                    report.errors.push(Error::Expired { ticks });
                }
                RequestState::Error => {
                    let error = head.error();
                    logwise::warn_sync!(
                        "readback request {sequence} failed: {err}",
                        sequence = head.sequence(),
                        err = logwise::privacy::LogIt(&error)
                    );
                    report.failed += 1;
                    report.errors.push(error);
                }
                RequestState::Done => {
                    let sequence = head.sequence();
                    let delivered = head
                        .ready()
                        .map(|ready| (ready.backend(), ready.read_raw()));
                    match delivered {
                        Some((Some(backend), Ok(bytes))) => {
                            consumer(Readback {
                                sequence,
                                backend,
                                bytes,
                            });
                            report.completed += 1;
                        }
                        Some((_, Err(e))) => {
                            logwise::warn_sync!(
                                "readback request {sequence} finished without data: {err}",
                                sequence = sequence,
                                err = logwise::privacy::LogIt(&e)
                            );
                            report.failed += 1;
                            report.errors.push(e);
                        }
                        _ => {
                            report.failed += 1;
                            report.errors.push(Error::RequestFailed { id: head.id() });
                        }
                    }
                }
            }
            if let Some(mut head) = self.entries.pop_front() {
                head.dispose();
            }
        }
        report.outstanding = self.entries.len();
        report
    }

    /// Disposes every queued request.
    pub fn clear(&mut self) {
        for mut request in self.entries.drain(..) {
            request.dispose();
        }
    }
}

impl Drop for ReadbackQueue {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Platform;
    use crate::dispatch::Dispatcher;
    use crate::engine::{SoftwareCopyEngine, TextureFault};
    use crate::host::{HostReadback, HostRequest};
    use crate::texture::{TexelFormat, TextureDescriptor, TextureHandle};
    use std::sync::Arc;

    #[test]
    fn stuck_head_expires() {
        let engine = Arc::new(SoftwareCopyEngine::new());
        let texture = engine.add_texture(TextureDescriptor::new_2d(1, 1, TexelFormat::R8Unorm), vec![1]);
        engine.set_fault(texture, Some(TextureFault::Stall));
        let (dispatcher, render_queue) = Dispatcher::host_driven(engine.clone());
        let platform = Platform::new().with_fallback(dispatcher);

        let config = ReadbackConfig {
            max_pending_ticks: Some(3),
            ..ReadbackConfig::default()
        };
        let mut queue = ReadbackQueue::with_config(&config);
        queue.try_enqueue(platform.request(texture).unwrap()).unwrap();

        let mut reports = Vec::new();
        for _ in 0..4 {
            reports.push(queue.tick(|_| panic!("stalled copy delivered data")));
            render_queue.execute_pending();
        }
        assert!(reports[..3].iter().all(|r| r.expired == 0 && r.outstanding == 1));
        assert_eq!(reports[3].expired, 1);
        assert_eq!(reports[3].errors, vec![Error::Expired { ticks: 4 }]);
        assert!(queue.is_empty());
        render_queue.execute_pending();
        assert_eq!(engine.live_requests(), 0);
    }

    #[test]
    #[cfg(not(target_arch = "wasm32"))]
    fn stuck_head_expires_by_age() {
        let engine = Arc::new(SoftwareCopyEngine::new());
        let texture = engine.add_texture(TextureDescriptor::new_2d(1, 1, TexelFormat::R8Unorm), vec![1]);
        engine.set_fault(texture, Some(TextureFault::Stall));
        let (dispatcher, render_queue) = Dispatcher::host_driven(engine.clone());
        let platform = Platform::new().with_fallback(dispatcher);

        let config = ReadbackConfig {
            max_pending_ticks: None,
            max_pending_age: Some(Duration::from_millis(5)),
            ..ReadbackConfig::default()
        };
        let mut queue = ReadbackQueue::with_config(&config);
        queue.try_enqueue(platform.request(texture).unwrap()).unwrap();
        render_queue.execute_pending();

        std::thread::sleep(Duration::from_millis(20));
        let report = queue.tick(|_| panic!("stalled copy delivered data"));
        assert_eq!(report.expired, 1);
        assert_eq!(report.errors, vec![Error::Expired { ticks: 1 }]);
        assert!(queue.is_empty());
        render_queue.execute_pending();
        assert_eq!(engine.live_requests(), 0);
    }

    /// A host readback that only notices completion when asked to update.
    struct LazyHost;

    struct LazyRequest {
        checked: bool,
    }

    impl HostReadback for LazyHost {
        fn supports_async_readback(&self) -> bool {
            true
        }
        fn request(&self, _texture: TextureHandle, _mip_level: u32) -> Box<dyn HostRequest> {
            Box::new(LazyRequest { checked: false })
        }
    }

    impl HostRequest for LazyRequest {
        fn done(&self) -> bool {
            self.checked
        }
        fn has_error(&self) -> bool {
            false
        }
        fn data(&self) -> Vec<u8> {
            vec![9, 8, 7]
        }
        fn update(&mut self) {
            self.checked = true;
        }
    }

    #[test]
    fn forced_host_update_is_driven_by_tick() {
        let platform = Platform::new().with_host(Arc::new(LazyHost));
        let texture = TextureHandle::new(5);

        let mut unforced = ReadbackQueue::with_config(&ReadbackConfig::default());
        unforced.try_enqueue(platform.request(texture).unwrap()).unwrap();
        for _ in 0..3 {
            let report = unforced.tick(|_| panic!("host request completed without an update"));
            assert_eq!(report.outstanding, 1);
        }

        let config = ReadbackConfig {
            force_host_update: true,
            ..ReadbackConfig::default()
        };
        let mut forced = ReadbackQueue::with_config(&config);
        forced.try_enqueue(platform.request(texture).unwrap()).unwrap();
        let mut delivered = Vec::new();
        let report = forced.tick(|r| delivered.push(r));
        assert_eq!(report.completed, 1);
        assert_eq!(delivered[0].backend, BackendKind::HostNative);
        assert_eq!(delivered[0].bytes, vec![9, 8, 7]);
    }

    #[test]
    fn zero_capacity_admits_one() {
        let queue = ReadbackQueue::new(0);
        assert_eq!(queue.capacity(), 1);
    }
}
