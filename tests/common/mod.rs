// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use async_gpu_readback::engine::{
    CopyEngine, DeviceEvent, FetchConvention, RenderContext, RequestId, SoftwareCopyEngine,
};
use async_gpu_readback::texture::{TexelFormat, TextureDescriptor, TextureHandle};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Wraps [`SoftwareCopyEngine`] and records every protocol violation it sees:
/// a second dispose of an id, or any use of an id after its dispose.
#[derive(Debug)]
pub struct ConformanceEngine {
    pub inner: SoftwareCopyEngine,
    disposed: Mutex<HashSet<RequestId>>,
    dispose_counts: Mutex<HashMap<RequestId, usize>>,
    violations: Mutex<Vec<String>>,
}

impl ConformanceEngine {
    pub fn new(inner: SoftwareCopyEngine) -> Self {
        ConformanceEngine {
            inner,
            disposed: Mutex::new(HashSet::new()),
            dispose_counts: Mutex::new(HashMap::new()),
            violations: Mutex::new(Vec::new()),
        }
    }

    fn check_live(&self, what: &str, id: RequestId) {
        if self.disposed.lock().unwrap().contains(&id) {
            self.violations
                .lock()
                .unwrap()
                .push(format!("{what} of {id:?} after dispose"));
        }
    }

    pub fn violations(&self) -> Vec<String> {
        self.violations.lock().unwrap().clone()
    }

    pub fn dispose_count(&self, id: RequestId) -> usize {
        self.dispose_counts.lock().unwrap().get(&id).copied().unwrap_or(0)
    }

    pub fn assert_clean(&self) {
        assert_eq!(self.violations(), Vec::<String>::new());
        assert_eq!(self.inner.live_requests(), 0, "requests leaked");
    }
}

impl CopyEngine for ConformanceEngine {
    fn probe_compatibility(&self) -> bool {
        self.inner.probe_compatibility()
    }
    fn submit_copy(&self, texture: TextureHandle, mip_level: u32) -> RequestId {
        self.inner.submit_copy(texture, mip_level)
    }
    fn cancel_copy(&self, id: RequestId) {
        self.check_live("cancel", id);
        self.disposed.lock().unwrap().insert(id);
        self.inner.cancel_copy(id)
    }
    fn execute_copy(&self, ctx: &RenderContext, id: RequestId) {
        self.check_live("execute", id);
        self.inner.execute_copy(ctx, id)
    }
    fn update(&self, ctx: &RenderContext, id: RequestId) {
        self.check_live("update", id);
        self.inner.update(ctx, id)
    }
    fn dispose(&self, ctx: &RenderContext, id: RequestId) {
        self.check_live("dispose", id);
        *self.dispose_counts.lock().unwrap().entry(id).or_default() += 1;
        self.disposed.lock().unwrap().insert(id);
        self.inner.dispose(ctx, id)
    }
    fn poll_done(&self, id: RequestId) -> bool {
        self.inner.poll_done(id)
    }
    fn poll_error(&self, id: RequestId) -> bool {
        self.inner.poll_error(id)
    }
    fn fetch_convention(&self) -> FetchConvention {
        self.inner.fetch_convention()
    }
    fn staged_len(&self, id: RequestId) -> Option<usize> {
        self.check_live("staged_len", id);
        self.inner.staged_len(id)
    }
    fn fetch_borrowed(&self, id: RequestId, visit: &mut dyn FnMut(&[u8])) -> bool {
        self.check_live("fetch", id);
        self.inner.fetch_borrowed(id, visit)
    }
    fn fetch_into(&self, id: RequestId, buffer: &mut [u8]) -> Option<usize> {
        self.check_live("fetch", id);
        self.inner.fetch_into(id, buffer)
    }
    fn device_event(&self, event: DeviceEvent) {
        self.inner.device_event(event)
    }
}

/// A one-row R8 texture whose bytes are `0, 1, 2, ...` offset by `seed`.
pub fn patterned_texture(engine: &SoftwareCopyEngine, len: u32, seed: u8) -> (TextureHandle, Vec<u8>) {
    let bytes: Vec<u8> = (0..len).map(|i| (i as u8).wrapping_add(seed)).collect();
    let texture = engine.add_texture(TextureDescriptor::new_2d(len, 1, TexelFormat::R8Unorm), bytes.clone());
    (texture, bytes)
}
