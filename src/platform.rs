// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Backend selection.

use crate::Error;
use crate::config::ReadbackConfig;
use crate::dispatch::Dispatcher;
use crate::engine::DeviceEvent;
use crate::host::HostReadback;
use crate::request::{BackendKind, ReadbackRequest};
use crate::texture::TextureHandle;
use std::fmt::Debug;
use std::sync::Arc;

/// The readback capabilities available to the application.
///
/// A platform may carry the host's native readback, a fallback copy engine, both
/// or neither. Each new request picks the host readback when the host supports
/// it, otherwise the fallback when its engine probes compatible.
#[derive(Clone, Default)]
pub struct Platform {
    host: Option<Arc<dyn HostReadback>>,
    fallback: Option<Dispatcher>,
    config: ReadbackConfig,
}

impl Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("host", &self.host.is_some())
            .field("fallback", &self.fallback)
            .field("config", &self.config)
            .finish()
    }
}

impl Platform {
    /// A platform with no readback support and default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: Arc<dyn HostReadback>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_fallback(mut self, dispatcher: Dispatcher) -> Self {
        self.fallback = Some(dispatcher);
        self
    }

    pub fn with_config(mut self, config: ReadbackConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ReadbackConfig {
        &self.config
    }

    pub(crate) fn host(&self) -> Option<&Arc<dyn HostReadback>> {
        self.host.as_ref()
    }

    pub(crate) fn fallback(&self) -> Option<&Dispatcher> {
        self.fallback.as_ref()
    }

    /// Whether the host's own asynchronous readback is available.
    pub fn supports_async_readback(&self) -> bool {
        self.host.as_ref().is_some_and(|h| h.supports_async_readback())
    }

    /// The backend a request created now would use.
    pub fn selected_backend(&self) -> Option<BackendKind> {
        if self.supports_async_readback() {
            Some(BackendKind::HostNative)
        } else if self.fallback.as_ref().is_some_and(Dispatcher::is_compatible) {
            Some(BackendKind::NativeFallback)
        } else {
            None
        }
    }

    /// Reads back the configured mip level of `texture`.
    pub fn request(&self, texture: TextureHandle) -> Result<ReadbackRequest, Error> {
        self.request_level(texture, self.config.mip_level)
    }

    /// Reads back `mip_level` of `texture`.
    pub fn request_level(&self, texture: TextureHandle, mip_level: u32) -> Result<ReadbackRequest, Error> {
        let request = ReadbackRequest::create(self, texture, mip_level);
        match request.failure() {
            Some(e) => Err(e.clone()),
            None => Ok(request),
        }
    }

    /// Forwards a device lifecycle event to the fallback engine.
    pub fn device_event(&self, event: DeviceEvent) {
        logwise::info_sync!("device event {event}", event = logwise::privacy::LogIt(&event));
        if let Some(fallback) = &self.fallback {
            fallback.device_event(event);
        }
    }
}
