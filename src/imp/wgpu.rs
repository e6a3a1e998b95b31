// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
mod copy_engine;
mod texel_format;

pub use copy_engine::WgpuCopyEngine;
