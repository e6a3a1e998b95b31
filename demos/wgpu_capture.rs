//! Reads a GPU texture back through the wgpu copy engine.
//!
//! Creates a device, fills a texture with a gradient, and reads it back without
//! blocking the thread that owns the request queue.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example wgpu_capture --features=backend_wgpu
//! ```

use async_gpu_readback::dispatch::Dispatcher;
use async_gpu_readback::{Platform, ReadbackQueue, WgpuCopyEngine};
use std::sync::Arc;
use std::time::Duration;

const WIDTH: u32 = 100;
const HEIGHT: u32 = 64;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    test_executors::sleep_on(run())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::from_env_or_default());
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions::default())
        .await?;
    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("wgpu_capture"),
            ..Default::default()
        })
        .await?;

    let size = wgpu::Extent3d {
        width: WIDTH,
        height: HEIGHT,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("gradient"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let gradient: Vec<u8> = (0..WIDTH * HEIGHT)
        .flat_map(|i| [(i % WIDTH) as u8, (i / WIDTH) as u8, 128, 255])
        .collect();
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &gradient,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(WIDTH * 4),
            rows_per_image: Some(HEIGHT),
        },
        size,
    );

    let engine = Arc::new(WgpuCopyEngine::new(device, queue));
    let handle = engine.register_texture(texture);
    let dispatcher = Dispatcher::threaded(engine)?;
    let platform = Platform::new().with_fallback(dispatcher.clone());

    let mut readbacks = ReadbackQueue::with_config(platform.config());
    readbacks
        .try_enqueue(platform.request(handle)?)
        .map_err(|_| "fresh queue is full")?;

    let mut frames = 0;
    while !readbacks.is_empty() {
        let report = readbacks.tick(|readback| {
            let matches = readback.bytes == gradient;
            println!(
                "read back {} bytes after {frames} frames; matches upload: {matches}",
                readback.bytes.len()
            );
        });
        for error in report.errors {
            eprintln!("readback failed: {error}");
        }
        frames += 1;
        portable_async_sleep::async_sleep(Duration::from_millis(16)).await;
    }
    dispatcher.flush().await?;
    Ok(())
}
