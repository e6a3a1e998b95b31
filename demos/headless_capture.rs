//! Frame capture loop with the software copy engine.
//!
//! Mirrors how a game would capture frames: every frame it requests a readback
//! of the current frame texture while the queue has room, drains finished
//! readbacks from the head, and keeps every 60th delivered frame.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example headless_capture
//! ASYNC_READBACK_QUEUE_CAPACITY=2 cargo run --example headless_capture
//! ```

use async_gpu_readback::dispatch::Dispatcher;
use async_gpu_readback::engine::SoftwareCopyEngine;
use async_gpu_readback::texture::{TexelFormat, TextureDescriptor};
use async_gpu_readback::{Platform, ReadbackConfig, ReadbackQueue};
use std::sync::Arc;
use std::time::Duration;

const WIDTH: u32 = 320;
const HEIGHT: u32 = 180;
const FRAMES: u32 = 600;

fn render_frame(frame: u32) -> Vec<u8> {
    (0..WIDTH * HEIGHT)
        .flat_map(|i| {
            let x = (i % WIDTH) as u8;
            let y = (i / WIDTH) as u8;
            [x, y, frame as u8, 255]
        })
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ReadbackConfig::from_env_or_default();
    println!("capturing with {config:?}");

    // Copies take a few frames to land, like a real GPU.
    let engine = Arc::new(SoftwareCopyEngine::new().with_fence_latency(2));
    let descriptor = TextureDescriptor::new_2d(WIDTH, HEIGHT, TexelFormat::Rgba8Unorm);
    let frame_texture = engine.add_texture(descriptor, render_frame(0));

    let dispatcher = Dispatcher::threaded(engine.clone())?;
    let platform = Platform::new()
        .with_fallback(dispatcher.clone())
        .with_config(config);
    let mut queue = ReadbackQueue::with_config(platform.config());

    let mut delivered = 0u32;
    let mut saved = 0u32;
    let mut rejected = 0u32;
    for frame in 0..FRAMES {
        engine.write_level(frame_texture, 0, render_frame(frame));

        if queue.is_full() {
            rejected += 1;
        } else {
            queue
                .try_enqueue(platform.request(frame_texture)?)
                .map_err(|_| "queue refused a request it reported room for")?;
        }

        let report = queue.tick(|readback| {
            delivered += 1;
            if delivered % 60 == 0 {
                saved += 1;
                println!(
                    "frame {frame}: kept readback #{} ({} bytes, first texel {:?})",
                    readback.sequence,
                    readback.bytes.len(),
                    &readback.bytes[..4]
                );
            }
        });
        for error in report.errors {
            eprintln!("frame {frame}: readback failed: {error}");
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    println!("{delivered} readbacks delivered, {saved} kept, {rejected} frames skipped while the queue was full");
    queue.clear();
    test_executors::sleep_on(dispatcher.flush())?;
    Ok(())
}
