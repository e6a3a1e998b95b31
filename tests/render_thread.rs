// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Readbacks driven through a dedicated render thread.
#![cfg(not(target_arch = "wasm32"))]

mod common;

use async_gpu_readback::dispatch::{Dispatcher, RenderThread};
use async_gpu_readback::engine::{CopyEngine, SoftwareCopyEngine};
use async_gpu_readback::{Error, Platform, ReadbackQueue, RequestState};
use common::{ConformanceEngine, patterned_texture};
use std::sync::Arc;
use test_executors::async_test;

#[async_test]
async fn queue_drains_in_order_across_threads() {
    let engine = Arc::new(ConformanceEngine::new(SoftwareCopyEngine::new().with_fence_latency(1)));
    let textures: Vec<_> = (0..6u8)
        .map(|seed| patterned_texture(&engine.inner, 32, seed * 10))
        .collect();
    let dispatcher = Dispatcher::threaded(engine.clone()).unwrap();
    let platform = Platform::new().with_fallback(dispatcher.clone());

    let mut queue = ReadbackQueue::new(6);
    for (texture, _) in &textures {
        queue.try_enqueue(platform.request(*texture).unwrap()).unwrap();
    }

    let mut delivered = Vec::new();
    for _ in 0..64 {
        queue.tick(|r| delivered.push(r.bytes));
        dispatcher.flush().await.unwrap();
        if queue.is_empty() {
            break;
        }
    }
    assert!(queue.is_empty());
    let expected: Vec<Vec<u8>> = textures.into_iter().map(|(_, bytes)| bytes).collect();
    assert_eq!(delivered, expected);

    dispatcher.flush().await.unwrap();
    engine.assert_clean();
}

#[async_test]
async fn requests_complete_in_submission_order() {
    let engine = Arc::new(SoftwareCopyEngine::new());
    let (texture, _) = patterned_texture(&engine, 4, 0);
    let dispatcher = Dispatcher::threaded(engine.clone()).unwrap();
    let platform = Platform::new().with_fallback(dispatcher.clone());

    let mut requests: Vec<_> = (0..16).map(|_| platform.request(texture).unwrap()).collect();
    for request in &mut requests {
        request.advance();
    }
    dispatcher.flush().await.unwrap();
    for request in &requests {
        assert_eq!(request.poll(), RequestState::Done);
    }
    drop(requests);
    dispatcher.flush().await.unwrap();
    assert_eq!(engine.live_requests(), 0);
    assert_eq!(engine.disposed_requests(), 16);
}

#[test]
fn shutdown_closes_the_stream() {
    let engine = Arc::new(SoftwareCopyEngine::new());
    let (texture, _) = patterned_texture(&engine, 4, 0);
    let thread = Arc::new(RenderThread::spawn(engine.clone()).unwrap());
    let dispatcher = Dispatcher::new(engine.clone(), thread.clone());
    let platform = Platform::new().with_fallback(dispatcher.clone());

    let request = platform.request(texture).unwrap();
    thread.shutdown();
    assert_eq!(platform.request(texture).unwrap_err(), Error::CommandStreamClosed);
    assert_eq!(
        test_executors::sleep_on(dispatcher.flush()),
        Err(Error::CommandStreamClosed)
    );

    // The copy submitted before shutdown still ran.
    assert!(!engine.poll_error(request.id().unwrap()));
}
