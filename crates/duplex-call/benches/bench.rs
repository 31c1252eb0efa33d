use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use duplex_call::{DuplexCall, memory};
use std::time::Instant;
use tokio::runtime::Builder;

// Messages exchanged per benchmark iteration.
const MESSAGES: usize = 1024;

/// Spawns an echo peer and returns a call connected to it.
fn echo_call(
    buffer: usize,
) -> DuplexCall<memory::MemoryRequestTransport<u64>, memory::MemoryResponseTransport<u64>> {
    let (requests, responses, peer) = memory::pair::<u64, u64>(buffer);
    let (mut inbox, outbox) = peer.split();
    tokio::spawn(async move {
        while let Some(m) = inbox.recv().await {
            if outbox.send(m).await.is_err() {
                return;
            }
        }
        outbox.finish();
    });
    DuplexCall::new(requests, responses)
}

/// One request, one response, strictly alternating.
fn bench_ping_pong(c: &mut Criterion) {
    let rt = Builder::new_multi_thread().enable_all().build().unwrap();
    let mut group = c.benchmark_group("duplex/ping_pong");
    group.throughput(Throughput::Elements(MESSAGES as u64));

    group.bench_function(format!("elems/{MESSAGES}"), |b| {
        b.to_async(&rt).iter_custom(|iters| async move {
            let start = Instant::now();
            for _ in 0..iters {
                let call = echo_call(1);
                for i in 0..MESSAGES as u64 {
                    call.send(i).await.unwrap();
                    black_box(call.receive_next().await.unwrap());
                }
                call.half_close().await.unwrap();
                assert_eq!(call.receive_next().await.unwrap(), None);
            }
            start.elapsed()
        });
    });

    group.finish();
}

/// Sender and receiver on separate tasks, pipelined through the buffers.
fn bench_pipelined(c: &mut Criterion) {
    let rt = Builder::new_multi_thread().enable_all().build().unwrap();

    for buffer in [1, 16, 256] {
        let mut group = c.benchmark_group("duplex/pipelined");
        group.throughput(Throughput::Elements(MESSAGES as u64));

        group.bench_function(format!("elems/{MESSAGES}/buffer/{buffer}"), |b| {
            b.to_async(&rt).iter_custom(|iters| async move {
                let start = Instant::now();
                for _ in 0..iters {
                    let call = echo_call(buffer);
                    let (sink, source) = call.into_parts();
                    let sender = tokio::spawn(async move {
                        for i in 0..MESSAGES as u64 {
                            sink.send(i).await.unwrap();
                        }
                        sink.half_close().await.unwrap();
                    });
                    while let Some(m) = source.receive_next().await.unwrap() {
                        black_box(m);
                    }
                    sender.await.unwrap();
                }
                start.elapsed()
            });
        });

        group.finish();
    }
}

criterion_group!(benches, bench_ping_pong, bench_pipelined);
criterion_main!(benches);
