//! Throughput and latency benchmark for the boundq primitives.
//!
//! Usage:
//!     cargo run --release --bin queue_bench
//!
//! Environment variables:
//!     PRODUCER_CPU=0  Pin producer to CPU 0 (default: 0)
//!     CONSUMER_CPU=2  Pin consumer to CPU 2 (default: 2)
//!     ITERATIONS=N    Items per run (default: 2^24)

use std::env;
use std::hint;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use boundq::{AtomicByteFifo, PoolConfig, WorkerPool, slot, spsc};
use crossbeam::queue::ArrayQueue;

const QUEUE_SIZE: usize = 1 << 16;
const DEFAULT_ITERATIONS: usize = 1 << 24;
const POOL_TASKS: usize = 1 << 20;

type Payload = u32;

fn get_cpu_affinity() -> (Option<usize>, Option<usize>) {
    let producer_cpu = env::var("PRODUCER_CPU")
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(0));
    let consumer_cpu = env::var("CONSUMER_CPU")
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(2));
    (producer_cpu, consumer_cpu)
}

fn iterations() -> usize {
    env::var("ITERATIONS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_ITERATIONS)
}

fn pin_to_cpu(cpu: Option<usize>) {
    if let Some(id) = cpu {
        boundq::topology::pin_to_core(id);
    }
}

fn report(name: &str, items: usize, elapsed: Duration) {
    let ops_per_ms = items as u128 * 1_000_000 / elapsed.as_nanos().max(1);
    println!("  {name:<12} {ops_per_ms} ops/ms");
}

/// Runs `produce` on the calling thread and `consume` on a pinned helper,
/// timing from the consumer's ready signal until both finish.
fn run_pair<P, C>(cpus: (Option<usize>, Option<usize>), produce: P, consume: C) -> Duration
where
    P: FnOnce(),
    C: FnOnce() + Send,
{
    let (producer_cpu, consumer_cpu) = cpus;
    let ready = AtomicBool::new(false);

    thread::scope(|s| {
        let consumer = s.spawn(|| {
            pin_to_cpu(consumer_cpu);
            ready.store(true, Ordering::Release);
            consume();
        });

        while !ready.load(Ordering::Acquire) {
            hint::spin_loop();
        }
        pin_to_cpu(producer_cpu);

        let start = Instant::now();
        produce();
        consumer.join().unwrap();
        start.elapsed()
    })
}

fn bench_spsc(cpus: (Option<usize>, Option<usize>), iters: usize) {
    let (producer, mut consumer) = spsc::channel::<Payload>(QUEUE_SIZE).unwrap();
    let elapsed = run_pair(
        cpus,
        || {
            for i in 0..iters as Payload {
                producer.push(i);
            }
        },
        move || {
            for expected in 0..iters as Payload {
                loop {
                    if let Some(value) = consumer.try_pop() {
                        assert_eq!(value, expected, "data corruption");
                        break;
                    }
                    hint::spin_loop();
                }
            }
        },
    );
    report("spsc", iters, elapsed);
}

fn bench_slot(cpus: (Option<usize>, Option<usize>), iters: usize) {
    let (producer, mut consumer) = slot::channel::<Payload>(QUEUE_SIZE).unwrap();
    let elapsed = run_pair(
        cpus,
        || {
            for i in 0..iters as Payload {
                let mut item = i;
                while let Err(back) = producer.try_push(item) {
                    item = back;
                    hint::spin_loop();
                }
            }
        },
        move || {
            for expected in 0..iters as Payload {
                loop {
                    if let Some(value) = consumer.pop() {
                        assert_eq!(value, expected, "data corruption");
                        break;
                    }
                    hint::spin_loop();
                }
            }
        },
    );
    report("slot", iters, elapsed);
}

fn bench_byte_fifo(cpus: (Option<usize>, Option<usize>), iters: usize) {
    let mut fifo = AtomicByteFifo::new(QUEUE_SIZE).unwrap();
    let (producer, consumer) = fifo.split();
    let elapsed = run_pair(
        cpus,
        || {
            for i in 0..iters as Payload {
                let bytes = i.to_le_bytes();
                let mut sent = 0;
                while sent < bytes.len() {
                    sent += producer.put(&bytes[sent..]);
                }
            }
        },
        move || {
            let mut bytes = [0u8; 4];
            for expected in 0..iters as Payload {
                let mut got = 0;
                while got < bytes.len() {
                    got += consumer.get(&mut bytes[got..]);
                }
                assert_eq!(Payload::from_le_bytes(bytes), expected, "data corruption");
            }
        },
    );
    report("byte fifo", iters, elapsed);
}

fn bench_array_queue(cpus: (Option<usize>, Option<usize>), iters: usize) {
    let queue = ArrayQueue::<Payload>::new(QUEUE_SIZE);
    let elapsed = run_pair(
        cpus,
        || {
            for i in 0..iters as Payload {
                let mut item = i;
                while let Err(back) = queue.push(item) {
                    item = back;
                    hint::spin_loop();
                }
            }
        },
        || {
            for expected in 0..iters as Payload {
                loop {
                    if let Some(value) = queue.pop() {
                        assert_eq!(value, expected, "data corruption");
                        break;
                    }
                    hint::spin_loop();
                }
            }
        },
    );
    report("array queue", iters, elapsed);
}

fn bench_spsc_rtt(cpus: (Option<usize>, Option<usize>), iters: usize) {
    let (q1_producer, mut q1_consumer) = spsc::channel::<Payload>(QUEUE_SIZE).unwrap();
    let (q2_producer, mut q2_consumer) = spsc::channel::<Payload>(QUEUE_SIZE).unwrap();
    let elapsed = run_pair(
        cpus,
        || {
            for i in 0..iters as Payload {
                q1_producer.push(i);
                while q2_consumer.try_pop().is_none() {
                    hint::spin_loop();
                }
            }
        },
        move || {
            for _ in 0..iters {
                loop {
                    if let Some(value) = q1_consumer.try_pop() {
                        q2_producer.push(value);
                        break;
                    }
                    hint::spin_loop();
                }
            }
        },
    );
    let rtt_ns = elapsed.as_nanos() / iters.max(1) as u128;
    println!("  {:<12} {rtt_ns} ns RTT", "spsc");
}

fn bench_pool(workers: usize) {
    let done = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&done);
    let pool = WorkerPool::new(
        PoolConfig::new(workers, 1024),
        move |task: usize, _worker: usize| {
            hint::black_box(task);
            counter.fetch_add(1, Ordering::Relaxed);
        },
    )
    .unwrap();

    let start = Instant::now();
    for task in 0..POOL_TASKS {
        let mut task = task;
        while let Err(back) = pool.push_task(task) {
            task = back;
            hint::spin_loop();
        }
    }
    while done.load(Ordering::Relaxed) < POOL_TASKS {
        thread::yield_now();
    }
    let elapsed = start.elapsed();

    report(&format!("pool x{workers}"), POOL_TASKS, elapsed);
    for snapshot in pool.stats() {
        println!(
            "    worker {}: processed {} forwarded {}",
            snapshot.worker, snapshot.processed, snapshot.forwarded
        );
    }
    pool.shutdown();
}

fn main() {
    boundq::init_tracing();

    let cpus = get_cpu_affinity();
    let iters = iterations();

    println!("boundq throughput (size={QUEUE_SIZE}, iters={iters}):");
    bench_spsc(cpus, iters);
    bench_slot(cpus, iters);
    bench_byte_fifo(cpus, iters);
    bench_array_queue(cpus, iters);

    println!("boundq latency:");
    bench_spsc_rtt(cpus, iters.min(1 << 20));

    println!("boundq worker pool ({POOL_TASKS} tasks):");
    for workers in [1, 2, 4] {
        bench_pool(workers);
    }
}
