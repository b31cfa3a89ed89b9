//! Example of a `UnitPool` of scratch buffers shared by worker threads.
//!
//! Each worker takes a buffer for the duration of one job. Workers that find the pool
//! exhausted fall back to `take_aggressive`, which grows it past the configured maximum.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use unit_pool::UnitPool;

const WORKERS: usize = 4;
const JOBS_PER_WORKER: usize = 50;
const MAX_BUFFERS: usize = 2;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let pool = UnitPool::builder()
        .factory(|| vec![0_u64; 1024])
        .max_instances(MAX_BUFFERS)
        .build();

    let overflow = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let pool = pool.clone();
            let overflow = Arc::clone(&overflow);

            thread::spawn(move || {
                let mut checksum = 0_usize;

                for job in 0..JOBS_PER_WORKER {
                    let buffer = match pool.try_take_scoped() {
                        Some(buffer) => buffer,
                        None => {
                            overflow.fetch_add(1, Ordering::Relaxed);
                            pool.take_aggressive().into_guard()
                        }
                    };

                    checksum = checksum.wrapping_add(buffer.len()).wrapping_add(job);
                }

                println!("worker {worker} done, checksum {checksum}");
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("worker thread panicked");
    }

    println!(
        "buffers: {}, overflow takes: {}, in use: {}",
        pool.len(),
        overflow.load(Ordering::Relaxed),
        pool.used()
    );
}
