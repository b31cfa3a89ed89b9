//! Concise example demonstrating both unit pool variants.
//!
//! This shows `LocalUnitPool` (single-threaded) and `UnitPool` (thread-safe) with the
//! essential take/return lifecycle of each.

use unit_pool::{LocalUnitPool, UnitPool};

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== LocalUnitPool ===");
    local();

    println!("\n=== UnitPool ===");
    thread_safe();
}

fn local() {
    // A bounded pool that creates units on demand.
    let pool = LocalUnitPool::builder()
        .factory(|| String::with_capacity(128))
        .max_instances(2)
        .build();

    let first = pool.take().expect("pool is empty, so a unit is created");
    let second = pool.take().expect("pool has room for a second unit");
    println!("Used: {} of {}", pool.used(), pool.len());

    // Full: `try_take` reports that instead of failing.
    println!("Third unit available: {}", pool.try_take().is_some());

    first
        .return_to_pool()
        .expect("unit belongs to this pool");

    // The most recently returned unit is reused.
    let reused = pool.take().expect("a returned unit is available");
    println!("Reused first unit: {}", reused.ptr_eq(&first));

    drop(second);
}

fn thread_safe() {
    let pool = UnitPool::builder()
        .factory(|| vec![0_u8; 4096])
        .pre_instantiate(2)
        .build();

    {
        // Returned automatically when the guard goes out of scope.
        let buffer = pool.take_scoped().expect("pool is unbounded");
        println!("Buffer size: {}", buffer.len());
        println!("Used while guarded: {}", pool.used());
    }

    println!("Used after scope: {}", pool.used());
}
