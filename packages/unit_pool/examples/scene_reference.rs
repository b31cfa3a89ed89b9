//! Example of lazily created pools that belong to a scene.
//!
//! A `PoolRef` describes a pool without creating it. The first time it is used with a
//! `PoolScope` the pool is built and registered in that scope. Tearing the scope down
//! destroys its pools, and the next scene gets fresh ones.

use unit_pool::{LocalUnitPool, PoolRef, PoolScope};

#[derive(Debug, Default)]
struct Projectile {
    position: (f32, f32),
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let projectiles = PoolRef::new(|| {
        LocalUnitPool::builder()
            .factory(Projectile::default)
            .pre_instantiate(4)
            .max_instances(8)
    });

    let scene = PoolScope::new();
    println!("pools before first use: {}", scene.len());

    // Subscribing resolves the reference, so this observer sees the very first take.
    let _subscription = projectiles.subscribe_taken(&scene, |pool, unit| {
        println!(
            "  projectile #{} fired, {} in flight",
            unit.index(),
            pool.used()
        );
    });
    println!("pools after subscribing: {}", scene.len());

    let volley: Vec<_> = (0..3)
        .map(|_| projectiles.take(&scene).expect("the pool has room"))
        .collect();

    for projectile in &volley {
        println!("  at {:?}", projectile.position);
        projectiles
            .return_unit(&scene, projectile)
            .expect("the projectile came from this scene");
    }

    println!("in flight after volley: {}", projectiles.used(&scene));

    scene.teardown();
    println!("pools after teardown: {}", scene.len());
    println!(
        "old projectile still attached: {}",
        volley.iter().any(|projectile| projectile.is_attached())
    );

    // Same scope, next scene: the reference builds a fresh pool.
    let fresh = projectiles.resolve(&scene);
    println!("fresh pool holds {} projectiles", fresh.len());
}
