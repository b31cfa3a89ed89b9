//! Example of a frame-driven effect system backed by a bounded `LocalUnitPool`.
//!
//! Each burst asks the pool for an effect with `try_take`. When the pool is exhausted the
//! burst is dropped instead of allocating, which keeps the cost of a busy frame bounded.
//! Effects enable themselves when taken and disable themselves when returned.

use std::cell::Cell;
use std::mem;

use unit_pool::{LocalPooledUnit, LocalUnitPool, UnitCallbacks};

const MAX_EFFECTS: usize = 3;
const EFFECT_FRAMES: u32 = 4;

#[derive(Debug)]
struct Effect {
    id: usize,
    enabled: Cell<bool>,
}

impl UnitCallbacks for Effect {
    fn on_taken(&self) {
        self.enabled.set(true);
    }

    fn on_returned(&self) {
        self.enabled.set(false);
    }
}

struct Playing {
    effect: LocalPooledUnit<Effect>,
    frames_left: u32,
}

struct EffectSystem {
    pool: LocalUnitPool<Effect>,
    playing: Vec<Playing>,
    dropped: usize,
}

impl EffectSystem {
    fn new() -> Self {
        let next_id = Cell::new(0_usize);

        let pool = LocalUnitPool::builder()
            .factory(move || {
                let id = next_id.get();
                next_id.set(id.wrapping_add(1));
                println!("  creating effect #{id}");
                Effect {
                    id,
                    enabled: Cell::new(false),
                }
            })
            .max_instances(MAX_EFFECTS)
            .unit_callbacks()
            .build();

        Self {
            pool,
            playing: Vec::new(),
            dropped: 0,
        }
    }

    fn burst(&mut self) {
        match self.pool.try_take() {
            Some(effect) => {
                println!("  playing effect #{}", effect.id);
                self.playing.push(Playing {
                    effect,
                    frames_left: EFFECT_FRAMES,
                });
            }
            None => self.dropped = self.dropped.saturating_add(1),
        }
    }

    fn tick(&mut self) {
        for playing in &mut self.playing {
            playing.frames_left = playing.frames_left.saturating_sub(1);
        }

        let (finished, still_playing): (Vec<_>, Vec<_>) = mem::take(&mut self.playing)
            .into_iter()
            .partition(|playing| playing.frames_left == 0);
        self.playing = still_playing;

        for playing in finished {
            println!("  effect #{} finished", playing.effect.id);
            playing
                .effect
                .return_to_pool()
                .expect("effects are only returned to their own pool");
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut system = EffectSystem::new();

    for frame in 0..10 {
        println!("frame {frame}");

        // Two bursts per frame for the first few frames.
        if frame < 4 {
            system.burst();
            system.burst();
        }

        system.tick();
    }

    println!(
        "effects created: {}, dropped bursts: {}, still playing: {}",
        system.pool.len(),
        system.dropped,
        system.playing.len()
    );

    assert!(system.pool.len() <= MAX_EFFECTS);
    assert!(
        system
            .playing
            .iter()
            .all(|playing| playing.effect.enabled.get())
    );
}
