//! Tick driver demo
//!
//! This binary:
//! 1. Spawns `DEMO_ENTITIES` entities with a mix of components
//! 2. Subscribes a moving-entities system and a frozen-entities listener
//! 3. Runs `DEMO_TICKS` ticks of freeze/thaw churn, spawns and despawns
//! 4. Moves the `Frozen` component to a new bit halfway through

mod config;

use config::DemoConfig;
use rgb_tick::{Aspect, EntityId, EntityObserver, ListenerResult, Snapshot, World, listener_fn};
use tracing::{debug, info};

struct Position;
struct Velocity;
struct Frozen;

/// Observer standing in for a movement system.
struct MovementSystem {
    moving: usize,
}

impl EntityObserver for MovementSystem {
    fn inserted(&mut self, entities: &[EntityId], members: &[EntityId]) -> ListenerResult {
        self.moving = members.len();
        debug!(?entities, moving = self.moving, "started moving");
        Ok(())
    }

    fn removed(&mut self, entities: &[EntityId], members: &[EntityId]) -> ListenerResult {
        self.moving = members.len();
        debug!(?entities, moving = self.moving, "stopped moving");
        Ok(())
    }
}

fn main() -> eyre::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rgb_tick=info".parse()?)
                .add_directive("rgb_tick_demo=info".parse()?),
        )
        .init();

    let config = DemoConfig::from_env();
    info!(?config, "Starting tick demo");

    let mut world = World::with_capacity(config.entities as usize);
    let position = world.register::<Position>();
    let velocity = world.register::<Velocity>();
    let frozen = world.register::<Frozen>();

    for i in 0..config.entities {
        let entity = world.spawn();
        world.insert::<Position>(entity)?;
        if i % 2 == 0 {
            world.insert::<Velocity>(entity)?;
        }
    }
    world.tick()?;

    let moving = world.subscribe(
        &Aspect::builder()
            .all([position, velocity])
            .exclude([frozen]),
    )?;
    world
        .subscription_mut(moving)?
        .add_observer(MovementSystem { moving: 0 }, Snapshot::Replay)?;

    let frozen_set = world.subscribe(&Aspect::builder().all([frozen]))?;
    world.subscription_mut(frozen_set)?.add_listener(
        listener_fn(
            |ids| {
                info!(count = ids.len(), "frozen");
                Ok(())
            },
            |ids| {
                info!(count = ids.len(), "thawed");
                Ok(())
            },
        ),
        Snapshot::Skip,
    )?;

    for tick in 0..config.ticks {
        let stride = tick as usize + 2;
        let live: Vec<EntityId> = world.entities().to_vec();

        for &entity in live.iter().step_by(stride) {
            if world.has::<Frozen>(entity) {
                world.remove::<Frozen>(entity)?;
            } else {
                world.insert::<Frozen>(entity)?;
            }
        }

        if let Some(&oldest) = live.first() {
            world.despawn(oldest)?;
        }
        let newcomer = world.spawn();
        world.insert::<Position>(newcomer)?;
        world.insert::<Velocity>(newcomer)?;

        // Aspects keep the bits they were built with, so frozen entities
        // leave `frozen_set` and rejoin `moving` from here on.
        if tick == config.ticks / 2 {
            let bit = world.components().next_free();
            let old = world.reassign_component::<Frozen>(bit)?;
            info!(?old, new = ?bit, "moved Frozen");
        }

        world.tick()?;

        info!(
            tick = world.tick_count(),
            entities = world.entities().len(),
            moving = world.subscription(moving)?.len(),
            frozen = world.subscription(frozen_set)?.len(),
            "tick done"
        );
    }

    info!(?world, "Tick demo finished");
    Ok(())
}
