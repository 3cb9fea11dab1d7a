//! Integration tests for rgb-subscription

use std::sync::Arc;

use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rgb_subscription::prelude::*;
use rgb_subscription::{Compositions, FixedBitSet, ListenerResult};

// ============================================================================
// Helpers
// ============================================================================

const COMPONENTS: u32 = 5;
const ENTITIES: u32 = 48;

fn c(bit: u32) -> ComponentId {
    ComponentId::from_raw(bit)
}

/// Mirrors a subscription by applying every delivered delta.
#[derive(Default)]
struct Mirror {
    members: Vec<EntityId>,
}

struct MirrorObserver(Arc<Mutex<Mirror>>);

impl EntityObserver for MirrorObserver {
    fn inserted(&mut self, entities: &[EntityId], members: &[EntityId]) -> ListenerResult {
        let mut mirror = self.0.lock();
        for entity in entities {
            assert!(!mirror.members.contains(entity), "double insert of {entity}");
            assert!(members.binary_search(entity).is_ok());
            mirror.members.push(*entity);
        }
        mirror.members.sort_unstable();
        Ok(())
    }

    fn removed(&mut self, entities: &[EntityId], members: &[EntityId]) -> ListenerResult {
        let mut mirror = self.0.lock();
        for entity in entities {
            let idx = mirror
                .members
                .iter()
                .position(|m| m == entity)
                .expect("removed entity was never inserted");
            mirror.members.remove(idx);
            assert!(members.binary_search(entity).is_err());
        }
        Ok(())
    }
}

fn expected(world: &Compositions, aspect: &Aspect) -> Vec<EntityId> {
    world
        .iter()
        .filter(|(_, bits)| aspect.matches(bits))
        .map(|(entity, _)| entity)
        .collect()
}

fn aspects() -> Vec<AspectBuilder> {
    vec![
        Aspect::builder().all([c(0)]),
        Aspect::builder().all([c(0), c(1)]).exclude([c(4)]),
        Aspect::builder().one([c(2), c(3)]),
        Aspect::builder().all([c(1)]).one([c(2), c(4)]).exclude([c(0)]),
        Aspect::builder().exclude([c(3)]),
    ]
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_membership_matches_brute_force_every_tick() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut world = Compositions::new();
    let mut manager = SubscriptionManager::new();

    let mut tracked = Vec::new();
    for builder in aspects() {
        let id = manager.subscribe(&builder, &world).unwrap();
        let mirror = Arc::new(Mutex::new(Mirror::default()));
        manager
            .subscription_mut(id)
            .unwrap()
            .add_observer(MirrorObserver(mirror.clone()), Snapshot::Skip)
            .unwrap();
        tracked.push((id, builder.build().unwrap(), mirror));
    }

    let mut alive: Vec<EntityId> = Vec::new();
    // Ids freed this tick may only be reused after the commit.
    let mut free: Vec<EntityId> = Vec::new();
    let mut next = 0;

    for _tick in 0..200 {
        let mut freed_now = Vec::new();

        for _op in 0..rng.gen_range(0..12) {
            match rng.gen_range(0..4) {
                0 if (alive.len() as u32) < ENTITIES => {
                    let entity = free.pop().unwrap_or_else(|| {
                        next += 1;
                        next - 1
                    });
                    world.insert_entity(entity);
                    for bit in 0..COMPONENTS {
                        if rng.gen_bool(0.5) {
                            world.add(entity, c(bit));
                        }
                    }
                    manager.changes_mut().mark_added(entity);
                    alive.push(entity);
                }
                1 if !alive.is_empty() => {
                    let entity = alive.swap_remove(rng.gen_range(0..alive.len()));
                    world.remove_entity(entity);
                    manager.changes_mut().mark_deleted(entity);
                    freed_now.push(entity);
                }
                _ if !alive.is_empty() => {
                    let entity = alive[rng.gen_range(0..alive.len())];
                    let bit = c(rng.gen_range(0..COMPONENTS));
                    let changed = if rng.gen_bool(0.5) {
                        world.add(entity, bit)
                    } else {
                        world.remove(entity, bit)
                    };
                    if changed {
                        manager.changes_mut().mark_changed(entity);
                    }
                }
                _ => {}
            }
        }

        manager.process_tick(&world).unwrap();
        free.extend(freed_now);

        let mut all = alive.clone();
        all.sort_unstable();
        assert_eq!(manager.entities().entities(), all.as_slice());

        for (id, aspect, mirror) in &tracked {
            let subscription = manager.subscription(*id).unwrap();
            let want = expected(&world, aspect);
            assert_eq!(subscription.entities(), want.as_slice());
            assert_eq!(mirror.lock().members, want);
            assert_eq!(subscription.active().count_ones(..), want.len());
        }
    }
}

#[test]
fn test_subscription_created_mid_run_sees_existing_entities() {
    let mut world = Compositions::new();
    let mut manager = SubscriptionManager::new();

    for entity in 0..10 {
        world.insert_entity(entity);
        if entity % 3 == 0 {
            world.add(entity, c(2));
        }
        manager.changes_mut().mark_added(entity);
    }
    manager.process_tick(&world).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let id = manager
        .subscribe(&Aspect::builder().all([c(2)]), &world)
        .unwrap();
    manager
        .subscription_mut(id)
        .unwrap()
        .add_listener(
            listener_fn(
                move |ids| {
                    seen_clone.lock().extend_from_slice(ids);
                    Ok(())
                },
                |_| Ok(()),
            ),
            Snapshot::Replay,
        )
        .unwrap();

    assert_eq!(*seen.lock(), vec![0, 3, 6, 9]);
}

#[test]
fn test_external_change_set_is_consumed() {
    let mut world = Compositions::new();
    let mut manager = SubscriptionManager::new();
    let mut changes = rgb_subscription::ChangeSet::new();

    world.insert_entity(2);
    changes.mark_added(2);
    manager.process(&mut changes, &world).unwrap();

    assert!(changes.is_empty());
    assert!(manager.entities().contains(2));

    // Re-running the empty set changes nothing.
    manager.process(&mut changes, &world).unwrap();
    assert_eq!(manager.entities().entities(), &[2]);
}

#[test]
fn test_identity_change_without_membership_flip_is_silent() {
    let mut world = Compositions::new();
    let mut manager = SubscriptionManager::new();
    let id = manager
        .subscribe(&Aspect::builder().one([c(0), c(1)]), &world)
        .unwrap();

    world.insert_entity(0);
    world.add(0, c(0));
    manager.changes_mut().mark_added(0);
    manager.process_tick(&world).unwrap();

    let calls = Arc::new(Mutex::new(0_u32));
    let on_insert = calls.clone();
    let on_remove = calls.clone();
    manager
        .subscription_mut(id)
        .unwrap()
        .add_listener(
            listener_fn(
                move |_| {
                    *on_insert.lock() += 1;
                    Ok(())
                },
                move |_| {
                    *on_remove.lock() += 1;
                    Ok(())
                },
            ),
            Snapshot::Skip,
        )
        .unwrap();

    // Bit 0 renumbered to bit 1: still inside the one-of set.
    let mut renumbered = FixedBitSet::with_capacity(2);
    renumbered.insert(1);
    manager.process_component_identity(0, &renumbered).unwrap();

    assert_eq!(*calls.lock(), 0);
    assert!(manager.subscription(id).unwrap().contains(0));
}
