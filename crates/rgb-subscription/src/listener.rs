//! Callbacks attached to a subscription.
//!
//! Two kinds of callbacks exist:
//!
//! - [`EntityObserver`]: wants full membership semantics. Alongside each delta it
//!   sees the complete, already updated member list. Processing systems are
//!   observers.
//! - [`SubscriptionListener`]: only wants the delta.
//!
//! Within a subscription all observers run before any listener.

use crate::composition::EntityId;

/// Error returned by a callback. Propagated to the tick driver untouched.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for callbacks.
pub type ListenerResult = Result<(), ListenerError>;

/// Full-membership observer.
pub trait EntityObserver: 'static {
    /// `entities` started matching. `members` is the membership after the batch.
    fn inserted(&mut self, entities: &[EntityId], members: &[EntityId]) -> ListenerResult;

    /// `entities` stopped matching. `members` is the membership after the batch.
    fn removed(&mut self, entities: &[EntityId], members: &[EntityId]) -> ListenerResult;
}

/// Delta-only listener.
pub trait SubscriptionListener: 'static {
    /// `entities` started matching.
    fn inserted(&mut self, entities: &[EntityId]) -> ListenerResult;

    /// `entities` stopped matching.
    fn removed(&mut self, entities: &[EntityId]) -> ListenerResult;
}

/// Whether a newly registered callback is told about current members.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Snapshot {
    /// Only future changes are delivered.
    #[default]
    Skip,
    /// Current members are delivered immediately as one `inserted` batch.
    Replay,
}

/// Listener made of two closures. See [`listener_fn`].
pub struct FnListener<I, R> {
    on_inserted: I,
    on_removed: R,
}

/// Build a [`SubscriptionListener`] from an insertion and a removal closure.
///
/// ```ignore
/// subscription.add_listener(
///     listener_fn(
///         |ids| { spawned.extend_from_slice(ids); Ok(()) },
///         |ids| { despawned.extend_from_slice(ids); Ok(()) },
///     ),
///     Snapshot::Skip,
/// )?;
/// ```
pub fn listener_fn<I, R>(on_inserted: I, on_removed: R) -> FnListener<I, R>
where
    I: FnMut(&[EntityId]) -> ListenerResult + 'static,
    R: FnMut(&[EntityId]) -> ListenerResult + 'static,
{
    FnListener {
        on_inserted,
        on_removed,
    }
}

impl<I, R> SubscriptionListener for FnListener<I, R>
where
    I: FnMut(&[EntityId]) -> ListenerResult + 'static,
    R: FnMut(&[EntityId]) -> ListenerResult + 'static,
{
    fn inserted(&mut self, entities: &[EntityId]) -> ListenerResult {
        (self.on_inserted)(entities)
    }

    fn removed(&mut self, entities: &[EntityId]) -> ListenerResult {
        (self.on_removed)(entities)
    }
}

impl<I, R> core::fmt::Debug for FnListener<I, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FnListener").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn test_listener_fn_routes_callbacks() {
        let inserted = Arc::new(AtomicU32::new(0));
        let removed = Arc::new(AtomicU32::new(0));
        let inserted_clone = inserted.clone();
        let removed_clone = removed.clone();

        let mut listener = listener_fn(
            move |ids| {
                inserted_clone.fetch_add(ids.len() as u32, Ordering::SeqCst);
                Ok(())
            },
            move |ids| {
                removed_clone.fetch_add(ids.len() as u32, Ordering::SeqCst);
                Ok(())
            },
        );

        listener.inserted(&[1, 2, 3]).unwrap();
        listener.removed(&[2]).unwrap();

        assert_eq!(inserted.load(Ordering::SeqCst), 3);
        assert_eq!(removed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_fn_propagates_error() {
        let mut listener = listener_fn(|_| Err("boom".into()), |_| Ok(()));

        let err = listener.inserted(&[1]).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
