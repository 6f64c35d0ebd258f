//! The finalizer-guarded reconcile state machine shared by Tool and Policy.
//!
//! State is never stored. It is derived on every invocation from the
//! object itself: deletion timestamp, finalizer, owner link, `enabled`
//! and whether the status reflects the current spec.
//!
//! Steps are evaluated in a fixed order:
//!
//! 1. deletion requested with the finalizer present: clean up, then drop the finalizer
//! 2. finalizer absent: add it and stop
//! 3. owner link absent (Policy only): establish it and stop
//! 4. disabled: clean up, keep the finalizer
//! 5. otherwise: validate, sync artifacts, publish status

use std::time::Duration;

use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use tracing::{debug, info};

use eirenyx_cluster::{NamespacedObject, ObjectStore};
use eirenyx_core::Result;

/// Lifecycle states, derived from the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No finalizer yet.
    New,
    /// Finalizer present, owner link missing (or, without links, not synced yet).
    Guarded,
    /// Owner link present, spec not synced yet.
    Linked,
    /// Enabled and synced.
    Active,
    /// Disabled: artifacts removed, finalizer retained.
    Disabled,
    /// Deletion requested, cleanup pending.
    Deleting,
    /// Deletion requested and nothing left for this controller to do.
    Gone,
}

/// The next step for an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Finalize,
    Release,
    Guard,
    Link,
    Disable,
    Sync,
}

/// What one invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Cleanup ran and the finalizer was removed.
    Finalized,
    /// Deletion in progress without our finalizer; nothing done.
    Released,
    FinalizerAdded,
    OwnerLinked,
    Disabled,
    /// Synced; `requeue_after` asks for a follow-up check.
    Synced { requeue_after: Option<Duration> },
}

/// Lifecycle facts read from one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Observed {
    pub deleting: bool,
    pub guarded: bool,
    /// `None` for kinds without an owner to link.
    pub linked: Option<bool>,
    pub enabled: bool,
    pub synced: bool,
}

impl Observed {
    pub fn state(self) -> LifecycleState {
        match self {
            Self { deleting: true, guarded: true, .. } => LifecycleState::Deleting,
            Self { deleting: true, .. } => LifecycleState::Gone,
            Self { guarded: false, .. } => LifecycleState::New,
            Self { linked: Some(false), .. } => LifecycleState::Guarded,
            Self { enabled: false, .. } => LifecycleState::Disabled,
            Self { synced: false, linked: Some(true), .. } => LifecycleState::Linked,
            Self { synced: false, .. } => LifecycleState::Guarded,
            Self { .. } => LifecycleState::Active,
        }
    }

    pub fn step(self) -> Step {
        match self.state() {
            LifecycleState::Deleting => Step::Finalize,
            LifecycleState::Gone => Step::Release,
            LifecycleState::New => Step::Guard,
            LifecycleState::Guarded if self.linked == Some(false) => Step::Link,
            LifecycleState::Disabled => Step::Disable,
            LifecycleState::Guarded | LifecycleState::Linked | LifecycleState::Active => Step::Sync,
        }
    }
}

/// Per-kind hooks driven by [`drive`].
#[async_trait]
pub trait Lifecycle: Send + Sync {
    type Object: NamespacedObject;

    /// Finalizer guarding cleanup.
    fn finalizer(&self) -> &'static str;

    fn store(&self) -> &dyn ObjectStore<Self::Object>;

    fn enabled(&self, obj: &Self::Object) -> bool;

    /// Whether the owner link exists. `None` when the kind has no owner.
    fn linked(&self, _obj: &Self::Object) -> Option<bool> {
        None
    }

    /// Whether the status reflects the current spec.
    fn synced(&self, obj: &Self::Object) -> bool;

    /// Establish the owner link on `obj`. Persisted by the caller.
    async fn link(&self, _obj: &mut Self::Object) -> Result<()> {
        Ok(())
    }

    /// Remove everything the object caused to exist.
    async fn cleanup(&self, obj: &Self::Object) -> Result<()>;

    /// Clean up a disabled object and record it as such.
    async fn disable(&self, obj: &Self::Object) -> Result<()>;

    /// Validate, sync and publish status for an enabled object.
    ///
    /// Returns a delay after which the object should be looked at again, if any.
    async fn sync(&self, obj: &Self::Object) -> Result<Option<Duration>>;

    fn observe(&self, obj: &Self::Object) -> Observed {
        Observed {
            deleting: obj.meta().deletion_timestamp.is_some(),
            guarded: obj.finalizers().iter().any(|f| f == self.finalizer()),
            linked: self.linked(obj),
            enabled: self.enabled(obj),
            synced: self.synced(obj),
        }
    }
}

/// Run one step of the state machine for `obj`.
///
/// # Errors
///
/// Propagates the failing hook's error. A failed cleanup leaves the finalizer in place.
pub async fn drive<L: Lifecycle>(lifecycle: &L, obj: &L::Object) -> Result<Transition> {
    let name = obj.name_any();
    let observed = lifecycle.observe(obj);
    debug!(object = %name, state = ?observed.state(), "lifecycle state");

    match observed.step() {
        Step::Finalize => {
            lifecycle.cleanup(obj).await?;
            let mut next = obj.clone();
            next.finalizers_mut().retain(|f| f != lifecycle.finalizer());
            lifecycle.store().replace(&next).await?;
            info!(object = %name, "cleanup complete, finalizer removed");
            Ok(Transition::Finalized)
        }
        Step::Release => Ok(Transition::Released),
        Step::Guard => {
            let mut next = obj.clone();
            next.finalizers_mut().push(lifecycle.finalizer().to_string());
            lifecycle.store().replace(&next).await?;
            debug!(object = %name, "finalizer added");
            Ok(Transition::FinalizerAdded)
        }
        Step::Link => {
            let mut next = obj.clone();
            lifecycle.link(&mut next).await?;
            lifecycle.store().replace(&next).await?;
            debug!(object = %name, "owner linked");
            Ok(Transition::OwnerLinked)
        }
        Step::Disable => {
            lifecycle.disable(obj).await?;
            Ok(Transition::Disabled)
        }
        Step::Sync => {
            let requeue_after = lifecycle.sync(obj).await?;
            Ok(Transition::Synced { requeue_after })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active() -> Observed {
        Observed {
            deleting: false,
            guarded: true,
            linked: Some(true),
            enabled: true,
            synced: true,
        }
    }

    #[test]
    fn test_deletion_wins_over_everything() {
        let observed = Observed {
            deleting: true,
            linked: Some(false),
            enabled: false,
            ..active()
        };
        assert_eq!(observed.state(), LifecycleState::Deleting);
        assert_eq!(observed.step(), Step::Finalize);
    }

    #[test]
    fn test_deletion_without_finalizer_is_gone() {
        let observed = Observed {
            deleting: true,
            guarded: false,
            ..active()
        };
        assert_eq!(observed.state(), LifecycleState::Gone);
        assert_eq!(observed.step(), Step::Release);
    }

    #[test]
    fn test_finalizer_comes_before_link() {
        let observed = Observed {
            guarded: false,
            linked: Some(false),
            ..active()
        };
        assert_eq!(observed.state(), LifecycleState::New);
        assert_eq!(observed.step(), Step::Guard);
    }

    #[test]
    fn test_link_comes_before_disable() {
        let observed = Observed {
            linked: Some(false),
            enabled: false,
            ..active()
        };
        assert_eq!(observed.state(), LifecycleState::Guarded);
        assert_eq!(observed.step(), Step::Link);
    }

    #[test]
    fn test_disabled_keeps_finalizer_path() {
        let observed = Observed {
            enabled: false,
            ..active()
        };
        assert_eq!(observed.state(), LifecycleState::Disabled);
        assert_eq!(observed.step(), Step::Disable);
    }

    #[test]
    fn test_unsynced_states() {
        let linked = Observed {
            synced: false,
            ..active()
        };
        assert_eq!(linked.state(), LifecycleState::Linked);
        assert_eq!(linked.step(), Step::Sync);

        let unlinkable = Observed {
            synced: false,
            linked: None,
            ..active()
        };
        assert_eq!(unlinkable.state(), LifecycleState::Guarded);
        assert_eq!(unlinkable.step(), Step::Sync);
    }

    #[test]
    fn test_active_resyncs() {
        assert_eq!(active().state(), LifecycleState::Active);
        assert_eq!(active().step(), Step::Sync);
    }
}
