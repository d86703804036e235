use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use loupe_model::TargetId;

use crate::task::LoadTask;

/// Associates each target with the one task currently authorized to
/// deliver a result to it.
///
/// The tracker holds a non-owning association only: it never controls the
/// target's lifetime, and a target that was never attached (or was
/// detached by its owner) simply looks up as absent. Task identity is
/// pointer identity, matching "the task object bound to this target".
pub struct BindingTracker<K, A> {
    inner: Arc<RwLock<HashMap<TargetId, Arc<LoadTask<K, A>>>>>,
}

impl<K, A> Clone for BindingTracker<K, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, A> BindingTracker<K, A> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Atomically bind `task` to `target`, returning the superseded task
    /// if one was bound. The caller decides whether to cancel it.
    ///
    /// De-duplication (same key already in flight) is the caller's check,
    /// made *before* calling `attach`.
    pub fn attach(&self, target: TargetId, task: Arc<LoadTask<K, A>>) -> Option<Arc<LoadTask<K, A>>> {
        let mut inner = self.inner.write();
        let superseded = inner.insert(target, task);
        if superseded.is_some() {
            trace!(%target, "binding superseded");
        }
        superseded
    }

    /// True iff `target`'s binding still references exactly this task.
    pub fn is_current(&self, target: TargetId, task: &LoadTask<K, A>) -> bool {
        let inner = self.inner.read();
        inner
            .get(&target)
            .is_some_and(|bound| std::ptr::eq(Arc::as_ptr(bound), task))
    }

    /// Current task for `target`, if any. Lookup only, no mutation.
    pub fn get(&self, target: TargetId) -> Option<Arc<LoadTask<K, A>>> {
        let inner = self.inner.read();
        inner.get(&target).cloned()
    }

    /// Release the association for `target`, returning the task that was
    /// bound. Called by the target's owner when the target goes away or
    /// is reused for different content.
    pub fn detach(&self, target: TargetId) -> Option<Arc<LoadTask<K, A>>> {
        let mut inner = self.inner.write();
        inner.remove(&target)
    }

    /// Number of live associations.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl<K, A> Default for BindingTracker<K, A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    use crate::capability::BoxError;
    use crate::dispatch;

    fn tracker_and_task(key: &str, target: TargetId) -> (BindingTracker<String, String>, Arc<LoadTask<String, String>>) {
        let bindings: BindingTracker<String, String> = BindingTracker::new();
        let exit_early = Arc::new(AtomicBool::new(false));
        let (tx, _deliveries) = dispatch::channel(bindings.clone(), Arc::clone(&exit_early));
        let compute = |key: &String| Ok::<_, BoxError>(key.clone());
        let task = Arc::new(LoadTask::new(
            key.to_string(),
            target,
            1,
            Arc::new(compute),
            None,
            bindings.clone(),
            tx,
            exit_early,
        ));
        (bindings, task)
    }

    #[test]
    fn attach_and_lookup() {
        let target = TargetId::new();
        let (bindings, task) = tracker_and_task("k", target);

        assert!(bindings.attach(target, Arc::clone(&task)).is_none());
        assert!(bindings.is_current(target, &task));
        assert!(bindings.get(target).is_some());
        assert_eq!(bindings.len(), 1);
    }

    #[test]
    fn attach_returns_superseded_task() {
        let target = TargetId::new();
        let (bindings, first) = tracker_and_task("a", target);
        let (_, second) = tracker_and_task("b", target);

        bindings.attach(target, Arc::clone(&first));
        let superseded = bindings.attach(target, Arc::clone(&second)).unwrap();

        assert!(Arc::ptr_eq(&superseded, &first));
        assert!(!bindings.is_current(target, &first));
        assert!(bindings.is_current(target, &second));
    }

    #[test]
    fn at_most_one_binding_per_target() {
        let target = TargetId::new();
        let (bindings, first) = tracker_and_task("a", target);
        let (_, second) = tracker_and_task("b", target);
        let (_, third) = tracker_and_task("c", target);

        bindings.attach(target, first);
        bindings.attach(target, second);
        bindings.attach(target, Arc::clone(&third));

        assert_eq!(bindings.len(), 1);
        assert!(bindings.is_current(target, &third));
    }

    #[test]
    fn detach_releases_association() {
        let target = TargetId::new();
        let (bindings, task) = tracker_and_task("k", target);

        bindings.attach(target, Arc::clone(&task));
        let detached = bindings.detach(target).unwrap();

        assert!(Arc::ptr_eq(&detached, &task));
        assert!(!bindings.is_current(target, &task));
        assert!(bindings.get(target).is_none());
        assert!(bindings.is_empty());
    }

    #[test]
    fn unknown_target_is_absent() {
        let (bindings, task) = tracker_and_task("k", TargetId::new());
        let other = TargetId::new();

        assert!(bindings.get(other).is_none());
        assert!(!bindings.is_current(other, &task));
        assert!(bindings.detach(other).is_none());
    }
}
