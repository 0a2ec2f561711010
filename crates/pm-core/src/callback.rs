//! Sleep callback registries.
//!
//! Peripheral owners save and restore hardware state around a transition by
//! registering callbacks; the PM core only guarantees ordering:
//!
//! - ascending `priority` (0 runs first)
//! - among equal priorities, the most recent registration runs first
//!
//! Callbacks run on the idle path with the registry lock released. They must
//! not block; the core does not look at what they do.

use heapless::Vec;
use platform::SleepMode;

use crate::error::PmError;
use crate::module::{DeviceId, ModuleId};

/// A pre- or post-sleep action.
pub trait SleepCallback: Sync {
    /// Called with the mode being entered (pre) or just left (post).
    fn call(&self, mode: SleepMode);
}

impl<F> SleepCallback for F
where
    F: Fn(SleepMode) + Sync,
{
    fn call(&self, mode: SleepMode) {
        self(mode);
    }
}

/// Per-device enter/exit pair.
pub trait DeviceSleepHooks: Sync {
    /// Device is about to lose its clock / supply.
    fn enter_sleep(&self, mode: SleepMode);
    /// Device is clocked again.
    fn exit_sleep(&self, mode: SleepMode);
}

/// Handle returned by registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CallbackId(u32);

#[derive(Clone, Copy)]
struct Entry {
    id: CallbackId,
    priority: u8,
    callback: &'static dyn SleepCallback,
}

/// Priority-ordered callback list with room for `N` entries.
pub struct CallbackRegistry<const N: usize> {
    entries: Vec<Entry, N>,
    next_id: u32,
}

impl<const N: usize> CallbackRegistry<N> {
    /// Empty registry.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    /// Insert `callback` ahead of every entry with the same or a higher
    /// priority value.
    ///
    /// # Errors
    ///
    /// [`PmError::OutOfMemory`] when all `N` slots are taken.
    pub fn register(
        &mut self,
        callback: &'static dyn SleepCallback,
        priority: u8,
    ) -> Result<CallbackId, PmError> {
        let id = CallbackId(self.next_id);
        let at = self
            .entries
            .iter()
            .position(|e| e.priority >= priority)
            .unwrap_or(self.entries.len());
        self.entries
            .insert(
                at,
                Entry {
                    id,
                    priority,
                    callback,
                },
            )
            .map_err(|_| PmError::OutOfMemory)?;
        self.next_id = self.next_id.wrapping_add(1);
        Ok(id)
    }

    /// Remove the entry registered under `id`.
    ///
    /// # Errors
    ///
    /// [`PmError::NotFound`] if `id` is not registered (or already removed).
    pub fn unregister(&mut self, id: CallbackId) -> Result<(), PmError> {
        let at = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or(PmError::NotFound)?;
        self.entries.remove(at);
        Ok(())
    }

    /// Callbacks in execution order, copied out so the caller can run them
    /// without holding the registry lock.
    pub fn snapshot(&self) -> Vec<&'static dyn SleepCallback, N> {
        self.entries.iter().map(|e| e.callback).collect()
    }

    /// Registered entry count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<const N: usize> Default for CallbackRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// One optional hook pair per [`DeviceId`].
pub struct DeviceHookTable {
    hooks: [Option<&'static dyn DeviceSleepHooks>; DeviceId::COUNT],
}

impl DeviceHookTable {
    /// Empty table.
    pub const fn new() -> Self {
        Self {
            hooks: [None; DeviceId::COUNT],
        }
    }

    /// Install hooks for `device`, replacing any previous pair.
    pub fn register(&mut self, device: DeviceId, hooks: &'static dyn DeviceSleepHooks) {
        if let Some(slot) = self.hooks.get_mut(device.index()) {
            *slot = Some(hooks);
        }
    }

    /// Remove the hooks for `device`.
    ///
    /// # Errors
    ///
    /// [`PmError::NotFound`] if `device` has no hooks installed.
    pub fn unregister(&mut self, device: DeviceId) -> Result<(), PmError> {
        self.hooks
            .get_mut(device.index())
            .and_then(Option::take)
            .map(|_| ())
            .ok_or(PmError::NotFound)
    }

    /// Installed hooks in device order.
    pub fn snapshot(&self) -> Vec<&'static dyn DeviceSleepHooks, { DeviceId::COUNT }> {
        self.hooks.iter().flatten().copied().collect()
    }
}

impl Default for DeviceHookTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct Tagged(u8);

    impl SleepCallback for Tagged {
        fn call(&self, _mode: SleepMode) {}
    }

    static A: Tagged = Tagged(b'A');
    static B: Tagged = Tagged(b'B');
    static C: Tagged = Tagged(b'C');

    // `snapshot` returns trait objects; identify them by address.
    fn order<const N: usize>(registry: &CallbackRegistry<N>) -> std::vec::Vec<u8> {
        registry
            .snapshot()
            .iter()
            .map(|cb| {
                let addr = (*cb as *const dyn SleepCallback).cast::<u8>();
                [&A, &B, &C]
                    .into_iter()
                    .find(|t| core::ptr::eq((*t as *const Tagged).cast::<u8>(), addr))
                    .map_or(b'?', |t| t.0)
            })
            .collect()
    }

    #[test]
    fn test_ascending_priority() {
        let mut registry = CallbackRegistry::<4>::new();
        registry.register(&A, 100).unwrap();
        registry.register(&B, 0).unwrap();
        registry.register(&C, 50).unwrap();
        assert_eq!(order(&registry), b"BCA");
    }

    #[test]
    fn test_equal_priority_runs_latest_first() {
        let mut registry = CallbackRegistry::<4>::new();
        registry.register(&A, 7).unwrap();
        registry.register(&B, 7).unwrap();
        assert_eq!(order(&registry), b"BA");
    }

    #[test]
    fn test_full_registry_reports_out_of_memory() {
        let mut registry = CallbackRegistry::<2>::new();
        registry.register(&A, 1).unwrap();
        registry.register(&B, 1).unwrap();
        assert_eq!(registry.register(&C, 1), Err(PmError::OutOfMemory));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unregister_by_id() {
        let mut registry = CallbackRegistry::<4>::new();
        let a = registry.register(&A, 1).unwrap();
        registry.register(&B, 2).unwrap();
        registry.unregister(a).unwrap();
        assert_eq!(order(&registry), b"B");
        assert_eq!(registry.unregister(a), Err(PmError::NotFound));
    }

    struct NoopHooks;

    impl DeviceSleepHooks for NoopHooks {
        fn enter_sleep(&self, _mode: SleepMode) {}
        fn exit_sleep(&self, _mode: SleepMode) {}
    }

    static NOOP: NoopHooks = NoopHooks;

    #[test]
    fn test_device_hooks_register_and_remove() {
        let mut table = DeviceHookTable::new();
        table.register(DeviceId::Audio, &NOOP);
        assert_eq!(table.snapshot().len(), 1);
        table.unregister(DeviceId::Audio).unwrap();
        assert!(table.snapshot().is_empty());
        assert_eq!(table.unregister(DeviceId::Audio), Err(PmError::NotFound));
    }
}
