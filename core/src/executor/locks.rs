use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

use crate::plan::{ResourceRef, Task};

/// A requested resource already held by another task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldResource {
    pub resource: ResourceRef,
    pub holder: String,
}

/// Lock request refused; the requesting task holds nothing new afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task '{task_id}' blocked on {}", describe(.conflicts))]
pub struct LockConflict {
    pub task_id: String,
    pub conflicts: Vec<HeldResource>,
}

impl LockConflict {
    pub fn resources(&self) -> Vec<ResourceRef> {
        self.conflicts.iter().map(|c| c.resource.clone()).collect()
    }
}

fn describe(conflicts: &[HeldResource]) -> String {
    conflicts
        .iter()
        .map(|c| format!("{} (held by {})", c.resource, c.holder))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Exclusive, all-or-nothing resource locks.
///
/// Synchronous and non-blocking; waiting and retrying is the caller's job.
#[derive(Debug, Default)]
pub struct ResourceLockManager {
    held: Mutex<HashMap<ResourceRef, String>>,
}

impl ResourceLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<ResourceRef, String>> {
        match self.held.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Claim every lock key the task declares
    pub fn acquire_locks(&self, task: &Task) -> Result<Vec<ResourceRef>, LockConflict> {
        self.acquire(&task.id, &task.resources.lock_keys())
    }

    /// Claim all `resources` for `task_id` or none of them.
    ///
    /// Resources already held by the same task are accepted again.
    pub fn acquire(
        &self,
        task_id: &str,
        resources: &[ResourceRef],
    ) -> Result<Vec<ResourceRef>, LockConflict> {
        let mut held = self.guard();

        let conflicts: Vec<HeldResource> = resources
            .iter()
            .filter_map(|r| match held.get(r) {
                Some(holder) if holder != task_id => Some(HeldResource {
                    resource: r.clone(),
                    holder: holder.clone(),
                }),
                _ => None,
            })
            .collect();

        if !conflicts.is_empty() {
            return Err(LockConflict {
                task_id: task_id.to_string(),
                conflicts,
            });
        }

        for r in resources {
            held.insert(r.clone(), task_id.to_string());
        }
        Ok(resources.to_vec())
    }

    /// Release everything held by `task_id`. Returns the released resources, sorted.
    pub fn release_locks(&self, task_id: &str) -> Vec<ResourceRef> {
        let mut held = self.guard();
        let mut released: Vec<ResourceRef> = held
            .iter()
            .filter(|(_, holder)| holder.as_str() == task_id)
            .map(|(r, _)| r.clone())
            .collect();
        for r in &released {
            held.remove(r);
        }
        released.sort();
        released
    }

    pub fn holder(&self, resource: &ResourceRef) -> Option<String> {
        self.guard().get(resource).cloned()
    }

    pub fn held_by(&self, task_id: &str) -> Vec<ResourceRef> {
        let mut out: Vec<ResourceRef> = self
            .guard()
            .iter()
            .filter(|(_, holder)| holder.as_str() == task_id)
            .map(|(r, _)| r.clone())
            .collect();
        out.sort();
        out
    }

    /// Lock table as `kind:id -> task_id`
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.guard()
            .iter()
            .map(|(r, holder)| (r.key(), holder.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ResourceKind;

    fn table(id: &str) -> ResourceRef {
        ResourceRef::new(ResourceKind::Table, id)
    }

    #[test]
    fn test_acquire_is_all_or_nothing() {
        let locks = ResourceLockManager::new();
        locks.acquire("a", &[table("users")]).unwrap();

        let err = locks
            .acquire("b", &[table("orders"), table("users"), table("items")])
            .unwrap_err();
        assert_eq!(err.resources(), vec![table("users")]);
        assert_eq!(err.conflicts[0].holder, "a");
        assert!(locks.held_by("b").is_empty());
        assert_eq!(locks.holder(&table("orders")), None);
    }

    #[test]
    fn test_release_frees_for_next_task() {
        let locks = ResourceLockManager::new();
        locks.acquire("a", &[table("users"), table("orders")]).unwrap();
        assert!(locks.acquire("b", &[table("orders")]).is_err());

        let released = locks.release_locks("a");
        assert_eq!(released, vec![table("orders"), table("users")]);
        assert!(locks.acquire("b", &[table("orders")]).is_ok());
        assert_eq!(locks.snapshot().get("table:orders").map(String::as_str), Some("b"));
    }

    #[test]
    fn test_release_without_locks_is_noop() {
        let locks = ResourceLockManager::new();
        assert!(locks.release_locks("ghost").is_empty());
    }

    #[test]
    fn test_reacquire_by_holder_succeeds() {
        let locks = ResourceLockManager::new();
        locks.acquire("a", &[table("users")]).unwrap();
        assert!(locks.acquire("a", &[table("users"), table("orders")]).is_ok());
        assert_eq!(locks.held_by("a").len(), 2);
    }

    #[test]
    fn test_migration_tasks_exclude_each_other() {
        let locks = ResourceLockManager::new();
        let m1 = Task::new("m1", "M1").with_migrations(["create_users_table"]);
        let m2 = Task::new("m2", "M2").with_migrations(["create_orders_table"]);

        locks.acquire_locks(&m1).unwrap();
        let err = locks.acquire_locks(&m2).unwrap_err();
        assert_eq!(err.resources(), vec![ResourceRef::migration_sequence()]);
    }
}
