//! Poison-tolerant access to the std locks guarding cache state.
//!
//! A poisoned lock is logged and its inner state reused.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read()
        .unwrap_or_else(|poisoned| recover(poisoned, source, op, "read"))
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write()
        .unwrap_or_else(|poisoned| recover(poisoned, source, op, "write"))
}

fn recover<G>(
    poisoned: PoisonError<G>,
    source: &'static str,
    op: &'static str,
    mode: &'static str,
) -> G {
    warn!(
        target = "canopy::cache::lock",
        source, op, mode, "tree cache lock poisoned; reusing inner state"
    );
    poisoned.into_inner()
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn poisoned_lock_is_recovered() {
        let lock = RwLock::new(7_u32);
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.write().expect("fresh lock");
            panic!("poison the lock");
        }));
        assert!(lock.is_poisoned());

        assert_eq!(*rw_read(&lock, "cache::lock::tests", "read"), 7);
        *rw_write(&lock, "cache::lock::tests", "write") = 9;
        assert_eq!(*rw_read(&lock, "cache::lock::tests", "read"), 9);
    }
}
