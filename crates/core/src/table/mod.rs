//! Table module - the live record-list synchronizer and its debouncer.

mod debounce;
mod deed_table;
mod identity;


use std::sync::{Mutex, MutexGuard, PoisonError};

pub use debounce::{Debouncer, WriteKey, WriteTarget};
pub use deed_table::{DeedTable, DeedTableConfig, LoadStatus};
pub use identity::resolve_user_id;

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
