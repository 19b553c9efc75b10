// Single-writer check-out of a document's storage connection.
//
// `get` hands out the one connection as an RAII handle; dropping the handle
// (or passing it to `give`) checks it back in and wakes one waiter.

use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// What `get` does when the connection is already checked out.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutPolicy {
    /// Wait until the holder checks the connection back in.
    #[default]
    Blocking,
    /// Fail immediately with `Error::Busy`.
    NonBlocking,
}

enum Slot {
    Available(Connection),
    CheckedOut,
    Closed,
}

pub struct ConnectionGuard {
    label: &'static str,
    policy: CheckoutPolicy,
    slot: Mutex<Slot>,
    returned: Condvar,
}

impl ConnectionGuard {
    pub fn new(label: &'static str, conn: Connection, policy: CheckoutPolicy) -> Self {
        Self { label, policy, slot: Mutex::new(Slot::Available(conn)), returned: Condvar::new() }
    }

    pub fn policy(&self) -> CheckoutPolicy {
        self.policy
    }

    /// Check the connection out.
    pub fn get(&self) -> Result<CheckedOut<'_>> {
        let mut slot = self.lock_slot();
        loop {
            match std::mem::replace(&mut *slot, Slot::CheckedOut) {
                Slot::Available(conn) => {
                    debug!(guard = self.label, "connection checked out");
                    return Ok(CheckedOut { guard: self, conn: Some(conn) });
                }
                Slot::Closed => {
                    *slot = Slot::Closed;
                    return Err(Error::Closed);
                }
                Slot::CheckedOut => {
                    if self.policy == CheckoutPolicy::NonBlocking {
                        return Err(Error::Busy(self.label));
                    }
                    slot = self.returned.wait(slot).unwrap_or_else(|poison| poison.into_inner());
                }
            }
        }
    }

    /// Check the connection back in. Equivalent to dropping the handle.
    pub fn give(&self, handle: CheckedOut<'_>) {
        debug_assert!(std::ptr::eq(handle.guard, self), "handle returned to the wrong guard");
        drop(handle);
    }

    pub fn is_checked_out(&self) -> bool {
        matches!(*self.lock_slot(), Slot::CheckedOut)
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.lock_slot(), Slot::Closed)
    }

    /// Wait for any holder to finish, then take the connection out for good.
    /// Later `get` calls fail with `Error::Closed`.
    pub fn close(&self) -> Result<Connection> {
        let mut handle = self.get()?;
        let conn = handle.conn.take().ok_or(Error::Closed)?;
        *self.lock_slot() = Slot::Closed;
        drop(handle);
        self.returned.notify_all();
        Ok(conn)
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn check_in(&self, conn: Connection) {
        let mut slot = self.lock_slot();
        if matches!(*slot, Slot::CheckedOut) {
            *slot = Slot::Available(conn);
            debug!(guard = self.label, "connection checked in");
        }
        drop(slot);
        self.returned.notify_one();
    }
}

/// A checked-out connection. Returned to its guard on drop, on every path.
pub struct CheckedOut<'a> {
    guard: &'a ConnectionGuard,
    conn: Option<Connection>,
}

impl Deref for CheckedOut<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("checked-out connection is present until drop")
    }
}

impl DerefMut for CheckedOut<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("checked-out connection is present until drop")
    }
}

impl Drop for CheckedOut<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.guard.check_in(conn);
        }
    }
}
