// Process-wide scratch store: same relations as a document, never persisted,
// no history ledger.

use tracing::info;

use super::guard::{CheckedOut, CheckoutPolicy, ConnectionGuard};
use super::{file, schema};
use crate::error::Result;

pub struct MemoryDocument {
    guard: ConnectionGuard,
}

impl MemoryDocument {
    pub fn new(policy: CheckoutPolicy) -> Result<Self> {
        let conn = file::empty()?;
        Ok(Self { guard: ConnectionGuard::new("memory document", conn, policy) })
    }

    /// Check out the scratch connection.
    pub fn get(&self) -> Result<CheckedOut<'_>> {
        self.guard.get()
    }

    pub fn give(&self, handle: CheckedOut<'_>) {
        self.guard.give(handle);
    }

    pub fn table_names(&self) -> Result<Vec<String>> {
        let conn = self.guard.get()?;
        Ok(schema::table_names(&conn)?)
    }

    pub fn is_closed(&self) -> bool {
        self.guard.is_closed()
    }

    /// Drop the scratch data. Later check-outs fail with `Error::Closed`.
    pub fn close(&self) -> Result<()> {
        let conn = self.guard.close()?;
        drop(conn);
        info!("memory document closed");
        Ok(())
    }
}
