// Moving documents between disk and the in-memory working connection.
//
// A document is edited in an in-memory database restored from its file; saves
// write a full backup to a temp sibling and rename it over the target.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::backup::{Backup, Progress};
use rusqlite::{Connection, DatabaseName};
use tracing::debug;

use super::schema;
use crate::error::{Error, Result};

/// Restore `path` into a fresh in-memory connection and validate its layout.
pub fn load(path: &Path) -> Result<Connection> {
    if !path.is_file() {
        return Err(Error::NotFound(path.to_path_buf()));
    }

    let mut conn = Connection::open_in_memory()?;
    conn.restore(DatabaseName::Main, path, None::<fn(Progress)>).map_err(|err| {
        Error::NotValid { path: path.to_path_buf(), reason: err.to_string() }
    })?;
    schema::validate(&conn).map_err(|err| Error::NotValid {
        path: path.to_path_buf(),
        reason: format!("{err:#}"),
    })?;
    debug!(path = %path.display(), "document restored into memory");
    Ok(conn)
}

/// A new in-memory connection holding an empty, valid store.
pub fn empty() -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    schema::install(&mut conn)?;
    Ok(conn)
}

/// An independent in-memory copy of `conn`.
pub fn duplicate(conn: &Connection) -> Result<Connection> {
    let mut copy = Connection::open_in_memory()?;
    Backup::new(conn, &mut copy)?.run_to_completion(-1, Duration::ZERO, None)?;
    Ok(copy)
}

/// Write the whole working database to `target`, replacing it atomically.
pub fn persist(conn: &Connection, target: &Path) -> Result<()> {
    let tmp_path = temp_path_for(target);
    if tmp_path.exists() {
        fs::remove_file(&tmp_path)?;
    }
    if let Err(err) = conn.backup(DatabaseName::Main, &tmp_path, None) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    if let Err(err) = fs::rename(&tmp_path, target) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    debug!(path = %target.display(), "document persisted");
    Ok(())
}

fn temp_path_for(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(format!(".tmp.{}", std::process::id()));
    target.with_file_name(name)
}
