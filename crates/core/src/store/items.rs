// `items` relation access: load, upsert, delete.

use std::collections::BTreeMap;

use outliner_common::ItemId;
use rusqlite::{params, Connection, OptionalExtension};

use crate::tree::Item;

/// Load every item row. Order is by id; chain order is rebuilt by the tree.
pub fn load_all(conn: &Connection) -> rusqlite::Result<Vec<Item>> {
    let mut stmt =
        conn.prepare("SELECT id, parent, previous, text, fields FROM items ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        let fields_json: String = row.get(4)?;
        let fields: BTreeMap<String, String> =
            serde_json::from_str(&fields_json).map_err(|error| {
                rusqlite::Error::FromSqlConversionFailure(
                    4,
                    rusqlite::types::Type::Text,
                    Box::new(error),
                )
            })?;
        Ok(Item {
            id: ItemId(row.get(0)?),
            parent: ItemId::from_column(row.get(1)?),
            previous: ItemId::from_column(row.get(2)?),
            text: row.get(3)?,
            fields,
        })
    })?;
    let items = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(items)
}

/// Highest id ever handed out, including ids of since-deleted items.
pub fn last_allocated_id(conn: &Connection) -> rusqlite::Result<i64> {
    let from_sequence: Option<i64> = conn
        .query_row("SELECT seq FROM sqlite_sequence WHERE name = 'items'", [], |row| row.get(0))
        .optional()?;
    let from_rows: i64 =
        conn.query_row("SELECT COALESCE(MAX(id), 0) FROM items", [], |row| row.get(0))?;
    Ok(from_sequence.unwrap_or(0).max(from_rows))
}

/// Write the current state of `item`, inserting or replacing its row.
pub fn upsert(conn: &Connection, item: &Item) -> rusqlite::Result<()> {
    let fields = serde_json::to_string(&item.fields)
        .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;
    conn.execute(
        "INSERT INTO items (id, parent, previous, text, fields) VALUES (?1, ?2, ?3, ?4, ?5) \
         ON CONFLICT(id) DO UPDATE SET \
             parent = excluded.parent, previous = excluded.previous, \
             text = excluded.text, fields = excluded.fields",
        params![
            item.id.get(),
            ItemId::to_column(item.parent),
            ItemId::to_column(item.previous),
            item.text,
            fields,
        ],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, id: ItemId) -> rusqlite::Result<bool> {
    let changed = conn.execute("DELETE FROM items WHERE id = ?1", params![id.get()])?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::*;
    use crate::store::schema;

    fn conn() -> Connection {
        let mut conn = Connection::open_in_memory().expect("memory db should open");
        schema::install(&mut conn).expect("schema should install");
        conn
    }

    fn item(id: i64, parent: i64, previous: i64, text: &str) -> Item {
        Item {
            id: ItemId(id),
            parent: ItemId::from_column(parent),
            previous: ItemId::from_column(previous),
            text: text.into(),
            fields: BTreeMap::new(),
        }
    }

    #[test]
    fn upsert_then_load_preserves_links_and_fields() {
        let conn = conn();
        let mut child = item(2, 1, 0, "child");
        child.fields.insert("description".into(), "notes".into());
        upsert(&conn, &item(1, 0, 0, "root")).unwrap();
        upsert(&conn, &child).unwrap();

        let loaded = load_all(&conn).unwrap();
        assert_eq!(loaded, vec![item(1, 0, 0, "root"), child]);
    }

    #[test]
    fn upsert_replaces_existing_row() {
        let conn = conn();
        upsert(&conn, &item(1, 0, 0, "before")).unwrap();
        upsert(&conn, &item(1, 0, 0, "after")).unwrap();

        let loaded = load_all(&conn).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].text, "after");
    }

    #[test]
    fn deleted_ids_stay_allocated() {
        let conn = conn();
        upsert(&conn, &item(1, 0, 0, "a")).unwrap();
        upsert(&conn, &item(2, 0, 1, "b")).unwrap();
        assert!(delete(&conn, ItemId(2)).unwrap());
        assert!(!delete(&conn, ItemId(2)).unwrap());

        assert_eq!(last_allocated_id(&conn).unwrap(), 2);
    }
}
