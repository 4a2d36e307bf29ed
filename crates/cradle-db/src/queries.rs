use crate::Database;
use crate::models::{DocumentRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, Row};
use serde_json::{Map, Value};

const DOCUMENT_COLUMNS: &str = "collection, id, fields, created_at, updated_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, email: &str, name: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, name, password) VALUES (?1, ?2, ?3, ?4)",
                (id, email, name, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    // -- Documents --

    /// Insert a new document. Fails if the id is already taken in the collection.
    pub fn insert_document(&self, collection: &str, id: &str, fields: &Map<String, Value>) -> Result<()> {
        let text = Value::Object(fields.clone()).to_string();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO documents (collection, id, fields) VALUES (?1, ?2, ?3)",
                (collection, id, &text),
            )?;
            Ok(())
        })
    }

    /// Overwrite the whole field map, creating the document if needed.
    pub fn replace_document(&self, collection: &str, id: &str, fields: &Map<String, Value>) -> Result<()> {
        let text = Value::Object(fields.clone()).to_string();
        self.with_conn(|conn| upsert_document(conn, collection, id, &text))
    }

    /// Overlay `patch` onto the stored fields. Keys absent from `patch` are
    /// kept; a missing document is created from `patch` alone.
    pub fn merge_document(&self, collection: &str, id: &str, patch: &Map<String, Value>) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT fields FROM documents WHERE collection = ?1 AND id = ?2",
                    (collection, id),
                    |row| row.get(0),
                )
                .optional()?;

            let mut fields = match existing {
                Some(text) => match serde_json::from_str::<Value>(&text)? {
                    Value::Object(map) => map,
                    _ => Map::new(),
                },
                None => Map::new(),
            };
            for (key, value) in patch {
                fields.insert(key.clone(), value.clone());
            }

            upsert_document(&tx, collection, id, &Value::Object(fields).to_string())?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Returns whether a row was removed.
    pub fn delete_document(&self, collection: &str, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                (collection, id),
            )?;
            Ok(removed > 0)
        })
    }

    pub fn get_document(&self, collection: &str, id: &str) -> Result<Option<DocumentRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM documents WHERE collection = ?1 AND id = ?2",
                DOCUMENT_COLUMNS
            );
            let row = conn
                .query_row(&sql, (collection, id), document_from_row)
                .optional()?;
            Ok(row)
        })
    }

    /// All documents of a collection in insertion order.
    pub fn list_documents(&self, collection: &str) -> Result<Vec<DocumentRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM documents WHERE collection = ?1 ORDER BY seq",
                DOCUMENT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([collection], document_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Documents whose top-level `field` equals `value`, in insertion order.
    pub fn query_documents_eq(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<DocumentRow>> {
        let path = format!("$.\"{}\"", field.replace('"', ""));
        let value_text = value.to_string();

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM documents
                 WHERE collection = ?1
                   AND json_extract(fields, ?2) = json_extract(?3, '$')
                 ORDER BY seq",
                DOCUMENT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map((collection, &path, &value_text), document_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn upsert_document(conn: &Connection, collection: &str, id: &str, fields: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO documents (collection, id, fields) VALUES (?1, ?2, ?3)
         ON CONFLICT(collection, id) DO UPDATE SET
             fields = excluded.fields,
             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
        (collection, id, fields),
    )?;
    Ok(())
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        collection: row.get(0)?,
        id: row.get(1)?,
        fields: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, email, name, password, created_at FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                name: row.get(2)?,
                password: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
