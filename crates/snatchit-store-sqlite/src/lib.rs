//! SQLite-backed document store.
//!
//! Batches run inside one sqlx transaction, which is where the all-or-nothing
//! guarantee of `apply_batch` comes from.

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use snatchit_docstore::{DocStore, DocStoreError, Document, FieldOp, FieldValue, WriteOp};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub struct SqliteDocStore {
    pool: SqlitePool,
}

impl SqliteDocStore {
    /// `~/.snatchit/store.db` (creates dir with 0700 perms on unix)
    pub async fn open_default() -> Result<Self, DocStoreError> {
        let dir = dirs::home_dir()
            .ok_or_else(|| DocStoreError::Backend("no home dir".into()))?
            .join(".snatchit");
        std::fs::create_dir_all(&dir).map_err(|e| DocStoreError::Backend(e.to_string()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))
                .map_err(|e| DocStoreError::Backend(e.to_string()))?;
        }
        let path = dir.join("store.db");
        let url = format!("sqlite://{}?mode=rwc", path.to_string_lossy());
        Self::open(&url).await
    }

    pub async fn open_in_memory() -> Result<Self, DocStoreError> {
        Self::open("sqlite::memory:").await
    }

    pub async fn open(url: &str) -> Result<Self, DocStoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(|e| DocStoreError::Unavailable(e.to_string()))?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| DocStoreError::Backend(e.to_string()))?;

        Ok(Self { pool })
    }
}

fn map_err(e: sqlx::Error) -> DocStoreError {
    let s = e.to_string();
    if s.contains("UNIQUE") {
        DocStoreError::AlreadyExists
    } else if s.contains("locked") || s.contains("busy") {
        DocStoreError::Unavailable(s)
    } else {
        DocStoreError::Backend(s)
    }
}

async fn doc_exists(
    txn: &mut sqlx::SqliteConnection,
    collection: &str,
    doc_id: &str,
) -> Result<bool, DocStoreError> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM documents WHERE collection=? AND doc_id=?")
            .bind(collection)
            .bind(doc_id)
            .fetch_optional(txn)
            .await
            .map_err(map_err)?;
    Ok(row.is_some())
}

async fn insert_doc(
    txn: &mut sqlx::SqliteConnection,
    collection: &str,
    doc: &Document,
) -> Result<(), DocStoreError> {
    // The PK on documents turns a duplicate id into AlreadyExists via map_err.
    sqlx::query("INSERT INTO documents(collection,doc_id) VALUES(?,?)")
        .bind(collection)
        .bind(&doc.id)
        .execute(&mut *txn)
        .await
        .map_err(map_err)?;

    for (field, value) in &doc.fields {
        match value {
            FieldValue::Text(t) => {
                sqlx::query(
                    "INSERT INTO doc_fields(collection,doc_id,field,kind,text_value)
                     VALUES(?,?,?,'text',?)",
                )
                .bind(collection)
                .bind(&doc.id)
                .bind(field)
                .bind(t)
                .execute(&mut *txn)
                .await
                .map_err(map_err)?;
            }
            FieldValue::Timestamp(ts) => {
                sqlx::query(
                    "INSERT INTO doc_fields(collection,doc_id,field,kind,ts_value)
                     VALUES(?,?,?,'ts',?)",
                )
                .bind(collection)
                .bind(&doc.id)
                .bind(field)
                .bind(ts.timestamp())
                .execute(&mut *txn)
                .await
                .map_err(map_err)?;
            }
            FieldValue::Array(elems) => {
                for elem in elems {
                    sqlx::query(
                        "INSERT INTO doc_array_elems(collection,doc_id,field,value)
                         VALUES(?,?,?,?)",
                    )
                    .bind(collection)
                    .bind(&doc.id)
                    .bind(field)
                    .bind(elem)
                    .execute(&mut *txn)
                    .await
                    .map_err(map_err)?;
                }
            }
        }
    }
    Ok(())
}

async fn delete_doc(
    txn: &mut sqlx::SqliteConnection,
    collection: &str,
    doc_id: &str,
) -> Result<(), DocStoreError> {
    let res = sqlx::query("DELETE FROM documents WHERE collection=? AND doc_id=?")
        .bind(collection)
        .bind(doc_id)
        .execute(&mut *txn)
        .await
        .map_err(map_err)?;
    if res.rows_affected() == 0 {
        return Err(DocStoreError::NotFound);
    }

    sqlx::query("DELETE FROM doc_fields WHERE collection=? AND doc_id=?")
        .bind(collection)
        .bind(doc_id)
        .execute(&mut *txn)
        .await
        .map_err(map_err)?;
    sqlx::query("DELETE FROM doc_array_elems WHERE collection=? AND doc_id=?")
        .bind(collection)
        .bind(doc_id)
        .execute(&mut *txn)
        .await
        .map_err(map_err)?;
    Ok(())
}

async fn apply_field_op(
    txn: &mut sqlx::SqliteConnection,
    collection: &str,
    doc_id: &str,
    op: &FieldOp,
) -> Result<(), DocStoreError> {
    match op {
        FieldOp::ArrayUnion { field, value } => {
            sqlx::query(
                "INSERT OR IGNORE INTO doc_array_elems(collection,doc_id,field,value)
                 VALUES(?,?,?,?)",
            )
            .bind(collection)
            .bind(doc_id)
            .bind(field)
            .bind(value)
            .execute(&mut *txn)
            .await
            .map_err(map_err)?;
        }
        FieldOp::ArrayRemove { field, value } => {
            sqlx::query(
                "DELETE FROM doc_array_elems
                 WHERE collection=? AND doc_id=? AND field=? AND value=?",
            )
            .bind(collection)
            .bind(doc_id)
            .bind(field)
            .bind(value)
            .execute(&mut *txn)
            .await
            .map_err(map_err)?;
        }
        FieldOp::Set { field, value } => {
            let (kind, text_value, ts_value) = match value {
                FieldValue::Text(t) => ("text", Some(t.clone()), None),
                FieldValue::Timestamp(ts) => ("ts", None, Some(ts.timestamp())),
                FieldValue::Array(_) => {
                    return Err(DocStoreError::Backend(
                        "whole-array set is not supported; use array ops".into(),
                    ))
                }
            };
            sqlx::query(
                "INSERT INTO doc_fields(collection,doc_id,field,kind,text_value,ts_value)
                 VALUES(?,?,?,?,?,?)
                 ON CONFLICT(collection,doc_id,field)
                 DO UPDATE SET kind=excluded.kind,
                               text_value=excluded.text_value,
                               ts_value=excluded.ts_value",
            )
            .bind(collection)
            .bind(doc_id)
            .bind(field)
            .bind(kind)
            .bind(text_value)
            .bind(ts_value)
            .execute(&mut *txn)
            .await
            .map_err(map_err)?;
        }
    }
    Ok(())
}

#[async_trait::async_trait]
impl DocStore for SqliteDocStore {
    async fn create(&self, collection: &str, doc: &Document) -> Result<(), DocStoreError> {
        let mut txn = self.pool.begin().await.map_err(map_err)?;
        insert_doc(&mut txn, collection, doc).await?;
        txn.commit().await.map_err(map_err)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Document, DocStoreError> {
        let mut txn = self.pool.begin().await.map_err(map_err)?;
        if !doc_exists(&mut *txn, collection, id).await? {
            return Err(DocStoreError::NotFound);
        }

        let mut doc = Document::new(id);

        let fields = sqlx::query_as::<_, (String, String, Option<String>, Option<i64>)>(
            "SELECT field,kind,text_value,ts_value FROM doc_fields
             WHERE collection=? AND doc_id=?",
        )
        .bind(collection)
        .bind(id)
        .fetch_all(&mut *txn)
        .await
        .map_err(map_err)?;

        for (field, kind, text_value, ts_value) in fields {
            let value = match kind.as_str() {
                "text" => FieldValue::Text(text_value.unwrap_or_default()),
                "ts" => {
                    let secs = ts_value.unwrap_or_default();
                    let ts = DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| {
                        DocStoreError::Backend(format!("bad timestamp {} in {}", secs, id))
                    })?;
                    FieldValue::Timestamp(ts)
                }
                other => {
                    return Err(DocStoreError::Backend(format!(
                        "unknown field kind {:?} in {}",
                        other, id
                    )))
                }
            };
            doc.fields.insert(field, value);
        }

        let elems = sqlx::query_as::<_, (String, String)>(
            "SELECT field,value FROM doc_array_elems
             WHERE collection=? AND doc_id=? ORDER BY field,value",
        )
        .bind(collection)
        .bind(id)
        .fetch_all(&mut *txn)
        .await
        .map_err(map_err)?;

        for (field, value) in elems {
            doc.apply(&FieldOp::ArrayUnion { field, value });
        }

        Ok(doc)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), DocStoreError> {
        let mut txn = self.pool.begin().await.map_err(map_err)?;
        delete_doc(&mut txn, collection, id).await?;
        txn.commit().await.map_err(map_err)
    }

    async fn apply_batch(&self, ops: &[WriteOp]) -> Result<(), DocStoreError> {
        let mut txn = self.pool.begin().await.map_err(map_err)?;

        // Bailing out anywhere in the loop rolls the transaction back on drop.
        for op in ops {
            match op {
                WriteOp::Create { collection, doc } => {
                    insert_doc(&mut txn, collection, doc).await?;
                }
                WriteOp::Update {
                    collection,
                    doc_id,
                    op,
                } => {
                    if !doc_exists(&mut txn, collection, doc_id).await? {
                        return Err(DocStoreError::NotFound);
                    }
                    apply_field_op(&mut txn, collection, doc_id, op).await?;
                }
                WriteOp::Delete { collection, doc_id } => {
                    delete_doc(&mut txn, collection, doc_id).await?;
                }
            }
        }

        txn.commit().await.map_err(map_err)
    }

    async fn find_array_contains(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, DocStoreError> {
        let ids = sqlx::query_as::<_, (String,)>(
            "SELECT doc_id FROM doc_array_elems
             WHERE collection=? AND field=? AND value=? ORDER BY doc_id",
        )
        .bind(collection)
        .bind(field)
        .bind(value)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        let mut out = Vec::with_capacity(ids.len());
        for (id,) in ids {
            out.push(self.get(collection, &id).await?);
        }
        Ok(out)
    }

    async fn find_field_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, DocStoreError> {
        let ids = sqlx::query_as::<_, (String,)>(
            "SELECT doc_id FROM doc_fields
             WHERE collection=? AND field=? AND kind='text' AND text_value=?
             ORDER BY doc_id",
        )
        .bind(collection)
        .bind(field)
        .bind(value)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        let mut out = Vec::with_capacity(ids.len());
        for (id,) in ids {
            out.push(self.get(collection, &id).await?);
        }
        Ok(out)
    }
}
