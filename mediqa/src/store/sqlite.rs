//! SQLite passage store backed by `rig-sqlite` and the `sqlite-vec`
//! extension.
//!
//! Passages live in a `passages` table; `rig-sqlite` maintains the paired
//! `passages_embeddings` table. Similarity queries go through
//! `vec_distance_cosine` directly because the query embedding is already
//! computed by the time the store is asked to search.

use rig::OneOrMany;
use rig::embeddings::{Embedding, EmbeddingModel};
use rig_sqlite::{Column, ColumnValue, SqliteVectorStore, SqliteVectorStoreTable};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;
use tokio_rusqlite::{Connection, OptionalExtension, ffi};

use crate::types::RagError;

/// Row shape persisted by `rig-sqlite` for each passage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PassageRow {
    pub id: String,
    pub source: String,
    #[serde(deserialize_with = "deserialize_chunk_index")]
    pub chunk_index: usize,
    pub content: String,
    #[serde(deserialize_with = "deserialize_metadata_field")]
    pub metadata: serde_json::Value,
}

impl SqliteVectorStoreTable for PassageRow {
    fn name() -> &'static str {
        "passages"
    }

    fn schema() -> Vec<Column> {
        vec![
            Column::new("id", "TEXT PRIMARY KEY"),
            Column::new("source", "TEXT").indexed(),
            Column::new("chunk_index", "TEXT"),
            Column::new("metadata", "TEXT"),
            Column::new("content", "TEXT"),
        ]
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn column_values(&self) -> Vec<(&'static str, Box<dyn ColumnValue>)> {
        vec![
            ("id", Box::new(self.id.clone())),
            ("source", Box::new(self.source.clone())),
            ("chunk_index", Box::new(self.chunk_index.to_string())),
            ("metadata", Box::new(self.metadata.to_string())),
            ("content", Box::new(self.content.clone())),
        ]
    }
}

// chunk_index is stored as TEXT; accept both numeric and string forms when
// rows come back through serde.
fn deserialize_chunk_index<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Num(u64),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Num(value) => usize::try_from(value)
            .map_err(|_| de::Error::custom(format!("chunk_index {value} does not fit in usize"))),
        Repr::Text(text) => text.parse::<usize>().map_err(|err| {
            de::Error::custom(format!("unable to parse chunk_index '{text}': {err}"))
        }),
    }
}

fn deserialize_metadata_field<'de, D>(deserializer: D) -> Result<serde_json::Value, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if let serde_json::Value::String(raw) = value {
        serde_json::from_str(&raw).map_or(Ok(serde_json::Value::String(raw)), Ok)
    } else {
        Ok(value)
    }
}

/// Passage store persisted to a local SQLite database file.
#[derive(Clone)]
pub struct SqlitePassageStore<E>
where
    E: EmbeddingModel + 'static,
{
    inner: SqliteVectorStore<E, PassageRow>,
    /// Connection clone for queries rig-sqlite has no API for.
    conn: Connection,
}

impl<E> SqlitePassageStore<E>
where
    E: EmbeddingModel + Clone + Send + Sync + 'static,
{
    /// Opens (or creates) the database at `path` and ensures the sqlite-vec
    /// extension is loaded and functional.
    pub async fn open(path: impl AsRef<Path>, model: &E) -> Result<Self, RagError> {
        Self::register_sqlite_vec()?;
        let conn = Connection::open(path)
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;
        conn.call(|conn| {
            let result = conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0));
            match result {
                Ok(_) => Ok(()),
                Err(err) => Err(tokio_rusqlite::Error::Rusqlite(err)),
            }
        })
        .await
        .map_err(|err| RagError::Storage(err.to_string()))?;
        let conn_for_queries = conn.clone();
        let store = SqliteVectorStore::new(conn, model)
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;
        Ok(Self {
            inner: store,
            conn: conn_for_queries,
        })
    }

    /// Stores passages with their precomputed embeddings.
    pub async fn add_passages(
        &self,
        passages: Vec<(PassageRow, Vec<f32>)>,
    ) -> Result<(), RagError> {
        if passages.is_empty() {
            return Ok(());
        }
        let mut rows = Vec::with_capacity(passages.len());
        for (row, embedding) in passages {
            let converted: Vec<f64> = embedding.into_iter().map(|value| value as f64).collect();
            let embed = Embedding {
                document: row.content.clone(),
                vec: converted,
            };
            rows.push((row, OneOrMany::one(embed)));
        }
        self.inner
            .add_rows(rows)
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;
        Ok(())
    }

    // sqlite-vec ships as a C auto-extension; registration is process-global
    // and must happen before the first connection opens.
    fn register_sqlite_vec() -> Result<(), RagError> {
        use std::sync::Mutex;

        static INIT: Once = Once::new();
        static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

        INIT.call_once(|| {
            let result = unsafe {
                type SqliteExtensionInit = unsafe extern "C" fn(
                    *mut ffi::sqlite3,
                    *mut *mut c_char,
                    *const ffi::sqlite3_api_routines,
                ) -> i32;

                let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
                let init_fn: SqliteExtensionInit =
                    transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
                let rc = ffi::sqlite3_auto_extension(Some(init_fn));
                if rc != 0 {
                    Err(format!(
                        "failed to register sqlite-vec extension (code {rc})"
                    ))
                } else {
                    Ok(())
                }
            };
            *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
        });

        INIT_RESULT
            .lock()
            .expect("init result mutex poisoned")
            .clone()
            .expect("init was called but result not set")
            .map_err(RagError::Storage)
    }

    /// Underlying connection, for queries the trait does not cover.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

use super::{PassageRecord, PassageStore};
use async_trait::async_trait;

/// Raw column values of one `passages` row: id, source, chunk_index,
/// content, metadata. Parsing happens outside the connection closures so
/// every query shares one code path.
type RawRow = (String, String, String, String, String);

const ROW_COLUMNS: &str = "id, source, chunk_index, content, metadata";

/// Converts raw column values into a record. A `chunk_index` that does not
/// parse is a storage error, not a silent zero; metadata that is not JSON is
/// kept as a plain string.
fn parse_row((id, source, chunk_index, content, metadata): RawRow) -> Result<PassageRecord, RagError> {
    let chunk_index = chunk_index.parse::<usize>().map_err(|err| {
        RagError::Storage(format!(
            "passage {id} has malformed chunk_index '{chunk_index}': {err}"
        ))
    })?;
    let metadata =
        serde_json::from_str(&metadata).unwrap_or(serde_json::Value::String(metadata));
    Ok(PassageRecord {
        id,
        source,
        chunk_index,
        content,
        metadata,
        embedding: None,
    })
}

#[async_trait]
impl<E> PassageStore for SqlitePassageStore<E>
where
    E: EmbeddingModel + Clone + Send + Sync + 'static,
{
    async fn insert_passages(&self, passages: Vec<PassageRecord>) -> Result<(), RagError> {
        if passages.is_empty() {
            return Ok(());
        }

        let rows_with_embeddings: Vec<(PassageRow, Vec<f32>)> = passages
            .into_iter()
            .filter_map(|record| {
                let embedding = record.embedding.clone()?;
                let row = PassageRow::from(record);
                Some((row, embedding))
            })
            .collect();

        self.add_passages(rows_with_embeddings).await
    }

    async fn get_passages_by_source(&self, source: &str) -> Result<Vec<PassageRecord>, RagError> {
        let source = source.to_string();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {ROW_COLUMNS} FROM passages WHERE source = ? ORDER BY rowid"
                    ))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map([&source], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                rows.collect::<Result<Vec<RawRow>, _>>()
                    .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;

        rows.into_iter().map(parse_row).collect()
    }

    async fn get_passage_by_id(&self, id: &str) -> Result<Option<PassageRecord>, RagError> {
        let id = id.to_string();
        let row = self
            .conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(&format!("SELECT {ROW_COLUMNS} FROM passages WHERE id = ?"))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let raw: Option<RawRow> = stmt
                    .query_row([&id], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                    })
                    .optional()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(raw)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;

        row.map(parse_row).transpose()
    }

    async fn delete_passages_by_source(&self, source: &str) -> Result<usize, RagError> {
        let source = source.to_string();
        let conn = self.connection();

        conn.call(move |conn| {
            let deleted = conn
                .execute("DELETE FROM passages WHERE source = ?", [&source])
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
            Ok(deleted)
        })
        .await
        .map_err(|err| RagError::Storage(err.to_string()))
    }

    async fn search_similar(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(PassageRecord, f32)>, RagError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        // The rig vector index wants to embed the query text itself; the
        // embedding is already in hand here, so query sqlite-vec directly.
        let embedding_json = serde_json::to_string(query_embedding)?;

        let hits = self
            .conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT p.id, p.source, p.chunk_index, p.content, p.metadata, \
                         vec_distance_cosine(e.embedding, vec_f32(?)) as distance \
                         FROM passages p \
                         JOIN passages_embeddings e ON p.rowid = e.rowid \
                         ORDER BY distance ASC \
                         LIMIT {top_k}"
                    ))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map([&embedding_json], |row| {
                        let raw: RawRow =
                            (row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?);
                        let distance: f32 = row.get(5)?;
                        Ok((raw, distance))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                rows.collect::<Result<Vec<_>, _>>()
                    .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;

        hits.into_iter()
            .map(|(raw, distance)| {
                // Cosine distance in [0, 2]; report 1 - distance so larger
                // means more similar.
                Ok((parse_row(raw)?, 1.0 - distance))
            })
            .collect()
    }

    async fn count(&self) -> Result<usize, RagError> {
        let conn = self.connection();

        conn.call(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM passages", [], |row| row.get(0))
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
            Ok(count as usize)
        })
        .await
        .map_err(|err| RagError::Storage(err.to_string()))
    }
}
