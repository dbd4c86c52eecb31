use domain::errors::{RagError, RagResult};
use domain::models::{Chunk, Embedding};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};

pub const META_DIMENSION: &str = "dimension";
pub const META_SOURCE_DIGEST: &str = "source_digest";
pub const META_EMBEDDING_MODEL: &str = "embedding_model";

fn storage_err(err: rusqlite::Error) -> RagError {
    RagError::Storage(err.to_string())
}

fn decode_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, i64, String, Vec<u8>)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

/// SQLite file holding chunk texts and their vectors in insertion order.
pub struct EmbeddingStorage {
    conn: Connection,
    path: PathBuf,
}

impl EmbeddingStorage {
    /// Create a fresh database, including parent directories.
    pub fn create(db_path: impl AsRef<Path>) -> RagResult<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path).map_err(storage_err)?;
        Self::setup_db(&conn).map_err(storage_err)?;
        Ok(Self {
            conn,
            path: db_path.to_path_buf(),
        })
    }

    /// Open a database written by [`EmbeddingStorage::create`]. Anything
    /// missing or malformed is reported as corruption.
    pub fn open_existing(db_path: impl AsRef<Path>) -> RagResult<Self> {
        let db_path = db_path.as_ref();
        let corrupt = |reason: String| RagError::IndexCorruption {
            path: db_path.to_path_buf(),
            reason,
        };
        if !db_path.is_file() {
            return Err(corrupt("index database file is missing".to_string()));
        }
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| corrupt(e.to_string()))?;
        conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get::<_, i64>(0))
            .map_err(|e| corrupt(e.to_string()))?;
        conn.query_row("SELECT COUNT(*) FROM meta", [], |row| row.get::<_, i64>(0))
            .map_err(|e| corrupt(e.to_string()))?;
        Ok(Self {
            conn,
            path: db_path.to_path_buf(),
        })
    }

    fn setup_db(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "
            PRAGMA journal_mode=DELETE;
            PRAGMA synchronous=FULL;
            CREATE TABLE IF NOT EXISTS chunks (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                char_offset INTEGER NOT NULL,
                text TEXT NOT NULL,
                vector BLOB NOT NULL
            );
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
        ",
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append all embeddings in one transaction; nothing is written on error.
    pub fn insert_embeddings(&self, embeddings: &[Embedding]) -> RagResult<()> {
        self.insert_embeddings_with_meta(embeddings, &[])
    }

    /// Append embeddings and upsert `meta` pairs as a single transaction.
    pub fn insert_embeddings_with_meta(
        &self,
        embeddings: &[Embedding],
        meta: &[(&str, &str)],
    ) -> RagResult<()> {
        let tx = self.conn.unchecked_transaction().map_err(storage_err)?;
        {
            let mut stmt = tx
                .prepare("INSERT INTO chunks (source, char_offset, text, vector) VALUES (?1, ?2, ?3, ?4)")
                .map_err(storage_err)?;
            for embedding in embeddings {
                let vector_bytes = serde_json::to_vec(&embedding.vector)
                    .map_err(|e| RagError::Storage(e.to_string()))?;
                stmt.execute(params![
                    embedding.chunk.source,
                    embedding.chunk.offset as i64,
                    embedding.chunk.text,
                    vector_bytes
                ])
                .map_err(storage_err)?;
            }
            for (key, value) in meta {
                tx.execute(
                    "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
                    params![key, value],
                )
                .map_err(storage_err)?;
            }
        }
        tx.commit().map_err(storage_err)?;
        Ok(())
    }

    /// All entries in insertion order. A row that cannot be decoded means
    /// the index is corrupt.
    pub fn get_all_embeddings(&self) -> RagResult<Vec<Embedding>> {
        let corrupt = |reason: String| RagError::IndexCorruption {
            path: self.path.clone(),
            reason,
        };
        let mut stmt = self
            .conn
            .prepare("SELECT source, char_offset, text, vector FROM chunks ORDER BY seq")
            .map_err(|e| corrupt(e.to_string()))?;
        let mut rows = stmt.query([]).map_err(|e| corrupt(e.to_string()))?;
        let mut embeddings = Vec::new();
        while let Some(row) = rows.next().map_err(|e| corrupt(e.to_string()))? {
            let (source, offset, text, vector_bytes) = decode_row(row)
                .map_err(|e| corrupt(format!("unreadable chunk row: {}", e)))?;
            let vector: Vec<f32> = serde_json::from_slice(&vector_bytes).map_err(|e| {
                corrupt(format!("undecodable vector for {}@{}: {}", source, offset, e))
            })?;
            let offset = usize::try_from(offset)
                .map_err(|_| corrupt(format!("negative offset {} for {}", offset, source)))?;
            embeddings.push(Embedding {
                chunk: Chunk {
                    source,
                    offset,
                    text,
                },
                vector,
            });
        }
        Ok(embeddings)
    }

    pub fn count(&self) -> RagResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(storage_err)?;
        Ok(count as usize)
    }

    pub fn get_meta(&self, key: &str) -> RagResult<Option<String>> {
        self.conn
            .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(storage_err)
    }
}
