//! Legacy workflow metadata store.
//!
//! The workflow database is read-only input: items belong to a primary
//! collection and own file records tagged with a `use` (MASTER, MODS, …).
//! [`SqliteLegacyStore`] reads an SQLite export of it:
//!
//! ```sql
//! items(do_id TEXT PRIMARY KEY, name TEXT, type_name TEXT, primary_collection TEXT)
//! item_files(item_id TEXT, use_tag TEXT, path TEXT, name TEXT)
//! ```

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::MigrationError;
use crate::models::{FileUse, LegacyFile, LegacyItem};

#[async_trait]
pub trait LegacyStore: Send + Sync {
    /// Items whose primary collection is `collection_id`, ordered by id.
    async fn collection_items(&self, collection_id: &str) -> Result<Vec<LegacyItem>, MigrationError>;

    async fn item(&self, item_id: &str) -> Result<Option<LegacyItem>, MigrationError>;

    /// The item's file with this use, first by name if there are several.
    async fn file(&self, item_id: &str, file_use: &FileUse)
        -> Result<Option<LegacyFile>, MigrationError>;

    /// All of the item's files with this use, ordered by name.
    async fn files(&self, item_id: &str, file_use: &FileUse)
        -> Result<Vec<LegacyFile>, MigrationError>;
}

pub struct SqliteLegacyStore {
    pool: SqlitePool,
}

impl SqliteLegacyStore {
    /// Open an existing export read-only.
    pub async fn open(path: &Path) -> Result<Self, MigrationError> {
        if !path.exists() {
            return Err(MigrationError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "legacy database not found"),
            ));
        }
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Create (or open) a writable database with the expected tables.
    /// Used to build fixtures and test exports.
    pub async fn create(path: &Path) -> Result<Self, MigrationError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        create_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn item_count(&self) -> Result<i64, MigrationError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn insert_item(&self, item: &LegacyItem) -> Result<(), MigrationError> {
        sqlx::query(
            "INSERT INTO items (do_id, name, type_name, primary_collection) VALUES (?, ?, ?, ?)",
        )
        .bind(&item.id)
        .bind(&item.name)
        .bind(&item.type_name)
        .bind(&item.collection_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_file(&self, file: &LegacyFile) -> Result<(), MigrationError> {
        sqlx::query("INSERT INTO item_files (item_id, use_tag, path, name) VALUES (?, ?, ?, ?)")
            .bind(&file.item_id)
            .bind(file.file_use.as_str())
            .bind(file.path.to_string_lossy().into_owned())
            .bind(&file.name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

pub async fn create_schema(pool: &SqlitePool) -> Result<(), MigrationError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            do_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            type_name TEXT NOT NULL,
            primary_collection TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS item_files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id TEXT NOT NULL,
            use_tag TEXT NOT NULL,
            path TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY (item_id) REFERENCES items(do_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_collection ON items(primary_collection)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_item_files_item ON item_files(item_id, use_tag)")
        .execute(pool)
        .await?;
    Ok(())
}

// Exports are produced elsewhere, so NULL or mistyped columns are errors
// rather than panics.
fn item_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<LegacyItem, MigrationError> {
    Ok(LegacyItem {
        id: row.try_get("do_id")?,
        name: row.try_get("name")?,
        type_name: row.try_get("type_name")?,
        collection_id: row.try_get("primary_collection")?,
    })
}

fn file_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<LegacyFile, MigrationError> {
    let path: String = row.try_get("path")?;
    let tag: String = row.try_get("use_tag")?;
    Ok(LegacyFile {
        item_id: row.try_get("item_id")?,
        file_use: FileUse::parse(&tag),
        path: path.into(),
        name: row.try_get("name")?,
    })
}

#[async_trait]
impl LegacyStore for SqliteLegacyStore {
    async fn collection_items(&self, collection_id: &str) -> Result<Vec<LegacyItem>, MigrationError> {
        let rows = sqlx::query(
            "SELECT do_id, name, type_name, primary_collection FROM items \
             WHERE primary_collection = ? ORDER BY do_id",
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(item_from_row).collect()
    }

    async fn item(&self, item_id: &str) -> Result<Option<LegacyItem>, MigrationError> {
        let row = sqlx::query(
            "SELECT do_id, name, type_name, primary_collection FROM items WHERE do_id = ?",
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn file(
        &self,
        item_id: &str,
        file_use: &FileUse,
    ) -> Result<Option<LegacyFile>, MigrationError> {
        let row = sqlx::query(
            "SELECT item_id, use_tag, path, name FROM item_files \
             WHERE item_id = ? AND use_tag = ? ORDER BY name LIMIT 1",
        )
        .bind(item_id)
        .bind(file_use.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(file_from_row).transpose()
    }

    async fn files(
        &self,
        item_id: &str,
        file_use: &FileUse,
    ) -> Result<Vec<LegacyFile>, MigrationError> {
        let rows = sqlx::query(
            "SELECT item_id, use_tag, path, name FROM item_files \
             WHERE item_id = ? AND use_tag = ? ORDER BY name",
        )
        .bind(item_id)
        .bind(file_use.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(file_from_row).collect()
    }
}

/// Vector-backed store for tests.
#[derive(Default)]
pub struct MemoryLegacyStore {
    items: Vec<LegacyItem>,
    files: Vec<LegacyFile>,
}

impl MemoryLegacyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_item(&mut self, item: LegacyItem) {
        self.items.push(item);
    }

    pub fn add_file(&mut self, file: LegacyFile) {
        self.files.push(file);
    }

    fn matching(&self, item_id: &str, file_use: &FileUse) -> Vec<LegacyFile> {
        let mut out: Vec<LegacyFile> = self
            .files
            .iter()
            .filter(|f| f.item_id == item_id && &f.file_use == file_use)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

#[async_trait]
impl LegacyStore for MemoryLegacyStore {
    async fn collection_items(&self, collection_id: &str) -> Result<Vec<LegacyItem>, MigrationError> {
        let mut out: Vec<LegacyItem> = self
            .items
            .iter()
            .filter(|i| i.collection_id == collection_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn item(&self, item_id: &str) -> Result<Option<LegacyItem>, MigrationError> {
        Ok(self.items.iter().find(|i| i.id == item_id).cloned())
    }

    async fn file(
        &self,
        item_id: &str,
        file_use: &FileUse,
    ) -> Result<Option<LegacyFile>, MigrationError> {
        Ok(self.matching(item_id, file_use).into_iter().next())
    }

    async fn files(
        &self,
        item_id: &str,
        file_use: &FileUse,
    ) -> Result<Vec<LegacyFile>, MigrationError> {
        Ok(self.matching(item_id, file_use))
    }
}
