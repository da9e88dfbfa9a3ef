//! Module de gestion de la base de données SQLite pour le cache média
//!
//! Une ligne par média stocké, avec le suivi des accès. La ligne n'est écrite
//! qu'une fois le fichier renommé à sa place définitive.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;

const TABLE: &str = "media_entries";

/// Entrée de cache représentant un média stocké
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Clé dérivée de la référence (SHA1 tronqué)
    pub pk: String,
    /// Référence d'origine, telle que reçue lors du dernier peuplement
    pub source_url: String,
    /// Type MIME annoncé par le serveur
    pub content_type: Option<String>,
    /// Extension du fichier sur disque
    pub file_ext: String,
    /// Taille du fichier en octets
    pub size: u64,
    /// Nombre de lectures
    pub hits: i64,
    /// Date/heure du dernier accès (RFC3339)
    pub last_used: Option<String>,
}

impl CacheEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let size: i64 = row.get(4)?;
        Ok(Self {
            pk: row.get(0)?,
            source_url: row.get(1)?,
            content_type: row.get(2)?,
            file_ext: row.get(3)?,
            size: size.max(0) as u64,
            hits: row.get(5)?,
            last_used: row.get(6)?,
        })
    }
}

/// Base de données SQLite du cache
#[derive(Debug)]
pub struct DB {
    conn: Mutex<Connection>,
}

impl DB {
    /// Ouvre (ou crée) la base et sa table
    ///
    /// ```rust,no_run
    /// use sgncache::db::DB;
    /// use std::path::Path;
    ///
    /// let db = DB::init(Path::new("cache.db")).unwrap();
    /// ```
    pub fn init(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {TABLE} (
                    pk TEXT PRIMARY KEY,
                    source_url TEXT NOT NULL,
                    content_type TEXT,
                    file_ext TEXT NOT NULL,
                    size INTEGER NOT NULL DEFAULT 0,
                    hits INTEGER NOT NULL DEFAULT 0,
                    last_used TEXT
                )"
            ),
            [],
        )?;

        conn.execute(
            &format!("CREATE INDEX IF NOT EXISTS idx_{TABLE}_lru ON {TABLE} (last_used ASC, hits ASC)"),
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // Une connexion empoisonnée reste utilisable : SQLite garde sa cohérence.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Ajoute ou remplace une entrée
    ///
    /// Le compteur d'accès est conservé lors d'un remplacement.
    pub fn upsert(
        &self,
        pk: &str,
        source_url: &str,
        content_type: Option<&str>,
        file_ext: &str,
        size: u64,
    ) -> rusqlite::Result<()> {
        let conn = self.lock();
        conn.execute(
            &format!(
                "INSERT INTO {TABLE} (pk, source_url, content_type, file_ext, size, hits, last_used)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
                 ON CONFLICT(pk) DO UPDATE SET
                     source_url = excluded.source_url,
                     content_type = excluded.content_type,
                     file_ext = excluded.file_ext,
                     size = excluded.size,
                     last_used = excluded.last_used"
            ),
            params![
                pk,
                source_url,
                content_type,
                file_ext,
                size as i64,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Récupère une entrée par sa clé
    pub fn get(&self, pk: &str) -> rusqlite::Result<Option<CacheEntry>> {
        let conn = self.lock();
        conn.query_row(
            &format!(
                "SELECT pk, source_url, content_type, file_ext, size, hits, last_used
                 FROM {TABLE} WHERE pk = ?1"
            ),
            [pk],
            CacheEntry::from_row,
        )
        .optional()
    }

    /// Met à jour le compteur d'accès et la date du dernier accès
    pub fn update_hit(&self, pk: &str) -> rusqlite::Result<()> {
        let conn = self.lock();
        conn.execute(
            &format!("UPDATE {TABLE} SET hits = hits + 1, last_used = ?1 WHERE pk = ?2"),
            params![Utc::now().to_rfc3339(), pk],
        )?;
        Ok(())
    }

    /// Supprime une entrée, retourne `true` si une ligne existait
    pub fn delete(&self, pk: &str) -> rusqlite::Result<bool> {
        let conn = self.lock();
        let changed = conn.execute(&format!("DELETE FROM {TABLE} WHERE pk = ?1"), [pk])?;
        Ok(changed > 0)
    }

    /// Liste toutes les clés connues
    pub fn list_keys(&self) -> rusqlite::Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("SELECT pk FROM {TABLE} ORDER BY pk"))?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }

    /// Récupère toutes les entrées, les plus anciennes d'abord
    pub fn get_all(&self) -> rusqlite::Result<Vec<CacheEntry>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT pk, source_url, content_type, file_ext, size, hits, last_used
             FROM {TABLE} ORDER BY last_used ASC, hits ASC"
        ))?;
        let entries = stmt
            .query_map([], CacheEntry::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Compte le nombre total d'entrées
    pub fn count(&self) -> rusqlite::Result<usize> {
        let conn = self.lock();
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {TABLE}"), [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }

    /// Purge toutes les entrées
    pub fn purge(&self) -> rusqlite::Result<()> {
        let conn = self.lock();
        conn.execute(&format!("DELETE FROM {TABLE}"), [])?;
        Ok(())
    }
}
