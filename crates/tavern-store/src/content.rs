//! Content read model: threads and listings synced in by the platform so
//! the bot selector has something to aim at. The platform owns the real
//! content tables; rows here are disposable projections.

use chrono::{DateTime, Utc};
use rusqlite::params;

use tavern_shared::{Coins, ContentKind};

use crate::convert::{bad_enum, parse_ts, parse_uuid};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::ContentItem;
use crate::tx::StoreTx;

impl StoreTx<'_> {
    pub fn upsert_content(&self, item: &ContentItem) -> Result<()> {
        self.conn.execute(
            "INSERT INTO content_items (id, author_id, kind, price, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET price = excluded.price",
            params![
                item.id.to_string(),
                item.author_id.to_string(),
                item.kind.as_str(),
                item.price,
                item.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Items created at or after `since`, newest first.
    pub fn recent_content(&self, since: DateTime<Utc>) -> Result<Vec<ContentItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, author_id, kind, price, created_at
             FROM content_items WHERE created_at >= ?1
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![since.to_rfc3339()], row_to_item)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }
}

impl Database {
    pub fn recent_content(&self, since: DateTime<Utc>) -> Result<Vec<ContentItem>> {
        self.view(|tx| tx.recent_content(since))
    }
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContentItem> {
    let id_str: String = row.get(0)?;
    let author_str: String = row.get(1)?;
    let kind_str: String = row.get(2)?;
    let price: Option<Coins> = row.get(3)?;
    let ts_str: String = row.get(4)?;

    Ok(ContentItem {
        id: parse_uuid(0, &id_str)?,
        author_id: parse_uuid(1, &author_str)?,
        kind: ContentKind::from_str(&kind_str).ok_or_else(|| bad_enum(2, &kind_str))?,
        price,
        created_at: parse_ts(4, &ts_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn recent_window_filters_old_items() {
        let (_dir, mut db) = test_db();
        let now = Utc::now();

        let fresh = ContentItem {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            kind: ContentKind::Thread,
            price: None,
            created_at: now - Duration::minutes(5),
        };
        let stale = ContentItem {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            kind: ContentKind::Listing,
            price: Some(40),
            created_at: now - Duration::hours(2),
        };

        db.with_tx::<_, StoreError>(|tx| {
            tx.upsert_content(&fresh)?;
            tx.upsert_content(&stale)?;
            Ok(())
        })
        .unwrap();

        let recent = db.recent_content(now - Duration::minutes(30)).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0], fresh);
    }
}
