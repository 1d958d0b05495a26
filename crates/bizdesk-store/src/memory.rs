//! Persisted thread summaries

use anyhow::Result;
use rusqlite::{OptionalExtension, params};
use tracing::debug;

use crate::db::Store;

/// Serialized state of one conversation thread
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadRecord {
    pub thread_id: String,
    /// JSON document owned by the thread memory layer
    pub payload: String,
    /// Unix seconds of the last write
    pub updated_at: i64,
}

impl Store {
    pub async fn load_thread(&self, thread_id: &str) -> Result<Option<ThreadRecord>> {
        let thread_id = thread_id.to_owned();
        self.call(move |conn| {
            let record = conn
                .query_row(
                    "SELECT thread_id, payload, updated_at FROM thread_memory WHERE thread_id = ?1",
                    params![&thread_id],
                    |row| {
                        Ok(ThreadRecord {
                            thread_id: row.get(0)?,
                            payload: row.get(1)?,
                            updated_at: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    pub async fn save_thread(&self, record: ThreadRecord) -> Result<()> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO thread_memory (thread_id, payload, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(thread_id) DO UPDATE SET
                    payload = excluded.payload,
                    updated_at = excluded.updated_at",
                params![&record.thread_id, &record.payload, record.updated_at],
            )?;
            debug!("Saved thread {} ({} bytes)", record.thread_id, record.payload.len());
            Ok(())
        })
        .await
    }

    pub async fn delete_thread(&self, thread_id: &str) -> Result<bool> {
        let thread_id = thread_id.to_owned();
        self.call(move |conn| {
            let n = conn.execute(
                "DELETE FROM thread_memory WHERE thread_id = ?1",
                params![&thread_id],
            )?;
            Ok(n > 0)
        })
        .await
    }

    /// Drop threads last written before `cutoff` (unix seconds)
    pub async fn purge_threads_before(&self, cutoff: i64) -> Result<usize> {
        self.call(move |conn| {
            let n = conn.execute(
                "DELETE FROM thread_memory WHERE updated_at < ?1",
                params![cutoff],
            )?;
            if n > 0 {
                debug!("Purged {} expired threads", n);
            }
            Ok(n)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_thread_upsert_and_purge() -> Result<()> {
        let store = Store::open_in_memory()?;
        assert!(store.load_thread("t1").await?.is_none());

        store
            .save_thread(ThreadRecord {
                thread_id: "t1".into(),
                payload: "{}".into(),
                updated_at: 100,
            })
            .await?;
        store
            .save_thread(ThreadRecord {
                thread_id: "t1".into(),
                payload: "{\"summary\":\"x\"}".into(),
                updated_at: 200,
            })
            .await?;

        let loaded = store.load_thread("t1").await?.unwrap();
        assert_eq!(loaded.updated_at, 200);
        assert!(loaded.payload.contains("summary"));

        assert_eq!(store.purge_threads_before(150).await?, 0);
        assert_eq!(store.purge_threads_before(250).await?, 1);
        assert!(!store.delete_thread("t1").await?);
        Ok(())
    }
}
