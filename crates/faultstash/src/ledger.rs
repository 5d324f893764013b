//! Persistent run ledger
//!
//! One object in storage maps each project to the watermark of its last
//! successful backup, one `name:epoch` line per project. The ledger is read
//! lazily on the first watermark lookup, and written exactly once, at the
//! end of a fully successful run.

use std::collections::HashMap;

use chrono::Utc;
use faultstash_core::Result;

use crate::storage::ObjectStore;

/// Per-run watermark store.
///
/// `next` holds the watermark each touched project will resume from on the
/// following run, captured at the moment the project's previous watermark
/// was read (not at save time), so records created mid-scan are not skipped.
pub struct RunLedger {
    bucket: String,
    key: String,
    override_timestamp: Option<i64>,
    loaded: bool,
    previous: HashMap<String, i64>,
    next: HashMap<String, i64>,
}

impl RunLedger {
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        override_timestamp: Option<i64>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            override_timestamp,
            loaded: false,
            previous: HashMap::new(),
            next: HashMap::new(),
        }
    }

    /// Returns the watermark the given project should resume from.
    ///
    /// The first lookup of the run loads the ledger object; a missing object
    /// reads as an empty ledger (first-ever run). A project absent from the
    /// ledger defaults to 0. When an override timestamp was supplied it wins
    /// unconditionally and the ledger is never read. The first lookup for a
    /// project also captures `now` as its next-run watermark.
    pub async fn previous_timestamp(
        &mut self,
        store: &impl ObjectStore,
        project_name: &str,
    ) -> Result<i64> {
        let key = project_name.trim().to_lowercase();
        if let Some(ts) = self.previous.get(&key) {
            return Ok(*ts);
        }

        let ts = if let Some(override_ts) = self.override_timestamp {
            override_ts
        } else {
            if !self.loaded {
                self.load(store).await?;
            }
            self.previous.get(&key).copied().unwrap_or(0)
        };
        self.previous.insert(key.clone(), ts);

        let next_ts = Utc::now().timestamp();
        self.next.insert(key, next_ts);
        tracing::info!(
            project = project_name,
            previous = ts,
            next = next_ts,
            "watermark"
        );
        Ok(ts)
    }

    async fn load(&mut self, store: &impl ObjectStore) -> Result<()> {
        match store.get_object(&self.bucket, &self.key).await? {
            None => {
                tracing::debug!(key = %self.key, "no ledger object yet, starting empty");
            }
            Some(body) => {
                let text = String::from_utf8_lossy(&body);
                for line in text.lines() {
                    // Names may have been hand-edited; trim and lowercase.
                    // A malformed epoch reads as 0.
                    if let Some((name, epoch)) = line.split_once(':') {
                        let name = name.trim().to_lowercase();
                        if name.is_empty() {
                            continue;
                        }
                        let epoch = epoch.trim().parse().unwrap_or(0);
                        self.previous.insert(name, epoch);
                    }
                }
                tracing::debug!(key = %self.key, projects = self.previous.len(), "ledger loaded");
            }
        }
        self.loaded = true;
        Ok(())
    }

    /// Persists the next-run watermarks as one whole-object PUT.
    ///
    /// Projects not touched this run keep the value they had in the loaded
    /// ledger, so skipping a project never loses its watermark.
    pub async fn save_next_run(&self, store: &impl ObjectStore) -> Result<()> {
        let mut body = String::new();
        for (name, epoch) in &self.next {
            body.push_str(name);
            body.push(':');
            body.push_str(&epoch.to_string());
            body.push('\n');
        }
        for (name, epoch) in &self.previous {
            if !self.next.contains_key(name) {
                body.push_str(name);
                body.push(':');
                body.push_str(&epoch.to_string());
                body.push('\n');
            }
        }
        store
            .put_object(&self.bucket, &self.key, body.into_bytes())
            .await?;
        tracing::info!(key = %self.key, projects = self.next.len(), "ledger saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::collections::HashMap;

    const BUCKET: &str = "bucket";
    const KEY: &str = "faultstash-run-data.txt";

    async fn saved_entries(store: &MemoryStore) -> HashMap<String, i64> {
        let body = store.committed(BUCKET, KEY).await.expect("ledger saved");
        String::from_utf8(body)
            .unwrap()
            .lines()
            .map(|line| {
                let (name, epoch) = line.split_once(':').unwrap();
                (name.to_string(), epoch.parse().unwrap())
            })
            .collect()
    }

    #[tokio::test(flavor = "current_thread")]
    async fn first_run_defaults_to_zero() {
        let store = MemoryStore::new();
        let mut ledger = RunLedger::new(BUCKET, KEY, None);
        assert_eq!(ledger.previous_timestamp(&store, "Foo").await.unwrap(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn lookup_is_memoized_and_case_insensitive() {
        let store = MemoryStore::new();
        store
            .seed_object(BUCKET, KEY, b"foo:1000\n".to_vec())
            .await;
        let mut ledger = RunLedger::new(BUCKET, KEY, None);
        assert_eq!(ledger.previous_timestamp(&store, "Foo").await.unwrap(), 1000);
        assert_eq!(
            ledger.previous_timestamp(&store, " FOO ").await.unwrap(),
            1000
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn untouched_projects_keep_their_watermark() {
        let store = MemoryStore::new();
        store
            .seed_object(BUCKET, KEY, b"foo:1000\nbar:2000\n".to_vec())
            .await;
        let mut ledger = RunLedger::new(BUCKET, KEY, None);
        assert_eq!(ledger.previous_timestamp(&store, "foo").await.unwrap(), 1000);
        ledger.save_next_run(&store).await.unwrap();

        let entries = saved_entries(&store).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["bar"], 2000);
        // foo was touched, so its entry moved to the freshly captured epoch.
        assert!(entries["foo"] > 1000);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn round_trip_returns_the_captured_watermark() {
        let store = MemoryStore::new();
        {
            let mut ledger = RunLedger::new(BUCKET, KEY, None);
            ledger.previous_timestamp(&store, "foo").await.unwrap();
            ledger.save_next_run(&store).await.unwrap();
        }
        let saved = saved_entries(&store).await["foo"];

        let mut fresh = RunLedger::new(BUCKET, KEY, None);
        assert_eq!(
            fresh.previous_timestamp(&store, "foo").await.unwrap(),
            saved
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn override_wins_over_ledger_contents() {
        let store = MemoryStore::new();
        store
            .seed_object(BUCKET, KEY, b"foo:1000\n".to_vec())
            .await;
        let mut ledger = RunLedger::new(BUCKET, KEY, Some(777));
        assert_eq!(ledger.previous_timestamp(&store, "foo").await.unwrap(), 777);
        assert_eq!(ledger.previous_timestamp(&store, "new").await.unwrap(), 777);

        ledger.save_next_run(&store).await.unwrap();
        let entries = saved_entries(&store).await;
        // The saved watermarks are freshly captured epochs, not the override.
        assert!(entries["foo"] > 777);
        assert!(entries["new"] > 777);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn blank_and_malformed_lines_are_tolerated() {
        let store = MemoryStore::new();
        store
            .seed_object(
                BUCKET,
                KEY,
                b"\n Foo :1000\nno-colon-line\nbar:not-a-number\n".to_vec(),
            )
            .await;
        let mut ledger = RunLedger::new(BUCKET, KEY, None);
        assert_eq!(ledger.previous_timestamp(&store, "foo").await.unwrap(), 1000);
        assert_eq!(ledger.previous_timestamp(&store, "bar").await.unwrap(), 0);
    }
}
