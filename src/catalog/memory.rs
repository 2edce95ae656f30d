//! In-memory catalog with a configurable name matching policy

use super::traits::Catalog;
use crate::types::{DownloadTarget, MediaFile, MediaRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// How a candidate name is compared with the names already in the catalog
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "chars")]
pub enum MatchPolicy {
    /// Names must be identical
    #[default]
    Exact,
    /// Only the first N characters are compared
    FirstChars(usize),
    /// The last N characters of both names are ignored
    IgnoreLastChars(usize),
}

impl MatchPolicy {
    /// Whether `candidate` names the same item as `known`
    ///
    /// # Examples
    ///
    /// ```
    /// use media_dl::catalog::MatchPolicy;
    ///
    /// assert!(MatchPolicy::FirstChars(5).matches("Hello world", "Hello there"));
    /// assert!(MatchPolicy::IgnoreLastChars(4).matches("Clip 2024", "Clip 2023"));
    /// assert!(!MatchPolicy::Exact.matches("Clip", "clip"));
    /// ```
    pub fn matches(&self, candidate: &str, known: &str) -> bool {
        match *self {
            MatchPolicy::Exact => candidate == known,
            MatchPolicy::FirstChars(n) => {
                candidate.chars().take(n).eq(known.chars().take(n))
            }
            MatchPolicy::IgnoreLastChars(n) => {
                let keep = |s: &str| s.chars().count().saturating_sub(n);
                let (a, b) = (keep(candidate), keep(known));
                a == b && candidate.chars().take(a).eq(known.chars().take(b))
            }
        }
    }
}

/// Catalog that keeps records in memory, grouped by target id
///
/// Useful for tests and for callers that persist records themselves by
/// subscribing to [`Event::MediaConfirmed`](crate::Event::MediaConfirmed).
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    policy: MatchPolicy,
    records: Mutex<HashMap<String, Vec<MediaRecord>>>,
}

impl InMemoryCatalog {
    /// Empty catalog matching names exactly
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty catalog with the given matching policy
    pub fn with_policy(policy: MatchPolicy) -> Self {
        Self {
            policy,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Seed a record under a target id
    pub async fn insert(&self, target_id: &str, record: MediaRecord) {
        self.records
            .lock()
            .await
            .entry(target_id.to_string())
            .or_default()
            .push(record);
    }

    /// Snapshot of the records stored under a target id
    pub async fn records(&self, target_id: &str) -> Vec<MediaRecord> {
        self.records
            .lock()
            .await
            .get(target_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of records across all targets
    pub async fn len(&self) -> usize {
        self.records.lock().await.values().map(Vec::len).sum()
    }

    /// Whether no records are stored
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn position_of(&self, records: &[MediaRecord], record: &MediaRecord) -> Option<usize> {
        records.iter().position(|known| {
            let same_file = record.file.is_some() && known.file == record.file;
            let same_name = matches!(
                (&record.name, &known.name),
                (Some(a), Some(b)) if self.policy.matches(a, b)
            );
            same_file || same_name
        })
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn confirm_download(
        &self,
        target: &DownloadTarget,
        file: &MediaFile,
        already_present: bool,
    ) -> crate::Result<MediaRecord> {
        let mut records = self.records.lock().await;
        let list = records.entry(target.id.clone()).or_default();

        let candidate = MediaRecord {
            name: Some(file.filename.clone()),
            file: Some(file.clone()),
            ..Default::default()
        };

        let record = match self.position_of(list, &candidate) {
            Some(index) => {
                let known = &mut list[index];
                known.file = Some(file.clone());
                if known.name.is_none() {
                    known.name = Some(file.filename.clone());
                }
                known.downloaded = true;
                known.clone()
            }
            None => {
                let record = MediaRecord {
                    downloaded: true,
                    ..candidate
                };
                list.push(record.clone());
                record
            }
        };

        tracing::debug!(
            target_id = %target.id,
            file = %file.path().display(),
            already_present,
            "Catalog confirmed download"
        );
        Ok(record)
    }

    async fn find_match(
        &self,
        target: &DownloadTarget,
        name: &str,
    ) -> crate::Result<Option<MediaRecord>> {
        let records = self.records.lock().await;
        Ok(records.get(&target.id).and_then(|list| {
            list.iter()
                .find(|known| {
                    known
                        .name
                        .as_deref()
                        .is_some_and(|known| self.policy.matches(name, known))
                })
                .cloned()
        }))
    }

    async fn save(
        &self,
        target: &DownloadTarget,
        record: MediaRecord,
    ) -> crate::Result<MediaRecord> {
        let mut records = self.records.lock().await;
        let list = records.entry(target.id.clone()).or_default();
        match self.position_of(list, &record) {
            Some(index) => list[index] = record.clone(),
            None => list.push(record.clone()),
        }
        Ok(record)
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}
