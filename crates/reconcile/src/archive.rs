//! Archival of accepted deliveries.
//!
//! Each accepted delivery is written once to
//! `{prefix}/{owner}/{repo}/{number}/{year}/{month}/{day}/{delivery_id}` in
//! the configured bucket, dated in UTC at write time. The path is the dedup
//! key: a redelivery with the same id on the same day lands on the same object
//! and the store's create-only semantics keep the first copy.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::ports::{ArchiveStore, WriteOutcome};
use crate::settings::ArchiveSettings;
use crate::{ArchiveError, DeliveryId, RepoRef, Subject, SubjectNumber, Timestamp};

/// Hex SHA-256 of `payload`, used as the object name when a delivery carries
/// no id.
pub fn content_digest(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// The full partition key of one archived delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchivePartition {
    pub prefix: String,
    pub repo: RepoRef,
    pub number: SubjectNumber,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    /// Delivery id, or the payload digest when the delivery had none.
    pub object_name: String,
}

impl ArchivePartition {
    pub fn new(
        prefix: &str,
        subject: &Subject,
        delivery_id: &DeliveryId,
        at: Timestamp,
        payload: &[u8],
    ) -> Self {
        let (year, month, day) = at.ymd();
        let object_name = if delivery_id.is_empty() {
            content_digest(payload)
        } else {
            delivery_id.as_str().to_owned()
        };
        Self {
            prefix: prefix.to_owned(),
            repo: subject.repo.clone(),
            number: subject.number,
            year,
            month,
            day,
            object_name,
        }
    }

    /// Object path inside the bucket. Month and day are not zero-padded.
    pub fn object_path(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}/{}/{}/{}",
            self.prefix,
            self.repo.owner,
            self.repo.name,
            self.number,
            self.year,
            self.month,
            self.day,
            self.object_name
        )
    }
}

/// One delivery as it is written to the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedEventRecord<'a> {
    pub partition: ArchivePartition,
    pub payload: &'a [u8],
}

/// Writes accepted deliveries to an [`ArchiveStore`].
#[derive(Clone)]
pub struct ArchivalSink {
    store: Arc<dyn ArchiveStore>,
}

impl ArchivalSink {
    pub fn new(store: Arc<dyn ArchiveStore>) -> Self {
        Self { store }
    }

    /// Archives `payload` under today's partition.
    pub async fn store(
        &self,
        settings: &ArchiveSettings,
        subject: &Subject,
        delivery_id: &DeliveryId,
        payload: &[u8],
    ) -> Result<ArchivePartition, ArchiveError> {
        self.store_at(settings, subject, delivery_id, payload, Timestamp::now())
            .await
    }

    /// Archives `payload` under the partition for `at`.
    pub async fn store_at(
        &self,
        settings: &ArchiveSettings,
        subject: &Subject,
        delivery_id: &DeliveryId,
        payload: &[u8],
        at: Timestamp,
    ) -> Result<ArchivePartition, ArchiveError> {
        let bucket = settings.bucket.trim();
        if bucket.is_empty() {
            return Err(ArchiveError::MissingBucket);
        }

        let record = ArchivedEventRecord {
            partition: ArchivePartition::new(
                settings.object_prefix(),
                subject,
                delivery_id,
                at,
                payload,
            ),
            payload,
        };
        let path = record.partition.object_path();

        match self.store.write(bucket, &path, record.payload).await? {
            WriteOutcome::Created => {
                info!(bucket, path = %path, bytes = payload.len(), "Archived delivery");
            }
            WriteOutcome::AlreadyPresent => {
                debug!(bucket, path = %path, "Delivery already archived");
            }
        }
        Ok(record.partition)
    }
}

impl std::fmt::Debug for ArchivalSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchivalSink").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryArchiveStore;
    use chrono::{TimeZone, Utc};

    fn subject() -> Subject {
        Subject::new(
            RepoRef::from_full_name("org/repo").unwrap(),
            SubjectNumber::new(42).unwrap(),
        )
    }

    fn settings() -> ArchiveSettings {
        ArchiveSettings {
            bucket: "audit".into(),
            prefix: String::new(),
        }
    }

    fn march_9() -> Timestamp {
        Timestamp::from_utc(Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap())
    }

    #[test]
    fn path_is_not_zero_padded() {
        let partition = ArchivePartition::new(
            "hatch-webhooks",
            &subject(),
            &DeliveryId::new("abc-123"),
            march_9(),
            b"{}",
        );
        assert_eq!(
            partition.object_path(),
            "hatch-webhooks/org/repo/42/2024/3/9/abc-123"
        );
    }

    #[test]
    fn empty_delivery_id_uses_payload_digest() {
        let partition =
            ArchivePartition::new("p", &subject(), &DeliveryId::default(), march_9(), b"");
        assert_eq!(
            partition.object_name,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn same_partition_key_yields_one_object() {
        let store = Arc::new(MemoryArchiveStore::new());
        let sink = ArchivalSink::new(store.clone());
        let id = DeliveryId::new("d-1");

        let first = sink
            .store_at(&settings(), &subject(), &id, b"payload", march_9())
            .await
            .unwrap();
        let second = sink
            .store_at(&settings(), &subject(), &id, b"payload", march_9())
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.writes(), 2);
        assert_eq!(store.keys().len(), 1);
        assert_eq!(
            store.get("audit", &first.object_path()).as_deref(),
            Some(&b"payload"[..])
        );
    }

    #[tokio::test]
    async fn distinct_deliveries_are_kept_apart() {
        let store = Arc::new(MemoryArchiveStore::new());
        let sink = ArchivalSink::new(store.clone());

        for id in ["d-1", "d-2"] {
            sink.store_at(&settings(), &subject(), &DeliveryId::new(id), b"x", march_9())
                .await
                .unwrap();
        }

        assert_eq!(store.keys().len(), 2);
    }

    #[tokio::test]
    async fn missing_bucket_is_an_error() {
        let store = Arc::new(MemoryArchiveStore::new());
        let sink = ArchivalSink::new(store.clone());

        let err = sink
            .store(
                &ArchiveSettings::default(),
                &subject(),
                &DeliveryId::new("d"),
                b"{}",
            )
            .await
            .unwrap_err();

        assert_eq!(err, ArchiveError::MissingBucket);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn store_failure_is_returned() {
        let store = Arc::new(MemoryArchiveStore::new());
        store.fail_writes();
        let sink = ArchivalSink::new(store);

        let err = sink
            .store(&settings(), &subject(), &DeliveryId::new("d"), b"{}")
            .await;

        assert!(matches!(err, Err(ArchiveError::Write { .. })));
    }
}
