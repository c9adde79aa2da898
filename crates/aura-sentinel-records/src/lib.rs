#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use aura_sentinel_domain::{DecisionRecord, RecordId};
use tracing::debug;

/// Holder of completed decision records, most recent first.
pub trait DecisionRecordStore {
    #[allow(clippy::missing_errors_doc)]
    fn append(&self, record: DecisionRecord) -> Result<()>;

    #[allow(clippy::missing_errors_doc)]
    fn list(&self) -> Result<Vec<DecisionRecord>>;

    #[allow(clippy::missing_errors_doc)]
    fn get(&self, record_id: RecordId) -> Result<Option<DecisionRecord>>;

    #[allow(clippy::missing_errors_doc)]
    fn len(&self) -> Result<usize>;

    #[allow(clippy::missing_errors_doc)]
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Process-lifetime store. With a retention cap the oldest records are
/// dropped once the cap is exceeded.
#[derive(Debug, Default)]
pub struct InMemoryDecisionStore {
    records: Mutex<VecDeque<DecisionRecord>>,
    retention: Option<usize>,
}

impl InMemoryDecisionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_retention(limit: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            retention: Some(limit.max(1)),
        }
    }

    #[must_use]
    pub fn retention(&self) -> Option<usize> {
        self.retention
    }

    fn lock(&self) -> Result<MutexGuard<'_, VecDeque<DecisionRecord>>> {
        self.records
            .lock()
            .map_err(|_| anyhow!("decision record store lock poisoned"))
    }
}

impl DecisionRecordStore for InMemoryDecisionStore {
    fn append(&self, record: DecisionRecord) -> Result<()> {
        let mut records = self.lock()?;
        debug!(
            record_id = %record.record_id,
            verdict = record.verdict.as_str(),
            "decision record appended"
        );
        records.push_front(record);
        if let Some(limit) = self.retention {
            records.truncate(limit);
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<DecisionRecord>> {
        Ok(self.lock()?.iter().cloned().collect())
    }

    fn get(&self, record_id: RecordId) -> Result<Option<DecisionRecord>> {
        Ok(self
            .lock()?
            .iter()
            .find(|record| record.record_id == record_id)
            .cloned())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::{DecisionRecordStore, InMemoryDecisionStore};
    use aura_sentinel_domain::{now_utc, DecisionRecord, RecordId, Verdict, WorkflowId};

    fn record(verdict: Verdict) -> DecisionRecord {
        DecisionRecord {
            record_id: RecordId::new(),
            workflow_id: WorkflowId::new(),
            completed_at: now_utc(),
            verdict,
            traces: Vec::new(),
            self_evaluation: None,
            record_digest: "digest".to_string(),
            anchor_ref: None,
            signature: "unsigned".to_string(),
        }
    }

    #[test]
    fn list_is_most_recent_first() {
        let store = InMemoryDecisionStore::new();
        assert!(matches!(store.is_empty(), Ok(true)));

        let first = record(Verdict::Approved);
        let second = record(Verdict::Rejected);
        assert!(store.append(first.clone()).is_ok());
        assert!(store.append(second.clone()).is_ok());

        let listed = store.list().unwrap_or_else(|_| unreachable!());
        assert_eq!(listed, vec![second.clone(), first.clone()]);
        assert_eq!(store.len().unwrap_or_else(|_| unreachable!()), 2);
    }

    #[test]
    fn stored_records_are_not_mutated_by_callers() {
        let store = InMemoryDecisionStore::new();
        let original = record(Verdict::Approved);
        assert!(store.append(original.clone()).is_ok());

        let mut listed = store.list().unwrap_or_else(|_| unreachable!());
        listed[0].verdict = Verdict::Halted;

        let fetched = store
            .get(original.record_id)
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(fetched, Some(original));
        assert!(matches!(store.get(RecordId::new()), Ok(None)));
    }

    #[test]
    fn retention_cap_drops_oldest() {
        let store = InMemoryDecisionStore::with_retention(2);
        let records: Vec<DecisionRecord> = (0..3).map(|_| record(Verdict::Approved)).collect();
        for item in &records {
            assert!(store.append(item.clone()).is_ok());
        }
        let listed = store.list().unwrap_or_else(|_| unreachable!());
        assert_eq!(listed, vec![records[2].clone(), records[1].clone()]);
        assert_eq!(store.retention(), Some(2));
    }
}
