//! Sequence journal storage trait

use super::{RunId, SequenceEvent};
use serde::{Deserialize, Serialize};

/// Journal storage trait
pub trait SequenceJournal: Send + Sync + 'static {
    fn append(&self, run_id: RunId, event: SequenceEvent) -> Result<u64, JournalError>;
    fn read(&self, run_id: RunId) -> Result<Vec<JournalEntry>, JournalError>;
    fn list_runs(&self) -> Result<Vec<RunId>, JournalError>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JournalEntry {
    pub sequence: u64,
    pub recorded_at_millis: u64,
    pub event: SequenceEvent,
}

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("Storage error: {0}")]
    Storage(Box<str>),
}

/// In-memory journal, the default for a rig
pub struct InMemoryJournal {
    data: std::sync::RwLock<std::collections::BTreeMap<u64, Vec<JournalEntry>>>,
    counter: std::sync::atomic::AtomicU64,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self {
            data: std::sync::RwLock::new(std::collections::BTreeMap::new()),
            counter: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Events of one run, in recording order
    pub fn events(&self, run_id: RunId) -> Vec<SequenceEvent> {
        self.read(run_id)
            .map(|entries| entries.into_iter().map(|e| e.event).collect())
            .unwrap_or_default()
    }
}

impl SequenceJournal for InMemoryJournal {
    fn append(&self, run_id: RunId, event: SequenceEvent) -> Result<u64, JournalError> {
        let seq = self.counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let entry = JournalEntry {
            sequence: seq,
            recorded_at_millis: crate::RunContext::now_millis(),
            event,
        };

        let mut data = self.data.write().map_err(|e| JournalError::Storage(e.to_string().into()))?;
        data.entry(run_id.0).or_default().push(entry);

        Ok(seq)
    }

    fn read(&self, run_id: RunId) -> Result<Vec<JournalEntry>, JournalError> {
        let data = self.data.read().map_err(|e| JournalError::Storage(e.to_string().into()))?;
        Ok(data.get(&run_id.0).cloned().unwrap_or_default())
    }

    fn list_runs(&self) -> Result<Vec<RunId>, JournalError> {
        let data = self.data.read().map_err(|e| JournalError::Storage(e.to_string().into()))?;
        Ok(data.keys().map(|&id| RunId::new(id)).collect())
    }
}

impl Default for InMemoryJournal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_are_kept_apart() {
        let journal = InMemoryJournal::new();
        journal
            .append(RunId::new(2), SequenceEvent::RunStarted { steps: 7 })
            .unwrap();
        journal
            .append(RunId::new(1), SequenceEvent::RunStarted { steps: 3 })
            .unwrap();
        journal
            .append(RunId::new(2), SequenceEvent::SequenceFailed { index: 3 })
            .unwrap();

        assert_eq!(journal.list_runs().unwrap(), vec![RunId::new(1), RunId::new(2)]);
        assert_eq!(
            journal.events(RunId::new(2)),
            vec![
                SequenceEvent::RunStarted { steps: 7 },
                SequenceEvent::SequenceFailed { index: 3 },
            ]
        );
        assert!(journal.events(RunId::new(9)).is_empty());
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let journal = InMemoryJournal::new();
        let a = journal
            .append(RunId::new(1), SequenceEvent::RunStarted { steps: 1 })
            .unwrap();
        let b = journal
            .append(RunId::new(1), SequenceEvent::SequenceFailed { index: 0 })
            .unwrap();
        assert!(b > a);
    }
}
