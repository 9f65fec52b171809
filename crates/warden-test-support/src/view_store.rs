//! In-memory `ViewStore`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use warden_core::error::DomainError;
use warden_core::event::{Event, Sequence};
use warden_core::view::{CurrentSequence, FailedEvent, ViewStore};

#[derive(Debug, Default)]
struct Tables {
    sequences: HashMap<String, CurrentSequence>,
    failed: HashMap<(String, Sequence), FailedEvent>,
}

/// Bookmarks and failure counters held in `HashMap`s.
#[derive(Debug, Default)]
pub struct InMemoryViewStore {
    tables: Mutex<Tables>,
}

impl InMemoryViewStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded failure for `sequence`, if any.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn failed_event(&self, view_name: &str, sequence: Sequence) -> Option<FailedEvent> {
        self.tables
            .lock()
            .unwrap()
            .failed
            .get(&(view_name.to_owned(), sequence))
            .cloned()
    }
}

#[async_trait]
impl ViewStore for InMemoryViewStore {
    async fn latest_sequence(&self, view_name: &str) -> Result<CurrentSequence, DomainError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .sequences
            .get(view_name)
            .cloned()
            .unwrap_or_else(|| CurrentSequence::initial(view_name)))
    }

    async fn process_sequence(&self, view_name: &str, event: &Event) -> Result<(), DomainError> {
        let mut tables = self.tables.lock().unwrap();
        let current = tables
            .sequences
            .entry(view_name.to_owned())
            .or_insert_with(|| CurrentSequence::initial(view_name));
        if event.sequence > current.current_sequence {
            current.current_sequence = event.sequence;
            current.event_timestamp = event.creation_date;
        }
        Ok(())
    }

    async fn latest_failed_event(
        &self,
        view_name: &str,
        sequence: Sequence,
    ) -> Result<FailedEvent, DomainError> {
        Ok(self
            .failed_event(view_name, sequence)
            .unwrap_or_else(|| FailedEvent::new(view_name, sequence)))
    }

    async fn process_failed_event(&self, failed: &FailedEvent) -> Result<(), DomainError> {
        self.tables.lock().unwrap().failed.insert(
            (failed.view_name.clone(), failed.failed_sequence),
            failed.clone(),
        );
        Ok(())
    }

    async fn update_spooler_run_timestamp(&self, view_name: &str) -> Result<(), DomainError> {
        let mut tables = self.tables.lock().unwrap();
        let current = tables
            .sequences
            .entry(view_name.to_owned())
            .or_insert_with(|| CurrentSequence::initial(view_name));
        current.last_successful_spooler_run = Some(Utc::now());
        Ok(())
    }

    async fn current_sequences(&self) -> Result<Vec<CurrentSequence>, DomainError> {
        let mut all: Vec<CurrentSequence> =
            self.tables.lock().unwrap().sequences.values().cloned().collect();
        all.sort_by(|a, b| a.view_name.cmp(&b.view_name));
        Ok(all)
    }
}
