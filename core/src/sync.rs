//! Pushes the store's state to the session aggregator and to change listeners.

use std::collections::BTreeSet;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::cache::CategorySets;
use crate::models::FavoriteRecord;
use crate::providers::SessionAggregator;

/// Fired once per coalesced batch of store mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoritesChanged {
    pub total: usize,
    /// Canonical ids inserted or removed during the batch.
    pub changed_ids: BTreeSet<String>,
}

pub struct SessionSynchronizer {
    aggregator: Arc<dyn SessionAggregator>,
    listeners: Mutex<Vec<Sender<FavoritesChanged>>>,
}

impl SessionSynchronizer {
    pub fn new(aggregator: Arc<dyn SessionAggregator>) -> Self {
        Self {
            aggregator,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> Receiver<FavoritesChanged> {
        let (tx, rx) = mpsc::channel();
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Replace the aggregator's favorites with the full categorized id sets.
    pub fn sync(&self, records: &[FavoriteRecord]) -> CategorySets {
        let sets = CategorySets::from_records(records);
        debug!(
            courses = sets.courses.len(),
            cards = sets.cards.len(),
            hacks = sets.hacks.len(),
            "Syncing favorites to session aggregator"
        );
        self.aggregator
            .set_favorites(sets.courses.clone(), sets.cards.clone(), sets.hacks.clone());
        sets
    }

    /// Deliver `event` to every live listener; dropped receivers are pruned.
    pub fn notify(&self, event: FavoritesChanged) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
