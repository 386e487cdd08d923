//! The favorites source of truth.
//!
//! # Ownership
//!
//! All record state lives in one `Mutex<StoreState>`. Every mutation resolves
//! its reference first, outside the lock, then checks and mutates under the
//! lock in a single critical section. Two concurrent toggles of the same item
//! therefore serialize into insert-then-remove, never a double insert.
//!
//! # Side effects
//!
//! A mutation updates records, display order and the derived cache before it
//! returns. Persistence and aggregator sync are only *scheduled*: each has a
//! trailing-edge [`Debouncer`] and runs from [`FavoriteStore::tick`], which a
//! background flusher calls (see [`crate::flusher`]). A burst of toggles
//! inside one window yields one write and one change notification carrying
//! the final state.
//!
//! # Failure policy
//!
//! Unresolvable references are logged and ignored. A failed write leaves the
//! in-memory state untouched and re-arms the save timer. Undecodable persisted
//! data opens as an empty store.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::cache::DerivedCache;
use crate::config::{DebounceConfig, FavoritesConfig};
use crate::debounce::{Clock, Debouncer, SystemClock};
use crate::migration::{MigrationEngine, MigrationReport};
use crate::models::{comparison_key, Category, FavoriteRecord, FavoriteRef, ParsedReference};
use crate::providers::{LessonContentProvider, LessonTitleProvider, SessionAggregator};
use crate::resolver::{Resolution, StepResolver};
use crate::storage::{FavoritePersistence, PersistedFavorites, SqlitePersistence};
use crate::sync::{FavoritesChanged, SessionSynchronizer};
use crate::{Error, Result};

/// External collaborators, injected at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub content: Arc<dyn LessonContentProvider>,
    pub titles: Arc<dyn LessonTitleProvider>,
    pub aggregator: Arc<dyn SessionAggregator>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Inserted(String),
    Removed(String),
    Unresolved,
}

/// What a [`FavoriteStore::tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub saved: bool,
    pub save_failed: bool,
    pub synced: bool,
}

struct StoreState {
    /// Newest first.
    records: Vec<FavoriteRecord>,
    /// Display order of canonical ids (Key B).
    order: Vec<String>,
    cache: Arc<DerivedCache>,
    save: Debouncer,
    sync: Debouncer,
    /// Ids touched since the last change notification.
    changed: BTreeSet<String>,
}

pub struct FavoriteStore {
    state: Mutex<StoreState>,
    /// Serializes ticks so snapshots reach storage and listeners in order.
    flush_lock: Mutex<()>,
    persistence: Mutex<Box<dyn FavoritePersistence>>,
    resolver: Arc<StepResolver>,
    titles: Arc<dyn LessonTitleProvider>,
    synchronizer: SessionSynchronizer,
    clock: Arc<dyn Clock>,
}

impl FavoriteStore {
    /// Open a SQLite-backed store on the system clock.
    pub fn open_with_config(config: &FavoritesConfig, collaborators: Collaborators) -> Result<Self> {
        let persistence = SqlitePersistence::open(&config.storage)?;
        Self::open(
            Box::new(persistence),
            collaborators,
            Arc::new(SystemClock),
            &config.debounce,
        )
    }

    /// Load, migrate, build caches and push the initial sync.
    pub fn open(
        persistence: Box<dyn FavoritePersistence>,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
        debounce: &DebounceConfig,
    ) -> Result<Self> {
        let loaded = match persistence.load() {
            Ok(loaded) => loaded,
            Err(Error::CorruptState { key, details }) => {
                warn!(key = %key, details = %details, "Persisted favorites are unreadable, starting empty");
                PersistedFavorites::default()
            }
            Err(e) => return Err(e),
        };

        let resolver = Arc::new(StepResolver::new(collaborators.content));
        let (records, report) =
            MigrationEngine::new(&resolver, collaborators.titles.as_ref()).migrate_with_report(&loaded.records);
        let order = reconcile_order(loaded.order.as_deref(), &records);

        let mut save = Debouncer::from_millis(debounce.save_ms);
        let order_stale = match &loaded.order {
            Some(persisted) => persisted != &order,
            None => !records.is_empty(),
        };
        if !report.is_noop() || order_stale {
            save.schedule(clock.now());
        }

        let synchronizer = SessionSynchronizer::new(collaborators.aggregator);
        synchronizer.sync(&records);
        info!(records = records.len(), "Favorites loaded");

        Ok(Self {
            state: Mutex::new(StoreState {
                cache: Arc::new(DerivedCache::rebuild(&records)),
                records,
                order,
                save,
                sync: Debouncer::from_millis(debounce.sync_ms),
                changed: BTreeSet::new(),
            }),
            flush_lock: Mutex::new(()),
            persistence: Mutex::new(persistence),
            resolver,
            titles: collaborators.titles,
            synchronizer,
            clock,
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert the referenced item if absent, remove it if present.
    pub fn toggle(&self, reference: impl Into<FavoriteRef>) -> ToggleOutcome {
        let reference = reference.into();
        let Some(resolution) = self.resolver.resolve(&reference) else {
            debug!(raw = %reference.raw, "Toggle skipped: unresolvable reference");
            return ToggleOutcome::Unresolved;
        };

        let keys = HashSet::from([resolution.id.comparison_key()]);
        let candidate = self.build_record(&reference, &resolution);

        let mut state = self.lock_state();
        let removed = take_matching(&mut state.records, &keys);

        let outcome = if removed.is_empty() {
            let id = candidate.canonical_id.clone();
            state.order.retain(|existing| existing != &id);
            state.order.insert(0, id.clone());
            state.records.push(candidate);
            self.commit(&mut state, [id.clone()]);
            ToggleOutcome::Inserted(id)
        } else {
            let ids: Vec<String> = removed.into_iter().map(|r| r.canonical_id).collect();
            state.order.retain(|existing| !ids.contains(existing));
            self.commit(&mut state, ids.iter().cloned());
            ToggleOutcome::Removed(resolution.id.to_string())
        };

        debug!(outcome = ?outcome, total = state.records.len(), "Favorite toggled");
        outcome
    }

    /// Remove every record the reference names, in any spelling.
    /// Returns how many records were removed.
    pub fn remove(&self, reference: impl Into<FavoriteRef>) -> usize {
        let reference = reference.into();
        let resolution = self.resolver.resolve(&reference);
        let keys = match_keys(&reference, resolution.as_ref());
        if keys.is_empty() {
            debug!(raw = %reference.raw, "Remove skipped: unresolvable reference");
            return 0;
        }

        let mut state = self.lock_state();
        let removed = take_matching(&mut state.records, &keys);
        if removed.is_empty() {
            return 0;
        }

        let ids: Vec<String> = removed.into_iter().map(|r| r.canonical_id).collect();
        state.order.retain(|existing| !ids.contains(existing));
        let count = ids.len();
        self.commit(&mut state, ids);
        count
    }

    /// Membership test. Spellings that map onto a stored id without lesson
    /// content are answered from the cache; others are resolved first.
    pub fn contains(&self, reference: impl Into<FavoriteRef>) -> bool {
        let reference = reference.into();
        let cache = self.cache();
        if raw_spelling_applies(&reference) && cache.contains(&reference.raw) {
            return true;
        }
        match self.resolver.resolve(&reference) {
            Some(resolution) => cache.contains(&resolution.id.to_string()),
            None => false,
        }
    }

    /// Records matching `predicate`, newest first.
    pub fn query(&self, predicate: impl Fn(&FavoriteRecord) -> bool) -> Vec<FavoriteRecord> {
        self.lock_state()
            .records
            .iter()
            .filter(|record| predicate(record))
            .cloned()
            .collect()
    }

    pub fn records(&self) -> Vec<FavoriteRecord> {
        self.lock_state().records.clone()
    }

    pub fn get(&self, canonical_id: &str) -> Option<FavoriteRecord> {
        let key = comparison_key(canonical_id);
        self.lock_state()
            .records
            .iter()
            .find(|record| record.canonical_id == canonical_id || record.comparison_key() == key)
            .cloned()
    }

    /// Read-only snapshot of the derived views.
    pub fn cache(&self) -> Arc<DerivedCache> {
        Arc::clone(&self.lock_state().cache)
    }

    pub fn view(&self, category: Category) -> Vec<FavoriteRecord> {
        self.cache().view(category).to_vec()
    }

    pub fn cards(&self) -> Vec<FavoriteRecord> {
        self.view(Category::Card)
    }

    pub fn hacks(&self) -> Vec<FavoriteRecord> {
        self.view(Category::Hack)
    }

    pub fn courses(&self) -> Vec<FavoriteRecord> {
        self.view(Category::Course)
    }

    pub fn len(&self) -> usize {
        self.lock_state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Display order kept for legacy consumers (Key B).
    pub fn display_order(&self) -> Vec<String> {
        self.lock_state().order.clone()
    }

    pub fn subscribe(&self) -> Receiver<FavoritesChanged> {
        self.synchronizer.subscribe()
    }

    pub fn resolver(&self) -> &Arc<StepResolver> {
        &self.resolver
    }

    pub fn has_pending_work(&self) -> bool {
        let state = self.lock_state();
        state.save.is_pending() || state.sync.is_pending()
    }

    /// Re-run migration over the current records.
    pub fn migrate_now(&self) -> MigrationReport {
        let mut state = self.lock_state();
        let (migrated, report) =
            MigrationEngine::new(&self.resolver, self.titles.as_ref()).migrate_with_report(&state.records);

        if migrated != state.records {
            let before: HashSet<String> = state.records.iter().map(|r| r.canonical_id.clone()).collect();
            let after: HashSet<String> = migrated.iter().map(|r| r.canonical_id.clone()).collect();
            let changed: Vec<String> = before.symmetric_difference(&after).cloned().collect();

            let order = reconcile_order(Some(state.order.as_slice()), &migrated);
            state.order = order;
            state.records = migrated;
            self.commit(&mut state, changed);
        }
        report
    }

    /// Warm resolver memoization for known lessons on a background thread.
    /// Never touches the store's records.
    pub fn prefetch(&self, lessons: Vec<(String, String)>) -> JoinHandle<usize> {
        let resolver = Arc::clone(&self.resolver);
        thread::spawn(move || {
            lessons
                .iter()
                .map(|(course_id, lesson_id)| resolver.warm(course_id, lesson_id))
                .sum()
        })
    }

    /// Run save and sync work whose debounce window has elapsed.
    pub fn tick(&self) -> TickOutcome {
        self.run_scheduled(false)
    }

    /// Run any pending save and sync work now.
    pub fn flush(&self) -> TickOutcome {
        self.run_scheduled(true)
    }

    fn run_scheduled(&self, force: bool) -> TickOutcome {
        let _flush = self.flush_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (save_job, sync_job) = {
            let mut state = self.lock_state();
            let now = self.clock.now();
            let (save_due, sync_due) = if force {
                (state.save.take_pending(), state.sync.take_pending())
            } else {
                (state.save.fire_if_due(now), state.sync.fire_if_due(now))
            };

            let save_job = save_due.then(|| PersistedFavorites {
                records: state.records.clone(),
                order: Some(state.order.clone()),
            });
            let sync_job = sync_due.then(|| (state.records.clone(), std::mem::take(&mut state.changed)));
            (save_job, sync_job)
        };

        let mut outcome = TickOutcome::default();

        if let Some(snapshot) = save_job {
            let result = self
                .persistence
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .save(&snapshot);
            match result {
                Ok(()) => {
                    debug!(records = snapshot.records.len(), "Favorites saved");
                    outcome.saved = true;
                }
                Err(err) => {
                    warn!(error = %err, "Failed to save favorites, will retry");
                    self.lock_state().save.schedule(self.clock.now());
                    outcome.save_failed = true;
                }
            }
        }

        if let Some((records, changed_ids)) = sync_job {
            self.synchronizer.sync(&records);
            self.synchronizer.notify(FavoritesChanged {
                total: records.len(),
                changed_ids,
            });
            outcome.synced = true;
        }

        outcome
    }

    /// Re-sort, rebuild derived state and schedule save + sync.
    fn commit(&self, state: &mut StoreState, changed: impl IntoIterator<Item = String>) {
        FavoriteRecord::sort_newest_first(&mut state.records);
        state.cache = Arc::new(DerivedCache::rebuild(&state.records));
        state.changed.extend(changed);

        let now = self.clock.now();
        state.save.schedule(now);
        state.sync.schedule(now);
    }

    fn build_record(&self, reference: &FavoriteRef, resolution: &Resolution) -> FavoriteRecord {
        let hint = reference.content.clone().unwrap_or_default();
        let item = resolution.item.as_ref();
        let pick = |hinted: &str, from_item: Option<&str>| -> String {
            if hinted.trim().is_empty() {
                from_item.unwrap_or_default().to_string()
            } else {
                hinted.to_string()
            }
        };

        let id = &resolution.id;
        let mut record = match id.category() {
            Category::Hack => {
                let body = [hint.secondary.as_str(), hint.primary.as_str()]
                    .into_iter()
                    .find(|text| !text.trim().is_empty())
                    .map(str::to_string)
                    .or_else(|| item.map(|item| item.body().to_string()))
                    .unwrap_or_default();
                let title = if hint.secondary.trim().is_empty() {
                    item.map(|item| item.primary_text.clone()).unwrap_or_default()
                } else {
                    pick(&hint.primary, item.map(|item| item.primary_text.as_str()))
                };
                FavoriteRecord::new(id, &title, &body, &FavoriteRecord::hack_meta(&body), self.clock.now())
            }
            Category::Card => FavoriteRecord::new(
                id,
                &pick(&hint.primary, item.map(|item| item.primary_text.as_str())),
                &pick(&hint.secondary, item.map(|item| item.secondary_text.as_str())),
                &hint.meta,
                self.clock.now(),
            ),
            Category::Course => {
                FavoriteRecord::new(id, &hint.primary, &hint.secondary, &hint.meta, self.clock.now())
            }
        };

        if let Some(lesson_id) = id.lesson_id() {
            record.lesson_title = self.titles.title(id.course_id(), lesson_id);
        }
        record
    }
}

/// Comparison keys a removal should match: the resolved id, or failing
/// resolution the raw spelling itself, which reaches records kept under a
/// legacy id.
fn match_keys(reference: &FavoriteRef, resolution: Option<&Resolution>) -> HashSet<String> {
    match resolution {
        Some(resolution) => HashSet::from([resolution.id.comparison_key()]),
        None if raw_spelling_applies(reference) => HashSet::from([comparison_key(&reference.raw)]),
        None => HashSet::new(),
    }
}

/// Whether the raw spelling alone names the item. An explicit category that
/// contradicts the one the spelling implies rules it out.
fn raw_spelling_applies(reference: &FavoriteRef) -> bool {
    if reference.raw.trim().is_empty() {
        return false;
    }
    let implied = ParsedReference::parse(&reference.raw)
        .category()
        .unwrap_or(Category::Card);
    reference.category.map_or(true, |category| category == implied)
}

fn take_matching(records: &mut Vec<FavoriteRecord>, keys: &HashSet<String>) -> Vec<FavoriteRecord> {
    let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(records)
        .into_iter()
        .partition(|record| keys.contains(&record.comparison_key()));
    *records = kept;
    removed
}

/// Reconcile a persisted display order with the records it describes.
///
/// Entries are mapped onto the surviving record of the same item, entries
/// with no record are dropped, and records missing from the order are
/// prepended newest-first.
pub fn reconcile_order(order: Option<&[String]>, records: &[FavoriteRecord]) -> Vec<String> {
    let Some(order) = order else {
        return records.iter().map(|r| r.canonical_id.clone()).collect();
    };

    let by_key: HashMap<String, &str> = records
        .iter()
        .map(|r| (r.comparison_key(), r.canonical_id.as_str()))
        .collect();

    let mut placed = HashSet::new();
    let mut kept = Vec::with_capacity(order.len());
    for entry in order {
        let id = by_key
            .get(&comparison_key(entry))
            .copied()
            .or_else(|| records.iter().find(|r| &r.canonical_id == entry).map(|r| r.canonical_id.as_str()));
        if let Some(id) = id {
            if placed.insert(id.to_string()) {
                kept.push(id.to_string());
            }
        }
    }

    let mut reconciled: Vec<String> = records
        .iter()
        .filter(|r| !placed.contains(&r.canonical_id))
        .map(|r| r.canonical_id.clone())
        .collect();
    reconciled.extend(kept);
    reconciled
}
