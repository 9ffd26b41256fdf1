//! Contact store version tracking
//!
//! Remote clients detect phonebook changes through a two-level version:
//! the secondary counter moves on every detected change and the primary
//! counter only on rollover. Reading the contact store is slow, so loads and
//! recomputes run on blocking workers and report back as coordinator events.
//! At most one of each is in flight; recompute requests that arrive while one
//! runs collapse into a single follow-up run.

use std::sync::Arc;

use pbap_core::{
    ContactIndex, ContactLoad, ContactRecord, ContactStore, ContactSummary, CoordinatorEvent,
    EventSender, FieldCounts, PbapResult, TimeSource, Timestamp, VersionCounters,
    VersionDelta, VersionStore,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

// ----------------------------------------------------------------------------
// Snapshot Diffing
// ----------------------------------------------------------------------------

/// Build the baseline index from a full contact snapshot
pub fn build_index(snapshot: Vec<ContactRecord>) -> ContactLoad {
    let index: ContactIndex = snapshot
        .iter()
        .map(|record| (record.id, ContactSummary::from(record)))
        .collect();
    let field_counts = FieldCounts::from_index(&index);
    ContactLoad {
        index,
        field_counts,
    }
}

/// Compare a fresh snapshot against the baseline
///
/// A contact counts as updated when its modification time is newer than
/// `since` and its field digest changed. Each non-empty category (added,
/// deleted, updated) advances the secondary counter by one.
pub fn diff_contacts(
    baseline: &ContactIndex,
    since: Timestamp,
    snapshot: Vec<ContactRecord>,
    now: Timestamp,
) -> VersionDelta {
    let ContactLoad {
        index,
        field_counts,
    } = build_index(snapshot);

    let added = index.keys().filter(|id| !baseline.contains_key(id)).count();
    let deleted = baseline.keys().filter(|id| !index.contains_key(id)).count();
    let updated = index
        .iter()
        .filter(|(id, current)| {
            baseline.get(id).is_some_and(|previous| {
                current.last_updated > since && current.digest != previous.digest
            })
        })
        .count();

    let secondary_increment = [added, deleted, updated]
        .iter()
        .filter(|count| **count > 0)
        .count() as u64;

    VersionDelta {
        secondary_increment,
        index,
        field_counts,
        last_updated: if secondary_increment > 0 { now } else { since },
        added,
        deleted,
        updated,
    }
}

// ----------------------------------------------------------------------------
// Version Tracker
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeRequest {
    Started,
    /// A recompute is running; one more run will follow it
    Coalesced,
    /// No baseline yet
    NotLoaded,
}

pub struct VersionTracker {
    contacts: Arc<dyn ContactStore>,
    store: Arc<dyn VersionStore>,
    time: Arc<dyn TimeSource>,
    events: EventSender,
    counters: VersionCounters,
    index: ContactIndex,
    contacts_loaded: bool,
    counters_adopted: bool,
    load_task: Option<JoinHandle<()>>,
    recompute_task: Option<JoinHandle<()>>,
    recompute_pending: bool,
}

impl VersionTracker {
    pub fn new(
        contacts: Arc<dyn ContactStore>,
        store: Arc<dyn VersionStore>,
        time: Arc<dyn TimeSource>,
        events: EventSender,
    ) -> Self {
        let counters = VersionCounters::fresh(time.now());
        Self {
            contacts,
            store,
            time,
            events,
            counters,
            index: ContactIndex::new(),
            contacts_loaded: false,
            counters_adopted: false,
            load_task: None,
            recompute_task: None,
            recompute_pending: false,
        }
    }

    pub fn counters(&self) -> VersionCounters {
        self.counters
    }

    pub fn index(&self) -> &ContactIndex {
        &self.index
    }

    pub fn is_loaded(&self) -> bool {
        self.contacts_loaded
    }

    pub fn is_load_running(&self) -> bool {
        self.load_task.is_some()
    }

    pub fn is_recompute_running(&self) -> bool {
        self.recompute_task.is_some()
    }

    // ------------------------------------------------------------------------
    // Contact load
    // ------------------------------------------------------------------------

    /// Start the background load; ignored while one is in flight
    pub fn request_load(&mut self) -> bool {
        if self.load_task.is_some() {
            debug!("Contact load already running");
            return false;
        }

        let contacts = Arc::clone(&self.contacts);
        let events = self.events.clone();
        self.load_task = Some(tokio::task::spawn_blocking(move || {
            let result = contacts.snapshot().map(build_index);
            if events.send(CoordinatorEvent::ContactsLoaded(result)).is_err() {
                debug!("Contact load finished after shutdown");
            }
        }));
        info!("Loading contacts");
        true
    }

    /// Install the load result; returns the number of contacts on success
    pub fn finish_load(&mut self, result: PbapResult<ContactLoad>) -> Option<u64> {
        self.load_task = None;
        match result {
            Ok(load) => {
                let total = load.field_counts.total_contacts;
                self.index = load.index;
                self.counters.field_counts = load.field_counts;
                self.contacts_loaded = true;
                info!("Loaded {} contacts", total);
                Some(total)
            }
            Err(e) => {
                error!("Contact load failed: {}", e);
                None
            }
        }
    }

    // ------------------------------------------------------------------------
    // Recompute
    // ------------------------------------------------------------------------

    pub fn request_recompute(&mut self) -> RecomputeRequest {
        if !self.contacts_loaded {
            debug!("Contacts not loaded, skipping version check");
            return RecomputeRequest::NotLoaded;
        }
        if self.recompute_task.is_some() {
            if !self.recompute_pending {
                debug!("Version check running, queueing one follow-up");
            }
            self.recompute_pending = true;
            return RecomputeRequest::Coalesced;
        }

        self.spawn_recompute();
        RecomputeRequest::Started
    }

    /// Apply a finished recompute and start the queued follow-up, if any
    ///
    /// Returns the new counters if they changed.
    pub fn finish_recompute(
        &mut self,
        result: PbapResult<VersionDelta>,
    ) -> Option<VersionCounters> {
        self.recompute_task = None;

        let changed = match result {
            Ok(delta) => self.apply(delta),
            Err(e) => {
                error!("Version check failed: {}", e);
                None
            }
        };

        if self.recompute_pending {
            self.recompute_pending = false;
            self.spawn_recompute();
        }
        changed
    }

    fn spawn_recompute(&mut self) {
        let contacts = Arc::clone(&self.contacts);
        let time = Arc::clone(&self.time);
        let events = self.events.clone();
        let baseline = self.index.clone();
        let since = self.counters.last_updated;

        self.recompute_task = Some(tokio::task::spawn_blocking(move || {
            let result = contacts
                .snapshot()
                .map(|snapshot| diff_contacts(&baseline, since, snapshot, time.now()));
            if events.send(CoordinatorEvent::VersionRecomputed(result)).is_err() {
                debug!("Version check finished after shutdown");
            }
        }));
        debug!("Version check started");
    }

    fn apply(&mut self, delta: VersionDelta) -> Option<VersionCounters> {
        self.index = delta.index;
        let counts_changed = self.counters.field_counts != delta.field_counts;
        self.counters.field_counts = delta.field_counts;

        if delta.secondary_increment == 0 {
            debug!("No contact changes detected");
            return counts_changed.then_some(self.counters);
        }

        self.counters.secondary = self
            .counters
            .secondary
            .saturating_add(delta.secondary_increment);
        self.counters.last_updated = delta.last_updated;
        info!(
            "Contacts changed (+{} -{} ~{}), version {}.{}",
            delta.added,
            delta.deleted,
            delta.updated,
            self.counters.primary,
            self.counters.secondary
        );
        Some(self.counters)
    }

    // ------------------------------------------------------------------------
    // Counters
    // ------------------------------------------------------------------------

    pub fn rollover(&mut self) -> VersionCounters {
        self.counters.rollover();
        info!(
            "Version counters rolled over to {}.{}",
            self.counters.primary, self.counters.secondary
        );
        self.counters
    }

    /// Replace the in-memory counters with the persisted ones, once
    ///
    /// Runs when the coordinator starts, before any event can touch the
    /// counters. A failed load leaves the tracker unadopted so a later
    /// refresh retries and shutdown does not overwrite the stored counters.
    pub fn adopt(&mut self) -> PbapResult<VersionCounters> {
        if self.counters_adopted {
            return Ok(self.counters);
        }

        match self.store.load()? {
            Some(persisted) => {
                let field_counts = self.counters.field_counts;
                self.counters = persisted;
                if self.contacts_loaded {
                    self.counters.field_counts = field_counts;
                }
                info!(
                    "Restored version counters {}.{} for database {}",
                    persisted.primary, persisted.secondary, persisted.db_identifier
                );
            }
            None => {
                info!(
                    "No persisted counters, using new database identifier {}",
                    self.counters.db_identifier
                );
            }
        }
        self.counters_adopted = true;
        Ok(self.counters)
    }

    /// Checkpoint the counters, adopting the persisted ones first if that
    /// has not happened yet
    pub fn refresh(&mut self) -> PbapResult<VersionCounters> {
        if !self.counters_adopted {
            return self.adopt();
        }

        self.store.save(&self.counters)?;
        debug!("Checkpointed version counters");
        Ok(self.counters)
    }

    /// Save the counters; skipped while the persisted ones were never read
    pub fn persist(&self) -> PbapResult<()> {
        if !self.counters_adopted {
            warn!("Persisted version counters were never loaded, not overwriting them");
            return Ok(());
        }
        self.store.save(&self.counters)
    }

    /// Forget in-flight workers; their results arrive after the coordinator
    /// stopped and are dropped
    pub fn detach_workers(&mut self) {
        let load = self.load_task.take();
        let recompute = self.recompute_task.take();
        if load.is_some() || recompute.is_some() {
            warn!("Detaching contact workers still in flight");
        }
        self.recompute_pending = false;
    }
}
