//! Incremental run protocol.
//!
//! A run is keyed by its parameter fingerprint. If a record exists and every
//! requested monitor is already stored, nothing runs. If some monitors are
//! new, only those run (monitors already stored are switched off for the
//! duration) and the record is extended. Otherwise the full run is stored as
//! a new record.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;

use tracing::{debug, info, warn};

use fdtd_core::{
    EngineSession, Fingerprint, MonitorFamily, MonitorKind, MonitorSet, ResultSet, Simulation,
    SimulationError,
};

use crate::config::{DataLayout, RetryPolicy, savefile_path};
use crate::error::{CacheError, Result as StoreResult};
use crate::record::ResultRecord;
use crate::store::ResultStore;

const POWER_MONITORS: [MonitorKind; 2] = [MonitorKind::ReflectionPower, MonitorKind::TransmissionPower];
const PROFILE_MONITORS: [MonitorKind; 2] =
    [MonitorKind::ReflectionProfile, MonitorKind::TransmissionProfile];
const CROSS_SECTION_MONITORS: [MonitorKind; 2] = [MonitorKind::XzProfile, MonitorKind::YzProfile];

/// Protocol states, logged as they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    NoStructures,
    MissingMonitors,
    HitNoop,
    HitExtend,
    MissFullRun,
    Done,
    Aborted,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheState::NoStructures => "no-structures",
            CacheState::MissingMonitors => "missing-monitors",
            CacheState::HitNoop => "cache-hit-noop",
            CacheState::HitExtend => "cache-hit-extend",
            CacheState::MissFullRun => "cache-miss-full-run",
            CacheState::Done => "done",
            CacheState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

fn enter(state: CacheState, fingerprint: &Fingerprint) {
    debug!(%fingerprint, "cache state: {state}");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every requested monitor was already stored.
    Skipped { id: i64 },
    /// New monitors were run and merged into an existing record.
    Extended { id: i64, added: MonitorSet },
    /// Nothing was stored for this fingerprint; a new record was inserted.
    Inserted { id: i64 },
}

impl RunOutcome {
    pub fn id(&self) -> i64 {
        match self {
            RunOutcome::Skipped { id }
            | RunOutcome::Extended { id, .. }
            | RunOutcome::Inserted { id } => *id,
        }
    }
}

/// Switches monitors off and turns them back on when dropped, whatever
/// happened in between.
struct DisabledMonitors<'s, E: EngineSession> {
    sim: &'s mut Simulation<E>,
    disabled: MonitorSet,
}

impl<'s, E: EngineSession> DisabledMonitors<'s, E> {
    fn new(sim: &'s mut Simulation<E>, monitors: MonitorSet) -> Result<Self, SimulationError> {
        let mut guard = DisabledMonitors {
            sim,
            disabled: MonitorSet::empty(),
        };
        for kind in monitors.iter() {
            guard.sim.set_monitor_enabled(kind, false)?;
            guard.disabled.insert(kind);
        }
        if !guard.disabled.is_empty() {
            debug!("disabled already stored monitors: {}", guard.disabled);
        }
        Ok(guard)
    }
}

impl<E: EngineSession> Deref for DisabledMonitors<'_, E> {
    type Target = Simulation<E>;

    fn deref(&self) -> &Simulation<E> {
        self.sim
    }
}

impl<E: EngineSession> DerefMut for DisabledMonitors<'_, E> {
    fn deref_mut(&mut self) -> &mut Simulation<E> {
        self.sim
    }
}

impl<E: EngineSession> Drop for DisabledMonitors<'_, E> {
    fn drop(&mut self) {
        for kind in self.disabled.iter() {
            if let Err(e) = self.sim.set_monitor_enabled(kind, true) {
                warn!("failed to re-enable {kind}: {e}");
            }
        }
        if !self.disabled.is_empty() {
            debug!("re-enabled monitors: {}", self.disabled);
        }
    }
}

pub struct SimulationCache {
    store: ResultStore,
    retry: RetryPolicy,
    savefiles: Option<(PathBuf, String)>,
}

impl SimulationCache {
    /// Cache over `store` that does not write engine save files.
    pub fn new(store: ResultStore, retry: RetryPolicy) -> Self {
        SimulationCache {
            store,
            retry,
            savefiles: None,
        }
    }

    /// Cache over the layout's database, saving engine state next to it.
    pub fn open(layout: &DataLayout) -> StoreResult<Self> {
        Ok(SimulationCache {
            store: layout.open_store()?,
            retry: layout.config().retry,
            savefiles: Some((layout.savefile_dir(), layout.database().to_string())),
        })
    }

    /// Save engine state of each persisted run to `<dir>/<database>_<id>.fsp`.
    pub fn with_savefiles(mut self, dir: impl Into<PathBuf>, database: impl Into<String>) -> Self {
        self.savefiles = Some((dir.into(), database.into()));
        self
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Run `sim` unless its results are already stored, and persist whatever
    /// was computed.
    pub fn run_and_save<E: EngineSession>(
        &self,
        sim: &mut Simulation<E>,
    ) -> Result<RunOutcome, CacheError> {
        let parameters = sim.parameters()?;
        let fingerprint = Fingerprint::of(&parameters);
        let existing = self.store.find_by_fingerprint(&fingerprint)?;
        let previous = existing
            .as_ref()
            .map(|r| r.active_monitors)
            .unwrap_or_default();

        if !sim.has_structures() {
            enter(CacheState::NoStructures, &fingerprint);
            return Err(SimulationError::NoActiveStructures.into());
        }

        let mut current = sim.active_monitors()?;
        let powers = MonitorSet::of(&POWER_MONITORS);
        if !covers(current, powers) && !covers(previous, powers) {
            enter(CacheState::MissingMonitors, &fingerprint);
            warn!("power monitors are required, enabling them");
            for kind in POWER_MONITORS {
                sim.set_monitor_enabled(kind, true)?;
            }
            current = current.union(&powers);
        }

        let cross_sections = MonitorSet::of(&CROSS_SECTION_MONITORS);
        if current.intersects(&cross_sections)
            && !current
                .union(&previous)
                .contains_family(MonitorFamily::Profile)
        {
            enter(CacheState::MissingMonitors, &fingerprint);
            warn!("cross-section monitors need the profile monitors, enabling them");
            let profiles = MonitorSet::of(&PROFILE_MONITORS);
            for kind in PROFILE_MONITORS {
                sim.set_monitor_enabled(kind, true)?;
            }
            current = current.union(&profiles);
        }

        let new_monitors = current.difference(&previous);
        if let Some(record) = &existing
            && new_monitors.is_empty()
        {
            let id = record.id.unwrap_or_default();
            enter(CacheState::HitNoop, &fingerprint);
            info!("record {id} already holds {current}, skipping run");
            return Ok(RunOutcome::Skipped { id });
        }

        if existing.is_some() {
            enter(CacheState::HitExtend, &fingerprint);
            info!("extending cached record with {new_monitors}");
        } else {
            enter(CacheState::MissFullRun, &fingerprint);
        }

        let redundant = current.difference(&new_monitors);
        let results = {
            let mut guard = DisabledMonitors::new(sim, redundant)?;
            let previous_results = existing.as_ref().map(|r| &r.results);
            self.run_with_retry(&mut guard, previous_results, &fingerprint)?
        };

        let outcome = match existing {
            Some(mut record) => {
                let added = record.extend(&results, new_monitors);
                self.store.update(&record)?;
                RunOutcome::Extended {
                    id: record.id.unwrap_or_default(),
                    added,
                }
            }
            None => {
                let mut record =
                    ResultRecord::new(sim.name(), parameters, results, sim.comment().clone());
                record.film_thickness = Some(sim.film_thickness());
                let id = self.store.insert(&record)?;
                RunOutcome::Inserted { id }
            }
        };

        if let Some((dir, database)) = &self.savefiles {
            let path = savefile_path(dir, database, outcome.id());
            sim.switch_to_layout()?;
            sim.save(&path)?;
            debug!("saved engine state to {}", path.display());
        }

        enter(CacheState::Done, &fingerprint);
        Ok(outcome)
    }

    fn run_with_retry<E: EngineSession>(
        &self,
        sim: &mut Simulation<E>,
        previous: Option<&ResultSet>,
        fingerprint: &Fingerprint,
    ) -> Result<ResultSet, CacheError> {
        let attempts = self.retry.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match sim.run(previous) {
                Ok(results) => return Ok(results),
                Err(e) if attempt < attempts => {
                    warn!("run attempt {attempt}/{attempts} failed: {e}, retrying");
                    sim.switch_to_layout()?;
                }
                Err(e) => {
                    enter(CacheState::Aborted, fingerprint);
                    warn!("run aborted after {attempt} attempt(s): {e}");
                    if let Err(revert) = sim.switch_to_layout() {
                        warn!("failed to revert to layout mode: {revert}");
                    }
                    return Err(CacheError::Aborted {
                        attempts: attempt,
                        last_error: e,
                    });
                }
            }
        }
    }
}

fn covers(set: MonitorSet, required: MonitorSet) -> bool {
    required.difference(&set).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdtd_core::testing::RecordingEngine;
    use fdtd_core::{Footprint, StructureId};

    fn sim() -> Simulation<RecordingEngine> {
        let mut sim = Simulation::with_default_layout(RecordingEngine::new(), "cache").unwrap();
        sim.add_structure(
            StructureId::new(1).unwrap(),
            Footprint::Rectangle {
                x_span: 100.0,
                y_span: 100.0,
            },
            50.0,
            "Au (Gold) - Palik",
        )
        .unwrap();
        sim
    }

    fn cache() -> SimulationCache {
        SimulationCache::new(ResultStore::open_in_memory().unwrap(), RetryPolicy::default())
    }

    #[test]
    fn test_covers() {
        let powers = MonitorSet::of(&POWER_MONITORS);
        assert!(covers(MonitorSet::all(), powers));
        assert!(!covers(MonitorSet::of(&[MonitorKind::ReflectionPower]), powers));
    }

    #[test]
    fn test_no_structures_fails_before_running() {
        let cache = cache();
        let mut sim = Simulation::with_default_layout(RecordingEngine::new(), "empty").unwrap();
        let err = cache.run_and_save(&mut sim).unwrap_err();
        assert!(matches!(
            err,
            CacheError::Simulation(SimulationError::NoActiveStructures)
        ));
        assert_eq!(sim.engine().attempts, 0);
        assert_eq!(cache.store().count().unwrap(), 0);
    }

    #[test]
    fn test_guard_restores_monitors() {
        let mut sim = sim();
        let before = sim.active_monitors().unwrap();
        {
            let guard =
                DisabledMonitors::new(&mut sim, MonitorSet::of(&[MonitorKind::ReflectionPower]))
                    .unwrap();
            assert!(!guard.active_monitors().unwrap().contains(MonitorKind::ReflectionPower));
        }
        assert_eq!(sim.active_monitors().unwrap(), before);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(CacheState::HitNoop.to_string(), "cache-hit-noop");
        assert_eq!(CacheState::Aborted.to_string(), "aborted");
    }
}
