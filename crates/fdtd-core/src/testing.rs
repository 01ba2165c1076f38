//! In-memory [`EngineSession`] for tests.
//!
//! Parameters live in a map, executions synthesise Lorentzian spectra and
//! fields for every enabled monitor, and every call is counted so tests can
//! assert how much work a cache decision cost.

use std::collections::{BTreeMap, HashMap};
use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use ndarray::{ArrayD, IxDyn};
use num_complex::Complex64;

use crate::engine::{
    EngineError, EngineSession, GLOBAL_MONITOR, GLOBAL_SOURCE, MonitorDataset, ObjectKind,
    ParamValue,
};
use crate::monitor::{MonitorFamily, MonitorKind, MonitorSet};

/// Samples per lateral axis of synthetic field monitors.
const LATERAL_SAMPLES: usize = 4;
/// Samples along z of synthetic cross-section monitors.
const VERTICAL_SAMPLES: usize = 5;

#[derive(Debug, Default)]
pub struct RecordingEngine {
    params: HashMap<(String, String), ParamValue>,
    objects: BTreeMap<String, ObjectKind>,
    results: HashMap<(String, String), MonitorDataset>,
    analysis_mode: bool,
    fail_next: usize,
    /// Successful executions.
    pub executions: usize,
    /// Executions attempted, including injected failures.
    pub attempts: usize,
    pub writes: usize,
    pub layout_switches: usize,
    pub saves: Vec<PathBuf>,
    /// Monitors that were enabled during each successful execution.
    pub executed_monitors: Vec<MonitorSet>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls to `execute` fail.
    pub fn fail_next_executions(&mut self, n: usize) {
        self.fail_next = n;
    }

    pub fn is_analysis_mode(&self) -> bool {
        self.analysis_mode
    }

    pub fn objects(&self) -> impl Iterator<Item = (&str, ObjectKind)> {
        self.objects.iter().map(|(name, kind)| (name.as_str(), *kind))
    }

    /// Snapshot of every counter, for before/after comparisons.
    pub fn counters(&self) -> (usize, usize, usize) {
        (self.executions, self.writes, self.saves.len())
    }

    fn number(&self, scope: &str, name: &str, default: f64) -> f64 {
        self.params
            .get(&(scope.to_string(), name.to_string()))
            .and_then(ParamValue::as_number)
            .unwrap_or(default)
    }

    fn monitor_enabled(&self, kind: MonitorKind) -> bool {
        self.objects.contains_key(kind.name())
            && self
                .params
                .get(&(kind.name().to_string(), "enabled".to_string()))
                .and_then(ParamValue::as_flag)
                .unwrap_or(true)
    }

    fn wavelengths(&self) -> Vec<f64> {
        let start = self.number(GLOBAL_SOURCE, "wavelength start", 400e-9);
        let stop = self.number(GLOBAL_SOURCE, "wavelength stop", 1500e-9);
        let points = self.number(GLOBAL_MONITOR, "frequency points", 1000.0).max(2.0) as usize;
        (0..points)
            .map(|i| start + (stop - start) * i as f64 / (points - 1) as f64)
            .collect()
    }

    fn synthesise(&mut self) {
        self.results.clear();
        let lambdas = self.wavelengths();
        let spectra = Spectra::new(&lambdas);

        for kind in MonitorKind::ALL {
            if !self.monitor_enabled(kind) {
                continue;
            }
            match kind.family() {
                MonitorFamily::Power => {
                    let curve = if kind == MonitorKind::ReflectionPower {
                        &spectra.reflection
                    } else {
                        &spectra.transmission
                    };
                    let mut ds = base_dataset(&lambdas);
                    ds.real.insert("T".into(), vector(curve));
                    self.results.insert((kind.name().into(), "T".into()), ds);
                }
                MonitorFamily::Profile => {
                    let shape = [LATERAL_SAMPLES, LATERAL_SAMPLES, 1];
                    let ds = field_dataset(&lambdas, "E", shape, &spectra.near_field);
                    self.results.insert((kind.name().into(), "E".into()), ds);
                }
                MonitorFamily::CrossSection => {
                    let shape = if kind == MonitorKind::XzProfile {
                        [LATERAL_SAMPLES, 1, VERTICAL_SAMPLES]
                    } else {
                        [1, LATERAL_SAMPLES, VERTICAL_SAMPLES]
                    };
                    for dataset in ["E", "P"] {
                        let ds = field_dataset(&lambdas, dataset, shape, &spectra.near_field);
                        self.results.insert((kind.name().into(), dataset.into()), ds);
                    }
                }
            }
        }
    }
}

/// Reflection with two resonances, the matching transmission, and a near
/// field enhancement curve peaking between them.
struct Spectra {
    reflection: Vec<f64>,
    transmission: Vec<f64>,
    near_field: Vec<f64>,
}

impl Spectra {
    fn new(lambdas: &[f64]) -> Self {
        let (start, stop) = match (lambdas.first(), lambdas.last()) {
            (Some(a), Some(b)) => (*a, *b),
            _ => (0.0, 1.0),
        };
        let width = (stop - start) / 40.0;
        let at = |fraction: f64| start + (stop - start) * fraction;

        let reflection: Vec<f64> = lambdas
            .iter()
            .map(|l| 0.05 + 0.6 * lorentz(*l, at(0.3), width) + 0.3 * lorentz(*l, at(0.7), width))
            .collect();
        let transmission = reflection.iter().map(|r| 0.95 - r).collect();
        let near_field = lambdas
            .iter()
            .map(|l| 1.0 + 4.0 * lorentz(*l, at(0.5), width) + 2.0 * lorentz(*l, at(0.8), width))
            .collect();

        Spectra {
            reflection,
            transmission,
            near_field,
        }
    }
}

fn lorentz(x: f64, centre: f64, width: f64) -> f64 {
    1.0 / (1.0 + ((x - centre) / width).powi(2))
}

fn vector(values: &[f64]) -> ArrayD<f64> {
    ArrayD::from_shape_vec(IxDyn(&[values.len()]), values.to_vec())
        .unwrap_or_else(|_| ArrayD::zeros(IxDyn(&[0])))
}

fn axis(n: usize, span: f64) -> ArrayD<f64> {
    let values: Vec<f64> = (0..n)
        .map(|i| {
            if n == 1 {
                0.0
            } else {
                -span / 2.0 + span * i as f64 / (n - 1) as f64
            }
        })
        .collect();
    vector(&values)
}

fn base_dataset(lambdas: &[f64]) -> MonitorDataset {
    let mut ds = MonitorDataset::default();
    ds.real.insert("lambda".into(), vector(lambdas));
    ds
}

fn field_dataset(
    lambdas: &[f64],
    name: &str,
    [nx, ny, nz]: [usize; 3],
    amplitude: &[f64],
) -> MonitorDataset {
    let mut ds = base_dataset(lambdas);
    ds.real.insert("x".into(), axis(nx, 350e-9));
    ds.real.insert("y".into(), axis(ny, 350e-9));
    ds.real.insert("z".into(), axis(nz, 200e-9));

    let scale = if name == "P" { 0.5 } else { 1.0 };
    let field = ArrayD::from_shape_fn(IxDyn(&[nx, ny, nz, lambdas.len(), 3]), |idx| {
        let spatial = 1.0 + (idx[0] + idx[1] + idx[2]) as f64 / 4.0;
        let component = [1.0, 0.5, 0.0][idx[4]];
        let phase = 2.0 * PI * idx[3] as f64 / lambdas.len().max(1) as f64;
        Complex64::new(scale * amplitude[idx[3]] * spatial * component, phase.sin())
    });
    ds.complex.insert(name.into(), field);
    ds
}

impl EngineSession for RecordingEngine {
    fn get_named(&self, scope: &str, name: &str) -> Result<ParamValue, EngineError> {
        self.params
            .get(&(scope.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| EngineError::MissingParameter {
                scope: scope.to_string(),
                name: name.to_string(),
            })
    }

    fn set_named(&mut self, scope: &str, name: &str, value: ParamValue) -> Result<(), EngineError> {
        if self.analysis_mode {
            return Err(EngineError::Unavailable(format!(
                "cannot set {scope:?}.{name:?} in analysis mode"
            )));
        }
        self.writes += 1;
        self.params.insert((scope.to_string(), name.to_string()), value);
        Ok(())
    }

    fn add_object(&mut self, kind: ObjectKind, name: &str) -> Result<(), EngineError> {
        if self.analysis_mode {
            return Err(EngineError::Unavailable(format!(
                "cannot add {name:?} in analysis mode"
            )));
        }
        self.objects.insert(name.to_string(), kind);
        Ok(())
    }

    fn delete_object(&mut self, name: &str) -> Result<(), EngineError> {
        if self.objects.remove(name).is_none() {
            return Err(EngineError::MissingObject(name.to_string()));
        }
        self.params.retain(|(scope, _), _| scope != name);
        Ok(())
    }

    fn has_object(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    fn get_result(&self, monitor: &str, dataset: &str) -> Result<MonitorDataset, EngineError> {
        self.results
            .get(&(monitor.to_string(), dataset.to_string()))
            .cloned()
            .ok_or_else(|| EngineError::MissingResult {
                monitor: monitor.to_string(),
                field: dataset.to_string(),
            })
    }

    fn execute(&mut self) -> Result<(), EngineError> {
        self.attempts += 1;
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(EngineError::Execution("injected solver failure".into()));
        }
        let enabled = MonitorKind::ALL
            .into_iter()
            .filter(|kind| self.monitor_enabled(*kind))
            .collect();
        self.executed_monitors.push(enabled);
        self.synthesise();
        self.analysis_mode = true;
        self.executions += 1;
        Ok(())
    }

    fn save(&mut self, path: &Path) -> Result<(), EngineError> {
        self.saves.push(path.to_path_buf());
        Ok(())
    }

    fn switch_to_layout_mode(&mut self) -> Result<(), EngineError> {
        self.layout_switches += 1;
        self.analysis_mode = false;
        self.results.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(kinds: &[MonitorKind]) -> RecordingEngine {
        let mut engine = RecordingEngine::new();
        engine
            .set_named(GLOBAL_MONITOR, "frequency points", ParamValue::Number(50.0))
            .unwrap();
        for kind in kinds {
            engine.add_object(ObjectKind::PowerMonitor, kind.name()).unwrap();
        }
        engine
    }

    #[test]
    fn test_execute_synthesises_enabled_monitors_only() {
        let mut engine = engine_with(&[MonitorKind::ReflectionPower, MonitorKind::XzProfile]);
        engine
            .set_named("xz_profile_monitor", "enabled", false.into())
            .unwrap();
        engine.execute().unwrap();

        let ds = engine.get_result("ref_power_monitor", "T").unwrap();
        assert_eq!(ds.real["T"].len(), 50);
        assert!(engine.get_result("xz_profile_monitor", "E").is_err());
        assert_eq!(engine.executions, 1);
        assert_eq!(
            engine.executed_monitors,
            vec![MonitorSet::of(&[MonitorKind::ReflectionPower])]
        );
    }

    #[test]
    fn test_analysis_mode_blocks_writes() {
        let mut engine = engine_with(&[]);
        engine.execute().unwrap();
        assert!(engine.set_named("source", "angle phi", 0.0.into()).is_err());
        engine.switch_to_layout_mode().unwrap();
        assert!(engine.set_named("source", "angle phi", 0.0.into()).is_ok());
    }

    #[test]
    fn test_injected_failures() {
        let mut engine = engine_with(&[]);
        engine.fail_next_executions(2);
        assert!(engine.execute().is_err());
        assert!(engine.execute().is_err());
        assert!(engine.execute().is_ok());
        assert_eq!((engine.attempts, engine.executions), (3, 1));
    }

    #[test]
    fn test_field_dataset_shapes() {
        let mut engine = engine_with(&[MonitorKind::YzProfile, MonitorKind::ReflectionProfile]);
        engine.execute().unwrap();
        let yz = engine.get_result("yz_profile_monitor", "P").unwrap();
        assert_eq!(yz.complex["P"].shape(), &[1, 4, 5, 50, 3]);
        let xy = engine.get_result("ref_profile_monitor", "E").unwrap();
        assert_eq!(xy.complex["E"].shape(), &[4, 4, 1, 50, 3]);
    }
}
