//! The seam between this workspace and the external FDTD solver.
//!
//! Everything behind [`EngineSession`] speaks SI meters. Callers convert at
//! the boundary with [`crate::units`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use ndarray::ArrayD;
use num_complex::Complex64;

/// Scope of the wavelength sweep shared by every source.
pub const GLOBAL_SOURCE: &str = "global source";
/// Scope of the frequency sampling shared by every monitor.
pub const GLOBAL_MONITOR: &str = "global monitor";

/// A named scene property value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Number(f64),
    Text(String),
    Flag(bool),
}

impl ParamValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            ParamValue::Flag(b) => Some(*b),
            ParamValue::Number(v) => Some(*v != 0.0),
            ParamValue::Text(_) => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Number(v)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Flag(b)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Text(s)
    }
}

/// Scene object types the session can create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Group,
    Rectangle,
    Circle,
    FdtdRegion,
    MeshOverride,
    PowerMonitor,
    ProfileMonitor,
    PlaneSource,
}

/// Arrays returned for one monitor dataset, by field name.
#[derive(Debug, Clone, Default)]
pub struct MonitorDataset {
    pub real: BTreeMap<String, ArrayD<f64>>,
    pub complex: BTreeMap<String, ArrayD<Complex64>>,
}

impl MonitorDataset {
    pub fn real(&self, monitor: &str, field: &str) -> Result<&ArrayD<f64>, EngineError> {
        self.real.get(field).ok_or_else(|| EngineError::MissingResult {
            monitor: monitor.to_string(),
            field: field.to_string(),
        })
    }

    pub fn complex(&self, monitor: &str, field: &str) -> Result<&ArrayD<Complex64>, EngineError> {
        self.complex.get(field).ok_or_else(|| EngineError::MissingResult {
            monitor: monitor.to_string(),
            field: field.to_string(),
        })
    }

    /// A real array flattened in logical order.
    pub fn real_vec(&self, monitor: &str, field: &str) -> Result<Vec<f64>, EngineError> {
        Ok(self.real(monitor, field)?.iter().copied().collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The solver session is gone or was never started.
    Unavailable(String),
    MissingObject(String),
    MissingParameter { scope: String, name: String },
    TypeMismatch { scope: String, name: String, expected: &'static str },
    MissingResult { monitor: String, field: String },
    Shape(String),
    Execution(String),
    Save(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Unavailable(msg) => write!(f, "engine unavailable: {msg}"),
            EngineError::MissingObject(name) => write!(f, "no scene object named {name:?}"),
            EngineError::MissingParameter { scope, name } => {
                write!(f, "{scope:?} has no property {name:?}")
            }
            EngineError::TypeMismatch {
                scope,
                name,
                expected,
            } => write!(f, "{scope:?}.{name:?} is not a {expected}"),
            EngineError::MissingResult { monitor, field } => {
                write!(f, "monitor {monitor:?} has no result {field:?}")
            }
            EngineError::Shape(msg) => write!(f, "unexpected result shape: {msg}"),
            EngineError::Execution(msg) => write!(f, "simulation run failed: {msg}"),
            EngineError::Save(msg) => write!(f, "failed to save engine state: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// A live handle to the external solver.
///
/// Sessions are single-threaded and own their scene; all mutation happens in
/// layout mode, and `execute` leaves the session in analysis mode.
pub trait EngineSession {
    fn get_named(&self, scope: &str, name: &str) -> Result<ParamValue, EngineError>;

    fn set_named(&mut self, scope: &str, name: &str, value: ParamValue) -> Result<(), EngineError>;

    fn add_object(&mut self, kind: ObjectKind, name: &str) -> Result<(), EngineError>;

    fn delete_object(&mut self, name: &str) -> Result<(), EngineError>;

    fn has_object(&self, name: &str) -> bool;

    fn get_result(&self, monitor: &str, dataset: &str) -> Result<MonitorDataset, EngineError>;

    fn execute(&mut self) -> Result<(), EngineError>;

    fn save(&mut self, path: &Path) -> Result<(), EngineError>;

    fn switch_to_layout_mode(&mut self) -> Result<(), EngineError>;

    fn get_number(&self, scope: &str, name: &str) -> Result<f64, EngineError> {
        self.get_named(scope, name)?
            .as_number()
            .ok_or_else(|| EngineError::TypeMismatch {
                scope: scope.to_string(),
                name: name.to_string(),
                expected: "number",
            })
    }

    fn get_text(&self, scope: &str, name: &str) -> Result<String, EngineError> {
        match self.get_named(scope, name)? {
            ParamValue::Text(s) => Ok(s),
            _ => Err(EngineError::TypeMismatch {
                scope: scope.to_string(),
                name: name.to_string(),
                expected: "string",
            }),
        }
    }

    fn get_flag(&self, scope: &str, name: &str) -> Result<bool, EngineError> {
        self.get_named(scope, name)?
            .as_flag()
            .ok_or_else(|| EngineError::TypeMismatch {
                scope: scope.to_string(),
                name: name.to_string(),
                expected: "flag",
            })
    }
}
