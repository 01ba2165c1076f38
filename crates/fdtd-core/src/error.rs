use std::fmt;

use crate::engine::EngineError;
use crate::params::StructureId;
use crate::resonance::ResonanceError;

#[derive(Debug, Clone, PartialEq)]
pub enum SimulationError {
    Engine(EngineError),
    Resonance(ResonanceError),
    /// Structure ids outside 1..=3.
    InvalidStructureId(u8),
    StructureDoesNotExist(StructureId),
    /// A single-instance operation was asked of a structure laid out as a grid.
    StructureNotUnique { id: StructureId, instances: usize },
    /// The grid period does not leave room around the structure.
    StructureDimensions {
        id: StructureId,
        axis: char,
        unit_cell: f32,
        span: f32,
    },
    NoActiveStructures,
    IncidenceAngleOutOfRange(f32),
    InvalidGrid(String),
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::Engine(e) => write!(f, "engine error: {e}"),
            SimulationError::Resonance(e) => write!(f, "resonance extraction failed: {e}"),
            SimulationError::InvalidStructureId(id) => {
                write!(f, "structure id must be 1, 2 or 3, got {id}")
            }
            SimulationError::StructureDoesNotExist(id) => {
                write!(f, "structure {id} does not exist")
            }
            SimulationError::StructureNotUnique { id, instances } => write!(
                f,
                "structure {id} has {instances} instances, operation needs exactly one"
            ),
            SimulationError::StructureDimensions {
                id,
                axis,
                unit_cell,
                span,
            } => write!(
                f,
                "structure {id}: {axis} unit cell {unit_cell} nm must exceed span {span} nm"
            ),
            SimulationError::NoActiveStructures => {
                write!(f, "simulation has no active structures")
            }
            SimulationError::IncidenceAngleOutOfRange(angle) => {
                write!(f, "incidence angle {angle} must lie within [-89.9, 89.9] degrees")
            }
            SimulationError::InvalidGrid(msg) => write!(f, "invalid structure grid: {msg}"),
        }
    }
}

impl std::error::Error for SimulationError {}

impl From<EngineError> for SimulationError {
    fn from(e: EngineError) -> Self {
        SimulationError::Engine(e)
    }
}

impl From<ResonanceError> for SimulationError {
    fn from(e: ResonanceError) -> Self {
        SimulationError::Resonance(e)
    }
}

pub type Result<T> = std::result::Result<T, SimulationError>;
