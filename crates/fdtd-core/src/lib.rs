//! Parameter management for periodic-nanostructure FDTD sweeps.
//!
//! Describes a simulation in nm and degrees, fingerprints it with SHA-256,
//! drives an external solver through the [`EngineSession`] seam and turns its
//! raw monitor output into a reduced-precision [`ResultSet`] with ranked
//! resonances.
//!
//! No I/O of its own. Persistence and the incremental run cache live in
//! `fdtd-store`.

pub mod assemble;
pub mod comment;
pub mod constants;
pub mod engine;
pub mod error;
pub mod field;
pub mod fingerprint;
pub mod monitor;
pub mod params;
pub mod resonance;
pub mod results;
pub mod simulation;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod units;

pub use assemble::assemble;
pub use comment::Comment;
pub use constants::{COMMENT_SEPARATOR, TOP_RESONANCES, UNSET_TOKEN};
pub use engine::{EngineError, EngineSession, MonitorDataset, ObjectKind, ParamValue};
pub use error::{Result, SimulationError};
pub use field::{Label, NearFieldSnapshots, Plane};
pub use fingerprint::Fingerprint;
pub use monitor::{MonitorFamily, MonitorKind, MonitorSet, Side, UnknownMonitor};
pub use params::{
    BoundaryCondition, Boundaries, EdgeMesh, SimulationParameters, Spans, StructureId,
    StructureSlot, UnitCell, WavelengthRange,
};
pub use resonance::{Resonance, ResonanceError, ResonanceKind};
pub use results::{CrossSectionResult, MonitorResult, PowerResult, ProfileResult, ResultSet};
pub use simulation::{Footprint, Simulation, SolidBoundaries, StructureGrid};
