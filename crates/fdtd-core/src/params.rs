use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_FDTD_SPAN, DEFAULT_FILM_THICKNESS, DEFAULT_FREQUENCY_POINTS, DEFAULT_MESH_STEP,
    DEFAULT_WAVELENGTH_START, DEFAULT_WAVELENGTH_STOP, UNSET_TOKEN,
};

/// Identifier of one of the three structure slots a simulation can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct StructureId(u8);

impl StructureId {
    pub const ALL: [StructureId; 3] = [StructureId(1), StructureId(2), StructureId(3)];

    pub fn new(id: u8) -> Option<Self> {
        (1..=3).contains(&id).then_some(StructureId(id))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        usize::from(self.0 - 1)
    }
}

impl fmt::Display for StructureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for StructureId {
    type Error = String;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        StructureId::new(id).ok_or_else(|| format!("structure id must be 1, 2 or 3, got {id}"))
    }
}

impl From<StructureId> for u8 {
    fn from(id: StructureId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spans {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub z: Option<f32>,
}

impl Spans {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Spans {
            x: Some(x),
            y: Some(y),
            z: Some(z),
        }
    }

    /// Fill unset axes from `previous`.
    pub fn or(self, previous: Spans) -> Spans {
        Spans {
            x: self.x.or(previous.x),
            y: self.y.or(previous.y),
            z: self.z.or(previous.z),
        }
    }
}

/// Lattice period of a structure arranged in a grid (nm).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitCell {
    pub x: Option<f32>,
    pub y: Option<f32>,
}

/// Refined mesh placed around a structure's edges (nm).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeMesh {
    pub size: Option<f32>,
    pub step: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureSlot {
    pub spans: Spans,
    pub material: Option<String>,
    pub unit_cell: UnitCell,
    pub edge_mesh: EdgeMesh,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WavelengthRange {
    pub start: f32,
    pub stop: f32,
    pub points: u32,
}

impl Default for WavelengthRange {
    fn default() -> Self {
        WavelengthRange {
            start: DEFAULT_WAVELENGTH_START,
            stop: DEFAULT_WAVELENGTH_STOP,
            points: DEFAULT_FREQUENCY_POINTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundaryCondition {
    #[serde(rename = "PML")]
    Pml,
    Metal,
    Periodic,
    Symmetric,
    #[serde(rename = "Anti-Symmetric")]
    AntiSymmetric,
    Bloch,
}

impl BoundaryCondition {
    /// Label the engine uses for this boundary.
    pub fn label(self) -> &'static str {
        match self {
            BoundaryCondition::Pml => "PML",
            BoundaryCondition::Metal => "Metal",
            BoundaryCondition::Periodic => "Periodic",
            BoundaryCondition::Symmetric => "Symmetric",
            BoundaryCondition::AntiSymmetric => "Anti-Symmetric",
            BoundaryCondition::Bloch => "Bloch",
        }
    }
}

impl fmt::Display for BoundaryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for BoundaryCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "PML" => Ok(BoundaryCondition::Pml),
            "Metal" => Ok(BoundaryCondition::Metal),
            "Periodic" => Ok(BoundaryCondition::Periodic),
            "Symmetric" => Ok(BoundaryCondition::Symmetric),
            "Anti-Symmetric" => Ok(BoundaryCondition::AntiSymmetric),
            "Bloch" => Ok(BoundaryCondition::Bloch),
            other => Err(format!("unknown boundary condition: {other:?}")),
        }
    }
}

/// Boundary conditions of the six FDTD region faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Boundaries {
    pub x_min: BoundaryCondition,
    pub x_max: BoundaryCondition,
    pub y_min: BoundaryCondition,
    pub y_max: BoundaryCondition,
    pub z_min: BoundaryCondition,
    pub z_max: BoundaryCondition,
}

impl Boundaries {
    /// Engine property names, in the order they are serialised.
    pub const PROPERTIES: [&'static str; 6] = [
        "x min bc", "x max bc", "y min bc", "y max bc", "z min bc", "z max bc",
    ];

    pub fn lateral(x: BoundaryCondition, y: BoundaryCondition) -> Self {
        Boundaries {
            x_min: x,
            x_max: x,
            y_min: y,
            y_max: y,
            z_min: BoundaryCondition::Pml,
            z_max: BoundaryCondition::Pml,
        }
    }

    pub fn as_array(&self) -> [BoundaryCondition; 6] {
        [
            self.x_min, self.x_max, self.y_min, self.y_max, self.z_min, self.z_max,
        ]
    }

    pub fn from_array(bc: [BoundaryCondition; 6]) -> Self {
        Boundaries {
            x_min: bc[0],
            x_max: bc[1],
            y_min: bc[2],
            y_max: bc[3],
            z_min: bc[4],
            z_max: bc[5],
        }
    }
}

impl Default for Boundaries {
    fn default() -> Self {
        Boundaries::lateral(BoundaryCondition::AntiSymmetric, BoundaryCondition::Symmetric)
    }
}

impl fmt::Display for Boundaries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = self.as_array().iter().map(|bc| bc.label()).collect();
        f.write_str(&labels.join(","))
    }
}

impl FromStr for Boundaries {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = s
            .split(',')
            .map(str::parse::<BoundaryCondition>)
            .collect::<Result<Vec<_>, _>>()?;
        let bc: [BoundaryCondition; 6] = parsed
            .try_into()
            .map_err(|v: Vec<_>| format!("expected 6 boundary labels, got {}", v.len()))?;
        Ok(Boundaries::from_array(bc))
    }
}

/// Every input that determines a simulation's outcome, in nm and degrees.
///
/// Two parameter sets describe the same physical setup iff their
/// [`Fingerprint`](crate::Fingerprint)s are equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParameters {
    pub structures: [StructureSlot; 3],
    pub polarization_angle: f32,
    pub incidence_angle: f32,
    pub fdtd_spans: [f32; 3],
    pub mesh_steps: [f32; 3],
    pub wavelength: WavelengthRange,
    pub boundaries: Boundaries,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        let wavelength = WavelengthRange::default();
        SimulationParameters {
            structures: Default::default(),
            polarization_angle: 0.0,
            incidence_angle: 0.0,
            fdtd_spans: [
                DEFAULT_FDTD_SPAN,
                DEFAULT_FDTD_SPAN,
                default_fdtd_z_span(wavelength.stop, DEFAULT_FILM_THICKNESS),
            ],
            mesh_steps: [DEFAULT_MESH_STEP; 3],
            wavelength,
            boundaries: Boundaries::default(),
        }
    }
}

/// The region must hold the film plus a full wavelength above and below it.
pub fn default_fdtd_z_span(wavelength_stop: f32, film_thickness: f32) -> f32 {
    2.0 * wavelength_stop + film_thickness
}

impl SimulationParameters {
    pub fn structure(&self, id: StructureId) -> &StructureSlot {
        &self.structures[id.index()]
    }

    pub fn structure_mut(&mut self, id: StructureId) -> &mut StructureSlot {
        &mut self.structures[id.index()]
    }

    /// Canonical string form of every fingerprinted value, in fingerprint
    /// order. Reordering this list changes every stored fingerprint.
    pub fn canonical_fields(&self) -> Vec<String> {
        let mut fields = Vec::with_capacity(36);

        for slot in &self.structures {
            fields.push(opt(slot.spans.x));
            fields.push(opt(slot.spans.y));
            fields.push(opt(slot.spans.z));
            fields.push(slot.material.clone().unwrap_or_else(|| UNSET_TOKEN.to_string()));
        }

        fields.push(self.polarization_angle.to_string());
        fields.extend(self.fdtd_spans.iter().map(f32::to_string));
        fields.extend(self.mesh_steps.iter().map(f32::to_string));
        fields.push(self.wavelength.start.to_string());
        fields.push(self.wavelength.stop.to_string());
        fields.push(self.wavelength.points.to_string());

        for slot in &self.structures {
            fields.push(opt(slot.unit_cell.x));
            fields.push(opt(slot.unit_cell.y));
        }
        for slot in &self.structures {
            fields.push(opt(slot.edge_mesh.size));
            fields.push(opt(slot.edge_mesh.step));
        }

        fields.push(self.boundaries.to_string());
        fields.push(self.incidence_angle.to_string());
        fields
    }
}

fn opt(value: Option<f32>) -> String {
    value.map_or_else(|| UNSET_TOKEN.to_string(), |v| v.to_string())
}
