//! A live simulation: the engine session plus the parameters the engine does
//! not itself remember (mesh steps, unit cells, edge meshes, film geometry).
//!
//! All public lengths are nm. Every engine read and write goes through the
//! `get_nm`/`set_nm` helpers so the meter conversion cannot be skipped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::assemble::assemble;
use crate::comment::Comment;
use crate::constants::{
    DEFAULT_FDTD_SPAN, DEFAULT_FILM_THICKNESS, DEFAULT_MESH_STEP, DEFAULT_NEAR_FIELD_DISTANCE,
    MAX_INCIDENCE_ANGLE,
};
use crate::engine::{
    EngineError, EngineSession, GLOBAL_MONITOR, GLOBAL_SOURCE, ObjectKind, ParamValue,
};
use crate::error::{Result, SimulationError};
use crate::fingerprint::Fingerprint;
use crate::monitor::{MonitorFamily, MonitorKind, MonitorSet};
use crate::params::{
    BoundaryCondition, Boundaries, EdgeMesh, SimulationParameters, Spans, StructureId,
    StructureSlot, UnitCell, WavelengthRange, default_fdtd_z_span,
};
use crate::results::ResultSet;
use crate::units::{m_to_nm, nm_to_m};

pub const FDTD_REGION: &str = "FDTD";
pub const SUBSTRATE: &str = "substrate";
pub const SOURCE: &str = "source";
pub const GLOBAL_MESH: &str = "mesh";

const SUBSTRATE_MATERIAL: &str = "SiO2 (Glass) - Palik";

fn group_name(id: StructureId) -> String {
    format!("structure_{id}_group")
}

fn instance_name(id: StructureId, instance: usize) -> String {
    format!("structure_{id}_{instance}")
}

fn edge_mesh_name(id: StructureId) -> String {
    format!("structure_{id}_edge_mesh")
}

/// Lateral outline of a structure (nm).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Footprint {
    Rectangle { x_span: f32, y_span: f32 },
    Circle { radius: f32 },
}

impl Footprint {
    /// Bounding-box spans along x and y.
    pub fn lateral_spans(self) -> (f32, f32) {
        match self {
            Footprint::Rectangle { x_span, y_span } => (x_span, y_span),
            Footprint::Circle { radius } => (2.0 * radius, 2.0 * radius),
        }
    }

    fn object_kind(self) -> ObjectKind {
        match self {
            Footprint::Rectangle { .. } => ObjectKind::Rectangle,
            Footprint::Circle { .. } => ObjectKind::Circle,
        }
    }
}

/// Faces of the placement window that are real walls rather than symmetry
/// planes. A wall gets half a gap of extra clearance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolidBoundaries {
    pub x_min: bool,
    pub x_max: bool,
    pub y_min: bool,
    pub y_max: bool,
}

/// A rectangular window filled with `count_x * count_y` copies of a structure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StructureGrid {
    pub x_range: (f32, f32),
    pub y_range: (f32, f32),
    pub count_x: usize,
    pub count_y: usize,
    pub solid: SolidBoundaries,
}

impl StructureGrid {
    /// Period along one axis, chosen so the gap between neighbours equals
    /// twice the gap at a symmetry face.
    fn period(range: (f32, f32), count: usize, span: f32, walls: (bool, bool)) -> f32 {
        let available = range.1 - range.0;
        let wall_slots = 0.5 * (f32::from(u8::from(walls.0)) + f32::from(u8::from(walls.1)));
        (available - count as f32 * span) / (count as f32 + wall_slots) + span
    }

    fn first_centre(range: (f32, f32), period: f32, span: f32, min_wall: bool) -> f32 {
        let clearance = if min_wall { (period - span) / 2.0 } else { 0.0 };
        range.0 + period / 2.0 + clearance
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Placement {
    footprint: Footprint,
    instances: usize,
}

/// Lateral boundary conditions for a polarization/incidence pair.
///
/// Symmetry planes are only valid for normal incidence with the field along
/// x or y; anything else needs Bloch, or PML when symmetry is disallowed.
pub fn lateral_boundaries(polarization: f32, incidence: f32, allow_symmetry: bool) -> Boundaries {
    use BoundaryCondition::{AntiSymmetric, Bloch, Pml, Symmetric};

    if !allow_symmetry {
        return Boundaries::lateral(Pml, Pml);
    }
    let angle = polarization.rem_euclid(360.0);
    if incidence == 0.0 && (angle == 0.0 || angle == 180.0) {
        Boundaries::lateral(AntiSymmetric, Symmetric)
    } else if incidence == 0.0 && (angle == 90.0 || angle == 270.0) {
        Boundaries::lateral(Symmetric, AntiSymmetric)
    } else {
        Boundaries::lateral(Bloch, Bloch)
    }
}

#[derive(Debug)]
pub struct Simulation<E: EngineSession> {
    engine: E,
    name: String,
    structures: BTreeMap<StructureId, Placement>,
    mesh_steps: [f32; 3],
    unit_cells: [UnitCell; 3],
    edge_meshes: [EdgeMesh; 3],
    film_thickness: f32,
    near_field_distance: f32,
    comment: Comment,
    save_path: Option<PathBuf>,
}

impl<E: EngineSession> Simulation<E> {
    /// Wrap a session without touching its scene.
    pub fn new(engine: E, name: impl Into<String>) -> Self {
        Simulation {
            engine,
            name: name.into(),
            structures: BTreeMap::new(),
            mesh_steps: [DEFAULT_MESH_STEP; 3],
            unit_cells: Default::default(),
            edge_meshes: Default::default(),
            film_thickness: DEFAULT_FILM_THICKNESS,
            near_field_distance: DEFAULT_NEAR_FIELD_DISTANCE,
            comment: Comment::default(),
            save_path: None,
        }
    }

    /// Wrap a session and build the standard scene: substrate, FDTD region,
    /// plane-wave source, global mesh and all six monitors with the two
    /// cross-sections disabled.
    pub fn with_default_layout(engine: E, name: impl Into<String>) -> Result<Self> {
        let mut sim = Simulation::new(engine, name);
        sim.build_default_layout()?;
        Ok(sim)
    }

    fn build_default_layout(&mut self) -> Result<()> {
        self.layout()?;

        self.engine.add_object(ObjectKind::FdtdRegion, FDTD_REGION)?;
        self.set_nm(FDTD_REGION, "x span", DEFAULT_FDTD_SPAN)?;
        self.set_nm(FDTD_REGION, "y span", DEFAULT_FDTD_SPAN)?;
        self.apply_boundaries(Boundaries::default())?;

        self.engine.add_object(ObjectKind::Rectangle, SUBSTRATE)?;
        self.set(SUBSTRATE, "material", SUBSTRATE_MATERIAL)?;

        self.engine.add_object(ObjectKind::MeshOverride, GLOBAL_MESH)?;
        self.set_mesh_steps(self.mesh_steps)?;

        self.engine.add_object(ObjectKind::PlaneSource, SOURCE)?;
        self.set(SOURCE, "angle phi", 0.0)?;
        self.set(SOURCE, "angle theta", 0.0)?;

        for kind in MonitorKind::ALL {
            let object = match kind.family() {
                MonitorFamily::Power => ObjectKind::PowerMonitor,
                _ => ObjectKind::ProfileMonitor,
            };
            self.engine.add_object(object, kind.name())?;
            let enabled = kind.family() != MonitorFamily::CrossSection;
            self.set(kind.name(), "enabled", enabled)?;
            if kind.family() == MonitorFamily::CrossSection {
                self.set(kind.name(), "output Px", true)?;
            }
        }

        // Also sizes the region vertically and places the monitors.
        self.set_global_wavelength_range(WavelengthRange::default())?;
        info!("built default layout for {}", self.name);
        Ok(())
    }

    // --- Accessors ---

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    pub fn comment(&self) -> &Comment {
        &self.comment
    }

    pub fn set_comment(&mut self, text: impl Into<String>, custom_parameter: impl Into<String>) {
        self.comment = Comment::new(text, custom_parameter);
    }

    /// Where [`Simulation::save_default`] writes the engine state.
    pub fn save_path(&self) -> Option<&Path> {
        self.save_path.as_deref()
    }

    pub fn set_save_path(&mut self, path: impl Into<PathBuf>) {
        self.save_path = Some(path.into());
    }

    pub fn film_thickness(&self) -> f32 {
        self.film_thickness
    }

    pub fn near_field_distance(&self) -> f32 {
        self.near_field_distance
    }

    pub fn mesh_steps(&self) -> [f32; 3] {
        self.mesh_steps
    }

    pub fn active_structures(&self) -> Vec<StructureId> {
        self.structures.keys().copied().collect()
    }

    pub fn has_structures(&self) -> bool {
        !self.structures.is_empty()
    }

    // --- Engine boundary ---

    fn layout(&mut self) -> Result<()> {
        Ok(self.engine.switch_to_layout_mode()?)
    }

    fn set(&mut self, scope: &str, name: &str, value: impl Into<ParamValue>) -> Result<()> {
        Ok(self.engine.set_named(scope, name, value.into())?)
    }

    fn set_nm(&mut self, scope: &str, name: &str, nm: f32) -> Result<()> {
        self.set(scope, name, nm_to_m(nm))
    }

    fn get_nm(&self, scope: &str, name: &str) -> Result<f32> {
        Ok(m_to_nm(self.engine.get_number(scope, name)?))
    }

    fn get_degrees(&self, scope: &str, name: &str) -> Result<f32> {
        Ok(self.engine.get_number(scope, name)? as f32)
    }

    // --- Structures ---

    fn placement(&self, id: StructureId) -> Result<Placement> {
        self.structures
            .get(&id)
            .copied()
            .ok_or(SimulationError::StructureDoesNotExist(id))
    }

    fn unique_placement(&self, id: StructureId) -> Result<Placement> {
        let placement = self.placement(id)?;
        if placement.instances != 1 {
            return Err(SimulationError::StructureNotUnique {
                id,
                instances: placement.instances,
            });
        }
        Ok(placement)
    }

    /// Place a single structure at the origin, replacing whatever occupied
    /// the slot.
    pub fn add_structure(
        &mut self,
        id: StructureId,
        footprint: Footprint,
        z_span: f32,
        material: &str,
    ) -> Result<()> {
        self.layout()?;
        self.remove_structure_objects(id)?;
        self.engine.add_object(ObjectKind::Group, &group_name(id))?;
        self.place_instance(id, 1, footprint, z_span, material, (0.0, 0.0))?;
        self.structures.insert(
            id,
            Placement {
                footprint,
                instances: 1,
            },
        );
        self.unit_cells[id.index()] = UnitCell::default();
        debug!("added structure {id}");
        Ok(())
    }

    /// Fill a window with a periodic array of one structure and return the
    /// resulting unit cell.
    pub fn add_structure_grid(
        &mut self,
        id: StructureId,
        footprint: Footprint,
        z_span: f32,
        material: &str,
        grid: &StructureGrid,
    ) -> Result<UnitCell> {
        if grid.count_x == 0 || grid.count_y == 0 {
            return Err(SimulationError::InvalidGrid(format!(
                "structure counts must be positive, got {} x {}",
                grid.count_x, grid.count_y
            )));
        }
        if grid.x_range.0 > grid.x_range.1 || grid.y_range.0 > grid.y_range.1 {
            return Err(SimulationError::InvalidGrid(format!(
                "ranges must be ordered, got x {:?} and y {:?}",
                grid.x_range, grid.y_range
            )));
        }

        let (span_x, span_y) = footprint.lateral_spans();
        let solid = grid.solid;
        let period_x =
            StructureGrid::period(grid.x_range, grid.count_x, span_x, (solid.x_min, solid.x_max));
        let period_y =
            StructureGrid::period(grid.y_range, grid.count_y, span_y, (solid.y_min, solid.y_max));
        for (axis, period, span) in [('x', period_x, span_x), ('y', period_y, span_y)] {
            if period <= span {
                return Err(SimulationError::StructureDimensions {
                    id,
                    axis,
                    unit_cell: period,
                    span,
                });
            }
        }

        self.layout()?;
        self.remove_structure_objects(id)?;
        self.engine.add_object(ObjectKind::Group, &group_name(id))?;

        let first_x = StructureGrid::first_centre(grid.x_range, period_x, span_x, solid.x_min);
        let first_y = StructureGrid::first_centre(grid.y_range, period_y, span_y, solid.y_min);
        let mut instance = 0;
        for i in 0..grid.count_x {
            for j in 0..grid.count_y {
                instance += 1;
                let centre = (
                    first_x + period_x * i as f32,
                    first_y + period_y * j as f32,
                );
                self.place_instance(id, instance, footprint, z_span, material, centre)?;
            }
        }

        self.structures.insert(
            id,
            Placement {
                footprint,
                instances: instance,
            },
        );
        let unit_cell = UnitCell {
            x: Some(period_x),
            y: Some(period_y),
        };
        self.unit_cells[id.index()] = unit_cell;
        debug!("added {instance} copies of structure {id}, unit cell {period_x} x {period_y} nm");
        Ok(unit_cell)
    }

    fn place_instance(
        &mut self,
        id: StructureId,
        instance: usize,
        footprint: Footprint,
        z_span: f32,
        material: &str,
        (x, y): (f32, f32),
    ) -> Result<()> {
        let name = instance_name(id, instance);
        self.engine.add_object(footprint.object_kind(), &name)?;
        self.write_footprint(&name, footprint)?;
        self.set_nm(&name, "z span", z_span)?;
        self.set(&name, "material", material)?;
        self.set_nm(&name, "x", x)?;
        self.set_nm(&name, "y", y)?;
        self.set_nm(&name, "z", z_span / 2.0)
    }

    fn write_footprint(&mut self, object: &str, footprint: Footprint) -> Result<()> {
        match footprint {
            Footprint::Rectangle { x_span, y_span } => {
                self.set_nm(object, "x span", x_span)?;
                self.set_nm(object, "y span", y_span)
            }
            Footprint::Circle { radius } => self.set_nm(object, "radius", radius),
        }
    }

    fn remove_structure_objects(&mut self, id: StructureId) -> Result<()> {
        let Some(placement) = self.structures.remove(&id) else {
            return Ok(());
        };
        for instance in 1..=placement.instances {
            self.engine.delete_object(&instance_name(id, instance))?;
        }
        self.engine.delete_object(&group_name(id))?;
        Ok(())
    }

    /// Remove a structure together with its unit cell and edge mesh.
    pub fn delete_structure(&mut self, id: StructureId) -> Result<()> {
        self.placement(id)?;
        self.layout()?;
        self.remove_structure_objects(id)?;
        self.clear_edge_mesh(id)?;
        self.unit_cells[id.index()] = UnitCell::default();
        info!("deleted structure {id}");
        Ok(())
    }

    /// Refine the mesh around a structure's edges.
    pub fn set_edge_mesh(&mut self, id: StructureId, size: f32, step: f32) -> Result<()> {
        self.placement(id)?;
        self.layout()?;
        let name = edge_mesh_name(id);
        if !self.engine.has_object(&name) {
            self.engine.add_object(ObjectKind::MeshOverride, &name)?;
        }
        self.set_nm(&name, "size", size)?;
        for axis in ["dx", "dy", "dz"] {
            self.set_nm(&name, axis, step)?;
        }
        self.edge_meshes[id.index()] = EdgeMesh {
            size: Some(size),
            step: Some(step),
        };
        Ok(())
    }

    /// Toggle a structure's edge mesh without forgetting its settings. A
    /// disabled edge mesh does not count towards the fingerprint.
    pub fn set_mesh_enabled_for_structure(&mut self, id: StructureId, enabled: bool) -> Result<()> {
        self.placement(id)?;
        let name = edge_mesh_name(id);
        if !self.engine.has_object(&name) {
            return Err(EngineError::MissingObject(name).into());
        }
        self.layout()?;
        self.set(&name, "enabled", enabled)
    }

    fn edge_mesh_active(&self, id: StructureId) -> Result<bool> {
        let name = edge_mesh_name(id);
        if !self.engine.has_object(&name) {
            return Ok(false);
        }
        match self.engine.get_flag(&name, "enabled") {
            Ok(enabled) => Ok(enabled),
            Err(EngineError::MissingParameter { .. }) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    pub fn clear_edge_mesh(&mut self, id: StructureId) -> Result<()> {
        let name = edge_mesh_name(id);
        if self.engine.has_object(&name) {
            self.layout()?;
            self.engine.delete_object(&name)?;
        }
        self.edge_meshes[id.index()] = EdgeMesh::default();
        Ok(())
    }

    /// Resize every instance of a structure. Unset axes keep their value; a
    /// circle takes its diameter from `x`.
    pub fn set_structure_spans(&mut self, id: StructureId, spans: Spans) -> Result<()> {
        let placement = self.placement(id)?;
        let merged = spans.or(self.structure_spans(id)?);
        let footprint = match placement.footprint {
            Footprint::Rectangle { x_span, y_span } => Footprint::Rectangle {
                x_span: merged.x.unwrap_or(x_span),
                y_span: merged.y.unwrap_or(y_span),
            },
            Footprint::Circle { radius } => Footprint::Circle {
                radius: merged.x.map_or(radius, |d| d / 2.0),
            },
        };

        let cell = self.unit_cells[id.index()];
        let (span_x, span_y) = footprint.lateral_spans();
        for (axis, period, span) in [('x', cell.x, span_x), ('y', cell.y, span_y)] {
            if let Some(period) = period
                && period <= span
            {
                return Err(SimulationError::StructureDimensions {
                    id,
                    axis,
                    unit_cell: period,
                    span,
                });
            }
        }

        self.layout()?;
        for instance in 1..=placement.instances {
            let name = instance_name(id, instance);
            self.write_footprint(&name, footprint)?;
            if let Some(z_span) = merged.z {
                self.set_nm(&name, "z span", z_span)?;
                self.set_nm(&name, "z", z_span / 2.0)?;
            }
        }
        self.structures.insert(
            id,
            Placement {
                footprint,
                instances: placement.instances,
            },
        );
        Ok(())
    }

    pub fn set_structure_material(&mut self, id: StructureId, material: &str) -> Result<()> {
        let placement = self.placement(id)?;
        self.layout()?;
        for instance in 1..=placement.instances {
            self.set(&instance_name(id, instance), "material", material)?;
        }
        Ok(())
    }

    /// Spans read back from the scene (nm).
    pub fn structure_spans(&self, id: StructureId) -> Result<Spans> {
        let placement = self.placement(id)?;
        let name = instance_name(id, 1);
        let (x, y) = match placement.footprint {
            Footprint::Rectangle { .. } => {
                (self.get_nm(&name, "x span")?, self.get_nm(&name, "y span")?)
            }
            Footprint::Circle { .. } => {
                let diameter = 2.0 * self.get_nm(&name, "radius")?;
                (diameter, diameter)
            }
        };
        Ok(Spans::new(x, y, self.get_nm(&name, "z span")?))
    }

    pub fn structure_material(&self, id: StructureId) -> Result<String> {
        self.placement(id)?;
        Ok(self.engine.get_text(&instance_name(id, 1), "material")?)
    }

    /// Centre of a single-instance structure (nm).
    pub fn structure_position(&self, id: StructureId) -> Result<(f32, f32, f32)> {
        self.unique_placement(id)?;
        let name = instance_name(id, 1);
        Ok((
            self.get_nm(&name, "x")?,
            self.get_nm(&name, "y")?,
            self.get_nm(&name, "z")?,
        ))
    }

    pub fn set_structure_position(&mut self, id: StructureId, x: f32, y: f32) -> Result<()> {
        self.unique_placement(id)?;
        self.layout()?;
        let name = instance_name(id, 1);
        self.set_nm(&name, "x", x)?;
        self.set_nm(&name, "y", y)
    }

    // --- Source and region ---

    fn apply_boundaries(&mut self, boundaries: Boundaries) -> Result<()> {
        for (property, bc) in Boundaries::PROPERTIES.iter().zip(boundaries.as_array()) {
            self.set(FDTD_REGION, property, bc.label())?;
        }
        Ok(())
    }

    fn boundaries(&self) -> Result<Boundaries> {
        let mut labels = Vec::with_capacity(6);
        for property in Boundaries::PROPERTIES {
            labels.push(self.engine.get_text(FDTD_REGION, property)?);
        }
        labels
            .join(",")
            .parse()
            .map_err(|_| {
                SimulationError::Engine(EngineError::TypeMismatch {
                    scope: FDTD_REGION.to_string(),
                    name: "boundary conditions".to_string(),
                    expected: "boundary condition label",
                })
            })
    }

    /// Set the source polarization (degrees, taken modulo 360) and pick the
    /// lateral boundaries it allows.
    pub fn set_polarization_angle(&mut self, angle: f32, allow_symmetry: bool) -> Result<()> {
        let angle = angle.rem_euclid(360.0);
        let incidence = self.get_degrees(SOURCE, "angle theta")?;
        self.layout()?;
        self.set(SOURCE, "angle phi", f64::from(angle))?;
        self.apply_boundaries(lateral_boundaries(angle, incidence, allow_symmetry))
    }

    /// Set the angle of incidence (degrees). Oblique incidence always leaves
    /// symmetry planes behind.
    pub fn set_incidence_angle(&mut self, angle: f32, allow_symmetry: bool) -> Result<()> {
        if !(-MAX_INCIDENCE_ANGLE..=MAX_INCIDENCE_ANGLE).contains(&angle) {
            return Err(SimulationError::IncidenceAngleOutOfRange(angle));
        }
        let polarization = self.get_degrees(SOURCE, "angle phi")?;
        self.layout()?;
        self.set(SOURCE, "angle theta", f64::from(angle))?;
        self.apply_boundaries(lateral_boundaries(polarization, angle, allow_symmetry))
    }

    /// Rotate the polarization by 90 degrees.
    pub fn flip_polarization(&mut self) -> Result<()> {
        let current = self.get_degrees(SOURCE, "angle phi")?;
        let symmetric = !matches!(self.boundaries()?.x_min, BoundaryCondition::Pml);
        self.set_polarization_angle(current + 90.0, symmetric)
    }

    pub fn set_mesh_steps(&mut self, steps: [f32; 3]) -> Result<()> {
        self.layout()?;
        for (axis, step) in ["dx", "dy", "dz"].into_iter().zip(steps) {
            self.set_nm(GLOBAL_MESH, axis, step)?;
        }
        self.mesh_steps = steps;
        Ok(())
    }

    /// Resize the FDTD region. Unset axes keep their value. The substrate and
    /// monitors follow the new lateral spans.
    pub fn set_fdtd_spans(&mut self, x: Option<f32>, y: Option<f32>, z: Option<f32>) -> Result<()> {
        self.layout()?;
        for (axis, span) in [("x span", x), ("y span", y), ("z span", z)] {
            if let Some(span) = span {
                self.set_nm(FDTD_REGION, axis, span)?;
            }
        }
        self.place_scene()
    }

    /// Set the wavelength sweep shared by source and monitors. The region's
    /// z span is reset to fit the longest wavelength.
    pub fn set_global_wavelength_range(&mut self, range: WavelengthRange) -> Result<()> {
        self.layout()?;
        self.set_nm(GLOBAL_SOURCE, "wavelength start", range.start)?;
        self.set_nm(GLOBAL_SOURCE, "wavelength stop", range.stop)?;
        self.set(GLOBAL_MONITOR, "frequency points", f64::from(range.points))?;
        let z_span = default_fdtd_z_span(range.stop, self.film_thickness);
        self.set_nm(FDTD_REGION, "z span", z_span)?;
        self.place_scene()
    }

    pub fn set_film_thickness(&mut self, thickness: f32) -> Result<()> {
        self.film_thickness = thickness;
        let stop = self.get_nm(GLOBAL_SOURCE, "wavelength stop")?;
        self.layout()?;
        self.set_nm(FDTD_REGION, "z span", default_fdtd_z_span(stop, thickness))?;
        self.place_scene()
    }

    pub fn set_near_field_distance(&mut self, distance: f32) -> Result<()> {
        self.near_field_distance = distance;
        self.layout()?;
        self.place_scene()
    }

    /// Position substrate, source and monitors from the region size, film
    /// thickness and near-field distance.
    fn place_scene(&mut self) -> Result<()> {
        let span_x = self.get_nm(FDTD_REGION, "x span")?;
        let span_y = self.get_nm(FDTD_REGION, "y span")?;
        let span_z = self.get_nm(FDTD_REGION, "z span")?;
        let stop = self.get_nm(GLOBAL_SOURCE, "wavelength stop")?;
        let film = self.film_thickness;
        let near = self.near_field_distance;

        let centre = film / 2.0;
        let top = centre + span_z / 2.0;
        let bottom = centre - span_z / 2.0;
        self.set_nm(FDTD_REGION, "z", centre)?;

        self.set_nm(SUBSTRATE, "x span", span_x)?;
        self.set_nm(SUBSTRATE, "y span", span_y)?;
        self.set_nm(SUBSTRATE, "z span", -bottom)?;
        self.set_nm(SUBSTRATE, "z", bottom / 2.0)?;

        self.set_nm(SOURCE, "z", top - stop / 2.0)?;

        let placements = [
            (MonitorKind::ReflectionPower, top - stop / 4.0),
            (MonitorKind::TransmissionPower, bottom + stop / 4.0),
            (MonitorKind::ReflectionProfile, film + near),
            (MonitorKind::TransmissionProfile, -near),
        ];
        for (kind, z) in placements {
            self.set_nm(kind.name(), "x span", span_x)?;
            self.set_nm(kind.name(), "y span", span_y)?;
            self.set_nm(kind.name(), "z", z)?;
        }

        let cut_height = film + 2.0 * near;
        self.set_nm(MonitorKind::XzProfile.name(), "x span", span_x)?;
        self.set_nm(MonitorKind::YzProfile.name(), "y span", span_y)?;
        for kind in [MonitorKind::XzProfile, MonitorKind::YzProfile] {
            self.set_nm(kind.name(), "z span", cut_height)?;
            self.set_nm(kind.name(), "z", centre)?;
        }
        Ok(())
    }

    // --- Monitors ---

    pub fn set_monitor_enabled(&mut self, kind: MonitorKind, enabled: bool) -> Result<()> {
        self.layout()?;
        self.set(kind.name(), "enabled", enabled)
    }

    /// Enable exactly the monitors in `monitors`.
    pub fn set_monitors(&mut self, monitors: MonitorSet) -> Result<()> {
        for kind in MonitorKind::ALL {
            self.set_monitor_enabled(kind, monitors.contains(kind))?;
        }
        Ok(())
    }

    /// Monitors present in the scene and enabled.
    pub fn active_monitors(&self) -> Result<MonitorSet> {
        let mut active = MonitorSet::empty();
        for kind in MonitorKind::ALL {
            if self.engine.has_object(kind.name())
                && self.engine.get_flag(kind.name(), "enabled")?
            {
                active.insert(kind);
            }
        }
        Ok(active)
    }

    // --- Identity ---

    /// Every fingerprinted input, read back from the scene where the scene
    /// owns it.
    pub fn parameters(&self) -> Result<SimulationParameters> {
        let mut structures: [StructureSlot; 3] = Default::default();
        for id in StructureId::ALL {
            let slot = &mut structures[id.index()];
            if self.structures.contains_key(&id) {
                slot.spans = self.structure_spans(id)?;
                slot.material = Some(self.structure_material(id)?);
            }
            slot.unit_cell = self.unit_cells[id.index()];
            if self.edge_mesh_active(id)? {
                slot.edge_mesh = self.edge_meshes[id.index()];
            }
        }

        let points = self.engine.get_number(GLOBAL_MONITOR, "frequency points")?;
        Ok(SimulationParameters {
            structures,
            polarization_angle: self.get_degrees(SOURCE, "angle phi")?,
            incidence_angle: self.get_degrees(SOURCE, "angle theta")?,
            fdtd_spans: [
                self.get_nm(FDTD_REGION, "x span")?,
                self.get_nm(FDTD_REGION, "y span")?,
                self.get_nm(FDTD_REGION, "z span")?,
            ],
            mesh_steps: self.mesh_steps,
            wavelength: WavelengthRange {
                start: self.get_nm(GLOBAL_SOURCE, "wavelength start")?,
                stop: self.get_nm(GLOBAL_SOURCE, "wavelength stop")?,
                points: points.round() as u32,
            },
            boundaries: self.boundaries()?,
        })
    }

    pub fn fingerprint(&self) -> Result<Fingerprint> {
        Ok(Fingerprint::of(&self.parameters()?))
    }

    /// Whether this simulation's current setup hashes to `fingerprint`.
    pub fn matches(&self, fingerprint: &str) -> Result<bool> {
        Ok(self.fingerprint()? == fingerprint)
    }

    // --- Running ---

    pub fn switch_to_layout(&mut self) -> Result<()> {
        self.layout()
    }

    pub fn execute(&mut self) -> Result<()> {
        if self.structures.is_empty() {
            return Err(SimulationError::NoActiveStructures);
        }
        Ok(self.engine.execute()?)
    }

    /// Read the finished run. `previous` supplies curves of monitors that
    /// were not part of it.
    pub fn collect_results(&self, previous: Option<&ResultSet>) -> Result<ResultSet> {
        assemble(
            &self.engine,
            self.active_monitors()?,
            self.near_field_distance,
            previous,
        )
    }

    /// Execute and collect in one go, without touching any cache.
    pub fn run(&mut self, previous: Option<&ResultSet>) -> Result<ResultSet> {
        self.execute()?;
        self.collect_results(previous)
    }

    pub fn save(&mut self, path: &Path) -> Result<()> {
        Ok(self.engine.save(path)?)
    }

    /// Save to the configured save path. Returns the path written, or `None`
    /// when no path is configured.
    pub fn save_default(&mut self) -> Result<Option<PathBuf>> {
        let Some(path) = self.save_path.clone() else {
            return Ok(None);
        };
        self.engine.save(&path)?;
        Ok(Some(path))
    }
}
