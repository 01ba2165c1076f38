//! One persisted simulation: its parameters, the monitors it covers and the
//! results those monitors produced.

use rusqlite::Row;
use rusqlite::types::Value;

use fdtd_core::{
    Boundaries, Comment, CrossSectionResult, EdgeMesh, Fingerprint, MonitorFamily, MonitorKind,
    MonitorSet, PowerResult, ProfileResult, Resonance, ResultSet, SimulationParameters, Spans,
    StructureId, StructureSlot, UnitCell, WavelengthRange,
};

use crate::codec;
use crate::error::{Result, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    /// Row id, assigned on insert.
    pub id: Option<i64>,
    pub name: String,
    pub fingerprint: Fingerprint,
    pub parameters: SimulationParameters,
    pub film_thickness: Option<f32>,
    /// Always equal to `results.populated()`.
    pub active_monitors: MonitorSet,
    pub comment: Comment,
    pub created_at: Option<String>,
    pub results: ResultSet,
}

impl ResultRecord {
    pub fn new(
        name: impl Into<String>,
        parameters: SimulationParameters,
        results: ResultSet,
        comment: Comment,
    ) -> Self {
        ResultRecord {
            id: None,
            name: name.into(),
            fingerprint: Fingerprint::of(&parameters),
            parameters,
            film_thickness: None,
            active_monitors: results.populated(),
            comment,
            created_at: None,
            results,
        }
    }

    /// Take over the results of `monitors` from a fresh run. Monitors already
    /// in the record keep their stored results.
    pub fn extend(&mut self, fresh: &ResultSet, monitors: MonitorSet) -> MonitorSet {
        let mut added = MonitorSet::empty();
        for kind in monitors.iter() {
            if self.active_monitors.contains(kind) || !fresh.contains(kind) {
                continue;
            }
            self.results.copy_monitor(fresh, kind);
            added.insert(kind);
        }
        self.active_monitors = self.results.populated();
        added
    }

    // --- Columns ---

    /// Every column except `id`, `simulation_hash` and `created_at`.
    pub(crate) fn mutable_columns(&self) -> Result<Vec<(&'static str, Value)>> {
        let mut columns = vec![
            ("simulation_name", Value::Text(self.name.clone())),
            ("active_monitors", Value::Text(self.active_monitors.to_string())),
            ("comment", Value::Text(self.comment.to_wire())),
            ("film_thickness", opt_real(self.film_thickness)),
            (
                "lambdas",
                blob(codec::encode_vector(self.results.lambdas.as_deref())?),
            ),
        ];
        columns.extend(parameter_columns(&self.parameters));
        for kind in MonitorKind::ALL {
            columns.extend(monitor_columns(&self.results, kind)?);
        }
        Ok(columns)
    }

    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self> {
        let hash: String = row.get("simulation_hash")?;
        let fingerprint = Fingerprint::from_hex(&hash)
            .ok_or_else(|| StoreError::InvalidData(format!("bad fingerprint {hash:?}")))?;
        let monitors: String = row.get("active_monitors")?;
        let active_monitors: MonitorSet = monitors
            .parse()
            .map_err(|e| StoreError::InvalidData(format!("{e}")))?;
        let comment: String = row.get("comment")?;

        let mut results = ResultSet::new();
        results.lambdas = codec::decode_vector(get_blob(row, "lambdas")?.as_deref())?;
        for kind in active_monitors.iter() {
            read_monitor(row, kind, &mut results)?;
        }

        Ok(ResultRecord {
            id: Some(row.get("id")?),
            name: row.get("simulation_name")?,
            fingerprint,
            parameters: read_parameters(row)?,
            film_thickness: get_real(row, "film_thickness")?,
            active_monitors,
            comment: Comment::from_wire(&comment),
            created_at: row.get("created_at")?,
            results,
        })
    }
}

fn real(v: f32) -> Value {
    Value::Real(f64::from(v))
}

fn opt_real(v: Option<f32>) -> Value {
    v.map_or(Value::Null, real)
}

fn opt_text(v: Option<&str>) -> Value {
    v.map_or(Value::Null, |s| Value::Text(s.to_string()))
}

fn blob(bytes: Option<Vec<u8>>) -> Value {
    bytes.map_or(Value::Null, Value::Blob)
}

fn get_real(row: &Row<'_>, column: &str) -> Result<Option<f32>> {
    Ok(row.get::<_, Option<f64>>(column)?.map(|v| v as f32))
}

fn require_real(row: &Row<'_>, column: &str) -> Result<f32> {
    get_real(row, column)?
        .ok_or_else(|| StoreError::InvalidData(format!("column {column} is null")))
}

fn get_blob(row: &Row<'_>, column: &str) -> Result<Option<Vec<u8>>> {
    Ok(row.get::<_, Option<Vec<u8>>>(column)?)
}

fn require_vector(row: &Row<'_>, column: &str) -> Result<Vec<f32>> {
    codec::decode_vector(get_blob(row, column)?.as_deref())?
        .ok_or_else(|| StoreError::InvalidData(format!("column {column} is null")))
}

fn require_snapshots(row: &Row<'_>, column: &str) -> Result<fdtd_core::NearFieldSnapshots> {
    codec::decode_snapshots(get_blob(row, column)?.as_deref())?
        .ok_or_else(|| StoreError::InvalidData(format!("column {column} is null")))
}

fn resonance_columns(
    names: (&'static str, &'static str),
    resonance: Option<&Resonance>,
) -> [(&'static str, Value); 2] {
    [
        (names.0, opt_real(resonance.map(|r| r.wavelength))),
        (names.1, opt_real(resonance.map(|r| r.value))),
    ]
}

fn read_resonance(row: &Row<'_>, names: (&str, &str)) -> Result<Option<Resonance>> {
    Ok(match (get_real(row, names.0)?, get_real(row, names.1)?) {
        (Some(wavelength), Some(value)) => Some(Resonance { wavelength, value }),
        _ => None,
    })
}

// --- Parameters ---

const STRUCTURE_COLUMNS: [[&str; 4]; 3] = [
    ["structure_1_x_span", "structure_1_y_span", "structure_1_z_span", "structure_1_material"],
    ["structure_2_x_span", "structure_2_y_span", "structure_2_z_span", "structure_2_material"],
    ["structure_3_x_span", "structure_3_y_span", "structure_3_z_span", "structure_3_material"],
];
const UNIT_CELL_COLUMNS: [[&str; 2]; 3] = [
    ["unit_cell_1_x", "unit_cell_1_y"],
    ["unit_cell_2_x", "unit_cell_2_y"],
    ["unit_cell_3_x", "unit_cell_3_y"],
];
const EDGE_MESH_COLUMNS: [[&str; 2]; 3] = [
    ["edge_mesh_1_size", "edge_mesh_1_step"],
    ["edge_mesh_2_size", "edge_mesh_2_step"],
    ["edge_mesh_3_size", "edge_mesh_3_step"],
];
const FDTD_SPAN_COLUMNS: [&str; 3] = ["fdtd_x_span", "fdtd_y_span", "fdtd_z_span"];
const MESH_COLUMNS: [&str; 3] = ["mesh_dx", "mesh_dy", "mesh_dz"];

fn parameter_columns(p: &SimulationParameters) -> Vec<(&'static str, Value)> {
    let mut columns = Vec::with_capacity(36);
    for (slot, names) in p.structures.iter().zip(STRUCTURE_COLUMNS) {
        columns.push((names[0], opt_real(slot.spans.x)));
        columns.push((names[1], opt_real(slot.spans.y)));
        columns.push((names[2], opt_real(slot.spans.z)));
        columns.push((names[3], opt_text(slot.material.as_deref())));
    }
    for (slot, names) in p.structures.iter().zip(UNIT_CELL_COLUMNS) {
        columns.push((names[0], opt_real(slot.unit_cell.x)));
        columns.push((names[1], opt_real(slot.unit_cell.y)));
    }
    for (slot, names) in p.structures.iter().zip(EDGE_MESH_COLUMNS) {
        columns.push((names[0], opt_real(slot.edge_mesh.size)));
        columns.push((names[1], opt_real(slot.edge_mesh.step)));
    }
    columns.push(("polarization_angle", real(p.polarization_angle)));
    columns.push(("incidence_angle", real(p.incidence_angle)));
    for (name, span) in FDTD_SPAN_COLUMNS.into_iter().zip(p.fdtd_spans) {
        columns.push((name, real(span)));
    }
    for (name, step) in MESH_COLUMNS.into_iter().zip(p.mesh_steps) {
        columns.push((name, real(step)));
    }
    columns.push(("wavelength_start", real(p.wavelength.start)));
    columns.push(("wavelength_stop", real(p.wavelength.stop)));
    columns.push((
        "frequency_points",
        Value::Integer(i64::from(p.wavelength.points)),
    ));
    columns.push(("boundary_conditions", Value::Text(p.boundaries.to_string())));
    columns
}

fn read_parameters(row: &Row<'_>) -> Result<SimulationParameters> {
    let mut structures: [StructureSlot; 3] = Default::default();
    for id in StructureId::ALL {
        let i = usize::from(id.get()) - 1;
        let [x, y, z, material] = STRUCTURE_COLUMNS[i];
        let [cell_x, cell_y] = UNIT_CELL_COLUMNS[i];
        let [size, step] = EDGE_MESH_COLUMNS[i];
        structures[i] = StructureSlot {
            spans: Spans {
                x: get_real(row, x)?,
                y: get_real(row, y)?,
                z: get_real(row, z)?,
            },
            material: row.get(material)?,
            unit_cell: UnitCell {
                x: get_real(row, cell_x)?,
                y: get_real(row, cell_y)?,
            },
            edge_mesh: EdgeMesh {
                size: get_real(row, size)?,
                step: get_real(row, step)?,
            },
        };
    }

    let mut fdtd_spans = [0.0; 3];
    for (span, name) in fdtd_spans.iter_mut().zip(FDTD_SPAN_COLUMNS) {
        *span = require_real(row, name)?;
    }
    let mut mesh_steps = [0.0; 3];
    for (step, name) in mesh_steps.iter_mut().zip(MESH_COLUMNS) {
        *step = require_real(row, name)?;
    }

    let points: i64 = row.get("frequency_points")?;
    let boundaries: String = row.get("boundary_conditions")?;
    Ok(SimulationParameters {
        structures,
        polarization_angle: require_real(row, "polarization_angle")?,
        incidence_angle: require_real(row, "incidence_angle")?,
        fdtd_spans,
        mesh_steps,
        wavelength: WavelengthRange {
            start: require_real(row, "wavelength_start")?,
            stop: require_real(row, "wavelength_stop")?,
            points: u32::try_from(points)
                .map_err(|_| StoreError::InvalidData(format!("bad point count {points}")))?,
        },
        boundaries: boundaries
            .parse::<Boundaries>()
            .map_err(StoreError::InvalidData)?,
    })
}

// --- Monitor results ---

/// Columns owned by `kind`, in `result_fields` order. An unpopulated monitor
/// writes NULL to all of them.
fn monitor_columns(results: &ResultSet, kind: MonitorKind) -> Result<Vec<(&'static str, Value)>> {
    let f = kind.result_fields();
    let mut columns = Vec::with_capacity(f.len());
    match kind.family() {
        MonitorFamily::Power => {
            let power = kind.side().and_then(|side| results.power(side));
            columns.push((
                f[0],
                blob(codec::encode_vector(power.map(|p| p.powers.as_slice()))?),
            ));
            columns.extend(resonance_columns(
                (f[1], f[2]),
                power.and_then(|p| p.resonance.as_ref()),
            ));
        }
        MonitorFamily::Profile => {
            let profile = kind.side().and_then(|side| results.profile(side));
            columns.push((
                f[0],
                blob(codec::encode_vector(profile.map(|p| p.x.as_slice()))?),
            ));
            columns.push((
                f[1],
                blob(codec::encode_vector(profile.map(|p| p.y.as_slice()))?),
            ));
            columns.push((f[2], opt_real(profile.map(|p| p.distance))));
            columns.push((
                f[3],
                blob(codec::encode_snapshots(profile.map(|p| &p.snapshots))?),
            ));
            columns.push((
                f[4],
                blob(codec::encode_vector(
                    profile.map(|p| p.max_magnitude.as_slice()),
                )?),
            ));
            columns.extend(resonance_columns(
                (f[5], f[6]),
                profile.and_then(|p| p.resonance.as_ref()),
            ));
        }
        MonitorFamily::CrossSection => {
            let cut = cross_section(results, kind);
            columns.push((
                f[0],
                blob(codec::encode_snapshots(cut.map(|c| &c.e_snapshots))?),
            ));
            columns.push((
                f[1],
                blob(codec::encode_snapshots(cut.map(|c| &c.p_snapshots))?),
            ));
            columns.push((
                f[2],
                blob(codec::encode_vector(cut.map(|c| c.lateral.as_slice()))?),
            ));
            columns.push((
                f[3],
                blob(codec::encode_vector(cut.map(|c| c.z.as_slice()))?),
            ));
        }
    }
    Ok(columns)
}

fn cross_section(results: &ResultSet, kind: MonitorKind) -> Option<&CrossSectionResult> {
    match kind {
        MonitorKind::XzProfile => results.xz_profile.as_ref(),
        MonitorKind::YzProfile => results.yz_profile.as_ref(),
        _ => None,
    }
}

fn read_monitor(row: &Row<'_>, kind: MonitorKind, results: &mut ResultSet) -> Result<()> {
    let f = kind.result_fields();
    match kind {
        MonitorKind::ReflectionPower | MonitorKind::TransmissionPower => {
            let power = PowerResult {
                powers: require_vector(row, f[0])?,
                resonance: read_resonance(row, (f[1], f[2]))?,
            };
            if kind == MonitorKind::ReflectionPower {
                results.reflection_power = Some(power);
            } else {
                results.transmission_power = Some(power);
            }
        }
        MonitorKind::ReflectionProfile | MonitorKind::TransmissionProfile => {
            let profile = ProfileResult {
                x: require_vector(row, f[0])?,
                y: require_vector(row, f[1])?,
                distance: require_real(row, f[2])?,
                snapshots: require_snapshots(row, f[3])?,
                max_magnitude: require_vector(row, f[4])?,
                resonance: read_resonance(row, (f[5], f[6]))?,
            };
            if kind == MonitorKind::ReflectionProfile {
                results.reflection_profile = Some(profile);
            } else {
                results.transmission_profile = Some(profile);
            }
        }
        MonitorKind::XzProfile | MonitorKind::YzProfile => {
            let cut = CrossSectionResult {
                e_snapshots: require_snapshots(row, f[0])?,
                p_snapshots: require_snapshots(row, f[1])?,
                lateral: require_vector(row, f[2])?,
                z: require_vector(row, f[3])?,
            };
            if kind == MonitorKind::XzProfile {
                results.xz_profile = Some(cut);
            } else {
                results.yz_profile = Some(cut);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn power(values: &[f32]) -> PowerResult {
        PowerResult {
            powers: values.to_vec(),
            resonance: Some(Resonance {
                wavelength: 700.0,
                value: values[0],
            }),
        }
    }

    #[test]
    fn test_new_tracks_populated_monitors() {
        let mut results = ResultSet::new();
        results.reflection_power = Some(power(&[0.5]));
        let record = ResultRecord::new(
            "run",
            SimulationParameters::default(),
            results,
            Comment::default(),
        );
        assert_eq!(
            record.active_monitors,
            MonitorSet::of(&[MonitorKind::ReflectionPower])
        );
        assert_eq!(record.fingerprint, Fingerprint::of(&SimulationParameters::default()));
    }

    #[test]
    fn test_extend_keeps_existing_results() {
        let mut results = ResultSet::new();
        results.reflection_power = Some(power(&[0.5]));
        let mut record = ResultRecord::new(
            "run",
            SimulationParameters::default(),
            results,
            Comment::default(),
        );

        let mut fresh = ResultSet::new();
        fresh.reflection_power = Some(power(&[0.9]));
        fresh.transmission_power = Some(power(&[-0.1]));
        let added = record.extend(&fresh, MonitorSet::all());

        assert_eq!(added, MonitorSet::of(&[MonitorKind::TransmissionPower]));
        assert_eq!(record.results.reflection_power, Some(power(&[0.5])));
        assert_eq!(record.results.transmission_power, Some(power(&[-0.1])));
        assert_eq!(record.active_monitors, record.results.populated());
    }

    #[test]
    fn test_unpopulated_monitor_writes_nulls() {
        let results = ResultSet::new();
        for kind in MonitorKind::ALL {
            let columns = monitor_columns(&results, kind).unwrap();
            assert_eq!(columns.len(), kind.result_fields().len());
            assert!(columns.iter().all(|(_, v)| *v == Value::Null), "{kind}");
        }
    }

    #[test]
    fn test_parameter_columns_cover_every_field() {
        let columns = parameter_columns(&SimulationParameters::default());
        assert_eq!(columns.len(), 36);
        for (name, _) in &columns {
            assert!(crate::schema::is_filter_column(name), "{name}");
        }
    }
}
