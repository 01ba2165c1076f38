//! Field arrays and the wavelength-indexed snapshots kept from them.
//!
//! Engine field datasets are complex arrays shaped `(nx, ny, nz, nλ, 3)`.
//! Everything derived from them here is real, `f32`, and has the wavelength
//! axis second to last: a plane is `(na, nb, nλ, 3)`, a snapshot `(na, nb, 3)`.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use ndarray::{ArrayD, Axis};
use num_complex::Complex64;

use crate::engine::EngineError;

/// Numeric map key (nm) that orders totally and prints as its shortest
/// round-tripping decimal, so `Label::from_str(&l.to_string()) == l`.
#[derive(Debug, Clone, Copy)]
pub struct Label(pub f32);

impl Label {
    pub fn value(self) -> f32 {
        self.0
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Label {}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Label {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Label {
    type Err = std::num::ParseFloatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<f32>().map(Label)
    }
}

/// Which plane of the 3-D monitor volume to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plane {
    /// First z sample, for in-plane profile monitors.
    Xy,
    /// First y sample.
    Xz,
    /// First x sample.
    Yz,
}

impl Plane {
    fn collapsed_axis(self) -> usize {
        match self {
            Plane::Yz => 0,
            Plane::Xz => 1,
            Plane::Xy => 2,
        }
    }
}

/// Real part of one plane of a `(nx, ny, nz, nλ, 3)` complex field, at
/// reduced precision.
pub fn real_plane(field: &ArrayD<Complex64>, plane: Plane) -> Result<ArrayD<f32>, EngineError> {
    if field.ndim() != 5 {
        return Err(EngineError::Shape(format!(
            "expected a 5-D field array, got shape {:?}",
            field.shape()
        )));
    }
    let slice = field.index_axis(Axis(plane.collapsed_axis()), 0);
    Ok(slice.mapv(|c| c.re as f32))
}

/// Maximum vector magnitude over the plane at each wavelength.
///
/// `plane` is `(na, nb, nλ, 3)`; the result has length nλ.
pub fn max_magnitude_per_wavelength(plane: &ArrayD<f32>) -> Result<Vec<f32>, EngineError> {
    if plane.ndim() != 4 {
        return Err(EngineError::Shape(format!(
            "expected a 4-D plane, got shape {:?}",
            plane.shape()
        )));
    }
    let norms = plane.map_axis(Axis(3), |v| v.iter().map(|c| c * c).sum::<f32>().sqrt());
    let peak = norms
        .fold_axis(Axis(0), f32::NEG_INFINITY, |acc, v| f32::max(*acc, *v))
        .fold_axis(Axis(0), f32::NEG_INFINITY, |acc, v| f32::max(*acc, *v));
    Ok(peak.iter().copied().collect())
}

/// Index of the sample closest to `target`. `None` for an empty axis.
pub fn nearest_index(axis: &[f32], target: f32) -> Option<usize> {
    axis.iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (*a - target).abs().total_cmp(&(*b - target).abs()))
        .map(|(i, _)| i)
}

/// The `(na, nb, 3)` slice of `plane` at the wavelength nearest `target`.
pub fn snapshot_at(
    plane: &ArrayD<f32>,
    wavelengths: &[f32],
    target: f32,
) -> Result<ArrayD<f32>, EngineError> {
    let axis = plane.ndim().checked_sub(2).ok_or_else(|| {
        EngineError::Shape(format!("plane of shape {:?} has no wavelength axis", plane.shape()))
    })?;
    if plane.len_of(Axis(axis)) != wavelengths.len() {
        return Err(EngineError::Shape(format!(
            "wavelength axis has {} samples but {} wavelengths were given",
            plane.len_of(Axis(axis)),
            wavelengths.len()
        )));
    }
    let index = nearest_index(wavelengths, target)
        .ok_or_else(|| EngineError::Shape("empty wavelength axis".to_string()))?;
    Ok(plane.index_axis(Axis(axis), index).to_owned())
}

/// Field snapshots keyed by (near-field distance, wavelength), both in nm.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NearFieldSnapshots {
    entries: BTreeMap<(Label, Label), ArrayD<f32>>,
}

impl NearFieldSnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the snapshot of `plane` nearest each candidate wavelength.
    pub fn sample(
        plane: &ArrayD<f32>,
        wavelengths: &[f32],
        distance: f32,
        candidates: &[f32],
    ) -> Result<Self, EngineError> {
        let mut snapshots = NearFieldSnapshots::new();
        for &candidate in candidates {
            let field = snapshot_at(plane, wavelengths, candidate)?;
            snapshots.insert(distance, candidate, field);
        }
        Ok(snapshots)
    }

    pub fn insert(&mut self, distance: f32, wavelength: f32, field: ArrayD<f32>) {
        self.entries.insert((Label(distance), Label(wavelength)), field);
    }

    pub fn get(&self, distance: f32, wavelength: f32) -> Option<&ArrayD<f32>> {
        self.entries.get(&(Label(distance), Label(wavelength)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f32, f32, &ArrayD<f32>)> {
        self.entries
            .iter()
            .map(|((d, w), field)| (d.value(), w.value(), field))
    }

    /// Wavelengths stored at `distance`, ascending.
    pub fn wavelengths_at(&self, distance: f32) -> Vec<f32> {
        self.entries
            .keys()
            .filter(|(d, _)| *d == Label(distance))
            .map(|(_, w)| w.value())
            .collect()
    }
}
