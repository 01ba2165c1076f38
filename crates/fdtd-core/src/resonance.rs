//! Peak picking over spectra.
//!
//! Reflection-like curves resonate at local maxima, transmission curves at
//! local minima. Both are handled by negating transmission before searching,
//! so "importance" is always the height of the filtered curve.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResonanceKind {
    Reflection,
    Transmission,
}

impl ResonanceKind {
    fn filter(self, value: f32) -> f32 {
        match self {
            ResonanceKind::Reflection => value,
            ResonanceKind::Transmission => -value,
        }
    }
}

impl FromStr for ResonanceKind {
    type Err = ResonanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reflection" => Ok(ResonanceKind::Reflection),
            "transmission" => Ok(ResonanceKind::Transmission),
            other => Err(ResonanceError::InvalidKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResonanceError {
    InvalidKind(String),
    LengthMismatch { wavelengths: usize, values: usize },
}

impl fmt::Display for ResonanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResonanceError::InvalidKind(kind) => write!(
                f,
                "invalid resonance kind {kind:?}, expected \"reflection\" or \"transmission\""
            ),
            ResonanceError::LengthMismatch {
                wavelengths,
                values,
            } => write!(
                f,
                "spectrum has {wavelengths} wavelengths but {values} values"
            ),
        }
    }
}

impl std::error::Error for ResonanceError {}

/// A resonance at `wavelength` (nm).
///
/// `value` is the filtered response: raw for reflection, negated for
/// transmission, so a transmission dip to 0.2 reports `-0.2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resonance {
    pub wavelength: f32,
    pub value: f32,
}

/// The single most important resonance, or `None` when the curve has no peak.
pub fn dominant(
    wavelengths: &[f32],
    values: &[f32],
    kind: ResonanceKind,
) -> Result<Option<Resonance>, ResonanceError> {
    Ok(ranked(wavelengths, values, kind)?.into_iter().next())
}

/// Up to `n` resonances, most important first. Fewer than `n` peaks is not an error.
pub fn top_n(
    wavelengths: &[f32],
    values: &[f32],
    kind: ResonanceKind,
    n: usize,
) -> Result<Vec<Resonance>, ResonanceError> {
    let mut peaks = ranked(wavelengths, values, kind)?;
    peaks.truncate(n);
    Ok(peaks)
}

/// Wavelengths of [`top_n`], for callers that only need snapshot candidates.
pub fn top_n_wavelengths(
    wavelengths: &[f32],
    values: &[f32],
    kind: ResonanceKind,
    n: usize,
) -> Result<Vec<f32>, ResonanceError> {
    Ok(top_n(wavelengths, values, kind, n)?
        .into_iter()
        .map(|r| r.wavelength)
        .collect())
}

fn ranked(
    wavelengths: &[f32],
    values: &[f32],
    kind: ResonanceKind,
) -> Result<Vec<Resonance>, ResonanceError> {
    if wavelengths.len() != values.len() {
        return Err(ResonanceError::LengthMismatch {
            wavelengths: wavelengths.len(),
            values: values.len(),
        });
    }

    let filtered: Vec<f32> = values.iter().map(|v| kind.filter(*v)).collect();
    let mut peaks: Vec<Resonance> = local_maxima(&filtered)
        .into_iter()
        .map(|i| Resonance {
            wavelength: wavelengths[i],
            value: filtered[i],
        })
        .collect();

    // Stable sort keeps the shorter wavelength first on ties.
    peaks.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(Ordering::Equal));
    Ok(peaks)
}

/// Indices of samples strictly greater than both neighbours. Endpoints and
/// plateaus never qualify.
fn local_maxima(signal: &[f32]) -> Vec<usize> {
    signal
        .windows(3)
        .enumerate()
        .filter(|(_, w)| w[1] > w[0] && w[1] > w[2])
        .map(|(i, _)| i + 1)
        .collect()
}

/// Sorted union of candidate wavelengths with exact duplicates removed.
pub fn merge_candidates<I>(groups: I) -> Vec<f32>
where
    I: IntoIterator<Item = Vec<f32>>,
{
    let mut merged: Vec<f32> = groups.into_iter().flatten().collect();
    merged.sort_by(f32::total_cmp);
    merged.dedup();
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn axis(n: usize) -> Vec<f32> {
        (0..n).map(|i| 400.0 + 10.0 * i as f32).collect()
    }

    /// Five bumps of distinct height at indices 2, 6, 10, 14, 18.
    fn five_peaks() -> Vec<f32> {
        let heights = [0.3, 0.9, 0.5, 0.7, 0.1];
        let mut v = vec![0.0; 21];
        for (k, h) in heights.iter().enumerate() {
            v[2 + 4 * k] = *h;
        }
        v
    }

    #[test]
    fn test_flat_signal_has_no_resonance() {
        let wl = axis(10);
        let flat = vec![0.5; 10];
        assert_eq!(dominant(&wl, &flat, ResonanceKind::Reflection).unwrap(), None);
        assert!(top_n(&wl, &flat, ResonanceKind::Transmission, 3)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_single_peak() {
        let wl = axis(5);
        let r = dominant(&wl, &[0.1, 0.2, 0.8, 0.2, 0.1], ResonanceKind::Reflection)
            .unwrap()
            .unwrap();
        assert_relative_eq!(r.wavelength, 420.0);
        assert_relative_eq!(r.value, 0.8);
    }

    #[test]
    fn test_endpoints_are_not_peaks() {
        let wl = axis(4);
        assert_eq!(
            dominant(&wl, &[1.0, 0.5, 0.4, 0.9], ResonanceKind::Reflection).unwrap(),
            None
        );
    }

    #[test]
    fn test_reflection_top_three_descending() {
        let wl = axis(21);
        let peaks = top_n(&wl, &five_peaks(), ResonanceKind::Reflection, 3).unwrap();
        let heights: Vec<f32> = peaks.iter().map(|r| r.value).collect();
        assert_eq!(heights, vec![0.9, 0.7, 0.5]);
        assert_relative_eq!(peaks[0].wavelength, 460.0);
    }

    #[test]
    fn test_transmission_deepest_dips_first() {
        let wl = axis(21);
        let transmission: Vec<f32> = five_peaks().iter().map(|v| 1.0 - v).collect();
        let dips = top_n(&wl, &transmission, ResonanceKind::Transmission, 3).unwrap();
        let raw: Vec<f32> = dips.iter().map(|r| -r.value).collect();
        assert_relative_eq!(raw[0], 0.1, epsilon = 1e-6);
        assert_relative_eq!(raw[1], 0.3, epsilon = 1e-6);
        assert_relative_eq!(raw[2], 0.5, epsilon = 1e-6);
        assert!(dips.iter().all(|r| r.value < 0.0));
    }

    #[test]
    fn test_top_n_larger_than_available() {
        let wl = axis(21);
        let peaks = top_n(&wl, &five_peaks(), ResonanceKind::Reflection, 50).unwrap();
        assert_eq!(peaks.len(), 5);
    }

    #[test]
    fn test_transmission_dominant_is_minimum() {
        let wl = axis(7);
        let t = [0.9, 0.6, 0.8, 0.9, 0.2, 0.7, 0.9];
        let r = dominant(&wl, &t, ResonanceKind::Transmission).unwrap().unwrap();
        assert_relative_eq!(r.wavelength, 440.0);
        assert_relative_eq!(r.value, -0.2);
    }

    #[test]
    fn test_invalid_kind() {
        let err = "absorption".parse::<ResonanceKind>().unwrap_err();
        assert_eq!(err, ResonanceError::InvalidKind("absorption".into()));
        assert!(err.to_string().contains("absorption"));
    }

    #[test]
    fn test_length_mismatch() {
        let err = dominant(&[1.0, 2.0], &[1.0], ResonanceKind::Reflection).unwrap_err();
        assert_eq!(
            err,
            ResonanceError::LengthMismatch {
                wavelengths: 2,
                values: 1
            }
        );
    }

    #[test]
    fn test_merge_candidates() {
        let merged = merge_candidates([vec![700.0, 500.0], vec![500.0, 600.0], vec![]]);
        assert_eq!(merged, vec![500.0, 600.0, 700.0]);
    }
}
