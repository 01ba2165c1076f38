//! Conversions at the engine boundary. The engine works in meters, every
//! public value in this workspace is in nanometres at reduced precision.

use crate::constants::NM_PER_M;

pub fn m_to_nm(meters: f64) -> f32 {
    (meters * NM_PER_M) as f32
}

pub fn nm_to_m(nanometres: f32) -> f64 {
    f64::from(nanometres) / NM_PER_M
}

/// Convert a slice of engine lengths (meters) to nm.
pub fn slice_to_nm(meters: impl IntoIterator<Item = f64>) -> Vec<f32> {
    meters.into_iter().map(m_to_nm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_roundtrip_lengths() {
        assert_relative_eq!(m_to_nm(500e-9), 500.0, epsilon = 1e-4);
        assert_relative_eq!(nm_to_m(350.0), 350e-9, epsilon = 1e-15);
        assert_relative_eq!(m_to_nm(nm_to_m(1234.5)), 1234.5, epsilon = 1e-3);
    }

    #[test]
    fn test_slice_conversion() {
        let nm = slice_to_nm([400e-9, 1500e-9]);
        assert_eq!(nm.len(), 2);
        assert_relative_eq!(nm[1], 1500.0, epsilon = 1e-3);
    }
}
