//! Turns a finished engine run into a [`ResultSet`].
//!
//! Each monitor family has one handler. Handlers run powers first, then
//! in-plane profiles, then cross-sections, because later families pick their
//! snapshot wavelengths from curves the earlier ones produce. When a curve's
//! monitor is not part of this run, the previous result set supplies it.

use tracing::debug;

use crate::constants::TOP_RESONANCES;
use crate::engine::{EngineSession, MonitorDataset};
use crate::error::Result;
use crate::field::{NearFieldSnapshots, Plane, max_magnitude_per_wavelength, real_plane};
use crate::monitor::{MonitorFamily, MonitorKind, MonitorSet, Side};
use crate::resonance::{self, ResonanceKind};
use crate::results::{CrossSectionResult, MonitorResult, PowerResult, ProfileResult, ResultSet};
use crate::units::{m_to_nm, slice_to_nm};

const FAMILY_ORDER: [MonitorFamily; 3] = [
    MonitorFamily::Power,
    MonitorFamily::Profile,
    MonitorFamily::CrossSection,
];

type Handler<E> = fn(&mut Assembly<'_, E>, MonitorKind) -> Result<MonitorResult>;

fn handler<E: EngineSession>(family: MonitorFamily) -> Handler<E> {
    match family {
        MonitorFamily::Power => assemble_power,
        MonitorFamily::Profile => assemble_profile,
        MonitorFamily::CrossSection => assemble_cross_section,
    }
}

/// Far-field spectra rank reflection peaks and transmission dips.
pub fn far_field_kind(side: Side) -> ResonanceKind {
    match side {
        Side::Reflection => ResonanceKind::Reflection,
        Side::Transmission => ResonanceKind::Transmission,
    }
}

struct Assembly<'a, E> {
    engine: &'a E,
    lambdas: Vec<f32>,
    near_field_distance: f32,
    previous: Option<&'a ResultSet>,
    results: ResultSet,
}

/// Read every active monitor from a finished run.
///
/// `previous` is the cached result set being extended, if any.
pub fn assemble<E: EngineSession>(
    engine: &E,
    active: MonitorSet,
    near_field_distance: f32,
    previous: Option<&ResultSet>,
) -> Result<ResultSet> {
    let Some(first) = active.iter().next() else {
        return Ok(ResultSet::new());
    };

    let dataset = fetch(engine, first, first.datasets()[0])?;
    let lambdas: Vec<f32> = dataset
        .real_vec(first.name(), "lambda")?
        .into_iter()
        .map(m_to_nm)
        .collect();

    let mut assembly = Assembly {
        engine,
        lambdas,
        near_field_distance,
        previous,
        results: ResultSet::new(),
    };

    for family in FAMILY_ORDER {
        for kind in active.iter().filter(|k| k.family() == family) {
            let result = handler::<E>(family)(&mut assembly, kind)?;
            assembly.results.put(kind, result);
            debug!("assembled {kind}");
        }
    }

    assembly.results.lambdas = Some(assembly.lambdas);
    Ok(assembly.results)
}

fn fetch<E: EngineSession>(
    engine: &E,
    kind: MonitorKind,
    dataset: &str,
) -> Result<MonitorDataset> {
    Ok(engine.get_result(kind.name(), dataset)?)
}

impl<E: EngineSession> Assembly<'_, E> {
    /// Raw power spectrum for `side`, from this run or the previous one.
    fn power_curve(&self, side: Side) -> Option<Vec<f32>> {
        self.results
            .power(side)
            .or_else(|| self.previous.and_then(|p| p.power(side)))
            .map(|p| p.raw_curve(side))
    }

    /// Near-field magnitude curve for `side` at this run's distance.
    fn magnitude_curve(&self, side: Side) -> Option<&[f32]> {
        let profile = self
            .results
            .profile(side)
            .or_else(|| self.previous.and_then(|p| p.profile(side)))?;
        if profile.distance != self.near_field_distance {
            debug!(
                "ignoring {side:?} profile recorded at {} nm, run uses {} nm",
                profile.distance, self.near_field_distance
            );
            return None;
        }
        Some(&profile.max_magnitude)
    }

    fn far_field_peaks(&self, side: Side) -> Result<Vec<f32>> {
        match self.power_curve(side) {
            Some(curve) => Ok(resonance::top_n_wavelengths(
                &self.lambdas,
                &curve,
                far_field_kind(side),
                TOP_RESONANCES,
            )?),
            None => {
                debug!("no {side:?} power curve available for snapshot selection");
                Ok(Vec::new())
            }
        }
    }

    fn near_field_peaks(&self, side: Side) -> Result<Vec<f32>> {
        match self.magnitude_curve(side) {
            Some(curve) => Ok(resonance::top_n_wavelengths(
                &self.lambdas,
                curve,
                ResonanceKind::Reflection,
                TOP_RESONANCES,
            )?),
            None => Ok(Vec::new()),
        }
    }
}

fn side_of(kind: MonitorKind) -> Side {
    kind.side().unwrap_or(Side::Reflection)
}

fn assemble_power<E: EngineSession>(
    ctx: &mut Assembly<'_, E>,
    kind: MonitorKind,
) -> Result<MonitorResult> {
    let side = side_of(kind);
    let ds = fetch(ctx.engine, kind, "T")?;
    let curve: Vec<f32> = ds
        .real_vec(kind.name(), "T")?
        .into_iter()
        .map(|v| v as f32)
        .collect();

    let resonance = resonance::dominant(&ctx.lambdas, &curve, far_field_kind(side))?;
    let powers = match side {
        Side::Reflection => curve,
        Side::Transmission => curve.into_iter().map(|p| -p).collect(),
    };
    Ok(MonitorResult::Power(PowerResult { powers, resonance }))
}

fn assemble_profile<E: EngineSession>(
    ctx: &mut Assembly<'_, E>,
    kind: MonitorKind,
) -> Result<MonitorResult> {
    let side = side_of(kind);
    let name = kind.name();
    let ds = fetch(ctx.engine, kind, "E")?;
    let plane = real_plane(ds.complex(name, "E")?, Plane::Xy)?;

    let max_magnitude = max_magnitude_per_wavelength(&plane)?;
    // Field enhancement is a maximum on both sides of the film.
    let near = resonance::top_n(
        &ctx.lambdas,
        &max_magnitude,
        ResonanceKind::Reflection,
        TOP_RESONANCES,
    )?;
    let resonance = near.first().copied();

    let candidates = resonance::merge_candidates([
        near.iter().map(|r| r.wavelength).collect(),
        ctx.far_field_peaks(side)?,
    ]);
    let snapshots =
        NearFieldSnapshots::sample(&plane, &ctx.lambdas, ctx.near_field_distance, &candidates)?;

    Ok(MonitorResult::Profile(ProfileResult {
        x: slice_to_nm(ds.real_vec(name, "x")?),
        y: slice_to_nm(ds.real_vec(name, "y")?),
        distance: ctx.near_field_distance,
        snapshots,
        max_magnitude,
        resonance,
    }))
}

fn assemble_cross_section<E: EngineSession>(
    ctx: &mut Assembly<'_, E>,
    kind: MonitorKind,
) -> Result<MonitorResult> {
    let name = kind.name();
    let (plane, lateral_axis) = if kind == MonitorKind::XzProfile {
        (Plane::Xz, "x")
    } else {
        (Plane::Yz, "y")
    };

    let e_ds = fetch(ctx.engine, kind, "E")?;
    let p_ds = fetch(ctx.engine, kind, "P")?;
    let e_plane = real_plane(e_ds.complex(name, "E")?, plane)?;
    let p_plane = real_plane(p_ds.complex(name, "P")?, plane)?;

    let candidates = resonance::merge_candidates([
        ctx.near_field_peaks(Side::Transmission)?,
        ctx.near_field_peaks(Side::Reflection)?,
        ctx.far_field_peaks(Side::Reflection)?,
        ctx.far_field_peaks(Side::Transmission)?,
    ]);
    let distance = ctx.near_field_distance;

    Ok(MonitorResult::CrossSection(CrossSectionResult {
        lateral: slice_to_nm(e_ds.real_vec(name, lateral_axis)?),
        z: slice_to_nm(e_ds.real_vec(name, "z")?),
        e_snapshots: NearFieldSnapshots::sample(&e_plane, &ctx.lambdas, distance, &candidates)?,
        p_snapshots: NearFieldSnapshots::sample(&p_plane, &ctx.lambdas, distance, &candidates)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{GLOBAL_MONITOR, ObjectKind, ParamValue};
    use crate::testing::RecordingEngine;
    use approx::assert_relative_eq;

    const POINTS: f64 = 201.0;

    fn run(kinds: &[MonitorKind]) -> RecordingEngine {
        let mut engine = RecordingEngine::new();
        engine
            .set_named(GLOBAL_MONITOR, "frequency points", ParamValue::Number(POINTS))
            .unwrap();
        for kind in MonitorKind::ALL {
            engine.add_object(ObjectKind::ProfileMonitor, kind.name()).unwrap();
            engine
                .set_named(kind.name(), "enabled", kinds.contains(&kind).into())
                .unwrap();
        }
        engine.execute().unwrap();
        engine
    }

    #[test]
    fn test_empty_active_set() {
        let engine = run(&[]);
        let results = assemble(&engine, MonitorSet::empty(), 10.0, None).unwrap();
        assert_eq!(results, ResultSet::new());
    }

    #[test]
    fn test_power_monitors() {
        let kinds = [MonitorKind::ReflectionPower, MonitorKind::TransmissionPower];
        let engine = run(&kinds);
        let results = assemble(&engine, MonitorSet::of(&kinds), 10.0, None).unwrap();

        let lambdas = results.lambdas.as_ref().unwrap();
        assert_eq!(lambdas.len(), POINTS as usize);
        assert_relative_eq!(lambdas[0], 400.0, epsilon = 1e-3);

        // strongest reflection resonance sits 30% into the sweep
        let r = results.reflection_power.as_ref().unwrap();
        let res = r.resonance.unwrap();
        assert_relative_eq!(res.wavelength, 730.0, epsilon = 1.0);

        // stored transmission is negated, its resonance is the deepest dip
        let t = results.transmission_power.as_ref().unwrap();
        assert!(t.powers.iter().all(|p| *p < 0.0));
        assert_relative_eq!(t.resonance.unwrap().wavelength, 730.0, epsilon = 1.0);
        assert_eq!(results.populated(), MonitorSet::of(&kinds));
    }

    #[test]
    fn test_profile_snapshots_use_power_and_field_peaks() {
        let kinds = [MonitorKind::ReflectionPower, MonitorKind::ReflectionProfile];
        let engine = run(&kinds);
        let results = assemble(&engine, MonitorSet::of(&kinds), 10.0, None).unwrap();

        let profile = results.reflection_profile.as_ref().unwrap();
        assert_eq!(profile.x.len(), 4);
        assert_eq!(profile.max_magnitude.len(), POINTS as usize);
        // near field peaks at 50% and 80%, far field at 30% and 70%
        let stored = profile.snapshots.wavelengths_at(10.0);
        assert_eq!(stored.len(), 4);
        assert_relative_eq!(profile.resonance.unwrap().wavelength, 950.0, epsilon = 1.0);
        for (_, _, field) in profile.snapshots.iter() {
            assert_eq!(field.shape(), &[4, 4, 3]);
        }
    }

    #[test]
    fn test_profile_reuses_previous_power_curve() {
        let power_only = [MonitorKind::ReflectionPower];
        let engine = run(&power_only);
        let previous = assemble(&engine, MonitorSet::of(&power_only), 10.0, None).unwrap();

        let profile_only = [MonitorKind::ReflectionProfile];
        let engine = run(&profile_only);
        let without =
            assemble(&engine, MonitorSet::of(&profile_only), 10.0, None).unwrap();
        let with = assemble(&engine, MonitorSet::of(&profile_only), 10.0, Some(&previous))
            .unwrap();

        let count = |r: &ResultSet| r.reflection_profile.as_ref().unwrap().snapshots.len();
        assert_eq!(count(&without), 2);
        assert_eq!(count(&with), 4);
        assert!(with.reflection_power.is_none());
    }

    #[test]
    fn test_cross_sections() {
        let kinds = [
            MonitorKind::ReflectionPower,
            MonitorKind::TransmissionPower,
            MonitorKind::ReflectionProfile,
            MonitorKind::TransmissionProfile,
            MonitorKind::XzProfile,
            MonitorKind::YzProfile,
        ];
        let engine = run(&kinds);
        let results = assemble(&engine, MonitorSet::all(), 10.0, None).unwrap();

        let xz = results.xz_profile.as_ref().unwrap();
        assert_eq!(xz.lateral.len(), 4);
        assert_eq!(xz.z.len(), 5);
        assert_eq!(xz.e_snapshots.len(), xz.p_snapshots.len());
        assert!(!xz.e_snapshots.is_empty());
        let (_, _, field) = xz.e_snapshots.iter().next().unwrap();
        assert_eq!(field.shape(), &[4, 5, 3]);

        let yz = results.yz_profile.as_ref().unwrap();
        assert_eq!(yz.lateral.len(), 4);
        assert_eq!(results.populated(), MonitorSet::all());
    }

    #[test]
    fn test_missing_result_is_an_error() {
        let engine = run(&[MonitorKind::ReflectionPower]);
        let active = MonitorSet::of(&[MonitorKind::ReflectionPower, MonitorKind::XzProfile]);
        assert!(assemble(&engine, active, 10.0, None).is_err());
    }
}
