use crate::field::NearFieldSnapshots;
use crate::monitor::{MonitorKind, MonitorSet, Side};
use crate::resonance::Resonance;

/// Far-field power spectrum of one side of the film.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerResult {
    /// Stored sign convention: transmission is negated, reflection is raw.
    pub powers: Vec<f32>,
    pub resonance: Option<Resonance>,
}

impl PowerResult {
    /// The spectrum as the engine reported it, undoing the stored sign flip.
    pub fn raw_curve(&self, side: Side) -> Vec<f32> {
        match side {
            Side::Reflection => self.powers.clone(),
            Side::Transmission => self.powers.iter().map(|p| -p).collect(),
        }
    }
}

/// In-plane near-field profile recorded at `distance` nm from the film.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileResult {
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub distance: f32,
    /// Real field vectors at each candidate resonance wavelength.
    pub snapshots: NearFieldSnapshots,
    /// Maximum |E| over the plane, per wavelength.
    pub max_magnitude: Vec<f32>,
    pub resonance: Option<Resonance>,
}

/// Vertical cut through the unit cell. `lateral` is x for xz and y for yz.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossSectionResult {
    pub lateral: Vec<f32>,
    pub z: Vec<f32>,
    pub e_snapshots: NearFieldSnapshots,
    pub p_snapshots: NearFieldSnapshots,
}

/// Output of one monitor handler.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorResult {
    Power(PowerResult),
    Profile(ProfileResult),
    CrossSection(CrossSectionResult),
}

/// Everything a run produced. Each monitor's slot is `None` unless that
/// monitor was active, so `populated()` always names exactly the monitors
/// that ran.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Wavelength axis (nm) shared by every spectrum in the set.
    pub lambdas: Option<Vec<f32>>,
    pub reflection_power: Option<PowerResult>,
    pub transmission_power: Option<PowerResult>,
    pub reflection_profile: Option<ProfileResult>,
    pub transmission_profile: Option<ProfileResult>,
    pub xz_profile: Option<CrossSectionResult>,
    pub yz_profile: Option<CrossSectionResult>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn populated(&self) -> MonitorSet {
        MonitorKind::ALL
            .into_iter()
            .filter(|kind| self.contains(*kind))
            .collect()
    }

    pub fn contains(&self, kind: MonitorKind) -> bool {
        match kind {
            MonitorKind::ReflectionPower => self.reflection_power.is_some(),
            MonitorKind::TransmissionPower => self.transmission_power.is_some(),
            MonitorKind::ReflectionProfile => self.reflection_profile.is_some(),
            MonitorKind::TransmissionProfile => self.transmission_profile.is_some(),
            MonitorKind::XzProfile => self.xz_profile.is_some(),
            MonitorKind::YzProfile => self.yz_profile.is_some(),
        }
    }

    /// Store a handler's output in the slot for `kind`. Mismatched pairs are
    /// ignored; handlers are looked up by kind so they cannot occur.
    pub fn put(&mut self, kind: MonitorKind, result: MonitorResult) {
        match (kind, result) {
            (MonitorKind::ReflectionPower, MonitorResult::Power(r)) => {
                self.reflection_power = Some(r)
            }
            (MonitorKind::TransmissionPower, MonitorResult::Power(r)) => {
                self.transmission_power = Some(r)
            }
            (MonitorKind::ReflectionProfile, MonitorResult::Profile(r)) => {
                self.reflection_profile = Some(r)
            }
            (MonitorKind::TransmissionProfile, MonitorResult::Profile(r)) => {
                self.transmission_profile = Some(r)
            }
            (MonitorKind::XzProfile, MonitorResult::CrossSection(r)) => self.xz_profile = Some(r),
            (MonitorKind::YzProfile, MonitorResult::CrossSection(r)) => self.yz_profile = Some(r),
            (kind, _) => tracing::warn!("discarding result of mismatched type for {kind}"),
        }
    }

    /// Copy every field owned by `kind` from `other`, leaving the rest alone.
    pub fn copy_monitor(&mut self, other: &ResultSet, kind: MonitorKind) {
        match kind {
            MonitorKind::ReflectionPower => {
                self.reflection_power = other.reflection_power.clone()
            }
            MonitorKind::TransmissionPower => {
                self.transmission_power = other.transmission_power.clone()
            }
            MonitorKind::ReflectionProfile => {
                self.reflection_profile = other.reflection_profile.clone()
            }
            MonitorKind::TransmissionProfile => {
                self.transmission_profile = other.transmission_profile.clone()
            }
            MonitorKind::XzProfile => self.xz_profile = other.xz_profile.clone(),
            MonitorKind::YzProfile => self.yz_profile = other.yz_profile.clone(),
        }
        if self.lambdas.is_none() {
            self.lambdas = other.lambdas.clone();
        }
    }

    pub fn power(&self, side: Side) -> Option<&PowerResult> {
        match side {
            Side::Reflection => self.reflection_power.as_ref(),
            Side::Transmission => self.transmission_power.as_ref(),
        }
    }

    pub fn profile(&self, side: Side) -> Option<&ProfileResult> {
        match side {
            Side::Reflection => self.reflection_profile.as_ref(),
            Side::Transmission => self.transmission_profile.as_ref(),
        }
    }
}
