use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which broad measurement a monitor performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorFamily {
    /// Far-field power spectrum.
    Power,
    /// In-plane (xy) near-field profile above or below the film.
    Profile,
    /// Vertical cross-section through the unit cell.
    CrossSection,
}

/// Side of the film a power or profile monitor sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Reflection,
    Transmission,
}

/// The closed universe of monitors a simulation can record.
///
/// Declaration order is the canonical order used when serialising monitor
/// sets, so it must not change once records exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MonitorKind {
    ReflectionPower,
    ReflectionProfile,
    TransmissionPower,
    TransmissionProfile,
    XzProfile,
    YzProfile,
}

impl MonitorKind {
    pub const ALL: [MonitorKind; 6] = [
        MonitorKind::ReflectionPower,
        MonitorKind::ReflectionProfile,
        MonitorKind::TransmissionPower,
        MonitorKind::TransmissionProfile,
        MonitorKind::XzProfile,
        MonitorKind::YzProfile,
    ];

    /// Scene object name, also the token persisted in `active_monitors`.
    pub fn name(self) -> &'static str {
        match self {
            MonitorKind::ReflectionPower => "ref_power_monitor",
            MonitorKind::ReflectionProfile => "ref_profile_monitor",
            MonitorKind::TransmissionPower => "trans_power_monitor",
            MonitorKind::TransmissionProfile => "trans_profile_monitor",
            MonitorKind::XzProfile => "xz_profile_monitor",
            MonitorKind::YzProfile => "yz_profile_monitor",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn family(self) -> MonitorFamily {
        match self {
            MonitorKind::ReflectionPower | MonitorKind::TransmissionPower => MonitorFamily::Power,
            MonitorKind::ReflectionProfile | MonitorKind::TransmissionProfile => {
                MonitorFamily::Profile
            }
            MonitorKind::XzProfile | MonitorKind::YzProfile => MonitorFamily::CrossSection,
        }
    }

    /// `None` for cross-sections, which span both sides.
    pub fn side(self) -> Option<Side> {
        match self {
            MonitorKind::ReflectionPower | MonitorKind::ReflectionProfile => Some(Side::Reflection),
            MonitorKind::TransmissionPower | MonitorKind::TransmissionProfile => {
                Some(Side::Transmission)
            }
            MonitorKind::XzProfile | MonitorKind::YzProfile => None,
        }
    }

    /// Dataset names this monitor is read through.
    pub fn datasets(self) -> &'static [&'static str] {
        match self.family() {
            MonitorFamily::Power => &["T"],
            MonitorFamily::Profile => &["E"],
            MonitorFamily::CrossSection => &["E", "P"],
        }
    }

    /// Persisted columns this monitor owns. Copied as a unit when a cached
    /// record is extended.
    pub fn result_fields(self) -> &'static [&'static str] {
        match self {
            MonitorKind::ReflectionPower => {
                &["ref_powers", "ref_power_res_lambda", "ref_power_res"]
            }
            MonitorKind::TransmissionPower => {
                &["trans_powers", "trans_power_res_lambda", "trans_power_res"]
            }
            MonitorKind::ReflectionProfile => &[
                "ref_profile_x",
                "ref_profile_y",
                "ref_profile_distance",
                "ref_profile_vectors",
                "ref_mag_max_pr_lambda",
                "ref_mag_res_lambda",
                "ref_mag_res",
            ],
            MonitorKind::TransmissionProfile => &[
                "trans_profile_x",
                "trans_profile_y",
                "trans_profile_distance",
                "trans_profile_vectors",
                "trans_mag_max_pr_lambda",
                "trans_mag_res_lambda",
                "trans_mag_res",
            ],
            MonitorKind::XzProfile => &[
                "xz_profile_e_vectors",
                "xz_profile_p_vectors",
                "xz_profile_x_coord",
                "xz_profile_z_coord",
            ],
            MonitorKind::YzProfile => &[
                "yz_profile_e_vectors",
                "yz_profile_p_vectors",
                "yz_profile_y_coord",
                "yz_profile_z_coord",
            ],
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for MonitorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMonitor(pub String);

impl fmt::Display for UnknownMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown monitor name: {:?}", self.0)
    }
}

impl std::error::Error for UnknownMonitor {}

impl FromStr for MonitorKind {
    type Err = UnknownMonitor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MonitorKind::from_name(s).ok_or_else(|| UnknownMonitor(s.to_string()))
    }
}

/// A set of monitors. Iterates and serialises in canonical order, so two sets
/// with the same members always render to the same comma-joined string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MonitorSet(u8);

impl MonitorSet {
    pub const fn empty() -> Self {
        MonitorSet(0)
    }

    pub fn all() -> Self {
        MonitorKind::ALL.into_iter().collect()
    }

    pub fn of(kinds: &[MonitorKind]) -> Self {
        kinds.iter().copied().collect()
    }

    pub fn insert(&mut self, kind: MonitorKind) {
        self.0 |= kind.bit();
    }

    pub fn remove(&mut self, kind: MonitorKind) {
        self.0 &= !kind.bit();
    }

    pub fn contains(&self, kind: MonitorKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn union(&self, other: &MonitorSet) -> MonitorSet {
        MonitorSet(self.0 | other.0)
    }

    /// Members of `self` that are not in `other`.
    pub fn difference(&self, other: &MonitorSet) -> MonitorSet {
        MonitorSet(self.0 & !other.0)
    }

    pub fn intersects(&self, other: &MonitorSet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn iter(&self) -> impl Iterator<Item = MonitorKind> + '_ {
        MonitorKind::ALL.into_iter().filter(|kind| self.contains(*kind))
    }

    pub fn contains_family(&self, family: MonitorFamily) -> bool {
        self.iter().any(|kind| kind.family() == family)
    }
}

impl FromIterator<MonitorKind> for MonitorSet {
    fn from_iter<I: IntoIterator<Item = MonitorKind>>(iter: I) -> Self {
        let mut set = MonitorSet::empty();
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

impl fmt::Display for MonitorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(MonitorKind::name).collect();
        f.write_str(&names.join(","))
    }
}

impl FromStr for MonitorSet {
    type Err = UnknownMonitor;

    /// Parses a comma-joined list of monitor names. Order and duplicates are
    /// irrelevant, the empty string is the empty set.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::parse::<MonitorKind>)
            .collect()
    }
}

impl From<MonitorSet> for String {
    fn from(set: MonitorSet) -> Self {
        set.to_string()
    }
}

impl TryFrom<String> for MonitorSet {
    type Error = UnknownMonitor;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_roundtrip() {
        for kind in MonitorKind::ALL {
            assert_eq!(MonitorKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(MonitorKind::from_name("source"), None);
    }

    #[test]
    fn test_set_display_is_canonical() {
        let a = MonitorSet::of(&[MonitorKind::YzProfile, MonitorKind::ReflectionPower]);
        let b = MonitorSet::of(&[MonitorKind::ReflectionPower, MonitorKind::YzProfile]);
        assert_eq!(a.to_string(), "ref_power_monitor,yz_profile_monitor");
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_parse_set() {
        let set: MonitorSet = "trans_power_monitor, ref_power_monitor,".parse().unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains(MonitorKind::TransmissionPower));
        assert!(set.contains(MonitorKind::ReflectionPower));

        let empty: MonitorSet = "".parse().unwrap();
        assert!(empty.is_empty());

        let err = "ref_power_monitor,bogus".parse::<MonitorSet>().unwrap_err();
        assert_eq!(err, UnknownMonitor("bogus".into()));
    }

    #[test]
    fn test_set_algebra() {
        let current = MonitorSet::of(&[
            MonitorKind::ReflectionPower,
            MonitorKind::TransmissionPower,
            MonitorKind::XzProfile,
        ]);
        let previous = MonitorSet::of(&[MonitorKind::ReflectionPower, MonitorKind::TransmissionPower]);

        let new = current.difference(&previous);
        assert_eq!(new, MonitorSet::of(&[MonitorKind::XzProfile]));
        assert_eq!(current.difference(&new), previous);
        assert_eq!(previous.union(&new), current);
        assert!(current.contains_family(MonitorFamily::CrossSection));
        assert!(!previous.contains_family(MonitorFamily::Profile));
    }

    #[test]
    fn test_result_fields_are_disjoint() {
        let mut seen = std::collections::HashSet::new();
        for kind in MonitorKind::ALL {
            for field in kind.result_fields() {
                assert!(seen.insert(*field), "{field} owned by two monitors");
            }
        }
    }
}
