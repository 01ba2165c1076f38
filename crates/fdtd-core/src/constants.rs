/// Nanometres per metre. The engine speaks meters, everything public speaks nm.
pub const NM_PER_M: f64 = 1e9;

/// Default global wavelength sweep start (nm)
pub const DEFAULT_WAVELENGTH_START: f32 = 400.0;

/// Default global wavelength sweep stop (nm)
pub const DEFAULT_WAVELENGTH_STOP: f32 = 1500.0;

/// Default number of frequency points recorded by every monitor
pub const DEFAULT_FREQUENCY_POINTS: u32 = 1000;

/// Default global mesh step along every axis (nm)
pub const DEFAULT_MESH_STEP: f32 = 10.0;

/// Default lateral FDTD region span (nm)
pub const DEFAULT_FDTD_SPAN: f32 = 350.0;

/// Default film thickness of the structured layer (nm)
pub const DEFAULT_FILM_THICKNESS: f32 = 100.0;

/// Default distance of the profile monitors from the film (nm)
pub const DEFAULT_NEAR_FIELD_DISTANCE: f32 = 10.0;

/// Number of resonances kept per curve when building snapshot candidates
pub const TOP_RESONANCES: usize = 3;

/// Incidence angles must stay strictly inside grazing incidence (degrees)
pub const MAX_INCIDENCE_ANGLE: f32 = 89.9;

/// Separator between the free-text comment and the custom parameter
pub const COMMENT_SEPARATOR: &str = ";:;";

/// Token written into fingerprints for parameters that are not set
pub const UNSET_TOKEN: &str = "none";
