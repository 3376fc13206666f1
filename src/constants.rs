//! # Constants and type definitions for arcfit
//!
//! This module centralizes the **sensor constants**, the **default noise priors** of the
//! arc estimation, and the **type aliases** shared by the whole crate.
//!
//! ## Overview
//!
//! - Radar wavelength of the Sentinel-1 C-band sensor
//! - Default a-priori sigmas of the four estimated parameters
//! - Default partitioning of the parallel execution strategy
//! - Unit-carrying type aliases (meters, years, radians, ...)
//!
//! These values are only *defaults*: every run reads them through an explicit
//! [`PipelineConfig`](crate::config::PipelineConfig).

// -------------------------------------------------------------------------------------------------
// Sensor constants
// -------------------------------------------------------------------------------------------------

/// Sentinel-1 (C-band) radar wavelength in meters
pub const S1_WAVELENGTH: Meter = 0.055465763;

/// 2π, one phase cycle in radians
pub const DPI: f64 = 2. * std::f64::consts::PI;

// -------------------------------------------------------------------------------------------------
// Default a-priori sigmas of the unknown parameters
// -------------------------------------------------------------------------------------------------

/// Prior sigma of the offset (m)
pub const SIGMA_OFFSET: Meter = 0.001;

/// Prior sigma of the velocity (m/yr)
pub const SIGMA_VEL: f64 = 0.0001;

/// Prior sigma of the height correction (m)
pub const SIGMA_H: Meter = 5.0;

/// Prior sigma of the thermal expansion coefficient (m/°C)
pub const SIGMA_THER: f64 = 0.00005;

// -------------------------------------------------------------------------------------------------
// Estimation layout
// -------------------------------------------------------------------------------------------------

/// Number of estimated parameters per point (offset, velocity, height, thermal)
pub const N_STATE: usize = 4;

/// Default number of partitions of the parallel execution strategy.
///
/// Must be set explicitly: a default derived from the batch size yields far too many
/// partitions for a few hundred arcs.
pub const DEFAULT_PARTITIONS: usize = 12;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Distance in meters
pub type Meter = f64;
/// Elapsed time in years
pub type Year = f64;
/// Angle in radians
pub type Radian = f64;
/// Temperature in degrees Celsius
pub type Celsius = f64;
/// Normalized Median Absolute Deviation (dimensionless)
pub type Nmad = f64;
/// External identifier of a point in the store (`space` coordinate)
pub type PointId = u32;
