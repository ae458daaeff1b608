//! Geofence check
//!
//! Haversine distance from the user to the configured reference point,
//! compared against the configured radius.

use crate::models::LocationConfig;

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeoError {
    #[error("coordinate is not a finite number")]
    NotFinite,

    #[error("latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("geofence radius {0} must be positive")]
    InvalidRadius(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeofenceOutcome {
    pub ok: bool,
    pub distance_meters: f64,
    /// Inside, but past `near_boundary_ratio` of the radius
    pub near_boundary: bool,
}

fn check_point(lat: f64, lon: f64) -> Result<(), GeoError> {
    if !lat.is_finite() || !lon.is_finite() {
        return Err(GeoError::NotFinite);
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(GeoError::LatitudeOutOfRange(lat));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(GeoError::LongitudeOutOfRange(lon));
    }
    Ok(())
}

/// Great-circle distance in meters
pub fn distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Result<f64, GeoError> {
    check_point(lat1, lon1)?;
    check_point(lat2, lon2)?;

    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());

    Ok(EARTH_RADIUS_METERS * c)
}

pub struct GeofenceValidator {
    near_boundary_ratio: f64,
}

impl GeofenceValidator {
    pub fn new(near_boundary_ratio: f64) -> Self {
        Self { near_boundary_ratio }
    }

    pub fn is_within(&self, user_lat: f64, user_lon: f64, config: &LocationConfig) -> Result<GeofenceOutcome, GeoError> {
        if !config.radius_meters.is_finite() || config.radius_meters <= 0.0 {
            return Err(GeoError::InvalidRadius(config.radius_meters));
        }

        let d = distance(
            user_lat,
            user_lon,
            config.reference_latitude,
            config.reference_longitude,
        )?;
        let ok = d <= config.radius_meters;

        Ok(GeofenceOutcome {
            ok,
            distance_meters: d,
            near_boundary: ok && d > self.near_boundary_ratio * config.radius_meters,
        })
    }
}
