//! Common validation utilities.

use chrono::{TimeZone, Utc};
use validator::ValidationError;

/// Maximum age of a submitted capture time in hours.
const MAX_CAPTURE_AGE_HOURS: i64 = 48;

/// Maximum allowed future capture time tolerance in seconds (5 minutes for clock skew).
const MAX_FUTURE_TOLERANCE_SECS: i64 = 300;

/// Largest classroom geofence radius accepted, in meters.
const MAX_RADIUS_METERS: f64 = 50_000.0;

/// Validates that a latitude value is within valid range (-90 to 90).
pub fn validate_latitude(lat: f64) -> Result<(), ValidationError> {
    if (-90.0..=90.0).contains(&lat) {
        Ok(())
    } else {
        let mut err = ValidationError::new("latitude_range");
        err.message = Some("Latitude must be between -90 and 90".into());
        Err(err)
    }
}

/// Validates that a longitude value is within valid range (-180 to 180).
pub fn validate_longitude(lon: f64) -> Result<(), ValidationError> {
    if (-180.0..=180.0).contains(&lon) {
        Ok(())
    } else {
        let mut err = ValidationError::new("longitude_range");
        err.message = Some("Longitude must be between -180 and 180".into());
        Err(err)
    }
}

/// Validates a geofence radius: positive and not absurdly large.
pub fn validate_radius(radius: f64) -> Result<(), ValidationError> {
    if radius > 0.0 && radius <= MAX_RADIUS_METERS {
        Ok(())
    } else {
        let mut err = ValidationError::new("radius_range");
        err.message = Some("Radius must be greater than 0 and at most 50000 meters".into());
        Err(err)
    }
}

/// Validates a capture time (milliseconds since epoch).
/// - Must not be more than 5 minutes in the future (allows for clock skew)
/// - Must not be older than 48 hours
pub fn validate_capture_time(timestamp_millis: i64) -> Result<(), ValidationError> {
    let now = Utc::now();

    let timestamp = match Utc.timestamp_millis_opt(timestamp_millis).single() {
        Some(ts) => ts,
        None => {
            let mut err = ValidationError::new("capture_time_invalid");
            err.message = Some("Invalid capture time".into());
            return Err(err);
        }
    };

    if timestamp > now + chrono::Duration::seconds(MAX_FUTURE_TOLERANCE_SECS) {
        let mut err = ValidationError::new("capture_time_future");
        err.message = Some("Capture time cannot be in the future".into());
        return Err(err);
    }

    if timestamp < now - chrono::Duration::hours(MAX_CAPTURE_AGE_HOURS) {
        let mut err = ValidationError::new("capture_time_old");
        err.message = Some("Capture time cannot be older than 48 hours".into());
        return Err(err);
    }

    Ok(())
}

/// Validates an external identifier (user or subject id).
///
/// Identifiers travel in URL paths, so path separators and surrounding
/// whitespace are rejected.
pub fn validate_identifier(id: &str) -> Result<(), ValidationError> {
    let trimmed = id.trim();
    if trimmed.is_empty() || trimmed.len() != id.len() || id.len() > 128 || id.contains('/') {
        let mut err = ValidationError::new("identifier_format");
        err.message =
            Some("Identifier must be 1-128 characters without slashes or surrounding spaces".into());
        return Err(err);
    }
    Ok(())
}
