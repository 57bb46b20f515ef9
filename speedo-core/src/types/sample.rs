use chrono::DateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::EventTime;

/// A single timestamped position reading of one moving entity.
///
/// Samples are immutable once constructed. Use [PositionSample::new] for
/// values which are known to be valid and `PositionSample::try_from` to
/// validate a [RawTrackPoint] coming from the ingestion transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    key: String,
    latitude_deg: f64,
    longitude_deg: f64,
    elevation: Option<f64>,
    event_time: EventTime,
}

impl PositionSample {
    /// Create a sample without elevation
    pub fn new(
        key: impl Into<String>,
        latitude_deg: f64,
        longitude_deg: f64,
        event_time: EventTime,
    ) -> Self {
        Self {
            key: key.into(),
            latitude_deg,
            longitude_deg,
            elevation: None,
            event_time,
        }
    }

    /// Attach an elevation in metres
    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    /// Identity of the moving entity
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Latitude in degrees
    pub fn latitude_deg(&self) -> f64 {
        self.latitude_deg
    }

    /// Longitude in degrees
    pub fn longitude_deg(&self) -> f64 {
        self.longitude_deg
    }

    /// Elevation in metres if the device reported one
    pub fn elevation(&self) -> Option<f64> {
        self.elevation
    }

    /// Event time in milliseconds since the unix epoch
    pub fn event_time(&self) -> EventTime {
        self.event_time
    }

    /// True if both samples have exactly the same latitude and longitude
    pub fn same_position(&self, other: &PositionSample) -> bool {
        self.latitude_deg == other.latitude_deg && self.longitude_deg == other.longitude_deg
    }
}

/// A track point as delivered by the ingestion transport.
///
/// All values are textual, mirroring the GPX `trkpt` element the points
/// originate from. `time` is an RFC 3339 timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTrackPoint {
    /// Entity the point belongs to, usually the transport record key
    pub key: Option<String>,
    /// Latitude in degrees
    pub latitude: Option<String>,
    /// Longitude in degrees
    pub longitude: Option<String>,
    /// Elevation in metres
    pub elevation: Option<String>,
    /// RFC 3339 timestamp of the reading
    pub time: Option<String>,
}

/// A track point which can not be turned into a [PositionSample]
#[derive(Debug, Error, PartialEq)]
pub enum MalformedSampleError {
    #[error("Track point is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("Field `{field}` is not a finite number: `{value}`")]
    NotANumber { field: &'static str, value: String },
    #[error("Latitude {0} is outside of [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("Longitude {0} is outside of [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("Cannot parse time `{value}`: {source}")]
    InvalidTime {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

fn required<'a>(
    field: &'static str,
    value: &'a Option<String>,
) -> Result<&'a str, MalformedSampleError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(MalformedSampleError::MissingField(field))
}

fn parse_number(field: &'static str, value: &str) -> Result<f64, MalformedSampleError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|x| x.is_finite())
        .ok_or_else(|| MalformedSampleError::NotANumber {
            field,
            value: value.to_owned(),
        })
}

impl TryFrom<RawTrackPoint> for PositionSample {
    type Error = MalformedSampleError;

    fn try_from(raw: RawTrackPoint) -> Result<Self, Self::Error> {
        let key = required("key", &raw.key)?;
        let latitude_deg = parse_number("latitude", required("latitude", &raw.latitude)?)?;
        if !(-90.0..=90.0).contains(&latitude_deg) {
            return Err(MalformedSampleError::LatitudeOutOfRange(latitude_deg));
        }
        let longitude_deg = parse_number("longitude", required("longitude", &raw.longitude)?)?;
        if !(-180.0..=180.0).contains(&longitude_deg) {
            return Err(MalformedSampleError::LongitudeOutOfRange(longitude_deg));
        }
        let time = required("time", &raw.time)?;
        let event_time = DateTime::parse_from_rfc3339(time)
            .map_err(|source| MalformedSampleError::InvalidTime {
                value: time.to_owned(),
                source,
            })?
            .timestamp_millis();
        // elevation is optional, but if given it must be a number
        let elevation = match raw.elevation.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(ele) => Some(parse_number("elevation", ele)?),
        };

        Ok(Self {
            key: key.to_owned(),
            latitude_deg,
            longitude_deg,
            elevation,
            event_time,
        })
    }
}
