//! Car park facility documents as returned by the upstream API.
//!
//! The wire format encodes every count as a string and leaves most fields
//! optional, so all wire fields are `Option<String>` here. Collectors never
//! read those options directly: [`Facility::readings`] converts a document
//! into a [`FacilityReadings`] where each numeric value is either parsed or a
//! [`FieldError`] describing why it could not be.

use chrono::NaiveDateTime;
use serde::Deserialize;
use thiserror::Error;

/// Pattern of the `MessageDate` field. The upstream sends local time without
/// an offset; a fractional seconds part is optional and truncated.
pub const MESSAGE_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Reasons a single field could not be turned into a sample value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("field {0} is missing")]
    Missing(&'static str),
    #[error("field {field} is not an integer: {value:?}")]
    InvalidInteger { field: &'static str, value: String },
    #[error("field {field} is not a {pattern} timestamp: {value:?}")]
    InvalidTimestamp {
        field: &'static str,
        pattern: &'static str,
        value: String,
    },
}

/// One upstream car park document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Facility {
    #[serde(default)]
    pub tsn: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub spots: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub zones: Vec<Zone>,
    #[serde(rename = "ParkID", default)]
    pub park_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: Location,
    #[serde(default, deserialize_with = "null_as_default")]
    pub occupancy: Occupancy,
    #[serde(rename = "MessageDate", default)]
    pub message_date: Option<String>,
    #[serde(default)]
    pub facility_id: Option<String>,
    #[serde(default)]
    pub facility_name: Option<String>,
    #[serde(default)]
    pub tfnsw_facility_id: Option<String>,
}

/// Occupancy breakdown for a sub-area of a facility.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Zone {
    #[serde(default)]
    pub spots: Option<String>,
    #[serde(default)]
    pub zone_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub occupancy: Occupancy,
    #[serde(default)]
    pub zone_name: Option<String>,
    #[serde(default)]
    pub parent_zone_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub suburb: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub latitude: Option<String>,
    #[serde(default)]
    pub longitude: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Occupancy {
    #[serde(rename = "loop", default)]
    pub loop_count: Option<String>,
    #[serde(default)]
    pub total: Option<String>,
    #[serde(default)]
    pub monthlies: Option<String>,
    #[serde(default)]
    pub open_gate: Option<String>,
    #[serde(default)]
    pub transients: Option<String>,
}

/// Descriptive labels of a facility. Missing strings become empty labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacilityInfo {
    pub facility_id: String,
    pub facility_name: String,
    pub suburb: String,
    pub address: String,
}

impl FacilityInfo {
    /// Label values in the order of the car park label schema.
    pub fn label_values(&self) -> Vec<String> {
        vec![
            self.facility_id.clone(),
            self.facility_name.clone(),
            self.suburb.clone(),
            self.address.clone(),
        ]
    }
}

/// Presence-checked values extracted from a [`Facility`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacilityReadings {
    pub info: FacilityInfo,
    pub vehicle_count: Result<i64, FieldError>,
    pub spots_total: Result<i64, FieldError>,
    pub last_updated: Result<i64, FieldError>,
}

impl Facility {
    /// Convert the document into typed readings.
    ///
    /// `requested_id` is the identifier the document was fetched with; it is
    /// used for the `facility_id` label so that the label always matches the
    /// configured facility rather than whatever the upstream echoes back.
    pub fn readings(&self, requested_id: &str) -> FacilityReadings {
        FacilityReadings {
            info: FacilityInfo {
                facility_id: requested_id.to_string(),
                facility_name: self.facility_name.clone().unwrap_or_default(),
                suburb: self.location.suburb.clone().unwrap_or_default(),
                address: self.location.address.clone().unwrap_or_default(),
            },
            vehicle_count: parse_count("occupancy.total", self.occupancy.total.as_deref()),
            spots_total: parse_count("spots", self.spots.as_deref()),
            last_updated: parse_message_date("MessageDate", self.message_date.as_deref()),
        }
    }
}

/// Parse a string-encoded integer count.
///
/// The value must be a plain decimal integer with an optional sign; no
/// surrounding whitespace is accepted.
pub fn parse_count(field: &'static str, raw: Option<&str>) -> Result<i64, FieldError> {
    let raw = raw.filter(|s| !s.is_empty());
    let Some(raw) = raw else {
        return Err(FieldError::Missing(field));
    };

    raw.parse::<i64>().map_err(|_| FieldError::InvalidInteger {
        field,
        value: raw.to_string(),
    })
}

/// Parse a `MessageDate` value into Unix seconds.
///
/// The value carries no offset and is interpreted as UTC.
pub fn parse_message_date(field: &'static str, raw: Option<&str>) -> Result<i64, FieldError> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty());
    let Some(raw) = raw else {
        return Err(FieldError::Missing(field));
    };

    NaiveDateTime::parse_from_str(raw, MESSAGE_DATE_FORMAT)
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|_| FieldError::InvalidTimestamp {
            field,
            pattern: "YYYY-MM-DDThh:mm:ss",
            value: raw.to_string(),
        })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
