use std::convert::TryFrom;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::dates;
use crate::store::BlobId;

/// What a report is about. Stored and transmitted as a small integer.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum SubjectKind {
    Pet,
    Person,
}

impl TryFrom<i16> for SubjectKind {
    type Error = UnknownSubjectKind;

    fn try_from(tag: i16) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(SubjectKind::Pet),
            1 => Ok(SubjectKind::Person),
            _ => Err(UnknownSubjectKind(tag)),
        }
    }
}

impl From<SubjectKind> for i16 {
    fn from(kind: SubjectKind) -> Self {
        match kind {
            SubjectKind::Pet => 0,
            SubjectKind::Person => 1,
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown subject kind {0}")]
pub struct UnknownSubjectKind(pub i16);

/// A point on the globe in decimal degrees.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A lost pet or person, as filed by the owner of `phone_number`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct MissingReport {
    /// The ID assigned by the repository.
    pub id: Uuid,

    #[serde(rename = "type")]
    pub kind: SubjectKind,

    pub full_name: String,

    pub last_seen_location: Location,

    #[serde(with = "dates::iso_date")]
    pub missing_since: Date,

    pub description: String,

    pub reward: Option<f64>,

    /// Correlation key only; never verified.
    pub phone_number: String,

    /// The photograph in the blob store, if any.
    pub image_id: Option<BlobId>,

    /// Public URL of the photograph, rendered once at submission.
    pub photo_url: Option<String>,

    pub found: bool,

    #[serde(with = "dates::optional_timestamp")]
    pub found_date: Option<OffsetDateTime>,
}

/// A missing report before the repository has assigned it an ID.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewMissingReport {
    #[serde(rename = "type")]
    pub kind: SubjectKind,
    pub full_name: String,
    pub last_seen_location: Location,
    #[serde(with = "dates::iso_date")]
    pub missing_since: Date,
    pub description: String,
    pub reward: Option<f64>,
    pub phone_number: String,
    pub image_id: Option<BlobId>,
    pub photo_url: Option<String>,
}

impl NewMissingReport {
    /// Attaches the repository-assigned ID. New reports are never found.
    pub fn into_report(self, id: Uuid) -> MissingReport {
        MissingReport {
            id,
            kind: self.kind,
            full_name: self.full_name,
            last_seen_location: self.last_seen_location,
            missing_since: self.missing_since,
            description: self.description,
            reward: self.reward,
            phone_number: self.phone_number,
            image_id: self.image_id,
            photo_url: self.photo_url,
            found: false,
            found_date: None,
        }
    }
}

/// An observation of a pet or person, filed by anyone.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SightingReport {
    /// The ID assigned by the repository.
    pub id: Uuid,

    #[serde(rename = "type")]
    pub kind: SubjectKind,

    pub last_seen_location: Location,

    pub description: String,

    pub phone_number: String,

    pub image_id: Option<BlobId>,

    pub photo_url: Option<String>,

    #[serde(with = "time::serde::timestamp")]
    pub created: OffsetDateTime,

    /// Reserved. Nothing in this service changes it.
    pub resolved: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewSightingReport {
    #[serde(rename = "type")]
    pub kind: SubjectKind,
    pub last_seen_location: Location,
    pub description: String,
    pub phone_number: String,
    pub image_id: Option<BlobId>,
    pub photo_url: Option<String>,
    #[serde(with = "time::serde::timestamp")]
    pub created: OffsetDateTime,
}

impl NewSightingReport {
    pub fn into_report(self, id: Uuid) -> SightingReport {
        SightingReport {
            id,
            kind: self.kind,
            last_seen_location: self.last_seen_location,
            description: self.description,
            phone_number: self.phone_number,
            image_id: self.image_id,
            photo_url: self.photo_url,
            created: self.created,
            resolved: false,
        }
    }
}

/// A partial update to the mutable fields of a missing report. `None`
/// leaves the field as it is.
#[derive(Clone, Debug, Default)]
pub struct MissingReportPatch {
    pub found: Option<bool>,
    pub found_date: Option<OffsetDateTime>,
}

impl MissingReportPatch {
    pub fn found_at(instant: OffsetDateTime) -> Self {
        Self {
            found: Some(true),
            found_date: Some(instant),
        }
    }

    pub fn apply(&self, report: &mut MissingReport) {
        if let Some(found) = self.found {
            report.found = found;
        }

        if let Some(found_date) = self.found_date {
            report.found_date = Some(found_date);
        }
    }
}

/// Selects reports by the phone number that filed them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PhoneFilter {
    Is(String),
    IsNot(String),
}

impl PhoneFilter {
    pub fn phone_number(&self) -> &str {
        match self {
            PhoneFilter::Is(p) | PhoneFilter::IsNot(p) => p,
        }
    }

    pub fn accepts(&self, phone_number: &str) -> bool {
        match self {
            PhoneFilter::Is(p) => p == phone_number,
            PhoneFilter::IsNot(p) => p != phone_number,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_kind_is_a_small_integer_on_the_wire() {
        assert_eq!(serde_json::to_string(&SubjectKind::Person).unwrap(), "1");
        assert_eq!(
            serde_json::from_str::<SubjectKind>("0").unwrap(),
            SubjectKind::Pet
        );
        assert!(serde_json::from_str::<SubjectKind>("7").is_err());
    }

    #[test]
    fn patch_leaves_unset_fields_alone() {
        let mut report = NewMissingReport {
            kind: SubjectKind::Pet,
            full_name: "Rex".to_owned(),
            last_seen_location: Location::new(1.0, 2.0),
            missing_since: dates::iso_date::parse("2024-01-02").unwrap(),
            description: "brown labrador".to_owned(),
            reward: None,
            phone_number: "555-1".to_owned(),
            image_id: None,
            photo_url: None,
        }
        .into_report(Uuid::new_v4());

        MissingReportPatch::default().apply(&mut report);
        assert!(!report.found);
        assert_eq!(report.found_date, None);

        let now = OffsetDateTime::now_utc();
        MissingReportPatch::found_at(now).apply(&mut report);
        assert!(report.found);
        assert_eq!(report.found_date, Some(now));
    }

    #[test]
    fn phone_filter_excludes_exact_number() {
        let filter = PhoneFilter::IsNot("555-1".to_owned());

        assert!(!filter.accepts("555-1"));
        assert!(filter.accepts("555-2"));
        assert!(PhoneFilter::Is("555-1".to_owned()).accepts("555-1"));
    }

    #[test]
    fn missing_report_serializes_with_type_tag() {
        let report = NewMissingReport {
            kind: SubjectKind::Person,
            full_name: "Ann".to_owned(),
            last_seen_location: Location::new(10.5, -3.25),
            missing_since: dates::iso_date::parse("2023-12-31").unwrap(),
            description: "tall".to_owned(),
            reward: Some(50.0),
            phone_number: "555-9".to_owned(),
            image_id: None,
            photo_url: None,
        }
        .into_report(Uuid::nil());

        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["type"], 1);
        assert_eq!(value["missing_since"], "2023-12-31");
        assert_eq!(value["last_seen_location"]["lon"], -3.25);
        assert_eq!(value["found"], false);
        assert!(value["found_date"].is_null());
    }
}
