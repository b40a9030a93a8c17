use std::convert::TryFrom;
use std::time::{Duration, Instant};

use log::{debug, o};
use mime::Mime;
use time::OffsetDateTime;
use warp::{
    filters::multipart::FormData,
    http::{
        header::{HeaderValue, CONTENT_TYPE},
        Response, StatusCode,
    },
    hyper::Body,
    reject,
    reply::{json, with_header, with_status, Reply},
};

use crate::dates::iso_date;
use crate::environment::Environment;
use crate::errors::BackendError;
use crate::io::Submission;
use crate::lifecycle;
use crate::normalization::normalize;
use crate::report::{Location, NewMissingReport, NewSightingReport, SubjectKind};
use crate::routes::{
    query::{MatchesQuery, PhoneQuery},
    rejection::{Context, Rejection},
    response::{SuccessResponse, Submitted},
};
use crate::store::{Blob, BlobId};
use crate::urls::Urls;

const SERVER_TIMING_HEADER: &str = "server-timing";
const PHOTO_FIELD: &str = "photo";
type RouteResult = Result<Box<dyn Reply>, reject::Rejection>;

macro_rules! timed {
    ($($expression:stmt);+) => {
        let start = Instant::now();

        let result = { $($expression)+ };

        Ok(Box::new(with_header(
            result,
            SERVER_TIMING_HEADER,
            format_server_timing(start.elapsed()),
        )) as Box<dyn Reply>)
    };
}

pub async fn report_missing(environment: Environment, content: FormData) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::report_missing(), e);

        debug!(environment.logger, "Parsing missing report...");
        let submission = Submission::read(content, environment.store.as_ref(), PHOTO_FIELD)
            .await
            .map_err(error_handler)?;
        let new_report = missing_report_from(&environment.urls, &submission).map_err(error_handler)?;

        debug!(environment.logger, "Saving missing report..."; "image_id" => ?new_report.image_id);
        let report = environment
            .db
            .insert_missing(new_report)
            .await
            .map_err(error_handler)?;

        let response = SuccessResponse::Submitted {
            message: "Missing report submitted",
            id: report.id,
            data: Submitted::Missing(report),
        };

        with_status(json(&response), StatusCode::CREATED)
    }
}

pub async fn report_sighting(environment: Environment, content: FormData) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::report_sighting(), e);

        debug!(environment.logger, "Parsing sighting...");
        let submission = Submission::read(content, environment.store.as_ref(), PHOTO_FIELD)
            .await
            .map_err(error_handler)?;
        let new_report = sighting_report_from(&environment.urls, &submission, OffsetDateTime::now_utc())
            .map_err(error_handler)?;

        debug!(environment.logger, "Saving sighting..."; "image_id" => ?new_report.image_id);
        let report = environment
            .db
            .insert_sighting(new_report)
            .await
            .map_err(error_handler)?;

        let response = SuccessResponse::Submitted {
            message: "Sighting stored",
            id: report.id,
            data: Submitted::Sighting(report),
        };

        with_status(json(&response), StatusCode::CREATED)
    }
}

pub async fn my_reports(environment: Environment, query: PhoneQuery) -> RouteResult {
    timed! {
        let PhoneQuery { phone_number } = query;
        let error_handler = |e: BackendError| Rejection::new(Context::my_reports(phone_number.clone()), e);

        let mut reports = environment
            .db
            .find_missing(&phone_number)
            .await
            .map_err(error_handler)?;

        for report in reports.iter_mut() {
            fill_photo_url(&environment.urls, report.image_id.as_ref(), &mut report.photo_url)
                .map_err(error_handler)?;
        };

        json(&SuccessResponse::Reports { reports })
    }
}

pub async fn my_searches(environment: Environment, query: PhoneQuery) -> RouteResult {
    use crate::report::PhoneFilter;

    timed! {
        let PhoneQuery { phone_number } = query;
        let error_handler = |e: BackendError| Rejection::new(Context::my_searches(phone_number.clone()), e);

        let mut searches = environment
            .db
            .find_sightings(&PhoneFilter::Is(phone_number.clone()))
            .await
            .map_err(error_handler)?;

        for search in searches.iter_mut() {
            fill_photo_url(&environment.urls, search.image_id.as_ref(), &mut search.photo_url)
                .map_err(error_handler)?;
        };

        json(&SuccessResponse::Searches { searches })
    }
}

pub async fn potential_matches(environment: Environment, query: MatchesQuery) -> RouteResult {
    timed! {
        let MatchesQuery { phone_number, limit_per_report } = query;
        let limit_per_report = limit_per_report.unwrap_or(environment.config.default_limit_per_report);
        let error_handler = |e: BackendError| Rejection::new(Context::potential_matches(phone_number.clone()), e);

        debug!(environment.logger, "Finding potential matches..."; "phone_number" => &phone_number, "limit_per_report" => limit_per_report);
        let correlation = environment
            .correlator()
            .find_potential_matches(&phone_number, limit_per_report)
            .await
            .map_err(error_handler)?;

        json(&SuccessResponse::Matches(correlation))
    }
}

pub async fn file(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::file(id.clone()), e);

        let logger = environment.logger.new(o!("blob_id" => id.clone()));
        let blob_id = BlobId::from(id.clone());

        debug!(logger, "Fetching file...");
        let blob = environment
            .store
            .fetch(&blob_id)
            .await
            .map_err(BackendError::from)
            .map_err(error_handler)?;

        stream_blob(blob)
    }
}

pub async fn mark_found(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::mark_found(id.clone()), e);

        let report_id = lifecycle::parse_report_id(&id).map_err(error_handler)?;

        debug!(environment.logger, "Marking report as found..."; "report_id" => %report_id);
        let found_date = lifecycle::mark_found(environment.db.as_ref(), &report_id)
            .await
            .map_err(error_handler)?;

        debug!(environment.logger, "Report found"; "report_id" => %report_id, "found_date" => %found_date);
        json(&SuccessResponse::Found { ok: true, id: report_id })
    }
}

fn missing_report_from(
    urls: &Urls,
    submission: &Submission,
) -> Result<NewMissingReport, BackendError> {
    let image_id = submission
        .file
        .clone()
        .ok_or(BackendError::MissingField(PHOTO_FIELD))?;
    let photo_url = photo_url_for(urls, &image_id)?;

    let missing_since = submission.text("missing_since")?;
    let missing_since =
        iso_date::parse(missing_since.trim()).map_err(|_| BackendError::InvalidField {
            name: "missing_since",
            value: missing_since.to_owned(),
        })?;

    Ok(NewMissingReport {
        kind: subject_kind(submission)?,
        full_name: submission.text("full_name")?.trim().to_owned(),
        last_seen_location: location(submission)?,
        missing_since,
        description: submission.text("description")?.to_owned(),
        reward: submission.parse_optional("reward")?,
        phone_number: normalize(submission.text("phone_number")?),
        image_id: Some(image_id),
        photo_url: Some(photo_url),
    })
}

fn sighting_report_from(
    urls: &Urls,
    submission: &Submission,
    created: OffsetDateTime,
) -> Result<NewSightingReport, BackendError> {
    let image_id = submission.file.clone();
    let photo_url = match &image_id {
        Some(id) => Some(photo_url_for(urls, id)?),
        None => None,
    };

    Ok(NewSightingReport {
        kind: subject_kind(submission)?,
        last_seen_location: location(submission)?,
        description: submission.text("description")?.to_owned(),
        phone_number: normalize(submission.text("phone_number")?),
        image_id,
        photo_url,
        created,
    })
}

fn subject_kind(submission: &Submission) -> Result<SubjectKind, BackendError> {
    let code: i16 = submission.parse("type")?;

    SubjectKind::try_from(code).map_err(|_| BackendError::InvalidField {
        name: "type",
        value: code.to_string(),
    })
}

fn location(submission: &Submission) -> Result<Location, BackendError> {
    let lat: f64 = submission.parse("lat")?;
    let lon: f64 = submission.parse("lon")?;

    if !(-90.0..=90.0).contains(&lat) {
        return Err(BackendError::InvalidField {
            name: "lat",
            value: lat.to_string(),
        });
    }

    if !(-180.0..=180.0).contains(&lon) {
        return Err(BackendError::InvalidField {
            name: "lon",
            value: lon.to_string(),
        });
    }

    Ok(Location::new(lat, lon))
}

fn photo_url_for(urls: &Urls, id: &BlobId) -> Result<String, BackendError> {
    urls.file(id)
        .map(String::from)
        .map_err(|source| BackendError::FailedToGenerateUrl { source })
}

/// Renders a photo URL for records that have an image but were stored
/// without one.
fn fill_photo_url(
    urls: &Urls,
    image_id: Option<&BlobId>,
    photo_url: &mut Option<String>,
) -> Result<(), BackendError> {
    if let (Some(id), None) = (image_id, photo_url.as_ref()) {
        *photo_url = Some(photo_url_for(urls, id)?);
    }

    Ok(())
}

/// Streams the blob body to the client without buffering it.
fn stream_blob(blob: Blob) -> Response<Body> {
    let content_type = content_type_of(&blob);
    let mut response = Response::new(Body::wrap_stream(blob.body));
    response.headers_mut().insert(CONTENT_TYPE, content_type);

    response
}

fn content_type_of(blob: &Blob) -> HeaderValue {
    blob.content_type
        .as_deref()
        .and_then(|raw| raw.parse::<Mime>().ok())
        .and_then(|mime| HeaderValue::from_str(mime.as_ref()).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"))
}

fn format_server_timing(seconds: Duration) -> String {
    format!("handler;dur={}", seconds.as_secs_f64() * 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls() -> Urls {
        Urls::new("https://example.com/api")
    }

    fn missing_fields() -> Vec<(&'static str, &'static str)> {
        vec![
            ("type", "0"),
            ("full_name", " Rex "),
            ("lat", "52.52"),
            ("lon", "13.40"),
            ("missing_since", "2024-02-29"),
            ("description", "brown dog, red collar"),
            ("phone_number", " 555-1 "),
        ]
    }

    #[test]
    fn missing_reports_need_a_photo() {
        let submission = Submission::from_fields(missing_fields());

        assert!(matches!(
            missing_report_from(&urls(), &submission),
            Err(BackendError::MissingField("photo"))
        ));
    }

    #[test]
    fn missing_reports_are_read_from_fields() {
        let mut submission = Submission::from_fields(missing_fields());
        submission.file = Some(BlobId::from("5f0c6a3e-2d7b-4a51-9c1e-0d7f1b2a9e44"));

        let report = missing_report_from(&urls(), &submission).unwrap();

        assert_eq!(report.kind, SubjectKind::Pet);
        assert_eq!(report.full_name, "Rex");
        assert_eq!(report.phone_number, "555-1");
        assert_eq!(report.reward, None);
        assert_eq!(iso_date::format(&report.missing_since), "2024-02-29");
        assert_eq!(
            report.photo_url.as_deref(),
            Some("https://example.com/api/files/5f0c6a3e-2d7b-4a51-9c1e-0d7f1b2a9e44")
        );
    }

    #[test]
    fn sightings_may_omit_the_photo() {
        let submission = Submission::from_fields(vec![
            ("type", "1"),
            ("lat", "-33.9"),
            ("lon", "151.2"),
            ("description", "man in green coat"),
            ("phone_number", "555-2"),
        ]);

        let report =
            sighting_report_from(&urls(), &submission, OffsetDateTime::now_utc()).unwrap();

        assert_eq!(report.kind, SubjectKind::Person);
        assert_eq!(report.image_id, None);
        assert_eq!(report.photo_url, None);
    }

    #[test]
    fn out_of_range_fields_are_invalid() {
        let submission = Submission::from_fields(vec![("type", "7"), ("lat", "91"), ("lon", "0")]);

        assert!(matches!(
            subject_kind(&submission),
            Err(BackendError::InvalidField { name: "type", .. })
        ));
        assert!(matches!(
            location(&submission),
            Err(BackendError::InvalidField { name: "lat", .. })
        ));
    }

    #[test]
    fn stored_urls_are_kept_and_missing_ones_rendered() {
        let id = BlobId::from("abc");
        let mut kept = Some("https://cdn.example.com/abc.jpg".to_owned());
        let mut rendered = None;

        fill_photo_url(&urls(), Some(&id), &mut kept).unwrap();
        fill_photo_url(&urls(), Some(&id), &mut rendered).unwrap();

        assert_eq!(kept.as_deref(), Some("https://cdn.example.com/abc.jpg"));
        assert_eq!(rendered.as_deref(), Some("https://example.com/api/files/abc"));
    }
}
