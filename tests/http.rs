use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;
use warp::http::StatusCode;
use warp::Filter;

use reunite::dates::iso_date;
use reunite::db::mock::MockDb;
use reunite::db::Db;
use reunite::environment::{Config, Environment};
use reunite::matcher::mock::ScriptedMatcher;
use reunite::report::{Location, NewMissingReport, NewSightingReport, SubjectKind};
use reunite::routes;
use reunite::store::mock::MockStore;
use reunite::urls::Urls;

const BOUNDARY: &str = "thisisaboundary1234";
const BASE_URL: &str = "https://www.example.com/api";
const PHOTO: &[u8] = b"\x89PNG\r\n\x1a\nnot really a png";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SubmissionResponse {
    message: String,
    id: Uuid,
    data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ErrorResponse {
    #[serde(default)]
    blob_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    message: String,
}

struct Service {
    db: Arc<MockDb>,
    store: Arc<MockStore>,
    matcher: Arc<ScriptedMatcher>,
    environment: Environment,
}

impl Service {
    fn new() -> Self {
        let db = Arc::new(MockDb::new());
        let store = Arc::new(MockStore::new());
        let matcher = Arc::new(ScriptedMatcher::pool_order());

        let environment = Environment::new(
            Arc::new(log::discard()),
            db.clone(),
            Arc::new(Urls::new(BASE_URL)),
            store.clone(),
            matcher.clone(),
            Config::default(),
        );

        Self {
            db,
            store,
            matcher,
            environment,
        }
    }

    fn routes(
        &self,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone + 'static
    {
        let logger = self.environment.logger.clone();

        routes::make_main_routes(self.environment.clone())
            .recover(move |r| routes::format_rejection(logger.clone(), r))
    }

    async fn missing(&self, phone_number: &str, description: &str) -> Uuid {
        self.db
            .insert_missing(NewMissingReport {
                kind: SubjectKind::Pet,
                full_name: "Rex".to_owned(),
                last_seen_location: Location::new(52.52, 13.40),
                missing_since: iso_date::parse("2024-02-29").unwrap(),
                description: description.to_owned(),
                reward: Some(50.0),
                phone_number: phone_number.to_owned(),
                image_id: None,
                photo_url: None,
            })
            .await
            .unwrap()
            .id
    }

    async fn sighting(&self, phone_number: &str, description: &str) -> Uuid {
        self.db
            .insert_sighting(NewSightingReport {
                kind: SubjectKind::Pet,
                last_seen_location: Location::new(52.5, 13.4),
                description: description.to_owned(),
                phone_number: phone_number.to_owned(),
                image_id: None,
                photo_url: None,
                created: OffsetDateTime::now_utc(),
            })
            .await
            .unwrap()
            .id
    }
}

enum Field<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a str, &'a [u8]),
}

fn multipart_body(fields: &[Field]) -> Vec<u8> {
    let mut body = vec![];

    for field in fields {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());

        match field {
            Field::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Field::File(name, filename, content_type, content) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        name, filename, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(content);
            }
        }

        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    body
}

fn submit(path: &str, fields: &[Field]) -> warp::test::RequestBuilder {
    let body = multipart_body(fields);

    warp::test::request()
        .path(path)
        .method("POST")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header("content-length", body.len())
        .body(body)
}

fn parse<'a, T: Deserialize<'a>>(body: &'a [u8]) -> T {
    serde_json::from_slice(body).expect("parse response as JSON")
}

#[tokio::test]
async fn sightings_are_stored_with_their_photo() {
    let service = Service::new();
    let filter = service.routes();

    let response = submit(
        "/report-sighting",
        &[
            Field::Text("type", "0"),
            Field::Text("lat", "52.5"),
            Field::Text("lon", "13.4"),
            Field::Text("description", "brown dog near the park"),
            Field::Text("phone_number", " 555-2 "),
            Field::File("photo", "dog.png", "image/png", PHOTO),
        ],
    )
    .reply(&filter)
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers().contains_key("server-timing"));

    let created: SubmissionResponse = parse(response.body());
    assert_eq!(created.message, "Sighting stored");
    assert_eq!(created.data["phone_number"], "555-2");
    assert_eq!(created.data["resolved"], false);
    assert_eq!(service.store.len(), 1);

    let photo_url = created.data["photo_url"].as_str().expect("photo URL");
    let image_id = created.data["image_id"].as_str().expect("image ID");
    assert_eq!(photo_url, format!("{}/files/{}", BASE_URL, image_id));

    let response = warp::test::request()
        .path("/my-searches?phone_number=555-2")
        .method("GET")
        .reply(&filter)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let searches: Value = parse(response.body());
    assert_eq!(searches["searches"].as_array().unwrap().len(), 1);
    assert_eq!(searches["searches"][0]["id"], created.id.to_string());

    let response = warp::test::request()
        .path(&format!("/files/{}", image_id))
        .method("GET")
        .reply(&filter)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert_eq!(response.body().as_ref(), PHOTO);
}

#[tokio::test]
async fn missing_reports_require_a_photo() {
    let service = Service::new();
    let filter = service.routes();

    let response = submit(
        "/report-missing",
        &[
            Field::Text("type", "1"),
            Field::Text("full_name", "Ann Example"),
            Field::Text("lat", "40.7"),
            Field::Text("lon", "-74.0"),
            Field::Text("missing_since", "2024-02-29"),
            Field::Text("description", "tall woman, blue coat"),
            Field::Text("phone_number", "555-1"),
        ],
    )
    .reply(&filter)
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let error: ErrorResponse = parse(response.body());
    assert!(error.message.contains("photo"));
}

#[tokio::test]
async fn missing_reports_are_listed_for_their_reporter() {
    let service = Service::new();
    let filter = service.routes();

    let response = submit(
        "/report-missing",
        &[
            Field::Text("type", "1"),
            Field::Text("full_name", "Ann Example"),
            Field::Text("lat", "40.7"),
            Field::Text("lon", "-74.0"),
            Field::Text("missing_since", "2024-02-29"),
            Field::Text("description", "tall woman, blue coat"),
            Field::Text("reward", "250"),
            Field::Text("phone_number", "555-1"),
            Field::File("photo", "ann.jpg", "image/jpeg", PHOTO),
        ],
    )
    .reply(&filter)
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let created: SubmissionResponse = parse(response.body());
    assert_eq!(created.message, "Missing report submitted");
    assert_eq!(created.data["missing_since"], "2024-02-29");
    assert_eq!(created.data["type"], 1);

    let response = warp::test::request()
        .path("/my-reports?phone_number=%20555-1%20")
        .method("GET")
        .reply(&filter)
        .await;

    let reports: Value = parse(response.body());
    assert_eq!(reports["reports"].as_array().unwrap().len(), 1);
    assert_eq!(reports["reports"][0]["id"], created.id.to_string());
}

#[tokio::test]
async fn invalid_fields_are_bad_requests() {
    let service = Service::new();
    let filter = service.routes();

    let response = submit(
        "/report-sighting",
        &[
            Field::Text("type", "3"),
            Field::Text("lat", "52.5"),
            Field::Text("lon", "13.4"),
            Field::Text("description", "parrot"),
            Field::Text("phone_number", "555-2"),
        ],
    )
    .reply(&filter)
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let error: ErrorResponse = parse(response.body());
    assert!(error.message.contains("type"));
}

#[tokio::test]
async fn potential_matches_exclude_the_reporters_own_sightings() {
    let service = Service::new();
    let filter = service.routes();

    let report = service.missing("555-1", "brown dog").await;
    service.sighting("555-1", "my own sighting").await;
    let s2 = service.sighting("555-2", "dog by the river").await;
    let s3 = service.sighting("555-3", "dog at the station").await;

    let response = warp::test::request()
        .path("/potential-matches?phone_number=555-1&limit_per_report=5")
        .method("GET")
        .reply(&filter)
        .await;

    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = parse(response.body());
    let matches = body["matches"].as_array().unwrap();
    let ids = matches
        .iter()
        .map(|m| m["id"].as_str().unwrap().to_owned())
        .collect::<Vec<_>>();

    assert_eq!(ids, vec![s2.to_string(), s3.to_string()]);
    assert!(matches
        .iter()
        .all(|m| m["source_report_id"] == report.to_string()));
    assert!(body["failed_reports"].as_array().unwrap().is_empty());
    assert_eq!(service.matcher.call_count(), 1);
}

#[tokio::test]
async fn potential_matches_use_the_default_limit() {
    let service = Service::new();
    let filter = service.routes();

    service.missing("555-1", "brown dog").await;
    for i in 0..5 {
        service.sighting(&format!("555-{}", i + 2), "dog").await;
    }

    let response = warp::test::request()
        .path("/potential-matches?phone_number=555-1")
        .method("GET")
        .reply(&filter)
        .await;

    let body: Value = parse(response.body());
    assert_eq!(body["matches"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn unreachable_repository_fails_potential_matches() {
    let service = Service::new();
    let filter = service.routes();

    service.db.set_unavailable(true);

    let response = warp::test::request()
        .path("/potential-matches?phone_number=555-1")
        .method("GET")
        .reply(&filter)
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn unknown_files_are_not_found() {
    let service = Service::new();
    let filter = service.routes();

    for id in &[Uuid::new_v4().to_string(), "not-a-blob".to_owned()] {
        let response = warp::test::request()
            .path(&format!("/files/{}", id))
            .method("GET")
            .reply(&filter)
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let error: ErrorResponse = parse(response.body());
        assert_eq!(error.blob_id.as_deref(), Some(id.as_str()));
    }
}

#[tokio::test]
async fn marking_found_updates_the_report() {
    let service = Service::new();
    let filter = service.routes();

    let report = service.missing("555-1", "brown dog").await;

    let response = warp::test::request()
        .path(&format!("/my-reports/{}/found", report))
        .method("PATCH")
        .reply(&filter)
        .await;

    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = parse(response.body());
    assert_eq!(body["ok"], true);
    assert_eq!(body["id"], report.to_string());

    let stored = service.db.missing_report(&report).unwrap();
    assert!(stored.found);
    assert!(stored.found_date.is_some());
}

#[tokio::test]
async fn marking_unknown_reports_is_not_found() {
    let service = Service::new();
    let filter = service.routes();

    for id in &[Uuid::new_v4().to_string(), "not-a-report".to_owned()] {
        let response = warp::test::request()
            .path(&format!("/my-reports/{}/found", id))
            .method("PATCH")
            .reply(&filter)
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let error: ErrorResponse = parse(response.body());
        assert_eq!(error.id.as_deref(), Some(id.as_str()));
    }
}

#[tokio::test]
async fn any_origin_may_call_the_public_routes() {
    let service = Service::new();
    service.missing("555-1", "brown labrador").await;
    let filter = service.routes();

    let response = warp::test::request()
        .path("/my-reports?phone_number=555-1")
        .method("GET")
        .header("origin", "https://volunteers.example")
        .reply(&filter)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "https://volunteers.example"
    );

    let preflight = warp::test::request()
        .path("/my-reports/abc/found")
        .method("OPTIONS")
        .header("origin", "https://volunteers.example")
        .header("access-control-request-method", "PATCH")
        .header("access-control-request-headers", "content-type")
        .reply(&filter)
        .await;

    assert_eq!(preflight.status(), StatusCode::OK);
    let allowed = preflight.headers()["access-control-allow-methods"]
        .to_str()
        .unwrap()
        .to_owned();
    assert!(allowed.contains("PATCH"));
}

#[tokio::test]
async fn healthz_reports_the_version() {
    let filter = routes::admin::make_healthz_route();

    let response = warp::test::request()
        .path("/healthz")
        .method("GET")
        .reply(&filter)
        .await;

    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = parse(response.body());
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
