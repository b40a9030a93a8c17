//! The client side of the external content-matching service.
//!
//! The service scores a pool of sightings against one description, one
//! (possibly empty) image and an optional location, and answers with
//! the candidates it considers plausible, best first. How it scores is
//! its own business; this module only relies on the ordering.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use log::{trace, warn, Logger};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::report::{Location, SightingReport};

pub mod mock;

/// What one missing report is matched on.
#[derive(Clone, Debug)]
pub struct MatchQuery {
    pub description: String,

    /// The photograph, or an empty buffer if none could be resolved.
    pub image: Vec<u8>,

    pub location: Option<Location>,
}

/// One sighting as ranked by the matching service.
#[derive(Clone, Debug, Serialize)]
pub struct RankedCandidate {
    #[serde(flatten)]
    pub sighting: SightingReport,

    /// Higher is more likely. The scale belongs to the service.
    pub score: f64,

    /// Whatever else the service said about this candidate.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Could not encode matching request")]
    Encode { source: serde_json::Error },

    #[error("Matching request failed")]
    Request { source: reqwest::Error },

    #[error("Matching service rejected request with status {status}")]
    Rejected { status: u16 },

    #[error("Malformed matching response")]
    Decode { source: reqwest::Error },

    #[error("Matching timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Matching service unavailable: {0}")]
    Unavailable(String),
}

pub trait Matcher: Send + Sync {
    /// Ranks `candidates` against `query`, best first. Empty images,
    /// empty pools and absent locations are all valid inputs.
    fn rank<'a>(
        &'a self,
        query: &'a MatchQuery,
        candidates: &'a [SightingReport],
    ) -> BoxFuture<'a, Result<Vec<RankedCandidate>, MatchError>>;
}

/// Talks to the matching service over HTTP.
pub struct HttpMatcher {
    logger: Arc<Logger>,
    client: reqwest::Client,
    url: Url,
}

#[derive(Deserialize)]
struct MatchResponse {
    results: Vec<ScoredId>,

    #[serde(default)]
    metadata: Option<Value>,
}

#[derive(Deserialize)]
struct ScoredId {
    id: Uuid,
    score: f64,

    #[serde(flatten)]
    details: Map<String, Value>,
}

impl HttpMatcher {
    pub fn new(logger: Arc<Logger>, url: Url) -> Self {
        Self {
            logger,
            client: reqwest::Client::new(),
            url,
        }
    }

    pub fn from_env(logger: Arc<Logger>) -> Self {
        use crate::config::get_variable;

        let url = get_variable("BACKEND_MATCHER_URL");
        let url = Url::parse(&url).unwrap_or_else(|_| panic!("parse {} as URL", url));

        Self::new(logger, url)
    }
}

impl Matcher for HttpMatcher {
    fn rank<'a>(
        &'a self,
        query: &'a MatchQuery,
        candidates: &'a [SightingReport],
    ) -> BoxFuture<'a, Result<Vec<RankedCandidate>, MatchError>> {
        request_ranking(self, query, candidates).boxed()
    }
}

async fn request_ranking(
    matcher: &HttpMatcher,
    query: &MatchQuery,
    candidates: &[SightingReport],
) -> Result<Vec<RankedCandidate>, MatchError> {
    use reqwest::multipart::{Form, Part};

    let encoded_candidates =
        serde_json::to_string(candidates).map_err(|source| MatchError::Encode { source })?;

    let mut form = Form::new()
        .text("description", query.description.clone())
        .text("candidates", encoded_candidates)
        .part("image", Part::bytes(query.image.clone()).file_name("image"));

    if let Some(location) = &query.location {
        let encoded_location =
            serde_json::to_string(location).map_err(|source| MatchError::Encode { source })?;
        form = form.text("location", encoded_location);
    }

    let response = matcher
        .client
        .post(matcher.url.clone())
        .multipart(form)
        .send()
        .await
        .map_err(|source| MatchError::Request { source })?;

    let status = response.status();
    if !status.is_success() {
        return Err(MatchError::Rejected {
            status: status.as_u16(),
        });
    }

    let response: MatchResponse = response
        .json()
        .await
        .map_err(|source| MatchError::Decode { source })?;

    trace!(matcher.logger, "Matching service responded"; "results" => response.results.len(), "metadata" => ?response.metadata);

    Ok(attach_candidates(&matcher.logger, response.results, candidates))
}

/// Swaps the IDs the service returned for the sightings they name,
/// keeping the service's order. IDs outside the pool are dropped.
fn attach_candidates(
    logger: &Logger,
    results: Vec<ScoredId>,
    candidates: &[SightingReport],
) -> Vec<RankedCandidate> {
    let by_id = candidates
        .iter()
        .map(|c| (c.id, c))
        .collect::<HashMap<_, _>>();

    results
        .into_iter()
        .filter_map(|result| match by_id.get(&result.id) {
            Some(sighting) => Some(RankedCandidate {
                sighting: (*sighting).clone(),
                score: result.score,
                details: result.details,
            }),
            None => {
                warn!(logger, "Matching service returned unknown candidate"; "id" => %result.id);
                None
            }
        })
        .collect()
}
