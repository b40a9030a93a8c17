//! Correlates a reporter's missing reports with everyone else's sightings.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use log::{debug, o, warn, Logger};
use serde::Serialize;
use uuid::Uuid;

use crate::db::Db;
use crate::errors::{BackendError, StoreError};
use crate::matcher::{MatchError, MatchQuery, Matcher, RankedCandidate};
use crate::report::{MissingReport, PhoneFilter, SightingReport};
use crate::store::{BlobId, Store};

/// A ranked sighting, tagged with the missing report it was found for.
#[derive(Clone, Debug, Serialize)]
pub struct Match {
    #[serde(flatten)]
    pub candidate: RankedCandidate,

    pub source_report_id: Uuid,
}

/// A missing report whose matching failed and so contributed nothing.
#[derive(Clone, Debug, Serialize)]
pub struct FailedReport {
    pub report_id: Uuid,
    pub reason: String,
}

/// The outcome of one correlation request.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Correlation {
    /// Per-report matches, concatenated in report order.
    pub matches: Vec<Match>,

    pub failed_reports: Vec<FailedReport>,
}

/// The photograph of a missing report, as far as the store could tell.
#[derive(Debug, PartialEq)]
pub enum ResolvedImage {
    Found(Vec<u8>),
    Missing,
}

impl ResolvedImage {
    /// The bytes to match on. A missing image matches as an empty one.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            ResolvedImage::Found(bytes) => bytes,
            ResolvedImage::Missing => vec![],
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CorrelationSettings {
    /// How long one report's matching call may take.
    pub match_timeout: Duration,

    /// How many reports are matched at the same time.
    pub concurrency: usize,
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        Self {
            match_timeout: Duration::from_secs(30),
            concurrency: 4,
        }
    }
}

#[derive(Clone)]
pub struct Correlator {
    logger: Arc<Logger>,
    db: Arc<dyn Db + Send + Sync>,
    store: Arc<dyn Store>,
    matcher: Arc<dyn Matcher>,
    settings: CorrelationSettings,
}

impl Correlator {
    pub fn new(
        logger: Arc<Logger>,
        db: Arc<dyn Db + Send + Sync>,
        store: Arc<dyn Store>,
        matcher: Arc<dyn Matcher>,
        settings: CorrelationSettings,
    ) -> Self {
        Self {
            logger,
            db,
            store,
            matcher,
            settings,
        }
    }

    /// Finds up to `limit_per_report` sightings for each missing report
    /// filed by `phone_number`.
    ///
    /// The sighting pool (everything not filed by `phone_number`) is
    /// queried once and shared by all reports. A report whose image
    /// cannot be resolved is matched without one; a report whose
    /// matching fails contributes nothing and is listed in
    /// `failed_reports`. Only failing to build the two report sets
    /// fails the whole request.
    pub async fn find_potential_matches(
        &self,
        phone_number: &str,
        limit_per_report: usize,
    ) -> Result<Correlation, BackendError> {
        let logger = self
            .logger
            .new(o!("phone_number" => phone_number.to_owned()));

        let mine = self
            .db
            .find_missing(phone_number)
            .await?;

        if mine.is_empty() {
            debug!(logger, "No missing reports to match");
            return Ok(Correlation::default());
        }

        let pool = self
            .db
            .find_sightings(&PhoneFilter::IsNot(phone_number.to_owned()))
            .await?;

        debug!(logger, "Matching reports..."; "reports" => mine.len(), "pool" => pool.len());

        let pool = pool.as_slice();
        let logger = &logger;

        // `buffered` yields in input order, whatever order the calls finish in
        let outcomes = stream::iter(mine)
            .map(|report| async move {
                let outcome = self
                    .match_report(logger, &report, pool, limit_per_report)
                    .await;
                (report.id, outcome)
            })
            .buffered(self.settings.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        let mut correlation = Correlation::default();

        for (report_id, outcome) in outcomes {
            match outcome {
                Ok(matches) => correlation.matches.extend(matches),
                Err(e) => {
                    warn!(logger, "Matching failed for report"; "report_id" => %report_id, "error" => %e);
                    correlation.failed_reports.push(FailedReport {
                        report_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        debug!(logger, "Matched reports"; "matches" => correlation.matches.len(), "failed" => correlation.failed_reports.len());

        Ok(correlation)
    }

    async fn match_report(
        &self,
        logger: &Logger,
        report: &MissingReport,
        pool: &[SightingReport],
        limit: usize,
    ) -> Result<Vec<Match>, MatchError> {
        let logger = logger.new(o!("report_id" => report.id.to_string()));

        let image = self
            .resolve_image(&logger, report.image_id.as_ref())
            .await
            .into_bytes();

        let query = MatchQuery {
            description: report.description.clone(),
            image,
            location: Some(report.last_seen_location),
        };

        let ranked = tokio::time::timeout(self.settings.match_timeout, self.matcher.rank(&query, pool))
            .await
            .map_err(|_| MatchError::TimedOut(self.settings.match_timeout))??;

        Ok(ranked
            .into_iter()
            .take(limit)
            .map(|candidate| Match {
                candidate,
                source_report_id: report.id,
            })
            .collect())
    }

    /// Fetches a report's photograph. Never fails: anything short of
    /// the complete content counts as no image.
    pub async fn resolve_image(&self, logger: &Logger, id: Option<&BlobId>) -> ResolvedImage {
        let id = match id {
            Some(id) => id,
            None => return ResolvedImage::Missing,
        };

        let blob = match self.store.fetch(id).await {
            Ok(blob) => blob,
            Err(StoreError::NotFound(_)) => {
                debug!(logger, "Image not found in store"; "blob_id" => %id);
                return ResolvedImage::Missing;
            }
            Err(e) => {
                warn!(logger, "Could not open image"; "blob_id" => %id, "error" => %e);
                return ResolvedImage::Missing;
            }
        };

        match blob.into_bytes().await {
            Ok(bytes) => ResolvedImage::Found(bytes),
            Err(e) => {
                warn!(logger, "Image stream was truncated"; "blob_id" => %id, "error" => %e);
                ResolvedImage::Missing
            }
        }
    }
}
