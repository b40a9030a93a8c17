//! State transitions on stored reports.

use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::Db;
use crate::errors::BackendError;
use crate::report::MissingReportPatch;

/// Parses a report ID from a path segment. Anything that could not have
/// been issued is simply a report that doesn't exist.
pub fn parse_report_id(raw: &str) -> Result<Uuid, BackendError> {
    Uuid::parse_str(raw).map_err(|_| BackendError::ReportNotFound(raw.to_owned()))
}

/// Marks a missing report as found now and returns the instant
/// recorded. Marking it again only moves `found_date`.
pub async fn mark_found(
    db: &(dyn Db + Send + Sync),
    id: &Uuid,
) -> Result<OffsetDateTime, BackendError> {
    let now = OffsetDateTime::now_utc();
    let matched = db.update_missing(id, MissingReportPatch::found_at(now)).await?;

    if matched == 0 {
        Err(BackendError::report_not_found(id))
    } else {
        Ok(now)
    }
}
