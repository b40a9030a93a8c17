use serde::Serialize;
use uuid::Uuid;

use crate::correlation::Correlation;
use crate::report::{MissingReport, SightingReport};

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Submitted {
    Missing(MissingReport),
    Sighting(SightingReport),
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SuccessResponse<'a> {
    Found {
        ok: bool,
        id: Uuid,
    },
    Healthz {
        revision: Option<&'a str>,
        timestamp: Option<&'a str>,
        version: &'a str,
    },
    Matches(Correlation),
    Reports {
        reports: Vec<MissingReport>,
    },
    Searches {
        searches: Vec<SightingReport>,
    },
    Submitted {
        message: &'a str,
        id: Uuid,
        data: Submitted,
    },
}
