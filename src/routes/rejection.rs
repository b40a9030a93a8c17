use serde::Serialize;
use warp::reject;

use crate::errors::BackendError;

#[derive(Debug)]
pub struct Rejection {
    pub(crate) context: Context,
    pub(crate) error: BackendError,
}

impl Rejection {
    pub fn new(context: Context, error: BackendError) -> Self {
        Rejection { context, error }
    }

    pub fn flatten(&self) -> FlattenedRejection {
        FlattenedRejection {
            context: self.context.clone(),
            message: format!("{}", self.error),
        }
    }
}

impl reject::Reject for Rejection {}

#[derive(Debug, Serialize)]
pub struct FlattenedRejection {
    #[serde(flatten)]
    pub(crate) context: Context,
    pub(crate) message: String,
}

/// What the failing request was about, echoed back beside the message.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Context {
    File { blob_id: String },
    MarkFound { id: String },
    MyReports { phone_number: String },
    MySearches { phone_number: String },
    PotentialMatches { phone_number: String },
    ReportMissing,
    ReportSighting,
}

impl Context {
    pub fn file(blob_id: String) -> Context {
        Context::File { blob_id }
    }

    pub fn mark_found(id: String) -> Context {
        Context::MarkFound { id }
    }

    pub fn my_reports(phone_number: String) -> Context {
        Context::MyReports { phone_number }
    }

    pub fn my_searches(phone_number: String) -> Context {
        Context::MySearches { phone_number }
    }

    pub fn potential_matches(phone_number: String) -> Context {
        Context::PotentialMatches { phone_number }
    }

    pub fn report_missing() -> Context {
        Context::ReportMissing
    }

    pub fn report_sighting() -> Context {
        Context::ReportSighting
    }
}
