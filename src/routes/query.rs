use serde::Deserialize;

use crate::normalization;

#[derive(Debug, Deserialize)]
pub struct PhoneQuery {
    #[serde(deserialize_with = "normalization::deserialize")]
    pub phone_number: String,
}

#[derive(Debug, Deserialize)]
pub struct MatchesQuery {
    #[serde(deserialize_with = "normalization::deserialize")]
    pub phone_number: String,

    /// Falls back to the configured default when absent.
    pub limit_per_report: Option<usize>,
}
