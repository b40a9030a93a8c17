use std::sync::Arc;
use std::time::Duration;

use log::Logger;

use crate::config::parse_variable_or;
use crate::correlation::{CorrelationSettings, Correlator};
use crate::db::Db;
use crate::matcher::Matcher;
use crate::store::Store;
use crate::urls::Urls;

/// Everything a request handler may touch, built once at startup and
/// cloned into each route.
#[derive(Clone)]
pub struct Environment {
    pub logger: Arc<Logger>,
    pub db: Arc<dyn Db + Send + Sync>,
    pub urls: Arc<Urls>,
    pub store: Arc<dyn Store>,
    pub matcher: Arc<dyn Matcher>,
    pub config: Config,
}

impl Environment {
    pub fn new(
        logger: Arc<Logger>,
        db: Arc<dyn Db + Send + Sync>,
        urls: Arc<Urls>,
        store: Arc<dyn Store>,
        matcher: Arc<dyn Matcher>,
        config: Config,
    ) -> Self {
        Self {
            logger,
            db,
            urls,
            store,
            matcher,
            config,
        }
    }

    pub fn correlator(&self) -> Correlator {
        Correlator::new(
            self.logger.clone(),
            self.db.clone(),
            self.store.clone(),
            self.matcher.clone(),
            self.config.correlation,
        )
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub(crate) default_limit_per_report: usize,
    pub(crate) correlation: CorrelationSettings,
}

impl Config {
    pub fn new(default_limit_per_report: usize, correlation: CorrelationSettings) -> Self {
        Self {
            default_limit_per_report,
            correlation,
        }
    }

    /// How many sightings each missing report keeps when the caller
    /// doesn't say.
    pub fn default_limit_per_report(&self) -> usize {
        self.default_limit_per_report
    }

    pub fn from_env() -> Self {
        let defaults = CorrelationSettings::default();

        let timeout_seconds = parse_variable_or(
            "BACKEND_MATCHER_TIMEOUT_SECONDS",
            defaults.match_timeout.as_secs(),
        );

        Self::new(
            parse_variable_or("BACKEND_DEFAULT_LIMIT_PER_REPORT", 3),
            CorrelationSettings {
                match_timeout: Duration::from_secs(timeout_seconds),
                concurrency: parse_variable_or("BACKEND_MATCH_CONCURRENCY", defaults.concurrency),
            },
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(3, CorrelationSettings::default())
    }
}
