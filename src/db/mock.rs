use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use futures::future::{BoxFuture, FutureExt};
use uuid::Uuid;

use crate::db::Db;
use crate::errors::BackendError;
use crate::report::{
    MissingReport, MissingReportPatch, NewMissingReport, NewSightingReport, PhoneFilter,
    SightingReport,
};

/// A repository that keeps both collections in memory.
#[derive(Default)]
pub struct MockDb {
    missing: RwLock<Vec<MissingReport>>,
    sightings: RwLock<Vec<SightingReport>>,
    unavailable: AtomicBool,
    sighting_queries: AtomicUsize,
}

impl MockDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// How many times the sighting collection has been queried.
    pub fn sighting_queries(&self) -> usize {
        self.sighting_queries.load(Ordering::SeqCst)
    }

    pub fn missing_report(&self, id: &Uuid) -> Option<MissingReport> {
        self.missing
            .read()
            .expect("read missing reports")
            .iter()
            .find(|r| &r.id == id)
            .cloned()
    }

    fn check_available(&self) -> Result<(), BackendError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(BackendError::Sqlx {
                source: sqlx::Error::PoolTimedOut,
            })
        } else {
            Ok(())
        }
    }
}

impl Db for MockDb {
    fn insert_missing(
        &self,
        report: NewMissingReport,
    ) -> BoxFuture<Result<MissingReport, BackendError>> {
        async move {
            self.check_available()?;

            let report = report.into_report(Uuid::new_v4());
            self.missing
                .write()
                .expect("write missing reports")
                .push(report.clone());

            Ok(report)
        }
        .boxed()
    }

    fn insert_sighting(
        &self,
        report: NewSightingReport,
    ) -> BoxFuture<Result<SightingReport, BackendError>> {
        async move {
            self.check_available()?;

            let report = report.into_report(Uuid::new_v4());
            self.sightings
                .write()
                .expect("write sightings")
                .push(report.clone());

            Ok(report)
        }
        .boxed()
    }

    fn find_missing(
        &self,
        phone_number: &str,
    ) -> BoxFuture<Result<Vec<MissingReport>, BackendError>> {
        let phone_number = phone_number.to_owned();

        async move {
            self.check_available()?;

            Ok(self
                .missing
                .read()
                .expect("read missing reports")
                .iter()
                .filter(|r| r.phone_number == phone_number)
                .cloned()
                .collect())
        }
        .boxed()
    }

    fn find_sightings(
        &self,
        filter: &PhoneFilter,
    ) -> BoxFuture<Result<Vec<SightingReport>, BackendError>> {
        let filter = filter.clone();

        async move {
            self.sighting_queries.fetch_add(1, Ordering::SeqCst);
            self.check_available()?;

            Ok(self
                .sightings
                .read()
                .expect("read sightings")
                .iter()
                .filter(|r| filter.accepts(&r.phone_number))
                .cloned()
                .collect())
        }
        .boxed()
    }

    fn update_missing(
        &self,
        id: &Uuid,
        patch: MissingReportPatch,
    ) -> BoxFuture<Result<u64, BackendError>> {
        let id = *id;

        async move {
            self.check_available()?;

            let mut missing = self.missing.write().expect("write missing reports");

            Ok(match missing.iter_mut().find(|r| r.id == id) {
                Some(report) => {
                    patch.apply(report);
                    1
                }
                None => 0,
            })
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::iso_date;
    use crate::report::{Location, SubjectKind};

    fn missing(phone_number: &str) -> NewMissingReport {
        NewMissingReport {
            kind: SubjectKind::Pet,
            full_name: "Rex".to_owned(),
            last_seen_location: Location::new(0.0, 0.0),
            missing_since: iso_date::parse("2024-01-01").unwrap(),
            description: "brown dog".to_owned(),
            reward: None,
            phone_number: phone_number.to_owned(),
            image_id: None,
            photo_url: None,
        }
    }

    #[tokio::test]
    async fn missing_reports_are_found_by_their_reporter_only() {
        let db = MockDb::new();
        let mine = db.insert_missing(missing("555-1")).await.unwrap();
        db.insert_missing(missing("555-2")).await.unwrap();

        let found = db.find_missing("555-1").await.unwrap();

        assert_eq!(found, vec![mine]);
        assert!(db.find_missing("555-9").await.unwrap().is_empty());
    }
}
