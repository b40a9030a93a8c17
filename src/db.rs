use futures::future::BoxFuture;
use uuid::Uuid;

use crate::errors::BackendError;
use crate::report::{
    MissingReport, MissingReportPatch, NewMissingReport, NewSightingReport, PhoneFilter,
    SightingReport,
};

pub mod mock;

/// Access to the two report collections. Results of the `find_*`
/// methods come back in no particular order.
pub trait Db {
    fn insert_missing(&self, report: NewMissingReport)
        -> BoxFuture<Result<MissingReport, BackendError>>;

    fn insert_sighting(
        &self,
        report: NewSightingReport,
    ) -> BoxFuture<Result<SightingReport, BackendError>>;

    /// The missing reports filed by `phone_number`.
    fn find_missing(&self, phone_number: &str)
        -> BoxFuture<Result<Vec<MissingReport>, BackendError>>;

    fn find_sightings(
        &self,
        filter: &PhoneFilter,
    ) -> BoxFuture<Result<Vec<SightingReport>, BackendError>>;

    /// Applies `patch` to the missing report with the given ID and
    /// returns how many records matched (zero or one).
    fn update_missing(
        &self,
        id: &Uuid,
        patch: MissingReportPatch,
    ) -> BoxFuture<Result<u64, BackendError>>;
}

pub use self::postgres::*;

mod postgres {
    use std::convert::TryFrom;

    use futures::future::BoxFuture;
    use futures::FutureExt;
    use sqlx::{
        self,
        postgres::{PgPool, PgRow},
    };
    use time::{Date, OffsetDateTime};
    use uuid::Uuid;

    use crate::errors::BackendError;
    use crate::report::{
        Location, MissingReport, MissingReportPatch, NewMissingReport, NewSightingReport,
        PhoneFilter, SightingReport, SubjectKind,
    };
    use crate::store::BlobId;

    pub struct PgDb {
        pool: PgPool,
    }

    impl PgDb {
        pub fn new(pool: PgPool) -> Self {
            PgDb { pool }
        }
    }

    // these can be simplified once async functions in traits are stabilized
    impl super::Db for PgDb {
        fn insert_missing(
            &self,
            report: NewMissingReport,
        ) -> BoxFuture<Result<MissingReport, BackendError>> {
            async move {
                let query = sqlx::query_as(include_str!("queries/insert_missing.sql"));

                let (id,): (Uuid,) = query
                    .bind(i16::from(report.kind))
                    .bind(report.full_name.clone())
                    .bind(report.last_seen_location.lat)
                    .bind(report.last_seen_location.lon)
                    .bind(report.missing_since)
                    .bind(report.description.clone())
                    .bind(report.reward)
                    .bind(report.phone_number.clone())
                    .bind(report.image_id.as_ref().map(BlobId::to_string))
                    .bind(report.photo_url.clone())
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(report.into_report(id))
            }
            .boxed()
        }

        fn insert_sighting(
            &self,
            report: NewSightingReport,
        ) -> BoxFuture<Result<SightingReport, BackendError>> {
            async move {
                let query = sqlx::query_as(include_str!("queries/insert_sighting.sql"));

                let (id,): (Uuid,) = query
                    .bind(i16::from(report.kind))
                    .bind(report.last_seen_location.lat)
                    .bind(report.last_seen_location.lon)
                    .bind(report.description.clone())
                    .bind(report.phone_number.clone())
                    .bind(report.image_id.as_ref().map(BlobId::to_string))
                    .bind(report.photo_url.clone())
                    .bind(report.created)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(report.into_report(id))
            }
            .boxed()
        }

        fn find_missing(
            &self,
            phone_number: &str,
        ) -> BoxFuture<Result<Vec<MissingReport>, BackendError>> {
            let phone_number = phone_number.to_owned();

            async move {
                let query = sqlx::query(include_str!("queries/find_missing_by_phone.sql"));

                let reports = query
                    .bind(phone_number)
                    .try_map(|row: PgRow| missing_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(reports)
            }
            .boxed()
        }

        fn find_sightings(
            &self,
            filter: &PhoneFilter,
        ) -> BoxFuture<Result<Vec<SightingReport>, BackendError>> {
            let filter = filter.clone();

            async move {
                let query = match filter {
                    PhoneFilter::Is(_) => {
                        sqlx::query(include_str!("queries/find_sightings_by_phone.sql"))
                    }
                    PhoneFilter::IsNot(_) => {
                        sqlx::query(include_str!("queries/find_sightings_excluding_phone.sql"))
                    }
                };

                let reports = query
                    .bind(filter.phone_number().to_owned())
                    .try_map(|row: PgRow| sighting_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(reports)
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
                let query = sqlx::query(include_str!("queries/update_missing.sql"));

                // Postgres counts matched rows, even when nothing changes
                let count = query
                    .bind(id)
                    .bind(patch.found)
                    .bind(patch.found_date)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                Ok(count)
            }
            .boxed()
        }
    }

    fn missing_from_row(row: &PgRow) -> Result<MissingReport, sqlx::Error> {
        let missing_since: Date = try_get(row, "missing_since")?;
        let found_date: Option<OffsetDateTime> = try_get(row, "found_date")?;
        let image_id: Option<String> = try_get(row, "image_id")?;

        Ok(MissingReport {
            id: try_get(row, "id")?,
            kind: kind_from_row(row)?,
            full_name: try_get(row, "full_name")?,
            last_seen_location: location_from_row(row)?,
            missing_since,
            description: try_get(row, "description")?,
            reward: try_get(row, "reward")?,
            phone_number: try_get(row, "phone_number")?,
            image_id: image_id.map(BlobId::from),
            photo_url: try_get(row, "photo_url")?,
            found: try_get(row, "found")?,
            found_date,
        })
    }

    fn sighting_from_row(row: &PgRow) -> Result<SightingReport, sqlx::Error> {
        let created: OffsetDateTime = try_get(row, "created")?;
        let image_id: Option<String> = try_get(row, "image_id")?;

        Ok(SightingReport {
            id: try_get(row, "id")?,
            kind: kind_from_row(row)?,
            last_seen_location: location_from_row(row)?,
            description: try_get(row, "description")?,
            phone_number: try_get(row, "phone_number")?,
            image_id: image_id.map(BlobId::from),
            photo_url: try_get(row, "photo_url")?,
            created,
            resolved: try_get(row, "resolved")?,
        })
    }

    fn kind_from_row(row: &PgRow) -> Result<SubjectKind, sqlx::Error> {
        let tag: i16 = try_get(row, "kind")?;

        // the table constrains the tag, so this only fails if the
        // schema and the code disagree
        SubjectKind::try_from(tag).map_err(|e| sqlx::Error::Decode(Box::new(e)))
    }

    fn location_from_row(row: &PgRow) -> Result<Location, sqlx::Error> {
        Ok(Location::new(try_get(row, "lat")?, try_get(row, "lon")?))
    }

    fn try_get<'a, T: sqlx::Type<sqlx::Postgres> + sqlx::decode::Decode<'a, sqlx::Postgres>>(
        row: &'a PgRow,
        column: &str,
    ) -> Result<T, sqlx::Error> {
        use sqlx::prelude::*;

        row.try_get(column)
    }

    fn map_sqlx_error(error: sqlx::Error) -> BackendError {
        BackendError::Sqlx { source: error }
    }
}
