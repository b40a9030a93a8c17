//! Serde adapters for the date types stored on reports.

/// Calendar dates as `YYYY-MM-DD`.
pub mod iso_date {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use time::Date;

    const FORMAT: &str = "%F";

    /// Parses a `YYYY-MM-DD` string.
    ///
    /// ```
    /// use reunite::dates::iso_date;
    /// let date = iso_date::parse("2024-03-09").unwrap();
    /// assert_eq!(iso_date::format(&date), "2024-03-09");
    /// ```
    pub fn parse(s: impl AsRef<str>) -> Result<Date, time::ParseError> {
        Date::parse(s.as_ref(), FORMAT)
    }

    pub fn format(date: &Date) -> String {
        date.format(FORMAT)
    }

    pub fn serialize<S>(date: &Date, serializer: S) -> Result<S::Ok, S::Error>
    where S: Serializer {
        serializer.serialize_str(&format(date))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Date, D::Error>
    where D: Deserializer<'de> {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(de::Error::custom)
    }
}

/// Optional instants as Unix timestamps, matching `time::serde::timestamp`.
pub mod optional_timestamp {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;

    pub fn serialize<S>(instant: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where S: Serializer {
        match instant {
            Some(instant) => serializer.serialize_some(&instant.unix_timestamp()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
    where D: Deserializer<'de> {
        let timestamp: Option<i64> = Deserialize::deserialize(deserializer)?;
        Ok(timestamp.map(OffsetDateTime::from_unix_timestamp))
    }
}
