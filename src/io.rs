use std::collections::HashMap;
use std::io;
use std::str::FromStr;

use bytes::{Buf, Bytes};
use futures::stream::{StreamExt, TryStreamExt};
use warp::multipart::{FormData, Part};

use crate::errors::{BackendError, StoreError};
use crate::store::{BlobId, Store};

/// Collects chunks of [`Part`].
pub async fn part_as_vec(raw: Part) -> Result<Vec<u8>, io::Error> {
    part_as_stream(raw)
        .try_fold(Vec::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await
}

/// Collects raw data from [`Part`].
pub fn part_as_stream(raw: Part) -> impl futures::Stream<Item = Result<Bytes, io::Error>> {
    raw.stream().map(|r| {
        r.map(|mut x| x.copy_to_bytes(x.remaining()))
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "could not retrieve chunk"))
    })
}

/// A photo that could not be read off the request is the client's fault;
/// anything else went wrong on the store's side.
fn upload_error(error: StoreError) -> BackendError {
    match error {
        StoreError::ContentUnreadable { .. } => BackendError::MalformedFormSubmission,
        source => BackendError::from(source),
    }
}

/// A parsed form submission: its text fields, plus the ID of the file
/// that was streamed into the store, if one was attached.
#[derive(Debug, Default)]
pub struct Submission {
    fields: HashMap<String, String>,
    pub(crate) file: Option<BlobId>,
}

impl Submission {
    /// Reads `form`. The part named `file_field` is streamed straight into
    /// `store`; every other part is read as UTF-8 text. A file part with
    /// no file name counts as no file.
    pub async fn read(
        form: FormData,
        store: &dyn Store,
        file_field: &str,
    ) -> Result<Self, BackendError> {
        futures::pin_mut!(form);

        let mut submission = Submission::default();

        while let Some(part) = form
            .try_next()
            .await
            .map_err(|_| BackendError::MalformedFormSubmission)?
        {
            let name = part.name().to_owned();

            if name == file_field {
                let filename = part.filename().unwrap_or_default().to_owned();

                if filename.is_empty() {
                    continue;
                }

                let content_type = part.content_type().map(str::to_owned);
                let id = store
                    .save(&filename, content_type, part_as_stream(part).boxed())
                    .await
                    .map_err(upload_error)?;

                submission.file = Some(id);
            } else {
                let raw = part_as_vec(part)
                    .await
                    .map_err(|_| BackendError::MalformedFormSubmission)?;
                let value =
                    String::from_utf8(raw).map_err(|_| BackendError::MalformedFormSubmission)?;

                submission.fields.insert(name, value);
            }
        }

        Ok(submission)
    }

    pub fn text(&self, name: &'static str) -> Result<&str, BackendError> {
        self.fields
            .get(name)
            .map(String::as_str)
            .ok_or(BackendError::MissingField(name))
    }

    pub fn parse<T: FromStr>(&self, name: &'static str) -> Result<T, BackendError> {
        let value = self.text(name)?;

        value.trim().parse().map_err(|_| BackendError::InvalidField {
            name,
            value: value.to_owned(),
        })
    }

    /// Like `parse`, but a missing or blank field is `None`.
    pub fn parse_optional<T: FromStr>(&self, name: &'static str) -> Result<Option<T>, BackendError> {
        match self.fields.get(name) {
            Some(value) if !value.trim().is_empty() => self.parse(name).map(Some),
            _ => Ok(None),
        }
    }

    #[cfg(test)]
    pub(crate) fn from_fields<'a>(fields: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Submission {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
            file: None,
        }
    }
}
