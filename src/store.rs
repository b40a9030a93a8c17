use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use rusoto_core::RusotoError;
use rusoto_s3::{GetObjectError, GetObjectRequest, PutObjectRequest, S3Client, StreamingBody, S3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::StoreError;

pub mod mock;

/// A stream of bytes going into or coming out of a store.
pub type ByteStream<'a> = BoxStream<'a, Result<Bytes, io::Error>>;

/// The opaque identifier of a stored blob.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BlobId(String);

impl BlobId {
    /// Mints a fresh identifier.
    pub fn generate() -> Self {
        BlobId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The storage key, if this is an identifier the store could have minted.
    pub fn key(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.0)
            .ok()
            .filter(|key| key.to_string() == self.0)
    }
}

impl From<String> for BlobId {
    fn from(s: String) -> Self {
        BlobId(s)
    }
}

impl From<&str> for BlobId {
    fn from(s: &str) -> Self {
        BlobId(s.to_owned())
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A blob being retrieved. `body` yields the stored bytes in order;
/// chunk boundaries carry no meaning. An `Err` item means the content
/// was truncated.
pub struct Blob {
    pub content_type: Option<String>,
    pub body: ByteStream<'static>,
}

impl Blob {
    /// Drains the body into memory.
    pub async fn into_bytes(self) -> Result<Vec<u8>, io::Error> {
        self.body
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
    }
}

pub trait Store: Send + Sync {
    /// Consumes `content` and saves it under a freshly minted ID. Nothing
    /// is retrievable unless the whole stream was read successfully.
    fn save<'a>(
        &'a self,
        name: &'a str,
        content_type: Option<String>,
        content: ByteStream<'a>,
    ) -> BoxFuture<'a, Result<BlobId, StoreError>>;

    /// Opens the blob with the given ID for streaming.
    fn fetch<'a>(&'a self, id: &'a BlobId) -> BoxFuture<'a, Result<Blob, StoreError>>;
}

/// Reads a whole upload into one contiguous buffer.
pub(crate) async fn collect(content: ByteStream<'_>) -> Result<Bytes, StoreError> {
    let buffer = content
        .try_fold(BytesMut::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await
        .map_err(|source| StoreError::ContentUnreadable { source })?;

    Ok(buffer.freeze())
}

/// A store that saves its data to S3.
pub struct S3Store {
    client: Arc<S3Client>,
    bucket: String,
}

impl S3Store {
    /// Creates a new instance.
    pub fn new(client: Arc<S3Client>, bucket: String) -> Self {
        Self { client, bucket }
    }

    pub fn from_env() -> Result<Self, rusoto_core::request::TlsError> {
        use rusoto_core::request::HttpClient;
        use rusoto_core::Region;
        use rusoto_credential::StaticProvider;

        use crate::config::get_variable;

        let access_key = get_variable("S3_ACCESS_KEY");
        let secret_access_key = get_variable("S3_SECRET_ACCESS_KEY");

        let region = Region::Custom {
            name: get_variable("S3_REGION_NAME"),
            endpoint: get_variable("S3_ENDPOINT"),
        };

        let bucket = get_variable("S3_BUCKET_NAME");

        let client = Arc::new(S3Client::new_with(
            HttpClient::new()?,
            StaticProvider::new_minimal(access_key, secret_access_key),
            region,
        ));

        Ok(S3Store::new(client, bucket))
    }
}

impl Store for S3Store {
    fn save<'a>(
        &'a self,
        name: &'a str,
        content_type: Option<String>,
        content: ByteStream<'a>,
    ) -> BoxFuture<'a, Result<BlobId, StoreError>> {
        upload(self, name, content_type, content).boxed()
    }

    fn fetch<'a>(&'a self, id: &'a BlobId) -> BoxFuture<'a, Result<Blob, StoreError>> {
        download(self, id).boxed()
    }
}

async fn upload(
    store: &S3Store,
    name: &str,
    content_type: Option<String>,
    content: ByteStream<'_>,
) -> Result<BlobId, StoreError> {
    use std::convert::TryFrom;

    // S3 needs the length up front, and a failed read must not leave a
    // partial object behind, so the upload is buffered exactly once
    let raw = collect(content).await?;
    let len = i64::try_from(raw.len()).map_err(|_| StoreError::ContentUnreadable {
        source: io::Error::new(io::ErrorKind::InvalidData, "content too large"),
    })?;

    let id = BlobId::generate();
    let request = put_request(&store.bucket, &id, name, content_type, raw, len);

    store
        .client
        .put_object(request)
        .await
        .map_err(|source| StoreError::UploadFailed { source })?;

    Ok(id)
}

/// Builds the upload request. `raw` is handed to the body as is.
fn put_request(
    bucket: &str,
    id: &BlobId,
    name: &str,
    content_type: Option<String>,
    raw: Bytes,
    len: i64,
) -> PutObjectRequest {
    let mut metadata = HashMap::new();
    metadata.insert("filename".to_owned(), name.to_owned());

    PutObjectRequest {
        body: Some(StreamingBody::new(stream::once(future::ready(Ok(raw))))),
        bucket: bucket.to_owned(),
        content_length: Some(len),
        content_type,
        key: id.to_string(),
        metadata: Some(metadata),
        ..Default::default()
    }
}

async fn download(store: &S3Store, id: &BlobId) -> Result<Blob, StoreError> {
    let key = id.key().ok_or_else(|| StoreError::NotFound(id.clone()))?;

    let request = GetObjectRequest {
        bucket: store.bucket.clone(),
        key: key.to_string(),
        ..Default::default()
    };

    let output = store
        .client
        .get_object(request)
        .await
        .map_err(|e| map_download_error(id, e))?;

    let body = output
        .body
        .ok_or_else(|| StoreError::MissingBody(id.clone()))?;

    Ok(Blob {
        content_type: output.content_type,
        body: body.boxed(),
    })
}

fn map_download_error(id: &BlobId, error: RusotoError<GetObjectError>) -> StoreError {
    match error {
        RusotoError::Service(GetObjectError::NoSuchKey(_)) => StoreError::NotFound(id.clone()),
        // some S3-compatible servers answer a bare 404 instead
        RusotoError::Unknown(ref response) if response.status.as_u16() == 404 => {
            StoreError::NotFound(id.clone())
        }
        source => StoreError::DownloadFailed { source },
    }
}
