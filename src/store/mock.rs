use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};

use crate::errors::StoreError;
use crate::store::{collect, Blob, BlobId, ByteStream, Store};

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// A store that keeps blobs in memory and replays them in fixed-size chunks.
pub struct MockStore {
    map: RwLock<HashMap<BlobId, StoredBlob>>,
    chunk_size: usize,
}

struct StoredBlob {
    content_type: Option<String>,
    content: Bytes,
}

impl Default for MockStore {
    fn default() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose fetched streams yield at most `chunk_size`
    /// bytes per item.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        MockStore {
            map: RwLock::new(HashMap::new()),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.map.read().expect("read mock store").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Store for MockStore {
    fn save<'a>(
        &'a self,
        _name: &'a str,
        content_type: Option<String>,
        content: ByteStream<'a>,
    ) -> BoxFuture<'a, Result<BlobId, StoreError>> {
        mock_save(self, content_type, content).boxed()
    }

    fn fetch<'a>(&'a self, id: &'a BlobId) -> BoxFuture<'a, Result<Blob, StoreError>> {
        async move { mock_fetch(self, id) }.boxed()
    }
}

async fn mock_save(
    store: &MockStore,
    content_type: Option<String>,
    content: ByteStream<'_>,
) -> Result<BlobId, StoreError> {
    let content = collect(content).await?;
    let id = BlobId::generate();

    store.map.write().expect("write mock store").insert(
        id.clone(),
        StoredBlob {
            content_type,
            content,
        },
    );

    Ok(id)
}

fn mock_fetch(store: &MockStore, id: &BlobId) -> Result<Blob, StoreError> {
    let map = store.map.read().expect("read mock store");
    let stored = map.get(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;

    let content = stored.content.clone();
    let chunks = (0..content.len())
        .step_by(store.chunk_size)
        .map(|start| {
            let end = (start + store.chunk_size).min(content.len());
            Ok(content.slice(start..end))
        })
        .collect::<Vec<_>>();

    Ok(Blob {
        content_type: stored.content_type.clone(),
        body: stream::iter(chunks).boxed(),
    })
}
