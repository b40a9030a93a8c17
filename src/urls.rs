use url::Url;

use crate::store::BlobId;

/// Path segment under which stored files are served.
pub const FILES_PATH: &str = "files";

/// Convenience wrapper for URL generation functions.
#[derive(Clone, Debug)]
pub struct Urls {
    /// Top-level URL, including trailing slash.
    base: Url,
}

impl Urls {
    /// Create a new instance. A trailing slash is added to `base` if it
    /// doesn't have one, so that paths resolve beneath it.
    pub fn new(base: impl AsRef<str>) -> Self {
        let base = base.as_ref();
        let with_slash = if base.ends_with('/') {
            base.to_owned()
        } else {
            format!("{}/", base)
        };

        let base = Url::parse(&with_slash).unwrap_or_else(|_| panic!("parse {} as URL", base));

        Urls { base }
    }

    /// The public URL of a stored file, `<base>/files/<blob-id>`.
    pub fn file(&self, id: &BlobId) -> Result<Url, url::ParseError> {
        self.base.join(&format!("{}/{}", FILES_PATH, id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_urls_sit_under_base() {
        let id = BlobId::from("5f0c6a3e-2d7b-4a51-9c1e-0d7f1b2a9e44");

        for base in &["https://example.com/api", "https://example.com/api/"] {
            assert_eq!(
                Urls::new(base).file(&id).unwrap().as_str(),
                "https://example.com/api/files/5f0c6a3e-2d7b-4a51-9c1e-0d7f1b2a9e44"
            );
        }
    }
}
