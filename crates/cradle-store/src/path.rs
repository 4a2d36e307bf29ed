use std::fmt;

use crate::error::{StoreError, StoreResult};

/// Slash-separated path to a collection: an odd number of segments,
/// alternating collection names and document ids (`children`,
/// `children/{child_id}/sleep`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath(String);

/// A collection path plus a document id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath {
    collection: CollectionPath,
    id: String,
}

fn check_segment(segment: &str, whole: &str) -> StoreResult<()> {
    if segment.is_empty() || segment.contains('/') || segment == "." || segment == ".." {
        return Err(StoreError::InvalidPath(format!(
            "bad segment '{}' in '{}'",
            segment, whole
        )));
    }
    Ok(())
}

impl CollectionPath {
    pub fn new(path: impl Into<String>) -> StoreResult<Self> {
        let path = path.into();
        let segments: Vec<&str> = path.split('/').collect();
        for segment in &segments {
            check_segment(segment, &path)?;
        }
        if segments.len() % 2 == 0 {
            return Err(StoreError::InvalidPath(format!(
                "'{}' names a document, not a collection",
                path
            )));
        }
        Ok(Self(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn doc(&self, id: impl Into<String>) -> StoreResult<DocumentPath> {
        let id = id.into();
        check_segment(&id, &self.0)?;
        Ok(DocumentPath {
            collection: self.clone(),
            id,
        })
    }
}

impl DocumentPath {
    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Collection nested under this document.
    pub fn sub_collection(&self, name: &str) -> StoreResult<CollectionPath> {
        check_segment(name, name)?;
        Ok(CollectionPath(format!("{}/{}/{}", self.collection.0, self.id, name)))
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}
