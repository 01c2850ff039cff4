//! Slash-separated document and collection paths.
//!
//! A collection path has an odd number of segments (`posts`,
//! `posts/{id}/comments`), a document path an even number (`posts/{id}`).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocPath(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionPath(String);

fn validate_segments(path: &str) -> StoreResult<usize> {
    let mut count = 0;
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(StoreError::InvalidPath(format!(
                "'{}' contains an empty or relative segment",
                path
            )));
        }
        count += 1;
    }
    Ok(count)
}

fn validate_id(id: &str) -> StoreResult<()> {
    if id.is_empty() || id.contains('/') || id == "." || id == ".." {
        return Err(StoreError::InvalidPath(format!("'{}' is not a valid id", id)));
    }
    Ok(())
}

impl CollectionPath {
    /// Parse a collection path, rejecting paths with an even segment count.
    pub fn parse(path: impl Into<String>) -> StoreResult<Self> {
        let path = path.into();
        if validate_segments(&path)? % 2 == 0 {
            return Err(StoreError::InvalidPath(format!(
                "'{}' addresses a document, not a collection",
                path
            )));
        }
        Ok(Self(path))
    }

    /// Address a document inside this collection.
    pub fn doc(&self, id: impl fmt::Display) -> StoreResult<DocPath> {
        let id = id.to_string();
        validate_id(&id)?;
        Ok(DocPath(format!("{}/{}", self.0, id)))
    }

    /// Owning document for subcollections, `None` for root collections.
    pub fn parent(&self) -> Option<DocPath> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| DocPath(parent.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl DocPath {
    /// Parse a document path, rejecting paths with an odd segment count.
    pub fn parse(path: impl Into<String>) -> StoreResult<Self> {
        let path = path.into();
        if validate_segments(&path)? % 2 != 0 {
            return Err(StoreError::InvalidPath(format!(
                "'{}' addresses a collection, not a document",
                path
            )));
        }
        Ok(Self(path))
    }

    /// Document id (last segment).
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Collection this document belongs to.
    pub fn parent(&self) -> CollectionPath {
        match self.0.rsplit_once('/') {
            Some((parent, _)) => CollectionPath(parent.to_string()),
            None => CollectionPath(self.0.clone()),
        }
    }

    /// Address a subcollection of this document.
    pub fn collection(&self, name: &str) -> StoreResult<CollectionPath> {
        validate_id(name)?;
        Ok(CollectionPath(format!("{}/{}", self.0, name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocPath {
    type Error = StoreError;

    fn try_from(value: String) -> StoreResult<Self> {
        Self::parse(value)
    }
}

impl TryFrom<String> for CollectionPath {
    type Error = StoreError;

    fn try_from(value: String) -> StoreResult<Self> {
        Self::parse(value)
    }
}

impl From<DocPath> for String {
    fn from(path: DocPath) -> Self {
        path.0
    }
}

impl From<CollectionPath> for String {
    fn from(path: CollectionPath) -> Self {
        path.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_paths() {
        let posts = CollectionPath::parse("posts").unwrap();
        let post = posts.doc("p1").unwrap();
        let comments = post.collection("comments").unwrap();
        let comment = comments.doc("c1").unwrap();

        assert_eq!(comment.as_str(), "posts/p1/comments/c1");
        assert_eq!(comment.id(), "c1");
        assert_eq!(comment.parent(), comments);
        assert_eq!(comments.parent(), Some(post.clone()));
        assert_eq!(comments.as_str(), "posts/p1/comments");
        assert!(posts.parent().is_none());
    }

    #[test]
    fn test_rejects_wrong_parity_and_empty_segments() {
        assert!(DocPath::parse("posts").is_err());
        assert!(CollectionPath::parse("posts/p1").is_err());
        assert!(DocPath::parse("posts//p1").is_err());
        assert!(DocPath::parse("").is_err());
        let posts = CollectionPath::parse("posts").unwrap();
        assert!(posts.doc("a/b").is_err());
        assert!(posts.doc("..").is_err());
    }
}
