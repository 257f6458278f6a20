//! Resource id ⇄ container IRI mapping.
//!
//! A resource lives at `{base}/{pairtree}/{segment}`, where `segment` is the
//! percent-encoded id and `pairtree` splits the first eight characters of the
//! segment into two-character directories so containers spread across the
//! repository tree. `ab12cd34-ef` becomes `{base}/ab/12/cd/34/ab12cd34-ef`.

use crate::id::Id;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const PAIRTREE_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IriMinter {
    base: String,
}

impl IriMinter {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn to_iri(&self, id: &Id) -> String {
        let segment = utf8_percent_encode(id.as_str(), SEGMENT).to_string();
        format!("{}/{}/{segment}", self.base, pairtree(&segment))
    }

    /// The id behind a container IRI, or `None` for any IRI this minter did not
    /// produce.
    pub fn to_id(&self, iri: &str) -> Option<Id> {
        let rest = iri.strip_prefix(&self.base)?.strip_prefix('/')?;
        let (tree, segment) = rest.rsplit_once('/')?;
        if segment.is_empty() || tree != pairtree(segment) {
            return None;
        }
        let decoded = percent_decode_str(segment).decode_utf8().ok()?;
        let id = Id::new(decoded.into_owned());
        // Only canonical encodings round-trip.
        (self.to_iri(&id) == iri).then_some(id)
    }
}

fn pairtree(segment: &str) -> String {
    let head: Vec<char> = segment.chars().take(PAIRTREE_DEPTH).collect();
    head.chunks(2)
        .map(|pair| pair.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_ids_get_a_pairtree() {
        let minter = IriMinter::new("http://localhost:8080/rest/");
        let id = Id::new("ab12cd34-ef56");
        let iri = minter.to_iri(&id);
        assert_eq!(iri, "http://localhost:8080/rest/ab/12/cd/34/ab12cd34-ef56");
        assert_eq!(minter.to_id(&iri), Some(id));
    }

    #[test]
    fn unsafe_characters_are_encoded() {
        let minter = IriMinter::new("http://repo");
        let id = Id::new("a b/c#d");
        let iri = minter.to_iri(&id);
        assert!(!iri.ends_with("a b/c#d"));
        assert_eq!(minter.to_id(&iri), Some(id));
    }

    #[test]
    fn foreign_iris_are_not_ids() {
        let minter = IriMinter::new("http://repo");
        assert_eq!(minter.to_id("http://elsewhere/ab/cd"), None);
        assert_eq!(minter.to_id("http://repo/zz/abcd"), None);
        assert_eq!(minter.to_id("http://repo"), None);
    }
}
