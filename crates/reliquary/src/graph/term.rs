//! RDF terms, triples and an insertion-ordered graph.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Term {
    Iri { value: String },
    Blank { id: String },
    Literal {
        lexical: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
    },
}

impl Term {
    pub fn iri(value: impl Into<String>) -> Self {
        Term::Iri {
            value: value.into(),
        }
    }

    /// A blank node with a fresh identifier.
    pub fn fresh_blank() -> Self {
        Term::Blank {
            id: Uuid::new_v4().simple().to_string(),
        }
    }

    pub fn plain(lexical: impl Into<String>) -> Self {
        Term::Literal {
            lexical: lexical.into(),
            language: None,
            datatype: None,
        }
    }

    pub fn typed(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal {
            lexical: lexical.into(),
            language: None,
            datatype: Some(datatype.into()),
        }
    }

    pub fn tagged(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Term::Literal {
            lexical: lexical.into(),
            language: Some(language.into()),
            datatype: None,
        }
    }

    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri { value } => Some(value),
            _ => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Term::Blank { .. })
    }

    pub fn lexical(&self) -> Option<&str> {
        match self {
            Term::Literal { lexical, .. } => Some(lexical),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri { value } => write!(f, "<{value}>"),
            Term::Blank { id } => write!(f, "_:{id}"),
            Term::Literal {
                lexical,
                language: Some(language),
                ..
            } => write!(f, "{lexical:?}@{language}"),
            Term::Literal {
                lexical,
                datatype: Some(datatype),
                ..
            } => write!(f, "{lexical:?}^^<{datatype}>"),
            Term::Literal { lexical, .. } => write!(f, "{lexical:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Term,
    pub predicate: String,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: impl Into<String>, object: Term) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
        }
    }
}

/// A set of triples that remembers insertion order and indexes subjects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Triple>", into = "Vec<Triple>")]
pub struct Graph {
    triples: Vec<Triple>,
    seen: HashSet<Triple>,
    by_subject: HashMap<Term, Vec<usize>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a triple, returning false when it was already present.
    pub fn insert(&mut self, triple: Triple) -> bool {
        if !self.seen.insert(triple.clone()) {
            return false;
        }
        self.by_subject
            .entry(triple.subject.clone())
            .or_default()
            .push(self.triples.len());
        self.triples.push(triple);
        true
    }

    pub fn add(&mut self, subject: Term, predicate: &str, object: Term) -> bool {
        self.insert(Triple::new(subject, predicate, object))
    }

    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Triples with the given subject, in insertion order.
    pub fn about<'a>(&'a self, subject: &Term) -> impl Iterator<Item = &'a Triple> + 'a {
        self.by_subject
            .get(subject)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .map(move |&index| &self.triples[index])
    }

    pub fn objects<'a>(
        &'a self,
        subject: &Term,
        predicate: &'a str,
    ) -> impl Iterator<Item = &'a Term> + 'a {
        self.about(subject)
            .filter(move |triple| triple.predicate == predicate)
            .map(|triple| &triple.object)
    }

    pub fn object<'a>(&'a self, subject: &Term, predicate: &str) -> Option<&'a Term> {
        self.about(subject)
            .find(|triple| triple.predicate == predicate)
            .map(|triple| &triple.object)
    }

    /// Whether any triple has `object` as its object.
    pub fn mentions(&self, object: &Term) -> bool {
        self.triples.iter().any(|triple| triple.object == *object)
    }
}

impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.seen == other.seen
    }
}

impl Extend<Triple> for Graph {
    fn extend<I: IntoIterator<Item = Triple>>(&mut self, triples: I) {
        for triple in triples {
            self.insert(triple);
        }
    }
}

impl FromIterator<Triple> for Graph {
    fn from_iter<I: IntoIterator<Item = Triple>>(triples: I) -> Self {
        let mut graph = Graph::new();
        graph.extend(triples);
        graph
    }
}

impl From<Vec<Triple>> for Graph {
    fn from(triples: Vec<Triple>) -> Self {
        triples.into_iter().collect()
    }
}

impl From<Graph> for Vec<Triple> {
    fn from(graph: Graph) -> Self {
        graph.triples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_triples_are_ignored() {
        let s = Term::iri("http://a/s");
        let mut graph = Graph::new();
        assert!(graph.add(s.clone(), "http://p", Term::plain("x")));
        assert!(!graph.add(s.clone(), "http://p", Term::plain("x")));
        assert!(graph.add(s.clone(), "http://p", Term::plain("y")));
        let objects: Vec<_> = graph.objects(&s, "http://p").collect();
        assert_eq!(objects, vec![&Term::plain("x"), &Term::plain("y")]);
    }

    #[test]
    fn object_outlives_a_built_predicate() {
        let s = Term::iri("http://a/s");
        let mut graph = Graph::new();
        graph.add(s.clone(), "http://ns/title", Term::plain("x"));
        let found = graph.object(&s, &format!("http://ns/{}", "title"));
        assert_eq!(found, Some(&Term::plain("x")));
        assert_eq!(graph.object(&Term::iri("http://a/t"), "http://ns/title"), None);
    }

    #[test]
    fn graphs_survive_json() {
        let graph: Graph = vec![
            Triple::new(Term::fresh_blank(), "http://p", Term::tagged("chat", "fr")),
            Triple::new(Term::iri("http://a"), "http://q", Term::typed("1", "http://t")),
        ]
        .into();
        let text = serde_json::to_string(&graph).unwrap();
        let back: Graph = serde_json::from_str(&text).unwrap();
        assert_eq!(back, graph);
        assert_eq!(back.triples(), graph.triples());
    }
}
