//! # Ordered Lists over a Graph
//!
//! A triple store has no array type, so ordered attribute values are stored as a
//! doubly linked list of anonymous proxy nodes:
//!
//! ```text
//! <resource> ns:member_ids _:anchor
//! _:anchor   iana:first    _:p1
//! _:anchor   iana:last     _:p3
//! _:p1       ore:proxyFor  <child-b> ; iana:next _:p2
//! _:p2       ore:proxyFor  <child-a> ; iana:next _:p3 ; iana:prev _:p1
//! _:p3       ore:proxyFor  <child-c> ;                  iana:prev _:p2
//! ```
//!
//! [`OrderedList`] keeps its nodes in an arena addressed by [`NodeKey`]. The
//! list's ends are the [`Link::Head`] and [`Link::Tail`] sentinels, which are
//! never written, so splicing at either end needs no special casing.
//!
//! A list loaded from a graph materialises nodes as traversal reaches them and
//! caches them for the lifetime of the list. Traversal follows `next` edges; a
//! node whose stored `prev` disagrees with the node actually visited before it is
//! corrected in place, so forward iteration gives the same sequence however the
//! graph's triples were ordered when it was loaded.

use super::term::{Graph, Term, Triple};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

pub const FIRST: &str = "http://www.iana.org/assignments/relation/first";
pub const LAST: &str = "http://www.iana.org/assignments/relation/last";
pub const NEXT: &str = "http://www.iana.org/assignments/relation/next";
pub const PREV: &str = "http://www.iana.org/assignments/relation/prev";
pub const PROXY_FOR: &str = "http://www.openarchives.org/ore/terms/proxyFor";

/// Opaque handle of a node in the list's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Head,
    Tail,
    Node(NodeKey),
}

#[derive(Debug, Clone)]
struct ProxyNode {
    id: Term,
    target: Option<Term>,
    next: Link,
    prev: Link,
    loaded: bool,
}

#[derive(Debug, Clone)]
pub struct OrderedList<'g> {
    source: Option<&'g Graph>,
    nodes: Vec<ProxyNode>,
    keys: HashMap<Term, NodeKey>,
    /// `next` of the head sentinel.
    first: Link,
    /// `prev` of the tail sentinel.
    last: Link,
}

impl Default for OrderedList<'_> {
    fn default() -> Self {
        Self {
            source: None,
            nodes: Vec::new(),
            keys: HashMap::new(),
            first: Link::Tail,
            last: Link::Head,
        }
    }
}

impl<'g> OrderedList<'g> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A list backed by the proxies `anchor` points at in `graph`.
    pub fn load(graph: &'g Graph, anchor: &Term) -> Self {
        let mut list = Self {
            source: Some(graph),
            ..Self::default()
        };
        if let Some(first) = graph.object(anchor, FIRST).cloned() {
            list.first = Link::Node(list.key_for(first));
        }
        if let Some(last) = graph.object(anchor, LAST).cloned() {
            list.last = Link::Node(list.key_for(last));
        }
        list
    }

    /// Whether `term` is the anchor of a list in `graph`.
    pub fn is_anchor(graph: &Graph, term: &Term) -> bool {
        term.is_blank() && graph.object(term, FIRST).is_some()
    }

    fn key_for(&mut self, id: Term) -> NodeKey {
        if let Some(key) = self.keys.get(&id) {
            return *key;
        }
        let key = NodeKey(self.nodes.len());
        self.keys.insert(id.clone(), key);
        self.nodes.push(ProxyNode {
            id,
            target: None,
            next: Link::Tail,
            prev: Link::Head,
            loaded: self.source.is_none(),
        });
        key
    }

    /// Reads a node's edges from the source graph on first visit.
    fn materialise(&mut self, key: NodeKey) {
        let Some(graph) = self.source else {
            return;
        };
        if self.nodes[key.0].loaded {
            return;
        }
        let id = self.nodes[key.0].id.clone();
        let target = graph.object(&id, PROXY_FOR).cloned();
        let next = match graph.object(&id, NEXT).cloned() {
            Some(next) => Link::Node(self.key_for(next)),
            None => Link::Tail,
        };
        let prev = match graph.object(&id, PREV).cloned() {
            Some(prev) => Link::Node(self.key_for(prev)),
            None => Link::Head,
        };
        let node = &mut self.nodes[key.0];
        node.target = target;
        node.next = next;
        node.prev = prev;
        node.loaded = true;
    }

    fn next_of(&mut self, link: Link) -> Link {
        match link {
            Link::Head => self.first,
            Link::Tail => Link::Tail,
            Link::Node(key) => {
                self.materialise(key);
                self.nodes[key.0].next
            }
        }
    }

    fn set_next(&mut self, link: Link, next: Link) {
        match link {
            Link::Head => self.first = next,
            Link::Tail => {}
            Link::Node(key) => self.nodes[key.0].next = next,
        }
    }

    fn set_prev(&mut self, link: Link, prev: Link) {
        match link {
            Link::Tail => self.last = prev,
            Link::Head => {}
            Link::Node(key) => self.nodes[key.0].prev = prev,
        }
    }

    /// Walks the list, healing `prev` pointers, and returns the node keys in order.
    fn walk(&mut self) -> Vec<NodeKey> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut previous = Link::Head;
        loop {
            match self.next_of(previous) {
                Link::Node(key) => {
                    if !visited.insert(key) {
                        warn!("Ordered list loops back on itself, stopping traversal");
                        break;
                    }
                    self.materialise(key);
                    if self.nodes[key.0].prev != previous {
                        debug!(node = %self.nodes[key.0].id, "Healing prev pointer");
                        self.nodes[key.0].prev = previous;
                    }
                    order.push(key);
                    previous = Link::Node(key);
                }
                Link::Tail | Link::Head => break,
            }
        }
        self.last = previous;
        order
    }

    /// Targets in list order.
    pub fn targets(&mut self) -> Vec<Term> {
        self.walk()
            .into_iter()
            .filter_map(|key| self.nodes[key.0].target.clone())
            .collect()
    }

    pub fn len(&mut self) -> usize {
        self.walk().len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.next_of(Link::Head) == Link::Tail
    }

    /// Inserts `target` so that it ends up at `position`; positions past the end
    /// append. Splicing touches exactly four links: the new node's `prev` and
    /// `next`, its predecessor's `next` and its successor's `prev`.
    pub fn insert_at(&mut self, position: usize, target: Term) {
        let order = self.walk();
        let predecessor = match position.checked_sub(1) {
            None => Link::Head,
            Some(index) => order
                .get(index)
                .or(order.last())
                .map_or(Link::Head, |key| Link::Node(*key)),
        };
        let successor = self.next_of(predecessor);

        let key = NodeKey(self.nodes.len());
        let id = Term::fresh_blank();
        self.keys.insert(id.clone(), key);
        self.nodes.push(ProxyNode {
            id,
            target: Some(target),
            next: successor,
            prev: predecessor,
            loaded: true,
        });
        self.set_next(predecessor, Link::Node(key));
        self.set_prev(successor, Link::Node(key));
    }

    pub fn push(&mut self, target: Term) {
        self.insert_at(usize::MAX, target);
    }

    /// The list's triples hanging off `anchor`, rebuilt from the realised
    /// sequence. An empty list yields no triples.
    pub fn to_triples(&mut self, anchor: &Term) -> Vec<Triple> {
        let order = self.walk();
        let (Some(first), Some(last)) = (order.first(), order.last()) else {
            return Vec::new();
        };
        let mut triples = vec![
            Triple::new(anchor.clone(), FIRST, self.nodes[first.0].id.clone()),
            Triple::new(anchor.clone(), LAST, self.nodes[last.0].id.clone()),
        ];
        for (index, key) in order.iter().enumerate() {
            let node = &self.nodes[key.0];
            if let Some(target) = &node.target {
                triples.push(Triple::new(node.id.clone(), PROXY_FOR, target.clone()));
            }
            if let Some(next) = order.get(index + 1) {
                triples.push(Triple::new(node.id.clone(), NEXT, self.nodes[next.0].id.clone()));
            }
            if let Link::Node(prev) = node.prev {
                triples.push(Triple::new(node.id.clone(), PREV, self.nodes[prev.0].id.clone()));
            }
        }
        triples
    }
}

impl FromIterator<Term> for OrderedList<'_> {
    fn from_iter<I: IntoIterator<Item = Term>>(targets: I) -> Self {
        let mut list = OrderedList::new();
        for target in targets {
            // Appending after `last` keeps construction linear.
            let predecessor = list.last;
            let key = NodeKey(list.nodes.len());
            let id = Term::fresh_blank();
            list.keys.insert(id.clone(), key);
            list.nodes.push(ProxyNode {
                id,
                target: Some(target),
                next: Link::Tail,
                prev: predecessor,
                loaded: true,
            });
            list.set_next(predecessor, Link::Node(key));
            list.last = Link::Node(key);
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(name: &str) -> Term {
        Term::iri(format!("http://repo/{name}"))
    }

    fn names(targets: &[Term]) -> Vec<&str> {
        targets
            .iter()
            .filter_map(Term::as_iri)
            .map(|iri| iri.trim_start_matches("http://repo/"))
            .collect()
    }

    #[test]
    fn first_insertion_into_an_empty_list() {
        let mut list = OrderedList::new();
        assert!(list.is_empty());
        list.insert_at(0, target("a"));
        assert_eq!(names(&list.targets()), vec!["a"]);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn insert_at_splices_between_neighbours() {
        let mut list: OrderedList = ["b", "c"].into_iter().map(target).collect();
        list.insert_at(1, target("a"));
        list.insert_at(0, target("z"));
        list.insert_at(99, target("end"));
        assert_eq!(names(&list.targets()), vec!["z", "b", "a", "c", "end"]);
    }

    #[test]
    fn empty_lists_write_nothing() {
        let mut list = OrderedList::new();
        assert!(list.to_triples(&Term::fresh_blank()).is_empty());
    }

    #[test]
    fn traversal_is_idempotent_and_independent_of_load_order() {
        let anchor = Term::fresh_blank();
        let mut built: OrderedList = ["b", "a", "c"].into_iter().map(target).collect();
        let mut triples = built.to_triples(&anchor);
        triples.reverse();
        let graph: Graph = triples.into_iter().collect();

        let mut loaded = OrderedList::load(&graph, &anchor);
        let first = loaded.targets();
        let second = loaded.targets();
        assert_eq!(names(&first), vec!["b", "a", "c"]);
        assert_eq!(first, second);
    }

    #[test]
    fn stale_prev_pointers_heal_on_traversal() {
        let anchor = Term::fresh_blank();
        let mut built: OrderedList = ["b", "a", "c"].into_iter().map(target).collect();
        let triples = built.to_triples(&anchor);

        // Point every prev edge at the first proxy.
        let first_proxy = triples[0].object.clone();
        let corrupted: Graph = triples
            .into_iter()
            .map(|mut triple| {
                if triple.predicate == PREV {
                    triple.object = first_proxy.clone();
                }
                triple
            })
            .collect();

        let mut loaded = OrderedList::load(&corrupted, &anchor);
        assert_eq!(names(&loaded.targets()), vec!["b", "a", "c"]);

        let healed = loaded.to_triples(&anchor);
        let next_edges: HashSet<_> = healed
            .iter()
            .filter(|t| t.predicate == NEXT)
            .map(|t| (t.object.clone(), t.subject.clone()))
            .collect();
        let prev_edges: HashSet<_> = healed
            .iter()
            .filter(|t| t.predicate == PREV)
            .map(|t| (t.subject.clone(), t.object.clone()))
            .collect();
        assert_eq!(next_edges, prev_edges);
    }

    #[test]
    fn cyclic_lists_terminate() {
        let anchor = Term::fresh_blank();
        let p1 = Term::fresh_blank();
        let p2 = Term::fresh_blank();
        let graph: Graph = vec![
            Triple::new(anchor.clone(), FIRST, p1.clone()),
            Triple::new(p1.clone(), PROXY_FOR, target("a")),
            Triple::new(p1.clone(), NEXT, p2.clone()),
            Triple::new(p2.clone(), PROXY_FOR, target("b")),
            Triple::new(p2.clone(), NEXT, p1.clone()),
        ]
        .into();
        let mut loaded = OrderedList::load(&graph, &anchor);
        assert_eq!(names(&loaded.targets()), vec!["a", "b"]);
    }
}
