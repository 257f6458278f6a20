//! # Value Casting Registry
//!
//! Every serializer converts values through a [`CastRegistry`]: an ordered chain of
//! [`Caster`]s, each pairing a predicate (`handles`) with a conversion (`cast`).
//! Dispatch walks the chain in registration order at call time and the first
//! caster that handles the value wins; a value nobody handles goes to the
//! registry's fallback, which for `CastRegistry<T, T>` is the identity.
//!
//! ## Late binding
//!
//! A caster that converts nested values (a list, a nested resource) recurses
//! through the registry *passed to* [`Caster::cast`], never through one it captured
//! when it was registered. Casters registered later are therefore visible to
//! recursive paths of casters registered earlier:
//!
//! ```rust
//! use reliquary::cast::CastRegistry;
//!
//! #[derive(Debug, PartialEq)]
//! enum Tree { Leaf(i64), Node(Vec<Tree>) }
//!
//! let mut registry: CastRegistry<Tree, Tree> = CastRegistry::identity("doubling");
//! registry.register_fn(
//!     |tree| matches!(tree, Tree::Node(_)),
//!     |tree, registry| match tree {
//!         Tree::Node(children) => Tree::Node(children.into_iter().map(|c| registry.cast(c)).collect()),
//!         leaf => leaf,
//!     },
//! );
//! // Registered after the recursive caster, still reached through it.
//! registry.register_fn(
//!     |tree| matches!(tree, Tree::Leaf(_)),
//!     |tree, _| match tree { Tree::Leaf(n) => Tree::Leaf(n * 2), other => other },
//! );
//!
//! let doubled = registry.cast(Tree::Node(vec![Tree::Leaf(1), Tree::Node(vec![Tree::Leaf(2)])]));
//! assert_eq!(doubled, Tree::Node(vec![Tree::Leaf(2), Tree::Node(vec![Tree::Leaf(4)])]));
//! ```

use std::fmt;

/// One link of a cast chain.
pub trait Caster<I, O>: Send + Sync {
    /// Whether this caster converts `value`.
    fn handles(&self, value: &I) -> bool;

    /// Converts `value`. Nested values must be cast through `registry`.
    fn cast(&self, value: I, registry: &CastRegistry<I, O>) -> O;
}

/// A [`Caster`] built from two closures.
pub struct FnCaster<H, C> {
    handles: H,
    cast: C,
}

impl<I, O, H, C> Caster<I, O> for FnCaster<H, C>
where
    H: Fn(&I) -> bool + Send + Sync,
    C: Fn(I, &CastRegistry<I, O>) -> O + Send + Sync,
{
    fn handles(&self, value: &I) -> bool {
        (self.handles)(value)
    }

    fn cast(&self, value: I, registry: &CastRegistry<I, O>) -> O {
        (self.cast)(value, registry)
    }
}

/// A named, ordered chain of casters with a fallback.
pub struct CastRegistry<I, O> {
    name: &'static str,
    casters: Vec<Box<dyn Caster<I, O>>>,
    fallback: fn(I) -> O,
}

impl<I: 'static, O: 'static> CastRegistry<I, O> {
    pub fn with_fallback(name: &'static str, fallback: fn(I) -> O) -> Self {
        Self {
            name,
            casters: Vec::new(),
            fallback,
        }
    }

    /// Appends a caster to the end of the chain.
    pub fn register(&mut self, caster: impl Caster<I, O> + 'static) -> &mut Self {
        self.casters.push(Box::new(caster));
        self
    }

    pub fn register_fn<H, C>(&mut self, handles: H, cast: C) -> &mut Self
    where
        H: Fn(&I) -> bool + Send + Sync + 'static,
        C: Fn(I, &CastRegistry<I, O>) -> O + Send + Sync + 'static,
    {
        self.register(FnCaster { handles, cast })
    }

    /// Resolves the caster for `value` without running it yet.
    pub fn for_value(&self, value: I) -> Cast<'_, I, O> {
        let caster = self
            .casters
            .iter()
            .find(|caster| caster.handles(&value))
            .map(|caster| caster.as_ref());
        Cast {
            registry: self,
            caster,
            value,
        }
    }

    pub fn cast(&self, value: I) -> O {
        self.for_value(value).result()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.casters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.casters.is_empty()
    }
}

impl<T: 'static> CastRegistry<T, T> {
    /// A registry whose unmatched values come back unchanged.
    pub fn identity(name: &'static str) -> Self {
        Self::with_fallback(name, std::convert::identity)
    }
}

impl<I, O> fmt::Debug for CastRegistry<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CastRegistry")
            .field("name", &self.name)
            .field("casters", &self.casters.len())
            .finish()
    }
}

/// A resolved cast, ready to produce its result.
pub struct Cast<'r, I, O> {
    registry: &'r CastRegistry<I, O>,
    caster: Option<&'r dyn Caster<I, O>>,
    value: I,
}

impl<I, O> Cast<'_, I, O> {
    /// True when no caster matched and the fallback will run.
    pub fn is_fallback(&self) -> bool {
        self.caster.is_none()
    }

    pub fn result(self) -> O {
        match self.caster {
            Some(caster) => caster.cast(self.value, self.registry),
            None => (self.registry.fallback)(self.value),
        }
    }
}
