//! # Reliquary Sample Catalog
//!
//! A small library catalog built on `reliquary`, exposed as a library for the
//! integration tests.

pub mod clients;
pub mod error;
pub mod lifecycle;
pub mod model;
