//! Capability index and template materializer: the read-only catalog of
//! what intents are known and how to turn their params into source text.

pub mod index;
pub mod materializer;

pub use index::{CapabilityIndex, Template};
pub use materializer::{MaterializeError, Materializer};
