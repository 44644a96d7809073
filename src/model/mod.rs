//! Data model for administrative divisions
//!
//! # Components
//!
//! - `Level`: the five fixed tiers of the hierarchy
//! - `ChildRecord`: one extracted row of a child-listing page, as cached
//! - `AdminNode`: one node of the assembled output tree

mod level;
mod node;

pub use level::Level;
pub use node::{clean_text, AdminNode, ChildRecord, Children};
