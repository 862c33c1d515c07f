//! TOOLGUARD Grounding
//!
//! Decides whether entity-annotated parameter values are traceable to the
//! request context: user messages, session entities and session facts.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod evidence;
pub mod checker;

pub use evidence::EvidenceIndex;
pub use checker::{Grounding, GroundingChecker, GroundingConfig, Substitution, UngroundedField};
