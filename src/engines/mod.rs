//! Prosody engines.
//!
//! # Available Engines
//!
//! - `rule_based` - Klatt duration rules and ToBI-style tone rules driven by
//!   JSON rule tables

pub mod rule_based;
