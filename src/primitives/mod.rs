//! Low-level primitives and utilities
//!
//! This module contains character decoding, display width rules,
//! and the regular expression matcher used for line search.

pub mod display_width;
pub mod regexp;
pub mod utf8;
