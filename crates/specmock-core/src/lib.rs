//! Core of specmock: the pattern type algebra and everything it needs.
//!
//! - [`Value`]: the runtime value model (JSON-shaped, plus XML elements)
//! - [`Pattern`]: schema nodes with match, generate, specialize, negative
//!   mutation and backward-compatibility (encompass) operations
//! - [`Resolver`]: immutable evaluation context (named types, recursion guard,
//!   example dictionary, mode flags)
//! - [`MatchResult`] / [`Failure`]: breadcrumbed diagnostics
//! - [`fuzzy`]: approximate key resolution
//! - [`pointer`]: pure JSON-pointer edits over values
//!
//! Everything here is synchronous and free of I/O and shared mutable state.

pub mod error;
pub mod fuzzy;
pub mod pattern;
pub mod pointer;
pub mod resolver;
pub mod result;
pub mod row;
pub mod value;

pub use error::PatternError;
pub use fuzzy::{FuzzyKeyMatcher, KeyMatch};
pub use pattern::{Field, NumberPattern, ObjectPattern, Pattern, StringPattern, Variants};
pub use pointer::{Pointer, PointerError};
pub use resolver::{type_name_of, Cycle, Dictionary, Resolver, ResolverFlags};
pub use result::{Failure, FailureDeDuper, FailureEntry, FailureReason, MatchResult, RuleViolation};
pub use row::Row;
pub use value::{Value, XmlContent, XmlNode};
