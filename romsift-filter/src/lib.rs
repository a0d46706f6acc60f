//! Rule evaluation, sorting, and one-game-one-rom prioritization.
//!
//! - [`Rule`] matches one attribute against a list of values.
//! - [`Ruleset`] combines rules (AND) with override rules (OR) into a
//!   [`FilterReason`].
//! - [`CompositeSorter`] ranks machines by an ordered list of [`Sorter`]s.
//! - [`SortableSet`] picks one representative per group (one per disc for
//!   multi-disc groups).

pub mod expression;
pub mod prioritizer;
pub mod rule;
pub mod ruleset;
pub mod sorter;

pub use expression::{Expression, Transform, UNION_SUFFIX};
pub use prioritizer::{GroupKey, SortableSet};
pub use rule::{MatchType, Rule};
pub use ruleset::{FilterReason, NAME_ATTRIBUTE, Ruleset};
pub use sorter::{CompositeSorter, SortComponent, SortKey, SortOrder, SortSpec, SortValue, Sorter};
