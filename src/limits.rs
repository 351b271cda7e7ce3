//! Hard bounds enforced across the scanner, compiler, and interpreter.
//!
//! These exist purely to guarantee termination in proportional time on
//! adversarial input; they are not configurable through [`crate::Options`]
//! because relaxing them changes the crate's safety contract.

/// Documents larger than this are rejected before any work begins.
pub const MAX_DOCUMENT_SIZE: usize = 10 * 1024 * 1024;

/// Scanner element-nesting depth. Deeper input is truncated, not followed.
pub const MAX_NESTING_DEPTH: usize = 100;

/// Attribute table per element. Excess attributes are silently discarded.
pub const MAX_ATTRIBUTES: usize = 100;

/// Largest single token (tag, comment, CDATA body, PI) the scanner will
/// buffer before giving up and treating the rest of the document as text.
pub const MAX_TOKEN_SIZE: usize = 1024 * 1024;

/// Maximum number of segments a compiled path may contain.
pub const MAX_PATH_SEGMENTS: usize = 128;

/// Maximum byte length of a single filter expression `#( ... )`.
pub const MAX_FILTER_EXPRESSION_LENGTH: usize = 1024;

/// Recursion cap when a filter's sub-path is itself evaluated against a
/// candidate element.
pub const MAX_FILTER_DEPTH: usize = 32;

/// Recursive descent (`**`) and all-match filters stop collecting once an
/// array would grow past this many entries.
pub const MAX_WILDCARD_RESULTS: usize = 1000;

/// Recursive descent (`**`) stops visiting elements after this many visits,
/// regardless of how many matches have been collected.
pub const MAX_RECURSIVE_OPERATIONS: usize = 10_000;

/// Namespace prefixes longer than this are treated as unqualified names
/// rather than rejected outright.
pub const MAX_NAMESPACE_PREFIX_LENGTH: usize = 64;

/// Longest field name accepted by a `#.field` field-extraction segment.
pub const MAX_FIELD_NAME_LENGTH: usize = 256;

/// Upper bound on entries held in the process-wide compiled-path cache.
pub const MAX_PATH_CACHE_ENTRIES: usize = 512;
