//! Compile-time tuning parameters.
//!
//! These mirror the knobs a build would normally expose through feature
//! flags or build-time configuration. They are plain constants so the
//! optimizer can fold the disabled paths away.

/// Maximum size of a supercolumn. `None` deactivates the limit.
pub const MAX_SUPERCOL_SIZE: Option<usize> = None;

/// During symbolic elimination we compute an upper bound on the number of
/// non-zeros of L and U. Uniting chains of one-childed columns into
/// supercolumns enlarges that upper bound ("overfill"). A chain is broken
/// once the enlarged bound would exceed this factor of the original bound.
pub const MAX_OVERFILL_RATIO: usize = 2;

/// In the relax phase a supercolumn is united with its parent only while the
/// parent's last column has fewer than this many descendants.
pub const RELAX_RULE_SIZE: usize = 20;

/// Extra superrow storage for the elimination analysis, as a multiple of the
/// number of columns. The superrow arena is sized `nnz + EAN_BUFFER * n`.
pub const EAN_BUFFER: usize = 2;

/// Minimum number of covered columns a supercolumn must have for its
/// children to be factored as spawned tasks. `None` deactivates the
/// heuristic.
pub const MIN_COVER_SPRS_SPAWN: Option<usize> = None;

/// Minimum supercolumn size for dispatching the dense block factorization as
/// a task of its own. The dense kernels here run inline, so this is kept for
/// a future parallel dense backend. `None` deactivates it.
pub const MIN_SIZE_DENSE_SPAWN: Option<usize> = None;

/// An `align_add` kernel recursively splits along its larger dimension while
/// either side exceeds this many rows or columns.
pub const ALIGN_ADD_SMALL: usize = 80;

/// Use union-by-rank in the union-find structure. Path compression alone is
/// already near-constant amortized for the access pattern of the symbolic
/// phase, so this defaults to off.
pub const UNION_BY_RANK: bool = false;
