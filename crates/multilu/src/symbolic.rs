//! Symbolic analysis: column elimination tree, fill upper bounds,
//! supercolumn detection, relaxation and postordering.
//!
//! # Algorithm
//!
//! The elimination analysis simulates the factorization on the row-merge
//! matrix: columns are processed in the given preorder, and rows that meet
//! in a column are united. Each union-find set of columns owns a "superrow"
//! (the union of the patterns of its merged rows) kept in a garbage
//! collected arena. The walk yields the column elimination tree plus, for
//! every column, upper bounds on the L column count (`l_size`) and the U row
//! count (`u_size`) of its front.
//!
//! Columns are then reordered by a depth-first postorder of the tree, chains
//! of one-childed columns are united into supercolumns (bounded by the
//! overfill ratio), small leaf supercolumns are relaxed into their parents,
//! and the final supercolumn tree is completed with child lists and
//! descendant index intervals.
//!
//! # References
//!
//! - Gilbert, J.R., Ng, E. "Predicting Structure in Nonsymmetric Sparse
//!   Matrix Factorizations", Graph Theory and Sparse Matrix Computation,
//!   1993.
//! - Davis, T.A., Gilbert, J.R., Larimore, S., Ng, E. "A Column Approximate
//!   Minimum Degree Ordering Algorithm", ACM TOMS, 2004.
//! - Avron, H., Shklarski, G., Toledo, S. "Parallel Unsymmetric-Pattern
//!   Multifrontal Sparse LU with Column Preordering", ACM TOMS, 2008.

use crate::csc::CcsMatrix;
use crate::error::Error;
use crate::params::{EAN_BUFFER, MAX_OVERFILL_RATIO, MAX_SUPERCOL_SIZE, RELAX_RULE_SIZE};
use crate::row_arena::RowArena;
use crate::scalar::Scalar;
use crate::union_find::UnionFind;

// ============================================================================
// Elimination tree over supercolumns
// ============================================================================

/// The supercolumn elimination tree, postordered: every parent index is
/// larger than all of its descendants, and the proper descendants of node
/// `i` occupy the closed interval `first_desc_index[i]..=last_desc_index[i]`.
#[derive(Debug, Clone)]
pub struct EliminationTree {
    pub first_root: Option<usize>,
    pub parent: Vec<Option<usize>>,
    pub first_child: Vec<Option<usize>>,
    pub next_child: Vec<Option<usize>>,
    pub first_desc_index: Vec<Option<usize>>,
    pub last_desc_index: Vec<Option<usize>>,
}

/// Iterator over the children of a node (or the roots of the forest).
pub struct Children<'a> {
    next: Option<usize>,
    next_child: &'a [Option<usize>],
}

impl Iterator for Children<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let c = self.next?;
        self.next = self.next_child[c];
        Some(c)
    }
}

impl EliminationTree {
    pub fn children(&self, i: usize) -> Children<'_> {
        Children {
            next: self.first_child[i],
            next_child: &self.next_child,
        }
    }

    pub fn roots(&self) -> Children<'_> {
        Children {
            next: self.first_root,
            next_child: &self.next_child,
        }
    }

    pub fn has_one_child(&self, i: usize) -> bool {
        match self.first_child[i] {
            Some(fc) => self.next_child[fc].is_none(),
            None => false,
        }
    }
}

// ============================================================================
// Symbolic record
// ============================================================================

/// Everything the numeric phase needs to know about the structure of the
/// factorization. Owned by the caller; the numeric phase only reads it.
#[derive(Debug, Clone)]
pub struct Symbolic {
    pub n: usize,
    /// Applied column permutation: preorder composed with the postorder.
    /// `columns[i]` is the original index of the i-th eliminated column.
    pub columns: Vec<usize>,
    pub number_supercolumns: usize,
    pub start_supercolumn: Vec<usize>,
    pub end_supercolumn: Vec<usize>,
    pub supercolumn_size: Vec<usize>,
    /// Size of the subtree rooted at each supercolumn, in columns.
    pub supercolumn_covered_columns: Vec<usize>,
    /// Upper bound on the number of front rows per supercolumn.
    pub l_size: Vec<usize>,
    /// Upper bound on the number of front columns per supercolumn.
    pub u_size: Vec<usize>,
    pub etree: EliminationTree,
}

impl Symbolic {
    /// Original indices of the pivot columns of supercolumn `i`.
    pub fn supercolumn_columns(&self, i: usize) -> &[usize] {
        &self.columns[self.start_supercolumn[i]..=self.end_supercolumn[i]]
    }
}

// ============================================================================
// Entry point
// ============================================================================

/// Compute the symbolic factorization of `a` under the given column
/// preorder: elimination tree, postorder, supercolumns and front size
/// bounds.
pub fn symbolic_factor<T: Scalar>(
    a: &CcsMatrix<T>,
    column_order: &[usize],
) -> Result<Symbolic, Error> {
    let n = a.ncols();
    if !a.is_square() {
        return Err(Error::malformed(format!(
            "matrix is {}x{}, the factorization needs a square input",
            a.nrows(),
            n
        )));
    }
    if n == 0 {
        return Err(Error::malformed("matrix has no columns"));
    }
    if column_order.len() != n {
        return Err(Error::malformed(format!(
            "column_order has {} entries for {} columns",
            column_order.len(),
            n
        )));
    }
    let mut seen = vec![false; n];
    for &c in column_order {
        if c >= n || seen[c] {
            return Err(Error::malformed("column_order is not a permutation"));
        }
        seen[c] = true;
    }

    let (parent, l_size, u_size) = elimination_analysis(a, column_order)?;

    // Child lists over columns, with the virtual node n as parent of all
    // roots. Building backwards keeps each child list in ascending order,
    // which makes the postorder canonical.
    let mut first_child: Vec<Option<usize>> = vec![None; n + 1];
    let mut next_child: Vec<Option<usize>> = vec![None; n + 1];
    for i in (0..n).rev() {
        let p = parent[i];
        next_child[i] = first_child[p];
        first_child[p] = Some(i);
    }

    let (postorder, desc_count_org) = df_postorder(&first_child, &next_child, n);
    debug_assert_eq!(postorder.len(), n);

    // one_child[i]: does the i-th column of the postorder have exactly one
    // child in the column etree?
    let mut one_child = vec![false; n];
    for i in 0..n {
        let col = postorder[i];
        if let Some(fc) = first_child[col] {
            if next_child[fc].is_none() {
                one_child[i] = true;
            }
        }
    }

    // Apply the postorder to the preordered columns and descendant counts.
    let mut columns = vec![0usize; n];
    let mut desc_count = vec![0usize; n];
    for i in 0..n {
        columns[i] = column_order[postorder[i]];
        desc_count[i] = desc_count_org[postorder[i]];
    }

    let det = detect_supercol(a, &columns, &one_child, &l_size, &u_size, &postorder);

    let (sc_size, sc_parent) = relax_supercolumns(&det, &desc_count);
    let s_num = sc_size.len();

    // Front size upper bounds per supercolumn. Within a supercolumn the
    // j-th column's front holds at most its own bound plus the j pivots
    // already in the front.
    let mut sc_l_size = vec![0usize; s_num];
    let mut sc_u_size = vec![0usize; s_num];
    let mut first = 0;
    for i in 0..s_num {
        let mut ls = 0;
        let mut us = 0;
        for j in 0..sc_size[i] {
            ls = ls.max(l_size[postorder[first + j]] + j);
            us = us.max(u_size[postorder[first + j]] + j);
        }
        sc_l_size[i] = ls;
        sc_u_size[i] = us;
        first += sc_size[i];
    }
    debug_assert_eq!(first, n);

    Ok(complete_symbolic(
        n, columns, sc_size, sc_parent, sc_l_size, sc_u_size,
    ))
}

// ============================================================================
// Elimination analysis
// ============================================================================

/// Column elimination analysis on the row-merge matrix. Returns, indexed by
/// position in the preorder: the parent of each column (`n` for roots) and
/// the L/U front size upper bounds.
fn elimination_analysis<T: Scalar>(
    a: &CcsMatrix<T>,
    column_order: &[usize],
) -> Result<(Vec<usize>, Vec<usize>, Vec<usize>), Error> {
    let n = a.ncols();
    let m = a.nrows();

    // firstcol[r]: position of the first column that contained row r, or n
    let mut firstcol = vec![n; m];
    // per union-find set: the column that currently roots it, its count of
    // uneliminated rows, and the row owning its superrow
    let mut root = vec![0usize; n];
    let mut rdegs = vec![0usize; n];
    let mut rnums = vec![0usize; n];
    let mut sets = UnionFind::make_sets(n);
    let mut col_cleared = vec![false; n];
    let mut col_mmb = vec![false; n];
    let mut arena = RowArena::from_pattern(m, a.colptr(), a.rowind(), EAN_BUFFER * n)?;

    let mut parent = vec![n; n];
    let mut l_size = vec![0usize; n];
    let mut u_size = vec![0usize; n];

    for col in 0..n {
        // the next superrow holds at most the n - col uneliminated columns
        arena.ensure(n - col);
        arena.open();

        let org_col = column_order[col];
        let (col_rows, _) = a.col(org_col);
        if col_rows.is_empty() {
            return Err(Error::malformed(format!(
                "column {} of A is empty",
                org_col
            )));
        }

        let mut cset = col;
        root[cset] = col;
        rdegs[cset] = 0;

        for &row in col_rows {
            let fcol = firstcol[row];
            if fcol == n {
                // first appearance of this row: absorb its pattern
                firstcol[row] = col;
                rdegs[cset] += 1;
                arena.merge_row_into_build(row, &col_cleared, &mut col_mmb);
                arena.clear_row(row);
            } else {
                let rset = sets.find(fcol);
                let rroot = root[rset];
                if rroot != col {
                    // absorb the whole set this row belongs to
                    let rnum = rnums[rset];
                    arena.merge_row_into_build(rnum, &col_cleared, &mut col_mmb);
                    arena.clear_row(rnum);

                    parent[rroot] = col;
                    let deg = rdegs[cset] + rdegs[rset];
                    cset = sets.union(cset, rset);
                    rdegs[cset] = deg;
                    root[cset] = col;
                }
            }
        }

        // l_size: rows that can still receive this pivot; u_size: width of
        // the united superrow
        l_size[col] = rdegs[cset];
        let owner = col_rows[0];
        let row_size = arena.commit(owner);
        debug_assert!(row_size > 0);
        u_size[col] = row_size;
        // the pivot row of this column leaves the uneliminated pool
        rdegs[cset] = rdegs[cset].saturating_sub(1);
        rnums[cset] = owner;

        for &c in arena.row(owner) {
            col_mmb[c] = false;
        }
        col_cleared[org_col] = true;
    }

    Ok((parent, l_size, u_size))
}

// ============================================================================
// Postorder
// ============================================================================

/// Depth-first postorder of the tree below `root` (exclusive), iterative
/// with explicit stacks. Also counts the descendants of every vertex,
/// itself included.
fn df_postorder(
    first_child: &[Option<usize>],
    next_child: &[Option<usize>],
    root: usize,
) -> (Vec<usize>, Vec<usize>) {
    let mut postorder = Vec::with_capacity(root);
    let mut desc_count = vec![0usize; root + 1];
    let mut stack_vertex = vec![0usize; root + 1];
    let mut stack_child: Vec<Option<usize>> = vec![None; root + 1];

    let mut depth: isize = 0;
    stack_vertex[0] = root;
    stack_child[0] = first_child[root];
    while depth >= 0 {
        let d = depth as usize;
        if let Some(child) = stack_child[d] {
            stack_vertex[d + 1] = child;
            stack_child[d + 1] = first_child[child];
            depth += 1;
        } else {
            let vertex = stack_vertex[d];
            if vertex != root {
                postorder.push(vertex);
                let mut count = 1;
                let mut c = first_child[vertex];
                while let Some(ch) = c {
                    count += desc_count[ch];
                    c = next_child[ch];
                }
                desc_count[vertex] = count;
            }
            depth -= 1;
            if depth >= 0 {
                let dd = depth as usize;
                stack_child[dd] = next_child[stack_child[dd].unwrap()];
            }
        }
    }

    (postorder, desc_count)
}

// ============================================================================
// Supercolumn detection
// ============================================================================

struct Detected {
    fsc_size: Vec<usize>,
    fsc_parent: Vec<Option<usize>>,
    /// Position (in the applied order) of the last column of each
    /// fundamental supercolumn.
    fsc_last_col: Vec<usize>,
}

/// Second elimination pass over the postordered columns: group chains of
/// one-childed columns into fundamental supercolumns, breaking on the
/// overfill bound, and rebuild the parent relation at supercolumn
/// granularity.
fn detect_supercol<T: Scalar>(
    a: &CcsMatrix<T>,
    columns: &[usize],
    one_child: &[bool],
    l_size: &[usize],
    u_size: &[usize],
    postorder: &[usize],
) -> Detected {
    let n = a.ncols();
    let m = a.nrows();

    let mut firstcol = vec![n; m];
    let mut root = vec![0usize; n];
    let mut sets = UnionFind::make_sets(n);
    let mut map_col_supercol = vec![0usize; n];
    // parent of each fundamental supercolumn, recorded as a column position
    // first and remapped below
    let mut parent_col: Vec<Option<usize>> = vec![None; n];

    let mut fsc_size: Vec<usize> = Vec::new();
    let mut fsc_last_col: Vec<usize> = Vec::new();

    let mut max_lsize = 0usize;
    let mut max_usize = 0usize;
    let mut sc_lsize = 0usize;
    let mut sc_usize = 0usize;

    for col in 0..n {
        let org_col = columns[col];
        let mut cset = col;
        root[cset] = col;

        let mut new_supercol = fsc_size.is_empty()
            || !one_child[col]
            || MAX_SUPERCOL_SIZE
                .map_or(false, |mx| fsc_size.last().map_or(false, |&s| s == mx));

        let (col_rows, _) = a.col(org_col);
        for &row in col_rows {
            let fcol = firstcol[row];
            if fcol == n {
                firstcol[row] = col;
            } else {
                let rset = sets.find(fcol);
                let rroot = root[rset];
                if rroot != col {
                    parent_col[map_col_supercol[rroot]] = Some(col);
                    cset = sets.union(cset, rset);
                    root[cset] = col;
                }
            }
        }

        let ls = l_size[postorder[col]];
        let us = u_size[postorder[col]];

        // in a chain, check whether appending would overfill the front
        if !new_supercol {
            let cur = *fsc_size.last().unwrap();
            let inc = cur + 1;
            max_lsize += ls;
            max_usize += us;
            sc_lsize = sc_lsize.max(ls + cur);
            sc_usize = sc_usize.max(us + cur);
            if sc_lsize * inc > MAX_OVERFILL_RATIO * max_lsize
                || sc_usize * inc > MAX_OVERFILL_RATIO * max_usize
            {
                new_supercol = true;
            }
        }

        if new_supercol {
            fsc_size.push(1);
            fsc_last_col.push(col);
            map_col_supercol[col] = fsc_size.len() - 1;
            max_lsize = ls;
            max_usize = us;
            sc_lsize = ls;
            sc_usize = us;
        } else {
            *fsc_size.last_mut().unwrap() += 1;
            *fsc_last_col.last_mut().unwrap() = col;
            map_col_supercol[col] = fsc_size.len() - 1;
        }
    }

    // remap parents from column positions to supercolumn indices; a
    // supercolumn whose parent landed inside itself is a root
    let fsc_num = fsc_size.len();
    let mut fsc_parent: Vec<Option<usize>> = vec![None; fsc_num];
    for f in 0..fsc_num {
        if let Some(pcol) = parent_col[f] {
            let pf = map_col_supercol[pcol];
            if pf != f {
                fsc_parent[f] = Some(pf);
            }
        }
    }

    Detected {
        fsc_size,
        fsc_parent,
        fsc_last_col,
    }
}

// ============================================================================
// Relaxation
// ============================================================================

/// Unite small leaf supercolumns with their parents: a supercolumn is
/// absorbed into its parent while the parent is its immediate postorder
/// successor and the parent's last column has fewer than
/// [`RELAX_RULE_SIZE`] descendants. Restricting merges to immediate
/// ancestor paths keeps the per-column front bound valid for the united
/// supercolumn; roots always close their group.
fn relax_supercolumns(
    det: &Detected,
    desc_count: &[usize],
) -> (Vec<usize>, Vec<Option<usize>>) {
    let fsc_num = det.fsc_size.len();
    if RELAX_RULE_SIZE <= 1 {
        return (det.fsc_size.clone(), det.fsc_parent.clone());
    }

    let mut rsc_size: Vec<usize> = Vec::new();
    let mut rsc_last_fsc: Vec<usize> = Vec::new();
    let mut map_fsc_rsc = vec![0usize; fsc_num];
    let mut acc = 0usize;
    for f in 0..fsc_num {
        acc += det.fsc_size[f];
        map_fsc_rsc[f] = rsc_size.len();
        let close = match det.fsc_parent[f] {
            None => true,
            Some(p) => p != f + 1 || desc_count[det.fsc_last_col[p]] >= RELAX_RULE_SIZE,
        };
        if close {
            rsc_size.push(acc);
            rsc_last_fsc.push(f);
            acc = 0;
        }
    }
    debug_assert_eq!(acc, 0, "the last supercolumn must close its group");

    let rsc_parent: Vec<Option<usize>> = rsc_last_fsc
        .iter()
        .map(|&lf| det.fsc_parent[lf].map(|p| map_fsc_rsc[p]))
        .collect();

    (rsc_size, rsc_parent)
}

// ============================================================================
// Finalization
// ============================================================================

/// Fill in everything derived from the supercolumn sizes and parents:
/// start/end offsets, child lists, descendant intervals and covered column
/// counts.
fn complete_symbolic(
    n: usize,
    columns: Vec<usize>,
    sc_size: Vec<usize>,
    sc_parent: Vec<Option<usize>>,
    sc_l_size: Vec<usize>,
    sc_u_size: Vec<usize>,
) -> Symbolic {
    let s = sc_size.len();

    let mut start_supercolumn = vec![0usize; s];
    let mut end_supercolumn = vec![0usize; s];
    end_supercolumn[0] = sc_size[0] - 1;
    for i in 1..s {
        start_supercolumn[i] = end_supercolumn[i - 1] + 1;
        end_supercolumn[i] = start_supercolumn[i] + sc_size[i] - 1;
    }
    debug_assert_eq!(end_supercolumn[s - 1], n - 1);

    let mut first_root = None;
    let mut first_child: Vec<Option<usize>> = vec![None; s];
    let mut next_child: Vec<Option<usize>> = vec![None; s];
    for child in 0..s {
        match sc_parent[child] {
            None => {
                next_child[child] = first_root;
                first_root = Some(child);
            }
            Some(p) => {
                next_child[child] = first_child[p];
                first_child[p] = Some(child);
            }
        }
    }

    // Descendant intervals in one ascending sweep: thanks to the postorder
    // every child is finished before its parent is reached.
    let mut first_desc_index: Vec<Option<usize>> = vec![None; s];
    let mut last_desc_index: Vec<Option<usize>> = vec![None; s];
    for i in 0..s {
        if first_desc_index[i].is_some() {
            last_desc_index[i] = Some(i - 1);
        }
        if let Some(p) = sc_parent[i] {
            if first_desc_index[p].is_none() {
                first_desc_index[p] = Some(first_desc_index[i].unwrap_or(i));
            }
        }
    }

    let mut covered = vec![0usize; s];
    for i in 0..s {
        covered[i] += sc_size[i];
        if let Some(p) = sc_parent[i] {
            covered[p] += covered[i];
        }
    }

    Symbolic {
        n,
        columns,
        number_supercolumns: s,
        start_supercolumn,
        end_supercolumn,
        supercolumn_size: sc_size,
        supercolumn_covered_columns: covered,
        l_size: sc_l_size,
        u_size: sc_u_size,
        etree: EliminationTree {
            first_root,
            parent: sc_parent,
            first_child,
            next_child,
            first_desc_index,
            last_desc_index,
        },
    }
}
