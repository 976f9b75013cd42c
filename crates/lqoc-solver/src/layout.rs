//! Per-stage dimensions and contiguous block storage for a horizon-structured QP.
//!
//! Every block type (A, B, Q, …) lives in one [`BlockArena`]: a single
//! column-major `Vec<f64>` with one offset per stage. A block with a zero
//! dimension takes no space and is reported as absent.

use nalgebra::{DMatrix, DMatrixView, DMatrixViewMut, DVectorView, Dim, Matrix, RawStorage};

/// Per-stage variable and constraint counts of a structured QP.
///
/// Stage 0's state is fixed, so `nx[0] == 0`; the last stage has no
/// control, so `nu[N] == 0`. Bound and general constraint counts are
/// always zero for now.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageDims {
    /// State variables per stage.
    pub nx: Vec<usize>,
    /// Control variables per stage.
    pub nu: Vec<usize>,
    /// Box bounds per stage.
    pub nb: Vec<usize>,
    /// General polytopic constraints per stage.
    pub ng: Vec<usize>,
}

impl StageDims {
    /// Dimensions for an N-stage problem with n states and m controls.
    pub fn for_horizon(horizon: usize, state_dim: usize, control_dim: usize) -> Self {
        let mut nx = vec![state_dim; horizon + 1];
        let mut nu = vec![control_dim; horizon + 1];
        nx[0] = 0;
        nu[horizon] = 0;
        Self {
            nx,
            nu,
            nb: vec![0; horizon + 1],
            ng: vec![0; horizon + 1],
        }
    }

    /// Number of stages N.
    pub fn horizon(&self) -> usize {
        self.nx.len() - 1
    }

    /// Total number of decision variables `Σ nx_k + nu_k`.
    pub fn num_variables(&self) -> usize {
        self.nx.iter().sum::<usize>() + self.nu.iter().sum::<usize>()
    }

    /// Number of dynamics equality rows `Σ_{k<N} nx_{k+1}`.
    pub fn num_equalities(&self) -> usize {
        self.nx[1..].iter().sum()
    }

    /// Number of one-sided inequality rows (lower and upper for every bound and constraint).
    pub fn num_inequalities(&self) -> usize {
        2 * (self.nb.iter().sum::<usize>() + self.ng.iter().sum::<usize>())
    }

    /// Block shapes of every arena, stage by stage.
    pub fn shapes(&self) -> ArenaShapes {
        let big_n = self.horizon();
        let dyn_stage = |f: &dyn Fn(usize) -> (usize, usize)| (0..big_n).map(f).collect::<Vec<_>>();
        let all_stage = |f: &dyn Fn(usize) -> (usize, usize)| (0..=big_n).map(f).collect::<Vec<_>>();

        ArenaShapes {
            a: dyn_stage(&|k| (self.nx[k + 1], self.nx[k])),
            b: dyn_stage(&|k| (self.nx[k + 1], self.nu[k])),
            b_vec: dyn_stage(&|k| (self.nx[k + 1], 1)),
            q: all_stage(&|k| (self.nx[k], self.nx[k])),
            s: all_stage(&|k| (self.nu[k], self.nx[k])),
            r: all_stage(&|k| (self.nu[k], self.nu[k])),
            q_vec: all_stage(&|k| (self.nx[k], 1)),
            r_vec: all_stage(&|k| (self.nu[k], 1)),
            d_lb: all_stage(&|k| (self.nb[k], 1)),
            d_ub: all_stage(&|k| (self.nb[k], 1)),
            c: all_stage(&|k| (self.ng[k], self.nx[k])),
            d: all_stage(&|k| (self.ng[k], self.nu[k])),
            d_lg: all_stage(&|k| (self.ng[k], 1)),
            d_ug: all_stage(&|k| (self.ng[k], 1)),
        }
    }

    /// Number of f64 slots needed to hold every QP block for these dimensions.
    pub fn mem_size(&self) -> usize {
        self.shapes().total_len()
    }
}

/// Block shapes for every arena of a transcribed QP.
#[derive(Clone, Debug)]
pub struct ArenaShapes {
    pub a: Vec<(usize, usize)>,
    pub b: Vec<(usize, usize)>,
    pub b_vec: Vec<(usize, usize)>,
    pub q: Vec<(usize, usize)>,
    pub s: Vec<(usize, usize)>,
    pub r: Vec<(usize, usize)>,
    pub q_vec: Vec<(usize, usize)>,
    pub r_vec: Vec<(usize, usize)>,
    pub d_lb: Vec<(usize, usize)>,
    pub d_ub: Vec<(usize, usize)>,
    pub c: Vec<(usize, usize)>,
    pub d: Vec<(usize, usize)>,
    pub d_lg: Vec<(usize, usize)>,
    pub d_ug: Vec<(usize, usize)>,
}

impl ArenaShapes {
    fn all(&self) -> [&Vec<(usize, usize)>; 14] {
        [
            &self.a, &self.b, &self.b_vec, &self.q, &self.s, &self.r, &self.q_vec, &self.r_vec,
            &self.d_lb, &self.d_ub, &self.c, &self.d, &self.d_lg, &self.d_ug,
        ]
    }

    /// Total number of f64 slots over all arenas.
    pub fn total_len(&self) -> usize {
        self.all()
            .iter()
            .flat_map(|shapes| shapes.iter())
            .map(|(r, c)| r * c)
            .sum()
    }
}

/// One contiguous column-major allocation holding a block per stage.
#[derive(Clone, Debug, Default)]
pub struct BlockArena {
    data: Vec<f64>,
    offsets: Vec<usize>,
    shapes: Vec<(usize, usize)>,
}

impl BlockArena {
    /// Zero-filled arena for the given per-stage block shapes.
    pub fn new(shapes: Vec<(usize, usize)>) -> Self {
        let mut offsets = Vec::with_capacity(shapes.len());
        let mut len = 0;
        for (rows, cols) in &shapes {
            offsets.push(len);
            len += rows * cols;
        }
        Self {
            data: vec![0.0; len],
            offsets,
            shapes,
        }
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn shape(&self, stage: usize) -> (usize, usize) {
        self.shapes[stage]
    }

    /// Whether the block at `stage` has any entries.
    pub fn is_present(&self, stage: usize) -> bool {
        let (rows, cols) = self.shapes[stage];
        rows * cols > 0
    }

    /// The block at `stage`, or `None` if it has a zero dimension.
    pub fn block(&self, stage: usize) -> Option<DMatrixView<'_, f64>> {
        self.is_present(stage).then(|| self.view(stage))
    }

    /// The single-column block at `stage` as a vector, or `None` if empty.
    pub fn column(&self, stage: usize) -> Option<DVectorView<'_, f64>> {
        self.is_present(stage).then(|| self.column_view(stage))
    }

    /// View of the block at `stage`, possibly with a zero dimension.
    pub fn view(&self, stage: usize) -> DMatrixView<'_, f64> {
        let (rows, cols) = self.shapes[stage];
        let start = self.offsets[stage];
        DMatrixView::from_slice(&self.data[start..start + rows * cols], rows, cols)
    }

    /// Vector view of a single-column block, possibly empty.
    pub fn column_view(&self, stage: usize) -> DVectorView<'_, f64> {
        let (rows, cols) = self.shapes[stage];
        debug_assert_eq!(cols, 1, "column_view on a {rows}x{cols} block");
        let start = self.offsets[stage];
        DVectorView::from_slice(&self.data[start..start + rows], rows)
    }

    pub fn view_mut(&mut self, stage: usize) -> DMatrixViewMut<'_, f64> {
        let (rows, cols) = self.shapes[stage];
        let start = self.offsets[stage];
        DMatrixViewMut::from_slice(&mut self.data[start..start + rows * cols], rows, cols)
    }

    /// Copy the top-left `shape(stage)` corner of `src` into the block at `stage`.
    ///
    /// Stage blocks can be smaller than the source when a dimension is
    /// dropped (e.g. the fixed initial state), never larger.
    pub fn set<R, C, S>(&mut self, stage: usize, src: &Matrix<f64, R, C, S>)
    where
        R: Dim,
        C: Dim,
        S: RawStorage<f64, R, C>,
    {
        let (rows, cols) = self.shapes[stage];
        assert!(
            src.nrows() >= rows && src.ncols() >= cols,
            "block {stage}: source {:?} smaller than {rows}x{cols}",
            src.shape()
        );
        self.view_mut(stage)
            .copy_from(&src.view((0, 0), (rows, cols)));
    }

    /// The whole backing allocation.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Owned copy of the block at `stage`.
    pub fn to_matrix(&self, stage: usize) -> DMatrix<f64> {
        self.view(stage).clone_owned()
    }
}
