/// Execution knobs shared by eager operations and [`QueryPlan`](crate::QueryPlan)s.
///
/// Configuration never changes results, only how work is scheduled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Fan independent work (projection outputs, aggregates, row-mapping chunks) out to the rayon
    /// pool. Ignored when the `parallel` feature is off.
    pub parallel: bool,
    /// Inputs with fewer rows than this always run sequentially.
    pub parallel_min_rows: usize,
    /// Rows per task for `map_rows`.
    pub map_rows_chunk_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: cfg!(feature = "parallel"),
            parallel_min_rows: 16_384,
            map_rows_chunk_size: 4_096,
        }
    }
}

impl EngineConfig {
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    #[cfg_attr(
        not(all(feature = "parallel", not(target_arch = "wasm32"))),
        allow(dead_code)
    )]
    pub(crate) fn wants_parallel(&self, rows: usize) -> bool {
        self.parallel && rows >= self.parallel_min_rows
    }
}
