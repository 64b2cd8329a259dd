use crate::config::EngineConfig;
use std::ops::Range;

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use rayon::prelude::*;
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use rayon::ThreadPool;
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use std::sync::OnceLock;

/// Crate-local rayon pool.
///
/// Building the global pool can fail under resource pressure, after which rayon panics on first
/// use. A private pool lets us fall back to sequential execution instead.
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
static RAYON_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
fn desired_rayon_threads() -> usize {
    let from_env = std::env::var("RAYON_NUM_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n > 0);
    from_env.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    })
}

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
fn build_rayon_pool() -> Option<ThreadPool> {
    let requested = desired_rayon_threads().max(1);
    let try_build = |n| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .thread_name(|idx| format!("formula-frame-{idx}"))
            .build()
    };

    match try_build(requested) {
        Ok(pool) => Some(pool),
        Err(err) if requested > 1 => {
            log::warn!("rayon pool with {requested} threads failed ({err}); retrying with 1");
            try_build(1).ok()
        }
        Err(err) => {
            log::warn!("rayon pool unavailable ({err}); running sequentially");
            None
        }
    }
}

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
fn rayon_pool() -> Option<&'static ThreadPool> {
    RAYON_POOL.get_or_init(build_rayon_pool).as_ref()
}

/// Apply `f` to every item, keeping input order in the output. The first error wins.
pub(crate) fn try_map_ordered<T, R, E, F>(
    config: &EngineConfig,
    rows: usize,
    items: &[T],
    f: F,
) -> Result<Vec<R>, E>
where
    T: Sync,
    R: Send,
    E: Send,
    F: Fn(&T) -> Result<R, E> + Sync + Send,
{
    #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
    {
        if items.len() > 1 && config.wants_parallel(rows) {
            if let Some(pool) = rayon_pool() {
                return pool.install(|| items.par_iter().map(&f).collect());
            }
        }
    }
    #[cfg(not(all(feature = "parallel", not(target_arch = "wasm32"))))]
    {
        let _ = (config, rows);
    }

    items.iter().map(f).collect()
}

/// Split `0..len` into `chunk_size` ranges, run `f` on each and concatenate the results in order.
pub(crate) fn map_chunks_ordered<R, F>(
    config: &EngineConfig,
    len: usize,
    chunk_size: usize,
    f: F,
) -> Vec<R>
where
    R: Send,
    F: Fn(Range<usize>) -> Vec<R> + Sync + Send,
{
    let chunk_size = chunk_size.max(1);
    let ranges: Vec<Range<usize>> = (0..len)
        .step_by(chunk_size)
        .map(|start| start..(start + chunk_size).min(len))
        .collect();

    #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
    {
        if ranges.len() > 1 && config.wants_parallel(len) {
            if let Some(pool) = rayon_pool() {
                let chunks: Vec<Vec<R>> = pool.install(|| ranges.into_par_iter().map(&f).collect());
                return chunks.into_iter().flatten().collect();
            }
        }
    }
    #[cfg(not(all(feature = "parallel", not(target_arch = "wasm32"))))]
    {
        let _ = config;
    }

    ranges.into_iter().flat_map(f).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn eager() -> EngineConfig {
        EngineConfig {
            parallel: true,
            parallel_min_rows: 0,
            map_rows_chunk_size: 3,
        }
    }

    #[test]
    fn chunks_preserve_order() {
        let out = map_chunks_ordered(&eager(), 10, 3, |range| range.map(|i| i * 2).collect());
        assert_eq!(out, (0..10).map(|i| i * 2).collect::<Vec<_>>());
        let empty: Vec<usize> = map_chunks_ordered(&eager(), 0, 3, |range| range.collect());
        assert!(empty.is_empty());
    }

    #[test]
    fn try_map_reports_errors_and_keeps_order() {
        let items = [1, 2, 3, 4];
        let ok: Result<Vec<i32>, String> = try_map_ordered(&eager(), 100, &items, |v| Ok(v * 10));
        assert_eq!(ok.unwrap(), vec![10, 20, 30, 40]);

        let err: Result<Vec<i32>, String> = try_map_ordered(&eager(), 100, &items, |v| {
            if *v == 3 {
                Err("three".to_string())
            } else {
                Ok(*v)
            }
        });
        assert_eq!(err.unwrap_err(), "three");
    }
}
