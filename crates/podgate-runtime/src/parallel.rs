//! Bounded fan-out for per-node stages.

use std::thread;

/// Apply `f` to every item using at most `workers` threads.
///
/// Results come back in input order. Work is split into contiguous chunks,
/// one per worker; a single chunk runs on the calling thread. A panic in `f`
/// is propagated to the caller.
pub fn parallelize<'a, T, R, F>(items: &'a [T], workers: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&'a T) -> R + Sync,
{
    let workers = workers.clamp(1, items.len().max(1));
    if workers == 1 {
        return items.iter().map(&f).collect();
    }

    let chunk_size = items.len().div_ceil(workers);
    let f = &f;
    thread::scope(|s| {
        let handles: Vec<_> = items
            .chunks(chunk_size)
            .map(|chunk| s.spawn(move || chunk.iter().map(f).collect::<Vec<R>>()))
            .collect();

        let mut results = Vec::with_capacity(items.len());
        for handle in handles {
            match handle.join() {
                Ok(chunk) => results.extend(chunk),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        results
    })
}
