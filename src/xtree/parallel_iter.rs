//! Conditional parallel iteration helpers.
//!
//! These functions provide parallel iteration when the `native` feature is enabled
//! (using rayon), and fall back to sequential iteration otherwise.

#[cfg(feature = "native")]
use rayon::prelude::*;

/// Process a Vec in parallel (native) or sequentially, returning results in
/// input order.
#[cfg(feature = "native")]
pub fn map_vec<T, R, F>(items: Vec<T>, f: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync + Send,
{
    items.into_par_iter().map(f).collect()
}

#[cfg(not(feature = "native"))]
pub fn map_vec<T, R, F>(items: Vec<T>, f: F) -> Vec<R>
where
    F: Fn(T) -> R,
{
    items.into_iter().map(f).collect()
}

/// Default number of workers: one per rayon thread, or 1 without `native`.
pub fn available_workers() -> usize {
    #[cfg(feature = "native")]
    {
        rayon::current_num_threads().max(1)
    }
    #[cfg(not(feature = "native"))]
    {
        1
    }
}

/// Split `workers` and `items` into `min(workers.len(), items.len())`
/// contiguous groups.
///
/// Workers are spread as evenly as possible, with any remainder going to the
/// later groups. Items are handed out front-loaded (rounded up), so every
/// group gets at least one worker and one item. Concatenating the item
/// groups in order gives back the input order.
pub fn partition<'a, W, T>(mut workers: &'a mut [W], items: Vec<T>) -> Vec<(&'a mut [W], Vec<T>)> {
    let groups = workers.len().min(items.len());
    let mut remaining = items.len();
    let mut items = items.into_iter();
    let mut out = Vec::with_capacity(groups);

    for left in (1..=groups).rev() {
        let worker_count = workers.len() / left;
        let item_count = remaining.div_ceil(left);

        let (head, tail) = std::mem::take(&mut workers).split_at_mut(worker_count);
        workers = tail;
        out.push((head, items.by_ref().take(item_count).collect()));
        remaining -= item_count;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(workers: usize, items: usize) -> Vec<(usize, Vec<usize>)> {
        let mut pool: Vec<usize> = (0..workers).collect();
        partition(&mut pool, (0..items).collect())
            .into_iter()
            .map(|(w, i)| (w.len(), i))
            .collect()
    }

    #[test]
    fn test_fewer_workers_than_items() {
        assert_eq!(shape(3, 4), vec![(1, vec![0, 1]), (1, vec![2]), (1, vec![3])]);
        assert_eq!(shape(1, 8), vec![(1, (0..8).collect::<Vec<usize>>())]);
    }

    #[test]
    fn test_more_workers_than_items() {
        assert_eq!(
            shape(7, 4),
            vec![(1, vec![0]), (2, vec![1]), (2, vec![2]), (2, vec![3])]
        );
        let groups = shape(64, 8);
        assert_eq!(groups.len(), 8);
        assert!(groups.iter().all(|(w, i)| *w == 8 && i.len() == 1));
    }

    #[test]
    fn test_partition_uses_everything() {
        for workers in 1..20 {
            for items in 1..10 {
                let groups = shape(workers, items);
                assert_eq!(groups.iter().map(|(w, _)| w).sum::<usize>(), workers);
                let flat: Vec<usize> = groups.into_iter().flat_map(|(_, i)| i).collect();
                assert_eq!(flat, (0..items).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_map_vec_keeps_order() {
        let out = map_vec((0..100).collect(), |x: i32| x * 2);
        assert_eq!(out, (0..100).map(|x| x * 2).collect::<Vec<_>>());
    }
}
