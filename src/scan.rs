//! Lane fan-out and parallel prefix scan.
//!
//! Every parallel phase in the crate goes through these helpers: work is cut
//! into contiguous chunks, one scoped thread per chunk, and each lane writes
//! only the chunk it was handed.

/// Below this many items per lane, fanning out costs more than it saves.
pub(crate) const MIN_ITEMS_PER_LANE: usize = 16 * 1024;

/// Resolve thread count: 0 = auto (available_parallelism), otherwise use the given value.
pub fn resolve_thread_count(threads: usize) -> usize {
    if threads == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    } else {
        threads
    }
}

/// Number of lanes worth using for `len` items with `threads` available.
pub(crate) fn lane_count(len: usize, threads: usize) -> usize {
    threads.min(len / MIN_ITEMS_PER_LANE).max(1)
}

/// Chunk length that splits `len` items across `lanes`, rounded up to a
/// multiple of `align`.
pub(crate) fn chunk_len(len: usize, lanes: usize, align: usize) -> usize {
    let per_lane = len.div_ceil(lanes.max(1)).max(1);
    per_lane.div_ceil(align) * align
}

/// Run `f(start, chunk)` over disjoint chunks of `data` on scoped threads.
///
/// `start` is the index of `chunk[0]` in `data`. Runs inline when a single
/// lane suffices.
pub(crate) fn par_chunks_mut<T, F>(data: &mut [T], threads: usize, f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync,
{
    let lanes = lane_count(data.len(), threads);
    if lanes <= 1 {
        f(0, data);
        return;
    }

    let chunk = chunk_len(data.len(), lanes, 1);
    std::thread::scope(|scope| {
        let f = &f;
        for (i, part) in data.chunks_mut(chunk).enumerate() {
            scope.spawn(move || f(i * chunk, part));
        }
    });
}

/// Run `f(lane_range)` for `lanes` contiguous ranges of `0..len` and collect
/// the results in range order.
pub(crate) fn par_map_ranges<R, F>(len: usize, lanes: usize, align: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(std::ops::Range<usize>) -> R + Sync,
{
    if len == 0 {
        return Vec::new();
    }
    let chunk = chunk_len(len, lanes, align);
    let ranges: Vec<std::ops::Range<usize>> = (0..len)
        .step_by(chunk)
        .map(|start| start..(start + chunk).min(len))
        .collect();

    if ranges.len() == 1 {
        return vec![f(0..len)];
    }

    std::thread::scope(|scope| {
        let f = &f;
        let handles: Vec<_> = ranges
            .into_iter()
            .map(|range| scope.spawn(move || f(range)))
            .collect();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(r) => r,
                Err(payload) => std::panic::resume_unwind(payload),
            })
            .collect()
    })
}

/// Exclusive prefix sum of `size(item)` over `items`.
///
/// Returns `(offsets, total)` where `offsets[i]` is the sum of the sizes of
/// all items before `i`. Two-pass blocked scan: lanes reduce their chunk,
/// the chunk totals are scanned, then lanes rescan their chunk from its base.
pub fn exclusive_scan_by<T, F>(items: &[T], threads: usize, size: F) -> (Vec<usize>, usize)
where
    T: Sync,
    F: Fn(&T) -> usize + Sync,
{
    let lanes = lane_count(items.len(), threads);
    let mut offsets = vec![0usize; items.len()];

    if lanes <= 1 {
        let mut acc = 0usize;
        for (slot, item) in offsets.iter_mut().zip(items) {
            *slot = acc;
            acc += size(item);
        }
        return (offsets, acc);
    }

    let chunk = chunk_len(items.len(), lanes, 1);

    // Pass 1: per-chunk totals.
    let sums = par_map_ranges(items.len(), lanes, 1, |range| {
        items[range].iter().map(&size).sum::<usize>()
    });

    // Scan the chunk totals into chunk bases.
    let mut bases = Vec::with_capacity(sums.len());
    let mut total = 0usize;
    for s in &sums {
        bases.push(total);
        total += s;
    }

    // Pass 2: rescan each chunk from its base.
    std::thread::scope(|scope| {
        let size = &size;
        for ((out, part), &base) in offsets
            .chunks_mut(chunk)
            .zip(items.chunks(chunk))
            .zip(&bases)
        {
            scope.spawn(move || {
                let mut acc = base;
                for (slot, item) in out.iter_mut().zip(part) {
                    *slot = acc;
                    acc += size(item);
                }
            });
        }
    });

    (offsets, total)
}
