//! Even-spaced sampling of long fragment lists.

/// Pick at most `max` items, always keeping the first and last and spacing
/// the interior picks evenly (Bresenham-style). `max == 0` keeps everything.
pub fn sample_evenly<T: Clone>(items: &[T], max: usize) -> Vec<T> {
    if max == 0 || items.len() <= max {
        return items.to_vec();
    }
    match max {
        1 => return items[..1].to_vec(),
        2 => return vec![items[0].clone(), items[items.len() - 1].clone()],
        _ => {}
    }

    let len = items.len();
    let n = len - 2;
    let m = max - 2;
    let mut out = Vec::with_capacity(max);
    out.push(items[0].clone());
    for i in 0..m {
        let index = (1 + i * n / m + len / (2 * m)).min(len - 2);
        out.push(items[index].clone());
    }
    out.push(items[len - 1].clone());
    out
}
