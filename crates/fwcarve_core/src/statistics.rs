//! Byte statistics over fixed-size windows.

/// Per-window summary produced while scanning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub offset: u64,
    pub len: usize,
    pub non_zero: usize,
    pub dense: bool,
}

/// Counts bytes that are not `0x00`.
#[inline]
pub fn non_zero_count(data: &[u8]) -> usize {
    data.len() - memchr::memchr_iter(0x00, data).count()
}

/// Dense-window predicate.
///
/// The count is compared against the *nominal* window size, so a short final
/// window has to carry as many non-zero bytes as a full window would.
#[inline]
pub fn is_dense(non_zero: usize, window_size: usize, threshold: f64) -> bool {
    non_zero as f64 > window_size as f64 * threshold
}

pub fn window_stats(offset: u64, window: &[u8], window_size: usize, threshold: f64) -> WindowStats {
    let non_zero = non_zero_count(window);
    WindowStats {
        offset,
        len: window.len(),
        non_zero,
        dense: is_dense(non_zero, window_size, threshold),
    }
}

/// Iterates the buffer as consecutive non-overlapping windows.
pub fn windows(
    data: &[u8],
    window_size: usize,
    threshold: f64,
) -> impl Iterator<Item = WindowStats> + '_ {
    data.chunks(window_size.max(1))
        .enumerate()
        .map(move |(i, chunk)| {
            window_stats((i * window_size) as u64, chunk, window_size, threshold)
        })
}

/// Shannon entropy in bits per byte.
pub fn compute_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut counts = [0u64; 256];
    for &byte in data {
        counts[byte as usize] += 1;
    }
    let len = data.len() as f64;
    let mut entropy = 0.0;
    for &count in &counts {
        if count > 0 {
            let p = count as f64 / len;
            entropy -= p * p.log2();
        }
    }
    entropy
}
