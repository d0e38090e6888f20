//! Bounded sequence with cheap eviction of its oldest entries.
//!
//! Elements live in segments of `segment_size` elements. Pushing past the
//! capacity drops the oldest segment as a whole, so eviction never shifts
//! the remaining elements. Segments are `Arc`-shared: cloning a stack copies
//! at most `segment_count` pointers, and only segments that are modified
//! afterwards get copied.

use std::ops::Index;
use std::sync::Arc;

/// A length-bounded, persistent sequence.
///
/// Invariants:
/// - at most `segment_count` segments, so never more than
///   `max_len + 2 * segment_size - 1` elements;
/// - every segment but the last holds exactly `segment_size` elements;
/// - the last segment holds between 1 and `segment_size` elements.
#[derive(Clone, Debug)]
pub struct TruncatingStack<E> {
    segments: Vec<Arc<Vec<E>>>,
    segment_size: usize,
    segment_count: usize,
    max_len: usize,
}

/// Pick a power-of-two segment size `s` and a segment count `c` such that
/// `c * s - s >= max_len` and `s >= c`.
fn segment_layout(max_len: usize) -> (usize, usize) {
    let mut size = 1usize;
    loop {
        let count = max_len.div_ceil(size) + 1;
        if size >= count {
            return (size, count);
        }
        size *= 2;
    }
}

impl<E: Clone> TruncatingStack<E> {
    /// Create an empty stack that keeps at least the newest `max_len` elements.
    pub fn empty(max_len: usize) -> Self {
        let (segment_size, segment_count) = segment_layout(max_len);
        Self {
            segments: Vec::new(),
            segment_size,
            segment_count,
            max_len,
        }
    }

    /// Build a stack from elements, oldest first. Elements beyond the
    /// capacity are evicted from the front.
    pub fn from_items(max_len: usize, items: impl IntoIterator<Item = E>) -> Self {
        let mut stack = Self::empty(max_len);
        stack.segments = stack.split(items.into_iter().collect());
        stack.truncate();
        stack
    }

    /// The `max_len` this stack was sized for.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    pub fn segment_count(&self) -> usize {
        self.segment_count
    }

    /// Number of stored elements.
    pub fn len(&self) -> usize {
        match self.segments.last() {
            Some(last) => (self.segments.len() - 1) * self.segment_size + last.len(),
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Get the element at logical index `n` (0 is the oldest).
    pub fn get(&self, n: usize) -> Option<&E> {
        self.segments
            .get(n / self.segment_size)
            .and_then(|segment| segment.get(n % self.segment_size))
    }

    /// The newest element.
    pub fn last(&self) -> Option<&E> {
        self.segments.last().and_then(|segment| segment.last())
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &E> + '_ {
        self.segments.iter().flat_map(|segment| segment.iter())
    }

    /// Segment contents, oldest first.
    pub fn segments(&self) -> impl Iterator<Item = &[E]> + '_ {
        self.segments.iter().map(|segment| segment.as_slice())
    }

    /// Append an element, evicting the oldest segment when full.
    pub fn push(&mut self, item: E) {
        match self.segments.last_mut() {
            Some(last) if last.len() < self.segment_size => Arc::make_mut(last).push(item),
            _ => {
                if self.segments.len() == self.segment_count {
                    self.segments.remove(0);
                }
                let mut segment = Vec::with_capacity(self.segment_size);
                segment.push(item);
                self.segments.push(Arc::new(segment));
            }
        }
    }

    /// Replace everything from logical index `from` on with `items`.
    ///
    /// Segments entirely before `from` are kept as they are.
    pub fn replace_from(&mut self, from: usize, items: impl IntoIterator<Item = E>) {
        let len = self.len();
        assert!(from <= len, "replace_from({from}) past stack length {len}");

        let split_at = from / self.segment_size;
        let offset = from % self.segment_size;
        let mut tail: Vec<E> = match self.segments.get(split_at) {
            Some(segment) => segment[..offset].to_vec(),
            None => Vec::new(),
        };
        tail.extend(items);

        self.segments.truncate(split_at);
        let rest = self.split(tail);
        self.segments.extend(rest);
        self.truncate();
    }

    /// Replace everything before logical index `to` with `items`.
    pub fn replace_before(&mut self, to: usize, items: impl IntoIterator<Item = E>) {
        let len = self.len();
        assert!(to <= len, "replace_before({to}) past stack length {len}");

        let mut all: Vec<E> = items.into_iter().collect();
        all.extend(self.iter().skip(to).cloned());
        self.segments = self.split(all);
        self.truncate();
    }

    /// Copy out the elements in `[from, to)`.
    pub fn slice(&self, from: usize, to: usize) -> Vec<E> {
        self.iter().skip(from).take(to.saturating_sub(from)).cloned().collect()
    }

    /// Rebuild for a different `max_len`, keeping the newest elements.
    pub fn resized(&self, max_len: usize) -> Self {
        if max_len == self.max_len {
            return self.clone();
        }
        Self::from_items(max_len, self.iter().cloned())
    }

    /// Whether both stacks share every segment, i.e. one is an unmodified
    /// clone of the other.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }

    fn split(&self, items: Vec<E>) -> Vec<Arc<Vec<E>>> {
        items
            .chunks(self.segment_size)
            .map(|chunk| {
                let mut segment = Vec::with_capacity(self.segment_size);
                segment.extend_from_slice(chunk);
                Arc::new(segment)
            })
            .collect()
    }

    fn truncate(&mut self) {
        if self.segments.len() > self.segment_count {
            let excess = self.segments.len() - self.segment_count;
            self.segments.drain(..excess);
        }
    }
}

impl<E: Clone> Index<usize> for TruncatingStack<E> {
    type Output = E;

    fn index(&self, n: usize) -> &E {
        match self.get(n) {
            Some(item) => item,
            None => panic!("index {n} out of range for stack of length {}", self.len()),
        }
    }
}

impl<E: Clone + PartialEq> PartialEq for TruncatingStack<E> {
    fn eq(&self, other: &Self) -> bool {
        self.max_len == other.max_len && self.len() == other.len() && self.iter().eq(other.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(stack: &TruncatingStack<usize>) -> Vec<usize> {
        stack.iter().copied().collect()
    }

    fn assert_layout(stack: &TruncatingStack<usize>) {
        let segments: Vec<&[usize]> = stack.segments().collect();
        assert!(segments.len() <= stack.segment_count());
        for (i, segment) in segments.iter().enumerate() {
            if i + 1 < segments.len() {
                assert_eq!(segment.len(), stack.segment_size());
            } else {
                assert!(!segment.is_empty() && segment.len() <= stack.segment_size());
            }
        }
    }

    #[test]
    fn test_segment_layout() {
        for max_len in [0, 1, 5, 10, 100, 200, 1000] {
            let (size, count) = segment_layout(max_len);
            assert!(size.is_power_of_two());
            assert!(size >= count);
            assert!(count * size - size >= max_len);
        }
        assert_eq!(segment_layout(100), (16, 8));
        assert_eq!(segment_layout(10), (4, 4));
    }

    #[test]
    fn test_push_and_get() {
        let mut stack = TruncatingStack::empty(10);
        for i in 0..7 {
            stack.push(i);
        }
        assert_eq!(stack.len(), 7);
        assert_eq!(stack.get(0), Some(&0));
        assert_eq!(stack[5], 5);
        assert_eq!(stack.last(), Some(&6));
        assert_eq!(stack.get(7), None);
        assert_layout(&stack);
    }

    #[test]
    fn test_push_evicts_oldest_segment() {
        let mut stack = TruncatingStack::empty(10);
        // 4 segments of 4 hold 16 elements; the 17th starts a new segment
        for i in 0..17 {
            stack.push(i);
        }
        assert_eq!(stack.len(), 13);
        assert_eq!(stack[0], 4);
        assert_eq!(stack.last(), Some(&16));
        assert!(stack.len() >= stack.max_len());
        assert_layout(&stack);
    }

    #[test]
    fn test_length_stays_within_two_segments_of_max_len() {
        let mut stack = TruncatingStack::empty(100);
        for i in 0..1000 {
            stack.push(i);
            assert!(stack.len() >= stack.max_len().min(i + 1));
            assert!(stack.len() <= stack.segment_count() * stack.segment_size());
            assert!(stack.len() <= 100 + 2 * stack.segment_size() - 1);
        }
        assert_eq!(stack.segment_count() * stack.segment_size(), 128);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_index_out_of_range_panics() {
        let mut stack = TruncatingStack::empty(4);
        stack.push(1);
        let _ = stack[3];
    }

    #[test]
    fn test_replace_from() {
        let mut stack = TruncatingStack::from_items(10, 0..9);
        stack.replace_from(6, [60, 70, 80, 90]);
        assert_eq!(contents(&stack), vec![0, 1, 2, 3, 4, 5, 60, 70, 80, 90]);
        assert_layout(&stack);

        stack.replace_from(2, []);
        assert_eq!(contents(&stack), vec![0, 1]);
        assert_layout(&stack);

        stack.replace_from(0, []);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_replace_before() {
        let mut stack = TruncatingStack::from_items(10, 0..9);
        stack.replace_before(5, [100]);
        assert_eq!(contents(&stack), vec![100, 5, 6, 7, 8]);
        assert_layout(&stack);
    }

    #[test]
    fn test_replace_keeps_capacity_bound() {
        let mut stack = TruncatingStack::from_items(10, 0..10);
        stack.replace_from(10, 10..30);
        assert!(stack.segments().count() <= stack.segment_count());
        assert_eq!(stack.last(), Some(&29));
        assert_layout(&stack);
    }

    #[test]
    fn test_clone_shares_untouched_segments() {
        let mut stack = TruncatingStack::empty(100);
        for i in 0..40 {
            stack.push(i);
        }
        let snapshot = stack.clone();
        assert!(snapshot.ptr_eq(&stack));

        stack.push(40);
        assert!(!snapshot.ptr_eq(&stack));
        assert_eq!(snapshot.len(), 40);
        assert_eq!(stack.len(), 41);
        // full segments are still shared
        let shared = snapshot
            .segments
            .iter()
            .zip(&stack.segments)
            .filter(|(a, b)| Arc::ptr_eq(a, b))
            .count();
        assert_eq!(shared, 2);
    }

    #[test]
    fn test_resized_keeps_newest() {
        let stack = TruncatingStack::from_items(100, 0..50);
        let small = stack.resized(10);
        assert_eq!(small.last(), Some(&49));
        assert!(small.len() >= 10);
        assert!(small.len() < 50);
        assert_layout(&small);
    }
}
