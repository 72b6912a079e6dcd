use std::fmt;

use crate::error::CacheError;

/// Half-open range `[start, stop)` of absolute record indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Window {
    start: usize,
    stop: usize,
}

impl Window {
    pub fn new(start: usize, stop: usize) -> Result<Self, CacheError> {
        if start > stop {
            return Err(CacheError::InvalidRange {
                start: start as i64,
                stop: stop as i64,
            });
        }
        Ok(Self { start, stop })
    }

    /// Validates indices coming from a caller that may pass negative values.
    pub fn from_signed(start: i64, stop: i64) -> Result<Self, CacheError> {
        let invalid = || CacheError::InvalidRange { start, stop };
        let (Ok(from), Ok(to)) = (usize::try_from(start), usize::try_from(stop)) else {
            return Err(invalid());
        };
        if from > to {
            return Err(invalid());
        }
        Ok(Self { start: from, stop: to })
    }

    /// `len` records beginning at `start`.
    pub fn span(start: usize, len: usize) -> Self {
        Self {
            start,
            stop: start.saturating_add(len),
        }
    }

    // Callers guarantee start <= stop
    pub(crate) fn raw(start: usize, stop: usize) -> Self {
        debug_assert!(start <= stop);
        Self { start, stop }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn stop(&self) -> usize {
        self.stop
    }

    pub fn len(&self) -> usize {
        self.stop - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.stop
    }

    pub fn contains(&self, index: usize) -> bool {
        self.start <= index && index < self.stop
    }

    pub fn overlaps(&self, other: &Window) -> bool {
        self.start < other.stop && other.start < self.stop
    }

    /// Cuts the window at a known end of data. An unknown total leaves it as is.
    pub fn clamp_to_total(&self, total: Option<usize>) -> Window {
        match total {
            Some(total) => {
                let stop = self.stop.min(total);
                Window::raw(self.start.min(stop), stop)
            }
            None => *self,
        }
    }

    /// The parts of `self` not covered by any of `covered`, in ascending order.
    pub fn subtract(&self, covered: &[Window]) -> Vec<Window> {
        let mut remaining = vec![*self];
        for cut in coalesce(covered.to_vec()) {
            let mut next = Vec::with_capacity(remaining.len() + 1);
            for piece in remaining {
                if !piece.overlaps(&cut) {
                    next.push(piece);
                    continue;
                }
                if piece.start < cut.start {
                    next.push(Window::raw(piece.start, cut.start));
                }
                if cut.stop < piece.stop {
                    next.push(Window::raw(cut.stop, piece.stop));
                }
            }
            remaining = next;
        }
        remaining.retain(|w| !w.is_empty());
        remaining
    }

    /// Consecutive windows of at most `max_len` records, produced lazily so a
    /// huge window costs nothing until the chunks are taken. Zero means one
    /// chunk for the whole window.
    pub fn chunks(&self, max_len: usize) -> impl Iterator<Item = Window> {
        let step = if max_len == 0 { self.len() } else { max_len };
        let stop = self.stop;
        let mut cursor = self.start;
        std::iter::from_fn(move || {
            if cursor >= stop {
                return None;
            }
            let end = cursor.saturating_add(step).min(stop);
            let chunk = Window::raw(cursor, end);
            cursor = end;
            Some(chunk)
        })
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.stop)
    }
}

/// Sorts and merges overlapping or adjacent windows. Empty windows are dropped.
pub fn coalesce(mut windows: Vec<Window>) -> Vec<Window> {
    windows.retain(|w| !w.is_empty());
    windows.sort();
    let mut out: Vec<Window> = Vec::with_capacity(windows.len());
    for w in windows {
        match out.last_mut() {
            Some(last) if w.start <= last.stop => last.stop = last.stop.max(w.stop),
            _ => out.push(w),
        }
    }
    out
}
