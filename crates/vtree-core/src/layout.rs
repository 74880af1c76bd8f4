use std::ops::Range;

pub const DEFAULT_ROW_HEIGHT: f32 = 28.0;

/// Vertical layout of variable-height rows, kept as prefix sums.
#[derive(Debug, Clone, PartialEq)]
pub struct RowLayout {
    heights: Vec<f32>,
    origins: Vec<f32>,
}

impl Default for RowLayout {
    fn default() -> Self {
        Self {
            heights: Vec::new(),
            origins: vec![0.0],
        }
    }
}

impl RowLayout {
    pub fn new(heights: impl IntoIterator<Item = f32>) -> Self {
        let mut layout = Self::default();
        for h in heights {
            let h = sanitize_height(h);
            let last = layout.origins.last().copied().unwrap_or(0.0);
            layout.heights.push(h);
            layout.origins.push(last + h);
        }
        layout
    }

    pub fn uniform(count: usize, height: f32) -> Self {
        Self::new(std::iter::repeat_n(height, count))
    }

    pub fn len(&self) -> usize {
        self.heights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    pub fn row_height(&self, ix: usize) -> f32 {
        self.heights.get(ix).copied().unwrap_or(DEFAULT_ROW_HEIGHT)
    }

    /// Top of row `ix`; for `ix == len()` this is the bottom of the last row.
    pub fn row_top(&self, ix: usize) -> f32 {
        let clamped = ix.min(self.heights.len());
        self.origins.get(clamped).copied().unwrap_or(0.0)
    }

    pub fn content_height(&self) -> f32 {
        self.origins.last().copied().unwrap_or(0.0)
    }

    /// Row under a content-space `y`. Returns `len()` when `y` is past the last row.
    pub fn index_at_y(&self, y: f32) -> usize {
        let count = self.heights.len();
        if count == 0 || !y.is_finite() {
            return 0;
        }

        let y = y.max(0.0);
        let content_end = self.content_height();
        if y >= content_end {
            return count;
        }

        // `origins` is strictly increasing (heights are clamped to >= 1).
        let mut lo = 0usize;
        let mut hi = count;
        while lo < hi {
            let mid = (lo + hi) / 2;
            let end_y = self.origins.get(mid + 1).copied().unwrap_or(content_end);
            if end_y <= y {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Rows intersecting `scroll_offset..scroll_offset + viewport_height`.
    pub fn visible_range(&self, scroll_offset: f32, viewport_height: f32) -> Range<usize> {
        if self.is_empty() || viewport_height.is_nan() || viewport_height <= 0.0 {
            return 0..0;
        }
        let top = scroll_offset.max(0.0);
        let start = self.index_at_y(top);
        let bottom = top + viewport_height;
        let mut end = start;
        while end < self.len() && self.row_top(end) < bottom {
            end += 1;
        }
        start..end
    }
}

fn sanitize_height(h: f32) -> f32 {
    if !h.is_finite() || h <= 0.0 { 1.0 } else { h }
}
