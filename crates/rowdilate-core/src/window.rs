//! Three-row sliding window over the source grid.
//!
//! Holds source rows `r-1`, `r`, `r+1` as *top*, *middle* and *bottom*.
//! Advancing the window relabels the owned buffers; no cell is copied.

use crate::kernel::KERNEL_SIZE;

const TOP: usize = 0;
const MIDDLE: usize = 1;
const BOTTOM: usize = 2;

#[derive(Debug)]
pub struct RowWindow {
    rows: [Vec<f64>; KERNEL_SIZE],
}

impl RowWindow {
    /// Allocate all three buffers up front, sized to `cols`.
    pub fn new(cols: usize) -> Self {
        Self { rows: std::array::from_fn(|_| vec![0.0; cols]) }
    }

    pub fn cols(&self) -> usize {
        self.rows[TOP].len()
    }

    pub fn top(&self) -> &[f64] {
        &self.rows[TOP]
    }

    pub fn middle(&self) -> &[f64] {
        &self.rows[MIDDLE]
    }

    pub fn bottom(&self) -> &[f64] {
        &self.rows[BOTTOM]
    }

    pub fn top_mut(&mut self) -> &mut [f64] {
        &mut self.rows[TOP]
    }

    pub fn middle_mut(&mut self) -> &mut [f64] {
        &mut self.rows[MIDDLE]
    }

    /// Load target for the next source row.
    pub fn bottom_mut(&mut self) -> &mut [f64] {
        &mut self.rows[BOTTOM]
    }

    /// `[top, middle, bottom]` in kernel order.
    pub fn rows(&self) -> [&[f64]; KERNEL_SIZE] {
        [self.top(), self.middle(), self.bottom()]
    }

    /// top ← middle, middle ← bottom; the old top becomes the next bottom.
    pub fn rotate(&mut self) {
        self.rows.rotate_left(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotate_relabels_without_copying() {
        let mut w = RowWindow::new(4);
        w.top_mut().fill(1.0);
        w.middle_mut().fill(2.0);
        w.bottom_mut().fill(3.0);
        let ptrs = [w.top().as_ptr(), w.middle().as_ptr(), w.bottom().as_ptr()];

        w.rotate();

        assert_eq!(w.top(), &[2.0; 4]);
        assert_eq!(w.middle(), &[3.0; 4]);
        assert_eq!(w.bottom(), &[1.0; 4]);
        assert_eq!(w.top().as_ptr(), ptrs[1]);
        assert_eq!(w.middle().as_ptr(), ptrs[2]);
        assert_eq!(w.bottom().as_ptr(), ptrs[0]);
    }

    #[test]
    fn buffers_keep_their_length() {
        let mut w = RowWindow::new(7);
        for _ in 0..10 {
            w.rotate();
        }
        assert_eq!(w.cols(), 7);
        assert!(w.rows().iter().all(|r| r.len() == 7));
    }
}
