//! Fixed 3×3 structuring element shared by the window and the filter.
//!
//! Neighbourhood layout around the centre column `c` of the middle row:
//! ```text
//!   top[c-1]     top[c]     top[c+1]
//!   middle[c-1]  middle[c]  middle[c+1]
//!   bottom[c-1]  bottom[c]  bottom[c+1]
//! ```

/// Side length of the square kernel, in cells.
pub const KERNEL_SIZE: usize = 3;

/// Cells on each side of the centre.
pub const KERNEL_RADIUS: usize = KERNEL_SIZE / 2;

/// Maximum over the 3×3 block centred at column `c`, centre included.
///
/// NaN cells never win, wherever they sit in the block; a block that is
/// entirely NaN yields NaN. `rows` is `[top, middle, bottom]`. Caller must
/// ensure `KERNEL_RADIUS ≤ c < len - KERNEL_RADIUS` for every row.
#[inline]
pub fn window_max(rows: [&[f64]; KERNEL_SIZE], c: usize) -> f64 {
    let lo = c - KERNEL_RADIUS;
    let hi = c + KERNEL_RADIUS;
    rows.iter()
        .flat_map(|row| row[lo..=hi].iter().copied())
        .fold(f64::NAN, f64::max)
}
