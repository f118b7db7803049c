//! Dense vector and matrix primitives.
//!
//! The plain-slice functions delegate to `ndarray`. The `*_cells` variants
//! operate on rows of shared weight tables (see [`Real`]); those loops are
//! written out by hand because every element is a relaxed atomic.

use ndarray::linalg::general_mat_mul;
use ndarray::{ArrayView1, ArrayViewMut2, Axis};

use crate::real;
use crate::table::Real;

pub fn dot(a: &[real], b: &[real]) -> real {
    debug_assert_eq!(a.len(), b.len());
    ArrayView1::from(a).dot(&ArrayView1::from(b))
}

pub fn norm(v: &[real]) -> real {
    dot(v, v).sqrt()
}

pub fn normalize(v: &mut [real]) {
    let len = norm(v);
    if len > 0.0 {
        scale(v, 1.0 / len);
    }
}

/// `y += alpha * x`
pub fn axpy(alpha: real, x: &[real], y: &mut [real]) {
    debug_assert_eq!(x.len(), y.len());
    ndarray::ArrayViewMut1::from(y).scaled_add(alpha, &ArrayView1::from(x));
}

pub fn scale(v: &mut [real], s: real) {
    for e in v {
        *e *= s;
    }
}

/// Average of `rows`, written to `out`. Leaves `out` zeroed if there are no
/// rows.
pub fn average<'a>(rows: impl IntoIterator<Item = &'a [real]>, out: &mut [real]) {
    out.fill(0.0);
    let mut n = 0;
    for row in rows {
        axpy(1.0, row, out);
        n += 1;
    }
    if n > 0 {
        scale(out, 1.0 / n as real);
    }
}

/// Outer-product accumulate: `a += alpha * x yᵀ`.
pub fn ger(alpha: real, x: ArrayView1<'_, real>, y: ArrayView1<'_, real>, mut a: ArrayViewMut2<'_, real>) {
    debug_assert_eq!(a.shape(), [x.len(), y.len()]);
    let x = x.insert_axis(Axis(1));
    let y = y.insert_axis(Axis(0));
    general_mat_mul(alpha, &x, &y, 1.0, &mut a);
}

pub fn dot_cells(cells: &[Real], x: &[real]) -> real {
    debug_assert_eq!(cells.len(), x.len());
    cells.iter().zip(x).map(|(c, &x)| c.get() * x).sum()
}

/// `cells += alpha * x`, element by element, without locking.
pub fn axpy_cells(alpha: real, x: &[real], cells: &[Real]) {
    debug_assert_eq!(cells.len(), x.len());
    for (c, &x) in cells.iter().zip(x) {
        c.add(alpha * x);
    }
}

/// `y += alpha * cells`
pub fn axpy_from_cells(alpha: real, cells: &[Real], y: &mut [real]) {
    debug_assert_eq!(cells.len(), y.len());
    for (y, c) in y.iter_mut().zip(cells) {
        *y += alpha * c.get();
    }
}

pub fn load_cells(cells: &[Real], out: &mut [real]) {
    debug_assert_eq!(cells.len(), out.len());
    for (o, c) in out.iter_mut().zip(cells) {
        *o = c.get();
    }
}
