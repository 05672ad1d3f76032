//! Dense matrices over GF(256)
//!
//! Just enough linear algebra for a systematic Reed-Solomon code: building the
//! encoding matrix and inverting the square sub-matrix picked by the decoder.

use crate::error::DecodeError;
use crate::gf256;
use std::fmt;

/// Row-major matrix of field elements
#[derive(Clone, PartialEq, Eq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<u8>,
}

impl Matrix {
    /// All-zero matrix
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0u8; rows * cols],
        }
    }

    /// Identity matrix of the given size
    pub fn identity(size: usize) -> Self {
        let mut m = Self::zeros(size, size);
        for i in 0..size {
            m.set(i, i, 1);
        }
        m
    }

    /// Vandermonde matrix with `m[r][c] = r^c`
    ///
    /// Any `cols` distinct rows are linearly independent as long as
    /// `rows <= 256`, which is what makes every k-subset of shards decodable.
    pub fn vandermonde(rows: usize, cols: usize) -> Self {
        let mut m = Self::zeros(rows, cols);
        for r in 0..rows {
            for c in 0..cols {
                m.set(r, c, gf256::pow(r as u8, c));
            }
        }
        m
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> u8 {
        self.data[r * self.cols + c]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, value: u8) {
        self.data[r * self.cols + c] = value;
    }

    /// Borrow one row
    pub fn row(&self, r: usize) -> &[u8] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Matrix product `self * rhs`
    pub fn multiply(&self, rhs: &Matrix) -> Matrix {
        assert_eq!(self.cols, rhs.rows, "matrix dimensions do not agree");
        let mut out = Matrix::zeros(self.rows, rhs.cols);
        for r in 0..self.rows {
            for c in 0..rhs.cols {
                let mut acc = 0u8;
                for i in 0..self.cols {
                    acc ^= gf256::mul(self.get(r, i), rhs.get(i, c));
                }
                out.set(r, c, acc);
            }
        }
        out
    }

    /// New matrix made of the listed rows, in the given order
    pub fn select_rows(&self, rows: &[usize]) -> Matrix {
        let mut out = Matrix::zeros(rows.len(), self.cols);
        for (dst, &src) in rows.iter().enumerate() {
            out.data[dst * self.cols..(dst + 1) * self.cols].copy_from_slice(self.row(src));
        }
        out
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for c in 0..self.cols {
            self.data.swap(a * self.cols + c, b * self.cols + c);
        }
    }

    /// Gauss-Jordan inversion of a square matrix
    pub fn invert(&self) -> Result<Matrix, DecodeError> {
        if self.rows != self.cols {
            return Err(DecodeError::InvalidParameters(format!(
                "cannot invert a {}x{} matrix",
                self.rows, self.cols
            )));
        }
        let n = self.rows;

        // Augment [self | I] and reduce the left half to the identity
        let width = 2 * n;
        let mut work = Matrix::zeros(n, width);
        for r in 0..n {
            for c in 0..n {
                work.set(r, c, self.get(r, c));
            }
            work.set(r, n + r, 1);
        }

        for col in 0..n {
            let pivot_row = (col..n)
                .find(|&r| work.get(r, col) != 0)
                .ok_or(DecodeError::SingularMatrix)?;
            work.swap_rows(col, pivot_row);

            let scale = gf256::inverse(work.get(col, col))?;
            if scale != 1 {
                for c in 0..width {
                    work.set(col, c, gf256::mul(work.get(col, c), scale));
                }
            }

            for r in 0..n {
                if r == col {
                    continue;
                }
                let factor = work.get(r, col);
                if factor == 0 {
                    continue;
                }
                for c in 0..width {
                    let v = gf256::sub(work.get(r, c), gf256::mul(factor, work.get(col, c)));
                    work.set(r, c, v);
                }
            }
        }

        let mut inverse = Matrix::zeros(n, n);
        for r in 0..n {
            for c in 0..n {
                inverse.set(r, c, work.get(r, n + c));
            }
        }
        Ok(inverse)
    }
}

impl fmt::Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Matrix({}x{})", self.rows, self.cols)?;
        for r in 0..self.rows {
            writeln!(f, "  {:02x?}", self.row(r))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_inverse() {
        let id = Matrix::identity(5);
        assert_eq!(id.invert().unwrap(), id);
    }

    #[test]
    fn test_invert_roundtrip() {
        let v = Matrix::vandermonde(6, 6);
        let inv = v.invert().unwrap();
        assert_eq!(v.multiply(&inv), Matrix::identity(6));
        assert_eq!(inv.multiply(&v), Matrix::identity(6));
    }

    #[test]
    fn test_singular_matrix() {
        let mut m = Matrix::zeros(3, 3);
        m.set(0, 0, 1);
        m.set(1, 1, 1);
        // third row all zero
        assert_eq!(m.invert(), Err(DecodeError::SingularMatrix));

        // two equal rows
        let v = Matrix::vandermonde(4, 3);
        let dup = v.select_rows(&[1, 2, 1]);
        assert_eq!(dup.invert(), Err(DecodeError::SingularMatrix));
    }

    #[test]
    fn test_non_square_rejected() {
        let v = Matrix::vandermonde(4, 3);
        assert!(matches!(v.invert(), Err(DecodeError::InvalidParameters(_))));
    }

    #[test]
    fn test_vandermonde_subsets_invertible() {
        let v = Matrix::vandermonde(8, 4);
        // every 4-row subset of an 8x4 Vandermonde matrix is invertible
        for a in 0..8 {
            for b in a + 1..8 {
                for c in b + 1..8 {
                    for d in c + 1..8 {
                        let sub = v.select_rows(&[a, b, c, d]);
                        assert!(sub.invert().is_ok(), "rows {a},{b},{c},{d}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_select_rows() {
        let v = Matrix::vandermonde(5, 3);
        let s = v.select_rows(&[4, 0]);
        assert_eq!(s.rows(), 2);
        assert_eq!(s.row(0), v.row(4));
        assert_eq!(s.row(1), v.row(0));
    }
}
