use super::norm;
use rayon::prelude::*;
use std::fmt::{self, Debug};
use std::ops::{AddAssign, Index, IndexMut};

/// Dense, row-major matrix of `f64`
#[derive(Clone, PartialEq, Default)]
pub struct Matrix {
    data: Vec<f64>,
    pub rows: usize,
    pub cols: usize,
}

impl Matrix {
    /// Create a new `Matrix`
    ///
    /// # Panics
    ///
    /// * Panics if `data` does not have len == rows * cols
    pub fn new<T: Into<Vec<f64>>>(t: T, rows: usize, cols: usize) -> Matrix {
        let data = t.into();
        assert_eq!(
            data.len(),
            rows * cols,
            "data passed to Matrix::new() does not have shape ({}, {})",
            rows,
            cols
        );
        Matrix { data, rows, cols }
    }

    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix {
            data: vec![0.0; rows * cols],
            rows,
            cols,
        }
    }

    pub fn identity(size: usize) -> Matrix {
        let mut matrix = Matrix::zeros(size, size);
        for i in 0..size {
            matrix[(i, i)] = 1.0
        }
        matrix
    }

    pub fn col_vector(data: Vec<f64>) -> Matrix {
        let rows = data.len();
        Matrix {
            data,
            rows,
            cols: 1,
        }
    }

    pub const fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows || col >= self.cols {
            None
        } else {
            self.data.get(self.cols * row + col).copied()
        }
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn col(&self, col: usize) -> impl Iterator<Item = f64> + '_ {
        self.data
            .iter()
            .skip(col)
            .step_by(self.cols.max(1))
            .take(self.rows)
            .copied()
    }

    /// Copy a subset of rows into a new matrix, in the order given
    pub fn select_rows(&self, rows: &[usize]) -> Matrix {
        let data = rows
            .iter()
            .flat_map(|&row| self.row(row).iter().copied())
            .collect::<Vec<_>>();
        Matrix::new(data, rows.len(), self.cols)
    }

    /// Use the power method to find the eigenvector with the largest
    /// corresponding eigenvalue. A zero starting vector is replaced by ones
    pub fn power_method(&self, initial: &[f64]) -> Vec<f64> {
        let mut v = match norm(initial) {
            n if n > f64::EPSILON => initial.iter().map(|i| i / n).collect::<Vec<_>>(),
            _ => vec![1.0 / (initial.len().max(1) as f64).sqrt(); initial.len()],
        };

        let mut last_eig = 0.0;
        for _ in 0..100 {
            let mut v1 = self.dotv(&v);
            let norm = norm(&v1);
            if norm <= f64::EPSILON || (norm - last_eig).abs() < 1E-10 {
                break;
            }
            last_eig = norm;
            v1.iter_mut().for_each(|x| *x /= norm);
            v = v1;
        }
        v
    }

    pub fn transpose(&self) -> Matrix {
        let mut mat = Matrix::zeros(self.cols, self.rows);
        for row in 0..self.rows {
            for col in 0..self.cols {
                mat[(col, row)] = self[(row, col)]
            }
        }
        mat
    }

    pub fn dotv(&self, rhs: &[f64]) -> Vec<f64> {
        assert_eq!(
            self.cols,
            rhs.len(),
            "lhs has shape ({},{}), rhs has shape (1,{})",
            self.rows,
            self.cols,
            rhs.len()
        );
        (0..self.rows)
            .into_par_iter()
            .map(|row| {
                self.row(row)
                    .iter()
                    .zip(rhs)
                    .fold(0.0, |acc, (x, y)| acc + x * y)
            })
            .collect::<Vec<_>>()
    }

    pub fn dot(&self, rhs: &Matrix) -> Matrix {
        assert_eq!(
            self.cols, rhs.rows,
            "lhs has shape ({},{}), rhs has shape ({},{})",
            self.rows, self.cols, rhs.rows, rhs.cols
        );
        let data = (0..self.rows)
            .into_par_iter()
            .flat_map(|row| {
                (0..rhs.cols).into_par_iter().map(move |col| {
                    self.row(row)
                        .iter()
                        .zip(rhs.col(col))
                        .fold(0.0, |acc, (x, y)| acc + x * y)
                })
            })
            .collect::<Vec<_>>();
        Matrix {
            data,
            rows: self.rows,
            cols: rhs.cols,
        }
    }

    /// Calculate mean of each column
    pub fn mean(&self) -> Vec<f64> {
        (0..self.cols)
            .into_par_iter()
            .map(|col| self.col(col).sum::<f64>() / self.rows as f64)
            .collect()
    }

    /// Population standard deviation of each column
    pub fn std(&self) -> Vec<f64> {
        let means = self.mean();
        (0..self.cols)
            .into_par_iter()
            .map(|col| {
                let ss = self
                    .col(col)
                    .fold(0.0, |acc, x| acc + (x - means[col]).powi(2));
                (ss / self.rows as f64).sqrt()
            })
            .collect()
    }

    pub(super) fn swap_rows(&mut self, i: usize, j: usize) {
        for k in 0..self.cols {
            self.data.swap(self.cols * i + k, self.cols * j + k);
        }
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (row, col): (usize, usize)) -> &Self::Output {
        &self.data[self.cols * row + col]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut Self::Output {
        &mut self.data[self.cols * row + col]
    }
}

impl AddAssign<Matrix> for Matrix {
    fn add_assign(&mut self, rhs: Matrix) {
        assert_eq!(
            self.shape(),
            rhs.shape(),
            "matrices must have equal shape to add"
        );
        self.data
            .iter_mut()
            .zip(rhs.data)
            .for_each(|(lhs, rhs)| *lhs += rhs);
    }
}

impl Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[")?;
        for row in 0..self.rows {
            writeln!(f, "{:?}", self.row(row))?;
        }
        writeln!(f, "]")
    }
}
