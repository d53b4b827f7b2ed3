//! Gauss-Jordan elimination for solution of systems of linear equations
//!
//! LDA requires solving the generalized eigenvalue problem for the scatter
//! matrices Sb and Sw. We solve the linear system Sw.dot(x) = Sb and then find
//! the dominant eigenvector of x. The same solver fits the least squares
//! retention time and ion mobility models via the normal equations.

use super::matrix::Matrix;

#[derive(Debug)]
pub struct Gauss {
    pub left: Matrix,
    pub right: Matrix,
}

impl Gauss {
    /// Solve `left.dot(x) = right` for x, returning `None` if `left` is
    /// singular or the solution is not finite
    pub fn solve(left: Matrix, right: Matrix) -> Option<Matrix> {
        assert_eq!(left.rows, right.rows, "left and right must have equal rows");
        let mut g = Gauss { left, right };
        g.echelon();
        g.reduce();
        g.backfill();

        match g.left_solved() {
            true => Some(g.right),
            false => None,
        }
    }

    // Is `left` the identity matrix, and is every value of `right` finite?
    fn left_solved(&self) -> bool {
        let n = self.left.cols;
        for i in 0..n {
            for j in 0..n {
                let x = self.left[(i, j)];
                let expected = if i == j { 1.0 } else { 0.0 };
                if (x - expected).abs() > 1E-9 {
                    return false;
                }
            }
        }
        (0..self.right.rows).all(|row| self.right.row(row).iter().all(|x| x.is_finite()))
    }

    fn echelon(&mut self) {
        let (m, n) = self.left.shape();
        let mut h = 0;
        let mut k = 0;

        while h < m && k < n {
            // Partial pivoting on the largest magnitude in column k
            let mut max = (h, 0.0f64);
            for i in h..m {
                if self.left[(i, k)].abs() > max.1 {
                    max = (i, self.left[(i, k)].abs())
                }
            }
            let i = max.0;
            if max.1 <= f64::EPSILON {
                k += 1;
                continue;
            }

            if h != i {
                self.left.swap_rows(h, i);
                self.right.swap_rows(h, i);
            }

            // Clear rows below pivot row
            for i in h + 1..m {
                let factor = self.left[(i, k)] / self.left[(h, k)];
                self.left[(i, k)] = 0.0;
                for j in k + 1..n {
                    self.left[(i, j)] -= self.left[(h, j)] * factor;
                }
                for j in 0..self.right.cols {
                    self.right[(i, j)] -= self.right[(h, j)] * factor;
                }
            }
            h += 1;
            k += 1;
        }
    }

    // Reduced echelon form: leading coefficient of every row is 1
    fn reduce(&mut self) {
        for i in (0..self.left.rows).rev() {
            for j in 0..self.left.cols {
                let x = self.left[(i, j)];
                if x == 0.0 {
                    continue;
                }
                for k in j..self.left.cols {
                    self.left[(i, k)] /= x;
                }
                for k in 0..self.right.cols {
                    self.right[(i, k)] /= x;
                }
                break;
            }
        }
    }

    // Solve the upper triangular matrix
    fn backfill(&mut self) {
        for i in (0..self.left.rows).rev() {
            for j in 0..self.left.cols {
                if self.left[(i, j)] == 0.0 {
                    continue;
                }
                for k in 0..i {
                    let factor = self.left[(k, j)] / self.left[(i, j)];
                    for h in 0..self.left.cols {
                        self.left[(k, h)] -= self.left[(i, h)] * factor;
                    }
                    for h in 0..self.right.cols {
                        self.right[(k, h)] -= self.right[(i, h)] * factor;
                    }
                }
                break;
            }
        }
    }
}
