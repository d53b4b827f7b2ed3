//! Linear algebra, machine learning & FDR estimation

pub mod gauss;
pub mod kde;
pub mod linear_discriminant;
pub mod matrix;
pub mod mobility_model;
pub mod qvalue;
pub mod retention_model;

#[allow(dead_code)]
fn all_close(lhs: &[f64], rhs: &[f64], eps: f64) -> bool {
    lhs.iter()
        .zip(rhs.iter())
        .all(|(l, r)| (l - r).abs() <= eps)
}

pub fn norm(slice: &[f64]) -> f64 {
    slice.iter().fold(0.0, |acc, x| acc + x.powi(2)).sqrt()
}

pub fn mean(slice: &[f64]) -> f64 {
    slice.iter().sum::<f64>() / slice.len() as f64
}

/// Population standard deviation
pub fn std(slice: &[f64]) -> f64 {
    let mean = mean(slice);
    let x = slice.iter().fold(0.0, |acc, x| acc + (x - mean).powi(2));
    (x / slice.len() as f64).sqrt()
}

/// Median of the finite values in `slice`; the mean of the two middle values
/// is used for even counts
pub fn median(slice: &[f64]) -> Option<f64> {
    let mut values = slice
        .iter()
        .copied()
        .filter(|x| x.is_finite())
        .collect::<Vec<_>>();
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    match values.len() % 2 {
        0 => Some((values[mid - 1] + values[mid]) / 2.0),
        _ => Some(values[mid]),
    }
}

/// Pearson correlation coefficient, `None` if either side has no variance
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let (mx, my) = (mean(x), mean(y));
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (a, b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        vx += (a - mx).powi(2);
        vy += (b - my).powi(2);
    }
    let denom = (vx * vy).sqrt();
    match denom > 0.0 {
        true => Some(cov / denom),
        false => None,
    }
}

/// Fractional ranks, ties receive the average of their positions
pub fn ranks(x: &[f64]) -> Vec<f64> {
    let mut order = (0..x.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| x[a].total_cmp(&x[b]));
    let mut ranks = vec![0.0; x.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && x[order[j + 1]] == x[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }
    ranks
}

pub fn spearman(x: &[f64], y: &[f64]) -> Option<f64> {
    pearson(&ranks(x), &ranks(y))
}

pub fn cosine(x: &[f64], y: &[f64]) -> Option<f64> {
    let denom = norm(x) * norm(y);
    if x.len() != y.len() || denom == 0.0 {
        return None;
    }
    let dot = x.iter().zip(y).fold(0.0, |acc, (a, b)| acc + a * b);
    Some(dot / denom)
}

/// Mean squared error
pub fn mse(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.is_empty() {
        return None;
    }
    let sse = x
        .iter()
        .zip(y)
        .fold(0.0, |acc, (a, b)| acc + (a - b).powi(2));
    Some(sse / x.len() as f64)
}

/// Ordinary least squares fit of `y = slope * x + intercept`
pub fn linear_fit(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let (mx, my) = (mean(x), mean(y));
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
    }
    if sxx <= f64::EPSILON {
        return None;
    }
    let slope = sxy / sxx;
    Some((slope, my - slope * mx))
}

/// Multiple linear regression via the normal equations, with a small ridge
/// penalty so that absent one-hot columns do not make the system singular.
/// Returns the coefficients and the coefficient of determination (r2)
pub fn regression(features: &matrix::Matrix, y: &[f64]) -> Option<(Vec<f64>, f64)> {
    assert_eq!(features.rows, y.len());
    if y.len() < 2 {
        return None;
    }
    let f_t = features.transpose();
    let mut cov = f_t.dot(features);
    for i in 0..cov.cols {
        cov[(i, i)] += 1E-3;
    }
    let b = f_t.dot(&matrix::Matrix::col_vector(y.to_vec()));
    let beta = gauss::Gauss::solve(cov, b)?.col(0).collect::<Vec<_>>();

    let predicted = features.dotv(&beta);
    let sse = predicted
        .iter()
        .zip(y)
        .map(|(pred, act)| (pred - act).powi(2))
        .sum::<f64>();
    let y_mean = mean(y);
    let var = y.iter().map(|v| (v - y_mean).powi(2)).sum::<f64>();
    let r2 = match var > 0.0 {
        true => 1.0 - sse / var,
        false => 0.0,
    };
    Some((beta, r2))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn summary_statistics() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[f64::NAN, 1.0]), Some(1.0));
        assert_eq!(median(&[]), None);
        assert!((std(&[2., 4., 4., 4., 5., 5., 7., 9.]) - 2.0).abs() < 1E-12);
    }

    #[test]
    fn correlations() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [2.0, 4.0, 6.0, 8.0];
        assert!((pearson(&x, &y).unwrap() - 1.0).abs() < 1E-12);
        assert!((cosine(&x, &y).unwrap() - 1.0).abs() < 1E-12);
        assert_eq!(pearson(&x, &[1.0; 4]), None);

        // Monotonic but non-linear
        let z = [1.0, 10.0, 100.0, 1000.0];
        assert!((spearman(&x, &z).unwrap() - 1.0).abs() < 1E-12);
        assert!(pearson(&x, &z).unwrap() < 1.0);

        assert_eq!(ranks(&[10.0, 20.0, 10.0]), vec![1.5, 3.0, 1.5]);
        assert_eq!(mse(&x, &y), Some(7.5));
    }

    #[test]
    fn least_squares() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        let (slope, intercept) = linear_fit(&x, &y).unwrap();
        assert!((slope - 2.0).abs() < 1E-12);
        assert!((intercept - 1.0).abs() < 1E-12);
        assert_eq!(linear_fit(&[1.0, 1.0], &[0.0, 1.0]), None);
    }

    #[test]
    fn multiple_regression() {
        // y = 2a - b + 3, with an intercept column
        #[rustfmt::skip]
        let x = matrix::Matrix::new([
            0., 0., 1.,
            1., 0., 1.,
            0., 1., 1.,
            2., 1., 1.,
            3., 5., 1.,
        ], 5, 3);
        let y = [3., 5., 2., 6., 4.];
        let (beta, r2) = regression(&x, &y).unwrap();
        assert!(all_close(&beta, &[2., -1., 3.], 1E-2), "{:?}", beta);
        assert!(r2 > 0.999);
    }
}
