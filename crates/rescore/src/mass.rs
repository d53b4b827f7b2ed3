use serde::{Deserialize, Serialize};

pub const H2O: f32 = 18.010565;
pub const PROTON: f32 = 1.0072764;

#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, PartialOrd)]
#[serde(rename_all = "lowercase")]
pub enum Tolerance {
    Ppm(f32, f32),
    Da(f32, f32),
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance::Da(-0.02, 0.02)
    }
}

impl Tolerance {
    /// Compute the (`lower`, `upper`) window (in Da) around `center`
    pub fn bounds(&self, center: f32) -> (f32, f32) {
        match self {
            Tolerance::Ppm(lo, hi) => {
                let delta_lo = center * lo / 1_000_000.0;
                let delta_hi = center * hi / 1_000_000.0;
                (center + delta_lo, center + delta_hi)
            }
            Tolerance::Da(lo, hi) => (center + lo, center + hi),
        }
    }

    pub fn contains(&self, center: f32, rhs: f32) -> bool {
        let (lo, hi) = self.bounds(center);
        rhs >= lo && rhs <= hi
    }
}

pub trait Mass {
    fn monoisotopic(&self) -> f32;
}

pub const VALID_AA: [u8; 22] = [
    b'A', b'C', b'D', b'E', b'F', b'G', b'H', b'I', b'K', b'L', b'M', b'N', b'P', b'Q', b'R', b'S',
    b'T', b'V', b'W', b'Y', b'U', b'O',
];

/// Is `residue` one of the amino acids we know a mass for?
pub fn valid_residue(residue: u8) -> bool {
    VALID_AA.contains(&residue)
}

impl Mass for u8 {
    fn monoisotopic(&self) -> f32 {
        match self {
            b'A' => 71.03711,
            b'R' => 156.1011,
            b'N' => 114.04293,
            b'D' => 115.02694,
            b'C' => 103.00919,
            b'E' => 129.04259,
            b'Q' => 128.05858,
            b'G' => 57.02146,
            b'H' => 137.05891,
            b'I' => 113.08406,
            b'L' => 113.08406,
            b'K' => 128.09496,
            b'M' => 131.0405,
            b'F' => 147.0684,
            b'P' => 97.05276,
            b'S' => 87.03203,
            b'T' => 101.04768,
            b'W' => 186.07931,
            b'Y' => 163.06333,
            b'V' => 99.06841,
            b'U' => 150.95363,
            b'O' => 237.14773,
            _ => unreachable!("BUG: invalid amino acid {}", *self as char),
        }
    }
}

/// Convert a neutral mass to m/z at a given charge state
pub fn mz(neutral_mass: f32, charge: u8) -> f32 {
    let charge = charge.max(1) as f32;
    (neutral_mass + charge * PROTON) / charge
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tolerances() {
        assert_eq!(
            Tolerance::Ppm(-10.0, 20.0).bounds(1000.0),
            (1000.0 - 0.01, 1000.0 + 0.02)
        );
        assert_eq!(Tolerance::Da(-0.5, 0.5).bounds(500.0), (499.5, 500.5));
        assert!(Tolerance::Da(-0.02, 0.02).contains(148.06, 148.07));
        assert!(!Tolerance::Da(-0.02, 0.02).contains(148.06, 148.09));
    }

    #[test]
    fn charge_state_mz() {
        assert!((mz(1000.0, 1) - 1001.00728).abs() < 1E-3);
        assert!((mz(1000.0, 2) - 501.00728).abs() < 1E-3);
        // Zero charge is treated as singly charged
        assert_eq!(mz(1000.0, 0), mz(1000.0, 1));
    }
}
