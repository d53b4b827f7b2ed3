use serde::{Deserialize, Serialize};

use crate::mass::{Mass, PROTON};
use crate::peptide::Peptidoform;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    B,
    Y,
}

/// Theoretical B/Y ion
#[derive(Copy, Clone, Debug)]
pub struct Ion {
    /// B or Y ion
    pub kind: Kind,
    /// Neutral fragment mass (no charge)
    pub monoisotopic_mass: f32,
}

impl Ion {
    /// Singly charged m/z
    pub fn mz(&self) -> f32 {
        self.monoisotopic_mass + PROTON
    }
}

/// Generate B/Y ions for a peptidoform. B ions are yielded as b1..b(n-1),
/// Y ions as y(n-1)..y1
pub struct IonSeries<'p> {
    pub kind: Kind,
    cumulative_mass: f32,
    peptide: &'p Peptidoform,
    idx: usize,
}

impl<'p> IonSeries<'p> {
    pub fn new(peptide: &'p Peptidoform, kind: Kind) -> Self {
        let cumulative_mass = match kind {
            Kind::B => peptide.nterm.unwrap_or_default(),
            Kind::Y => peptide.monoisotopic() - peptide.nterm.unwrap_or_default(),
        };
        Self {
            kind,
            cumulative_mass,
            peptide,
            idx: 0,
        }
    }
}

impl<'p> Iterator for IonSeries<'p> {
    type Item = Ion;

    // Memoize the cumulative mass of the fragment so far
    fn next(&mut self) -> Option<Self::Item> {
        if self.idx + 1 >= self.peptide.sequence.len() {
            return None;
        }
        let r = self.peptide.sequence.as_bytes().get(self.idx)?;
        let m = self.peptide.modifications.get(self.idx)?;

        self.cumulative_mass += match self.kind {
            Kind::B => r.monoisotopic() + *m,
            Kind::Y => -(r.monoisotopic() + *m),
        };
        self.idx += 1;

        Some(Ion {
            kind: self.kind,
            monoisotopic_mass: self.cumulative_mass,
        })
    }
}

/// Singly charged fragments in predictor order: b1..b(n-1), then y1..y(n-1)
pub fn fragment_ladder(peptide: &Peptidoform) -> Vec<Ion> {
    let mut ions = IonSeries::new(peptide, Kind::B).collect::<Vec<_>>();
    let mut y = IonSeries::new(peptide, Kind::Y).collect::<Vec<_>>();
    y.reverse();
    ions.extend(y);
    ions
}

#[cfg(test)]
mod test {
    use super::*;

    fn peptide(s: &str) -> Peptidoform {
        s.parse().unwrap()
    }

    fn check_within<I: Iterator<Item = Ion>>(iter: I, expected_mz: &[f32]) {
        let observed = iter.map(|ion| ion.mz()).collect::<Vec<f32>>();
        assert_eq!(expected_mz.len(), observed.len());
        assert!(
            expected_mz
                .iter()
                .zip(observed.iter())
                .all(|(a, b)| (a - b).abs() < 0.005),
            "{:?}",
            expected_mz
                .iter()
                .zip(observed.iter())
                .map(|(a, b)| a - b)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn iterate_b_ions() {
        let peptide = peptide("PEPTIDE");
        let expected_mz = vec![
            98.06004, 227.10263, 324.155_4, 425.203_06, 538.287_2, 653.314_1,
        ];
        check_within(IonSeries::new(&peptide, Kind::B), &expected_mz);
    }

    #[test]
    fn iterate_y_ions() {
        let peptide = peptide("PEPTIDE");
        let expected_mz = vec![
            703.31447, 574.27188, 477.21912, 376.17144, 263.08737, 148.06043,
        ];
        check_within(IonSeries::new(&peptide, Kind::Y), &expected_mz);
    }

    #[test]
    fn terminal_mods() {
        let peptide = peptide("[+229.01]-PEPTIDE");
        let expected_b = [
            98.06004, 227.10263, 324.155_4, 425.203_06, 538.287_2, 653.314_1,
        ]
        .into_iter()
        .map(|x| x + 229.01)
        .collect::<Vec<_>>();
        let expected_y = vec![
            703.31447, 574.27188, 477.21912, 376.17144, 263.08737, 148.06043,
        ];
        check_within(IonSeries::new(&peptide, Kind::B), &expected_b);
        check_within(IonSeries::new(&peptide, Kind::Y), &expected_y);

        let peptide = self::peptide("PEPTIDE-[+229.01]");
        let expected_y = expected_y.iter().map(|x| x + 229.01).collect::<Vec<_>>();
        check_within(IonSeries::new(&peptide, Kind::Y), &expected_y);
    }

    #[test]
    fn internal_mod() {
        let peptide = peptide("PEPTI[+29.0]DE");
        let expected_b = [
            98.06004,
            227.10263,
            324.155_4,
            425.203_06,
            538.287_2 + 29.0,
            653.314_1 + 29.0,
        ];
        check_within(IonSeries::new(&peptide, Kind::B), &expected_b);
    }

    #[test]
    fn ladder_order() {
        let peptide = peptide("PEPTIDE");
        let ladder = fragment_ladder(&peptide);
        assert_eq!(ladder.len(), 12);
        assert_eq!(ladder[0].kind, Kind::B);
        assert_eq!(ladder[6].kind, Kind::Y);
        // y1 first, y6 last
        assert!((ladder[6].mz() - 148.06043).abs() < 0.005);
        assert!((ladder[11].mz() - 703.31447).abs() < 0.005);
    }
}
