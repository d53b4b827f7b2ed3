//! Canonical peptidoform representation
//!
//! Search engines disagree on how modified sequences are written: mass deltas
//! in square brackets or parentheses, Unimod names or accessions, `n[..]`
//! terminal prefixes, flanking residues (`K.PEPTIDE.R`) and ProForma charge
//! suffixes. Everything is normalized into a [`Peptidoform`], which renders as
//! `[+42.0106]-PEM[+15.9949]TIDE` and is used as the peptide part of a PSM
//! identity.

use std::fmt::{Display, Write};
use std::str::FromStr;

use crate::mass::{valid_residue, Mass, H2O};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PeptideError {
    #[error("empty peptide sequence")]
    Empty,
    #[error("invalid residue `{0}`")]
    InvalidResidue(char),
    #[error("unknown modification `{0}`")]
    UnknownModification(String),
    #[error("unbalanced brackets in `{0}`")]
    Unbalanced(String),
}

/// (name, unimod accession, monoisotopic mass delta)
const KNOWN_MODIFICATIONS: [(&str, u32, f32); 14] = [
    ("Acetyl", 1, 42.010565),
    ("Amidated", 2, -0.984016),
    ("Carbamidomethyl", 4, 57.021464),
    ("Deamidated", 7, 0.984016),
    ("Phospho", 21, 79.966331),
    ("Gln->pyro-Glu", 28, -17.026549),
    ("Glu->pyro-Glu", 27, -18.010565),
    ("Methyl", 34, 14.01565),
    ("Oxidation", 35, 15.994915),
    ("Dimethyl", 36, 28.0313),
    ("Label:13C(6)15N(2)", 259, 8.014199),
    ("Label:13C(6)15N(4)", 267, 10.008269),
    ("TMT6plex", 737, 229.162932),
    ("TMTpro", 2016, 304.207146),
];

fn modification_mass(content: &str) -> Result<f32, PeptideError> {
    let content = content.trim();
    if let Ok(mass) = content.trim_start_matches('+').parse::<f32>() {
        return Ok(mass);
    }
    let unknown = || PeptideError::UnknownModification(content.into());
    if content.len() > 7 && content[..7].eq_ignore_ascii_case("UNIMOD:") {
        let accession = content[7..].parse::<u32>().map_err(|_| unknown())?;
        return KNOWN_MODIFICATIONS
            .iter()
            .find(|(_, id, _)| *id == accession)
            .map(|(_, _, mass)| *mass)
            .ok_or_else(unknown);
    }
    KNOWN_MODIFICATIONS
        .iter()
        .find(|(name, _, _)| name.eq_ignore_ascii_case(content))
        .map(|(_, _, mass)| *mass)
        .ok_or_else(unknown)
}

/// Peptide sequence with per-residue and terminal modification masses
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Peptidoform {
    /// Unmodified residues, upper case
    pub sequence: String,
    /// Mass delta for each residue, 0.0 if unmodified
    pub modifications: Vec<f32>,
    pub nterm: Option<f32>,
    pub cterm: Option<f32>,
}

impl Peptidoform {
    /// Parse a modified sequence, returning the charge if a ProForma `/z`
    /// suffix was present
    pub fn parse(s: &str) -> Result<(Self, Option<u8>), PeptideError> {
        let s = s.trim();
        let (s, charge) = match s.rsplit_once('/') {
            Some((seq, z)) if !z.is_empty() && z.bytes().all(|b| b.is_ascii_digit()) => {
                (seq, z.parse::<u8>().ok())
            }
            _ => (s, None),
        };
        let s = strip_flanking(s);
        let bytes = s.as_bytes();

        let mut peptide = Peptidoform::default();
        let mut i = 0;

        // N-terminal modification, either `n[42.01]PEP` or `[Acetyl]-PEP`
        match (bytes.first(), bytes.get(1)) {
            (Some(b'n'), Some(b'[')) => {
                let (mass, next) = read_modification(s, 1)?;
                peptide.nterm = Some(mass);
                i = next;
            }
            (Some(b'['), _) => {
                let (mass, next) = read_modification(s, 0)?;
                peptide.nterm = Some(mass);
                i = next;
                if bytes.get(i) == Some(&b'-') {
                    i += 1;
                }
            }
            _ => {}
        }

        while i < bytes.len() {
            match bytes[i] {
                b'[' | b'(' => {
                    let (mass, next) = read_modification(s, i)?;
                    match peptide.modifications.last_mut() {
                        Some(last) => *last += mass,
                        None => peptide.nterm = Some(peptide.nterm.unwrap_or_default() + mass),
                    }
                    i = next;
                }
                b'-' | b'c' if bytes.get(i + 1) == Some(&b'[') => {
                    let (mass, next) = read_modification(s, i + 1)?;
                    peptide.cterm = Some(peptide.cterm.unwrap_or_default() + mass);
                    i = next;
                }
                r if valid_residue(r) => {
                    peptide.sequence.push(r as char);
                    peptide.modifications.push(0.0);
                    i += 1;
                }
                r => return Err(PeptideError::InvalidResidue(r as char)),
            }
        }

        if peptide.sequence.is_empty() {
            return Err(PeptideError::Empty);
        }
        Ok((peptide, charge))
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn is_modified(&self) -> bool {
        self.nterm.is_some() || self.cterm.is_some() || self.modifications.iter().any(|m| *m != 0.0)
    }

    /// Neutral monoisotopic mass, including all modifications
    pub fn monoisotopic(&self) -> f32 {
        let residues = self
            .sequence
            .as_bytes()
            .iter()
            .zip(&self.modifications)
            .map(|(r, m)| r.monoisotopic() + m)
            .sum::<f32>();
        residues + self.nterm.unwrap_or_default() + self.cterm.unwrap_or_default() + H2O
    }

    /// Theoretical precursor m/z
    pub fn mz(&self, charge: u8) -> f32 {
        crate::mass::mz(self.monoisotopic(), charge)
    }

    /// Number of internal K/R residues not followed by proline
    pub fn missed_cleavages(&self) -> u8 {
        let seq = self.sequence.as_bytes();
        seq.windows(2)
            .filter(|w| matches!(w[0], b'K' | b'R') && w[1] != b'P')
            .count() as u8
    }
}

impl FromStr for Peptidoform {
    type Err = PeptideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Peptidoform::parse(s).map(|(peptide, _)| peptide)
    }
}

impl Display for Peptidoform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(m) = self.nterm {
            write!(f, "[{:+.4}]-", m)?;
        }
        for (residue, m) in self.sequence.chars().zip(&self.modifications) {
            f.write_char(residue)?;
            if *m != 0.0 {
                write!(f, "[{:+.4}]", m)?;
            }
        }
        if let Some(m) = self.cterm {
            write!(f, "-[{:+.4}]", m)?;
        }
        Ok(())
    }
}

/// Remove flanking residues, e.g. `K.PEPTIDE.R` or `-.PEPTIDE.-`
fn strip_flanking(s: &str) -> &str {
    let b = s.as_bytes();
    let n = b.len();
    if n > 4 && b[1] == b'.' && b[n - 2] == b'.' {
        &s[2..n - 2]
    } else {
        s
    }
}

/// Read a bracketed modification starting at `open`, returning its mass and
/// the index just past the closing bracket
fn read_modification(s: &str, open: usize) -> Result<(f32, usize), PeptideError> {
    let bytes = s.as_bytes();
    let (open_ch, close_ch) = match bytes[open] {
        b'(' => (b'(', b')'),
        _ => (b'[', b']'),
    };
    let mut depth = 0usize;
    for (offset, &b) in bytes[open..].iter().enumerate() {
        if b == open_ch {
            depth += 1;
        } else if b == close_ch {
            depth -= 1;
            if depth == 0 {
                let close = open + offset;
                let mass = modification_mass(&s[open + 1..close])?;
                return Ok((mass, close + 1));
            }
        }
    }
    Err(PeptideError::Unbalanced(s.into()))
}

/// Normalize a precursor charge written as `2`, `2+` or `+2`
pub fn parse_charge(s: &str) -> Option<u8> {
    let z = s.trim().trim_matches('+').parse::<u8>().ok()?;
    (z > 0).then_some(z)
}
