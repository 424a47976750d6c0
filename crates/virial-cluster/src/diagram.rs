//! Immutable bond structures and their combinatorial weights.

use std::fmt;

use serde::{Deserialize, Serialize};
use virial_core::{ErrorInfo, VirialError};

/// Which bond function a bond contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BondColor {
    /// Mayer function of the target interaction.
    Normal,
    /// Ring-exchange factor between two path-integral rings.
    Exchange,
    /// Hard-sphere Mayer function of the reference system.
    Reference,
}

/// A pair or triple bond between molecule indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Bond {
    /// Two-body bond.
    Pair {
        /// Bond function.
        color: BondColor,
        /// Lower molecule index.
        i: usize,
        /// Upper molecule index.
        j: usize,
    },
    /// Three-body bond.
    Triple {
        /// Bond function.
        color: BondColor,
        /// Lowest molecule index.
        i: usize,
        /// Middle molecule index.
        j: usize,
        /// Highest molecule index.
        k: usize,
    },
}

impl Bond {
    /// Normal-colored pair bond with sorted indices.
    pub fn pair(i: usize, j: usize) -> Self {
        Self::colored_pair(BondColor::Normal, i, j)
    }

    /// Pair bond of the given color with sorted indices.
    pub fn colored_pair(color: BondColor, i: usize, j: usize) -> Self {
        let (i, j) = if i <= j { (i, j) } else { (j, i) };
        Bond::Pair { color, i, j }
    }

    /// Normal-colored triple bond with sorted indices.
    pub fn triple(i: usize, j: usize, k: usize) -> Self {
        let mut idx = [i, j, k];
        idx.sort_unstable();
        Bond::Triple {
            color: BondColor::Normal,
            i: idx[0],
            j: idx[1],
            k: idx[2],
        }
    }

    /// Color of the bond.
    pub fn color(&self) -> BondColor {
        match self {
            Bond::Pair { color, .. } | Bond::Triple { color, .. } => *color,
        }
    }

    /// Molecule indices touched by the bond.
    pub fn indices(&self) -> Vec<usize> {
        match self {
            Bond::Pair { i, j, .. } => vec![*i, *j],
            Bond::Triple { i, j, k, .. } => vec![*i, *j, *k],
        }
    }
}

/// Exact rational diagram coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coefficient {
    /// Signed numerator.
    pub numerator: i64,
    /// Positive denominator.
    pub denominator: u64,
}

impl Coefficient {
    /// Reduced fraction `numerator / denominator`.
    pub fn new(numerator: i64, denominator: u64) -> Result<Self, VirialError> {
        if denominator == 0 {
            return Err(VirialError::Configuration(
                ErrorInfo::new("zero-denominator", "diagram coefficient has a zero denominator")
                    .with_context("numerator", numerator.to_string()),
            ));
        }
        let g = gcd(numerator.unsigned_abs(), denominator).max(1);
        Ok(Self {
            numerator: numerator / g as i64,
            denominator: denominator / g,
        })
    }

    /// Integer coefficient.
    pub fn integer(value: i64) -> Self {
        Self {
            numerator: value,
            denominator: 1,
        }
    }

    /// Floating-point value.
    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

impl fmt::Display for Coefficient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == 1 {
            write!(f, "{}", self.numerator)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}

pub(crate) fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// One term of a cluster integral: a bond structure and its coefficient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagram {
    bonds: Vec<Bond>,
    coefficient: Coefficient,
}

impl Diagram {
    /// Creates a diagram. Bonds are sorted and deduplicated so that equal
    /// structures compare equal.
    pub fn new(mut bonds: Vec<Bond>, coefficient: Coefficient) -> Self {
        bonds.sort_unstable();
        bonds.dedup();
        Self { bonds, coefficient }
    }

    /// Bonds of the diagram.
    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    /// Rational coefficient.
    pub fn coefficient(&self) -> Coefficient {
        self.coefficient
    }

    /// Largest molecule index referenced, if any bond exists.
    pub fn max_index(&self) -> Option<usize> {
        self.bonds
            .iter()
            .flat_map(|bond| bond.indices())
            .max()
    }

    /// True if any bond has three bodies.
    pub fn has_triples(&self) -> bool {
        self.bonds
            .iter()
            .any(|bond| matches!(bond, Bond::Triple { .. }))
    }

    /// True if any bond has the given color.
    pub fn uses_color(&self, color: BondColor) -> bool {
        self.bonds.iter().any(|bond| bond.color() == color)
    }

    /// Same structure with every bond recolored.
    pub fn recolored(&self, color: BondColor) -> Self {
        let bonds = self
            .bonds
            .iter()
            .map(|bond| match *bond {
                Bond::Pair { i, j, .. } => Bond::Pair { color, i, j },
                Bond::Triple { i, j, k, .. } => Bond::Triple { color, i, j, k },
            })
            .collect();
        Self::new(bonds, self.coefficient)
    }

    /// Short textual label such as `-1/2 f01` or `1 f01 e12`.
    pub fn label(&self) -> String {
        let mut label = self.coefficient.to_string();
        for bond in &self.bonds {
            let prefix = match bond.color() {
                BondColor::Normal => 'f',
                BondColor::Exchange => 'e',
                BondColor::Reference => 'h',
            };
            label.push(' ');
            label.push(prefix);
            for index in bond.indices() {
                label.push_str(&index.to_string());
            }
        }
        label
    }
}
