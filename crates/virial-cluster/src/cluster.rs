//! Signed cluster values: weighted sums of Mayer-bond products.

use std::fmt;
use std::sync::Arc;

use virial_core::{Configuration, ErrorInfo, VirialError};

use crate::diagram::{Bond, BondColor, Diagram};
use crate::mayer::{MayerFunction, PairGeometry, TripleGeometry, TripleMayerFunction};

/// Bond functions a cluster draws on, one slot per bond color.
#[derive(Clone)]
pub struct BondFunctions {
    normal: Arc<dyn MayerFunction>,
    reference: Option<Arc<dyn MayerFunction>>,
    exchange: Option<Arc<dyn MayerFunction>>,
    triple: Option<Arc<dyn TripleMayerFunction>>,
}

impl BondFunctions {
    /// Bond functions with only the normal pair slot filled.
    pub fn new(normal: Arc<dyn MayerFunction>) -> Self {
        Self {
            normal,
            reference: None,
            exchange: None,
            triple: None,
        }
    }

    /// Adds the hard-sphere reference function used by reference-colored bonds.
    pub fn with_reference(mut self, reference: Arc<dyn MayerFunction>) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Adds the ring-exchange function used by exchange-colored bonds.
    pub fn with_exchange(mut self, exchange: Arc<dyn MayerFunction>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    /// Adds the three-body function used by triple bonds.
    pub fn with_triple(mut self, triple: Arc<dyn TripleMayerFunction>) -> Self {
        self.triple = Some(triple);
        self
    }

    fn pair_function(&self, color: BondColor) -> Option<&Arc<dyn MayerFunction>> {
        match color {
            BondColor::Normal => Some(&self.normal),
            BondColor::Reference => self.reference.as_ref(),
            BondColor::Exchange => self.exchange.as_ref(),
        }
    }
}

impl fmt::Debug for BondFunctions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BondFunctions")
            .field("normal", &self.normal)
            .field("reference", &self.reference)
            .field("exchange", &self.exchange)
            .field("triple", &self.triple)
            .finish()
    }
}

/// Fixed list of diagrams evaluated with one set of bond functions.
#[derive(Debug, Clone)]
pub struct ClusterSum {
    points: usize,
    diagrams: Vec<Diagram>,
    bonds: BondFunctions,
}

impl ClusterSum {
    /// Builds a cluster over `points` molecules. Fails if a diagram references
    /// a missing molecule, repeats an index inside a bond, or needs a bond
    /// function that was not supplied.
    pub fn new(
        points: usize,
        diagrams: Vec<Diagram>,
        bonds: BondFunctions,
    ) -> Result<Self, VirialError> {
        if points < 2 {
            return Err(VirialError::Configuration(
                ErrorInfo::new("cluster-too-small", "a cluster needs at least two points")
                    .with_context("points", points.to_string()),
            ));
        }
        if diagrams.is_empty() {
            return Err(VirialError::configuration(
                "no-diagrams",
                "a cluster needs at least one diagram",
            ));
        }
        for (index, diagram) in diagrams.iter().enumerate() {
            for bond in diagram.bonds() {
                let mut indices = bond.indices();
                indices.sort_unstable();
                if let Some(&max) = indices.iter().max() {
                    if max >= points {
                        return Err(VirialError::Configuration(
                            ErrorInfo::new("bond-out-of-range", "bond references a missing molecule")
                                .with_context("diagram", index.to_string())
                                .with_context("index", max.to_string())
                                .with_context("points", points.to_string()),
                        ));
                    }
                }
                if indices.windows(2).any(|w| w[0] == w[1]) {
                    return Err(VirialError::Configuration(
                        ErrorInfo::new("self-bond", "bond joins a molecule to itself")
                            .with_context("diagram", index.to_string()),
                    ));
                }
                match bond {
                    Bond::Pair { color, .. } => {
                        if bonds.pair_function(*color).is_none() {
                            return Err(VirialError::Configuration(
                                ErrorInfo::new(
                                    "missing-bond-function",
                                    "diagram uses a bond color with no function supplied",
                                )
                                .with_context("diagram", index.to_string())
                                .with_context("color", format!("{color:?}")),
                            ));
                        }
                    }
                    Bond::Triple { .. } => {
                        if bonds.triple.is_none() {
                            return Err(VirialError::Configuration(
                                ErrorInfo::new(
                                    "missing-multibody",
                                    "non-additive diagram requested without a three-body function",
                                )
                                .with_context("diagram", index.to_string())
                                .with_hint("supply a three-body function with BondFunctions::with_triple"),
                            ));
                        }
                    }
                }
            }
        }
        Ok(Self {
            points,
            diagrams,
            bonds,
        })
    }

    /// Number of molecules the cluster spans.
    pub fn points(&self) -> usize {
        self.points
    }

    /// Diagrams in evaluation order.
    pub fn diagrams(&self) -> &[Diagram] {
        &self.diagrams
    }

    /// Signed cluster value.
    pub fn value(&self, config: &Configuration, beta: f64) -> f64 {
        let mut table = BondTable::new(self, config, beta);
        self.diagrams
            .iter()
            .map(|diagram| table.diagram_value(diagram))
            .sum()
    }

    /// Contribution of every diagram, coefficient included.
    pub fn terms(&self, config: &Configuration, beta: f64) -> Vec<f64> {
        let mut table = BondTable::new(self, config, beta);
        self.diagrams
            .iter()
            .map(|diagram| table.diagram_value(diagram))
            .collect()
    }

    /// Value followed by its first `order` derivatives with respect to beta.
    pub fn series(&self, config: &Configuration, beta: f64, order: usize) -> Vec<f64> {
        let mut table = BondTable::new(self, config, beta);
        let mut total = vec![0.0; order + 1];
        for diagram in &self.diagrams {
            let mut product = vec![0.0; order + 1];
            product[0] = diagram.coefficient().as_f64();
            for bond in diagram.bonds() {
                let bond_series = table.bond_series(bond, order);
                product = truncated_product(&product, &bond_series);
            }
            for (acc, term) in total.iter_mut().zip(product) {
                *acc += term;
            }
        }
        // Taylor coefficients to derivatives.
        let mut factorial = 1.0;
        for (k, value) in total.iter_mut().enumerate().skip(1) {
            factorial *= k as f64;
            *value *= factorial;
        }
        total
    }
}

fn truncated_product(a: &[f64], b: &[f64]) -> Vec<f64> {
    let order = a.len();
    let mut out = vec![0.0; order];
    for (i, x) in a.iter().enumerate() {
        if *x == 0.0 {
            continue;
        }
        for (j, y) in b.iter().enumerate().take(order - i) {
            out[i + j] += x * y;
        }
    }
    out
}

/// Per-evaluation bond cache, indexed by color and molecule indices. Created
/// empty for every evaluation and dropped with it.
struct BondTable<'a> {
    cluster: &'a ClusterSum,
    config: &'a Configuration,
    beta: f64,
    pairs: Vec<Option<f64>>,
    triples: Vec<Option<f64>>,
}

const COLORS: usize = 3;

fn color_slot(color: BondColor) -> usize {
    match color {
        BondColor::Normal => 0,
        BondColor::Exchange => 1,
        BondColor::Reference => 2,
    }
}

impl<'a> BondTable<'a> {
    fn new(cluster: &'a ClusterSum, config: &'a Configuration, beta: f64) -> Self {
        let n = cluster.points;
        Self {
            cluster,
            config,
            beta,
            pairs: vec![None; COLORS * n * n],
            triples: vec![None; n * n * n],
        }
    }

    fn diagram_value(&mut self, diagram: &Diagram) -> f64 {
        let mut product = diagram.coefficient().as_f64();
        for bond in diagram.bonds() {
            product *= self.bond_value(bond);
            if product == 0.0 {
                break;
            }
        }
        product
    }

    fn bond_value(&mut self, bond: &Bond) -> f64 {
        let n = self.cluster.points;
        match *bond {
            Bond::Pair { color, i, j } => {
                let slot = (color_slot(color) * n + i) * n + j;
                if let Some(value) = self.pairs[slot] {
                    return value;
                }
                let value = match self.cluster.bonds.pair_function(color) {
                    Some(function) => function.f(&PairGeometry::between(self.config, i, j), self.beta),
                    None => 0.0,
                };
                self.pairs[slot] = Some(value);
                value
            }
            Bond::Triple { i, j, k, .. } => {
                let slot = (i * n + j) * n + k;
                if let Some(value) = self.triples[slot] {
                    return value;
                }
                let value = match &self.cluster.bonds.triple {
                    Some(function) => {
                        function.f(&TripleGeometry::between(self.config, i, j, k), self.beta)
                    }
                    None => 0.0,
                };
                self.triples[slot] = Some(value);
                value
            }
        }
    }

    /// Taylor coefficients in `delta beta` of one bond up to `order`.
    fn bond_series(&mut self, bond: &Bond, order: usize) -> Vec<f64> {
        let value = self.bond_value(bond);
        let mut series = vec![0.0; order + 1];
        series[0] = value;
        if order == 0 {
            return series;
        }
        let energy = match *bond {
            Bond::Pair { color, i, j } => self
                .cluster
                .bonds
                .pair_function(color)
                .and_then(|function| function.energy(&PairGeometry::between(self.config, i, j))),
            Bond::Triple { i, j, k, .. } => self.cluster.bonds.triple.as_ref().and_then(|function| {
                function.energy(&TripleGeometry::between(self.config, i, j, k))
            }),
        };
        if let Some(u) = energy {
            if u.is_finite() {
                let boltzmann = value + 1.0;
                let mut term = boltzmann;
                for (k, slot) in series.iter_mut().enumerate().skip(1) {
                    term *= -u / k as f64;
                    *slot = term;
                }
            }
        }
        series
    }
}

/// A cluster value: a plain diagram sum or a difference of cluster values
/// evaluated on the same configuration.
#[derive(Debug, Clone)]
pub enum ClusterValue {
    /// Weighted diagram sum.
    Sum(ClusterSum),
    /// `plus - sum(minus)`.
    Difference {
        /// Full-accuracy cluster.
        plus: Box<ClusterValue>,
        /// Approximations subtracted from `plus`.
        minus: Vec<ClusterValue>,
    },
}

impl From<ClusterSum> for ClusterValue {
    fn from(sum: ClusterSum) -> Self {
        ClusterValue::Sum(sum)
    }
}

impl ClusterValue {
    /// Difference composition. Every part must span the same point count.
    pub fn difference(plus: ClusterValue, minus: Vec<ClusterValue>) -> Result<Self, VirialError> {
        let points = plus.points();
        if let Some(bad) = minus.iter().find(|cluster| cluster.points() != points) {
            return Err(VirialError::Configuration(
                ErrorInfo::new("difference-size", "difference parts span different point counts")
                    .with_context("plus", points.to_string())
                    .with_context("minus", bad.points().to_string()),
            ));
        }
        Ok(ClusterValue::Difference {
            plus: Box::new(plus),
            minus,
        })
    }

    /// Number of molecules the cluster spans.
    pub fn points(&self) -> usize {
        match self {
            ClusterValue::Sum(sum) => sum.points(),
            ClusterValue::Difference { plus, .. } => plus.points(),
        }
    }

    /// True if any part carries a three-body bond.
    pub fn has_triples(&self) -> bool {
        match self {
            ClusterValue::Sum(sum) => sum.diagrams().iter().any(Diagram::has_triples),
            ClusterValue::Difference { plus, minus } => {
                plus.has_triples() || minus.iter().any(ClusterValue::has_triples)
            }
        }
    }

    /// Signed value on `config` at inverse temperature `beta`.
    pub fn value(&self, config: &Configuration, beta: f64) -> f64 {
        match self {
            ClusterValue::Sum(sum) => sum.value(config, beta),
            ClusterValue::Difference { plus, minus } => {
                let mut value = plus.value(config, beta);
                for part in minus {
                    value -= part.value(config, beta);
                }
                value
            }
        }
    }

    /// Value and its first `order` beta derivatives.
    pub fn series(&self, config: &Configuration, beta: f64, order: usize) -> Vec<f64> {
        match self {
            ClusterValue::Sum(sum) => sum.series(config, beta, order),
            ClusterValue::Difference { plus, minus } => {
                let mut series = plus.series(config, beta, order);
                for part in minus {
                    for (acc, term) in series.iter_mut().zip(part.series(config, beta, order)) {
                        *acc -= term;
                    }
                }
                series
            }
        }
    }

    /// Total number of diagrams across all parts.
    pub fn diagram_count(&self) -> usize {
        match self {
            ClusterValue::Sum(sum) => sum.diagrams().len(),
            ClusterValue::Difference { plus, minus } => {
                plus.diagram_count() + minus.iter().map(ClusterValue::diagram_count).sum::<usize>()
            }
        }
    }
}
