//! Brute-force enumeration of labeled biconnected graphs.
//!
//! This builds complete virial clusters `B_n = (1 - n)/n! * sum over biconnected
//! graphs` for small `n`. It does no isomorphism or Ree-Hoover reduction; a
//! dedicated diagram generator should be used for anything beyond `n = 6`.

use std::sync::Arc;

use virial_core::{ErrorInfo, VirialError};

use crate::cluster::{BondFunctions, ClusterSum};
use crate::diagram::{Bond, BondColor, Coefficient, Diagram};
use crate::mayer::MayerFunction;

/// Largest point count the enumerator accepts.
pub const MAX_POINTS: usize = 6;

fn edge_list(n: usize) -> Vec<(usize, usize)> {
    let mut edges = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            edges.push((i, j));
        }
    }
    edges
}

fn connected_without(n: usize, edges: &[(usize, usize)], removed: Option<usize>) -> bool {
    let start = match (0..n).find(|&v| Some(v) != removed) {
        Some(v) => v,
        None => return true,
    };
    let mut seen = vec![false; n];
    let mut stack = vec![start];
    seen[start] = true;
    while let Some(v) = stack.pop() {
        for &(a, b) in edges {
            if Some(a) == removed || Some(b) == removed {
                continue;
            }
            let next = if a == v {
                b
            } else if b == v {
                a
            } else {
                continue;
            };
            if !seen[next] {
                seen[next] = true;
                stack.push(next);
            }
        }
    }
    (0..n).all(|v| seen[v] || Some(v) == removed)
}

fn is_biconnected(n: usize, edges: &[(usize, usize)]) -> bool {
    connected_without(n, edges, None) && (0..n).all(|v| connected_without(n, edges, Some(v)))
}

/// Edge lists of every labeled biconnected graph on `n` points.
pub fn biconnected_graphs(n: usize) -> Result<Vec<Vec<(usize, usize)>>, VirialError> {
    if !(2..=MAX_POINTS).contains(&n) {
        return Err(VirialError::Configuration(
            ErrorInfo::new("enumeration-range", "biconnected enumeration covers 2 to 6 points")
                .with_context("points", n.to_string()),
        ));
    }
    let all = edge_list(n);
    let min_edges = if n == 2 { 1 } else { n };
    let mut graphs = Vec::new();
    for mask in 1u32..(1u32 << all.len()) {
        let edges: Vec<(usize, usize)> = all
            .iter()
            .enumerate()
            .filter(|(bit, _)| mask & (1 << bit) != 0)
            .map(|(_, edge)| *edge)
            .collect();
        if edges.len() >= min_edges && is_biconnected(n, &edges) {
            graphs.push(edges);
        }
    }
    Ok(graphs)
}

/// `(1 - n) / n!` as an exact fraction.
pub fn virial_prefactor(n: usize) -> Result<Coefficient, VirialError> {
    let factorial: u64 = (1..=n as u64).product();
    Coefficient::new(1 - n as i64, factorial)
}

/// All biconnected diagrams on `n` points with bonds of `color`, each carrying
/// the virial prefactor.
pub fn virial_diagrams(n: usize, color: BondColor) -> Result<Vec<Diagram>, VirialError> {
    let prefactor = virial_prefactor(n)?;
    Ok(biconnected_graphs(n)?
        .into_iter()
        .map(|edges| {
            let bonds = edges
                .into_iter()
                .map(|(i, j)| Bond::colored_pair(color, i, j))
                .collect();
            Diagram::new(bonds, prefactor)
        })
        .collect())
}

/// Complete virial cluster of order `n` for a single pair Mayer function.
pub fn virial_cluster(n: usize, mayer: Arc<dyn MayerFunction>) -> Result<ClusterSum, VirialError> {
    ClusterSum::new(n, virial_diagrams(n, BondColor::Normal)?, BondFunctions::new(mayer))
}
