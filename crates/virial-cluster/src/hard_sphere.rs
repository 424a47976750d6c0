//! Known hard-sphere virial coefficients, the reference integrals of overlap
//! sampling.

use std::f64::consts::{PI, SQRT_2};

use virial_core::{ErrorInfo, VirialError};

/// Second virial coefficient `b0 = 2 pi sigma^3 / 3`.
pub fn b2(sigma: f64) -> f64 {
    2.0 * PI / 3.0 * sigma.powi(3)
}

/// Hard-sphere virial coefficient `B_n` for `2 <= n <= 7`.
///
/// B3 and B4 are exact; B5 to B7 are the Labik, Kolafa and Malijevsky values.
pub fn virial(order: usize, sigma: f64) -> Result<f64, VirialError> {
    let b0 = b2(sigma);
    let value = match order {
        2 => b0,
        3 => 5.0 / 8.0 * b0 * b0,
        4 => {
            (219.0 * SQRT_2 / (2240.0 * PI) - 89.0 / 280.0
                + 4131.0 / (2240.0 * PI) * SQRT_2.atan())
                * b0.powi(3)
        }
        5 => 28.22445 * (b0 / 4.0).powi(4),
        6 => 39.81550 * (b0 / 4.0).powi(5),
        7 => 53.3413 * (b0 / 4.0).powi(6),
        _ => {
            return Err(VirialError::Configuration(
                ErrorInfo::new("unknown-hs-order", "no hard-sphere reference value at this order")
                    .with_context("order", order.to_string())
                    .with_hint("hard-sphere references cover orders 2 to 7"),
            ))
        }
    };
    Ok(value)
}

/// Hard-sphere diameter the path-integral helium drivers use as reference at
/// temperature `temperature` (Kelvin), widened when three-body terms are on.
pub fn helium_reference_diameter(temperature: f64, non_additive: bool) -> f64 {
    let base = 2.4 + 120.0 / (100.0 + temperature);
    if non_additive {
        base + 0.6
    } else {
        base
    }
}
