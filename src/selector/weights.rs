//! Weight normalization.

use crate::model::Automata;
use thiserror::Error;

/// Tolerance under which a weight vector already counts as normalized.
const NORMALIZED_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeightError {
    #[error("cannot normalize weights: total weight is zero")]
    DivideByZero,

    #[error("cannot normalize weights: {0} is negative or not finite")]
    InvalidWeight(f64),
}

/// Rescale weights so they sum to 1.0.
///
/// Already-normalized input is returned unchanged, which makes the operation
/// idempotent bit for bit.
///
/// # Example
///
/// ```rust
/// use aetherium::selector::normalize_weights;
///
/// let weights = normalize_weights(&[1.0, 1.0, 2.0]).unwrap();
/// assert_eq!(weights, vec![0.25, 0.25, 0.5]);
/// assert_eq!(normalize_weights(&weights).unwrap(), weights);
/// ```
pub fn normalize_weights(weights: &[f64]) -> Result<Vec<f64>, WeightError> {
    if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(WeightError::InvalidWeight(*bad));
    }

    let total: f64 = weights.iter().sum();
    if total == 0.0 {
        return Err(WeightError::DivideByZero);
    }
    if (total - 1.0).abs() <= NORMALIZED_EPSILON {
        return Ok(weights.to_vec());
    }

    Ok(weights.iter().map(|w| w / total).collect())
}

/// Normalize the effective weights of every transition leaving `from`.
///
/// On error the automata is left untouched.
pub fn normalize_outgoing(automata: &mut Automata, from: &str) -> Result<(), WeightError> {
    let (ids, weights): (Vec<String>, Vec<f64>) = automata
        .transitions_from(from)
        .map(|t| (t.id.clone(), t.effective_weight()))
        .unzip();

    let normalized = normalize_weights(&weights)?;

    for (id, weight) in ids.iter().zip(normalized) {
        if let Some(transition) = automata.transition_mut(id) {
            transition.set_effective_weight(weight);
        }
    }
    Ok(())
}
