//! Boltzmann-rational action selection.

/// Relative slack under which two Q-values count as tied for a rational policy.
const TIE_SLACK: f64 = 1e-12;

/// Overwrite `values` with `softmax(beta * values)`.
///
/// `beta = inf` yields the hard-max policy, splitting mass evenly across tied
/// maxima. The computation subtracts the maximum first so large returns do not
/// overflow.
pub fn boltzmann_in_place(values: &mut [f64], beta: f64) {
    if values.is_empty() {
        return;
    }
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if beta.is_infinite() {
        let slack = TIE_SLACK * max.abs().max(1.0);
        let ties = values.iter().filter(|&&v| max - v <= slack).count() as f64;
        for value in values.iter_mut() {
            *value = if max - *value <= slack { 1.0 / ties } else { 0.0 };
        }
        return;
    }
    let mut total = 0.0;
    for value in values.iter_mut() {
        *value = (beta * (*value - max)).exp();
        total += *value;
    }
    for value in values.iter_mut() {
        *value /= total;
    }
}

/// Allocating variant of [`boltzmann_in_place`].
pub fn boltzmann(values: &[f64], beta: f64) -> Vec<f64> {
    let mut out = values.to_vec();
    boltzmann_in_place(&mut out, beta);
    out
}
