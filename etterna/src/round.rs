use std::cmp::Ordering;

/// Rounds `num` to `precision` decimal places, halves rounding up.
///
/// The scaled value is nudged one ulp towards positive infinity before rounding.
/// Decimal inputs like `1.255` are stored as `1.25499999...` and scale to
/// `125.49999...`, which a plain round would take down to `125`.
/// `round_to_precision(0.125, 2) == 0.13`.
pub fn round_to_precision(num: f64, precision: u32) -> f64 {
    let scalar = 10f64.powi(precision as i32);
    let scaled = next_up(num * scalar);

    scaled.round() / scalar
}

/// Smallest representable value greater than `x`.
fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        return x;
    }

    if x == 0.0 {
        return f64::from_bits(1);
    }

    let bits = x.to_bits();

    if x > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

/// Comparison sign between two ratings: `>`, `<` or `=`.
pub fn equality_sign(a: f64, b: f64) -> char {
    match a.partial_cmp(&b) {
        Some(Ordering::Greater) => '>',
        Some(Ordering::Less) => '<',
        _ => '=',
    }
}
