//! Small numeric helpers shared by the pipeline stages.

/// Largest power of two not exceeding `n` (`0` for `n == 0`)
pub fn nearest_power_of_two(n: usize) -> usize {
    if n == 0 {
        0
    } else {
        1 << (usize::BITS - 1 - n.leading_zeros())
    }
}

/// Index of the largest value; first occurrence wins, `NaN`s are skipped
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Unwrap radian phase so consecutive samples never jump by more than π
/// (`numpy.unwrap`)
pub fn unwrap_phase(phase: &[f64]) -> Vec<f64> {
    use std::f64::consts::PI;

    let mut out = Vec::with_capacity(phase.len());
    let mut offset = 0.0;
    let mut prev: Option<f64> = None;
    for &p in phase {
        if let Some(q) = prev {
            let d = p - q;
            // map d into [-π, π), keeping +π for positive jumps like numpy
            let mut dm = (d + PI).rem_euclid(2.0 * PI) - PI;
            if dm == -PI && d > 0.0 {
                dm = PI;
            }
            if d.abs() >= PI {
                offset += dm - d;
            }
        }
        out.push(p + offset);
        prev = Some(p);
    }
    out
}

/// Engineering notation: mantissa with 4 significant digits and an
/// exponent that is a multiple of three (`1.235E3`, `-47E-9`)
pub fn eng(x: f64) -> String {
    if x == 0.0 || !x.is_finite() {
        return format!("{x}");
    }
    let b = x.abs().log10().floor() as i32;
    if -3 < b && b < 3 {
        return significant(x, 4);
    }
    let shift = b.rem_euclid(3);
    let exponent = b - shift;
    let mantissa = x / 10f64.powi(exponent);
    format!("{}E{}", significant(mantissa, 4), exponent)
}

/// Fixed-notation rendering with `digits` significant digits, trailing
/// zeros trimmed
fn significant(x: f64, digits: i32) -> String {
    let magnitude = x.abs().log10().floor() as i32;
    let decimals = (digits - 1 - magnitude).max(0) as usize;
    let s = format!("{:.*}", decimals, x);
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}
