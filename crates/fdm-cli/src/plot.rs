//! Plain-text plots for the terminal.

/// Block characters from one eighth to a full cell
const BLOCKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Render `y` against `x` as a bar plot `width` columns wide and `height`
/// rows tall. Each column shows the largest value among the points it
/// covers. With `log_y` the ordinate is `log10(y)` and non-positive values
/// are dropped.
pub fn ascii_plot(x: &[f64], y: &[f64], width: usize, height: usize, log_y: bool, unit: &str) -> String {
    let points: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter(|(_, v)| v.is_finite() && (!log_y || **v > 0.0))
        .map(|(&xi, &v)| (xi, if log_y { v.log10() } else { v }))
        .collect();
    if points.is_empty() || width == 0 || height == 0 {
        return String::from("(nothing to plot)\n");
    }

    let columns = width.min(points.len());
    let per_column = points.len().div_ceil(columns);
    let binned: Vec<f64> = points
        .chunks(per_column)
        .map(|chunk| chunk.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max))
        .collect();

    let top = binned.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let bottom = binned.iter().cloned().fold(f64::INFINITY, f64::min);
    let range = if top > bottom { top - bottom } else { 1.0 };
    let row_height = range / height as f64;

    let mut output = String::new();
    let label = |v: f64| {
        if log_y {
            format!("{:>10.2e}", 10f64.powf(v))
        } else {
            format!("{v:>10.4}")
        }
    };
    for row in 0..height {
        let threshold = top - (row as f64 + 1.0) * row_height;
        if row == 0 {
            output.push_str(&label(top));
        } else if row == height - 1 {
            output.push_str(&label(bottom));
        } else {
            output.push_str(&" ".repeat(10));
        }
        output.push_str(" │");
        for &value in &binned {
            if value >= threshold {
                let frac = (value - threshold) / row_height;
                output.push(BLOCKS[((frac * 8.0) as usize).min(7)]);
            } else {
                output.push(' ');
            }
        }
        output.push('\n');
    }

    let span = binned.len();
    output.push_str(&" ".repeat(11));
    output.push('└');
    output.push_str(&"─".repeat(span));
    output.push('\n');

    let (first, last) = (points[0].0, points[points.len() - 1].0);
    let third = (span / 3).max(1);
    output.push_str(&" ".repeat(12));
    output.push_str(&format!("{:<third$}", format!("{first:.4}")));
    output.push_str(&format!("{:^third$}", format!("{:.4} {unit}", (first + last) / 2.0)));
    output.push_str(&format!("{:>third$}", format!("{last:.4}")));
    output.push('\n');
    output
}
