use super::types::PathPoint;

/// Nearest-rank percentile: sorts `values` in place and returns the element at
/// `floor(n * p / 100)`, clamped to the last index. Empty input yields `0.0`.
pub fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    let rank = (n as f64 * p / 100.0).floor();
    let index = if rank <= 0.0 {
        0
    } else {
        (rank as usize).min(n - 1)
    };
    values[index]
}

/// Per-year percentile across every path. Each year is ranked on its own
/// cross-section, so the result need not follow any single trial. Ages are
/// taken from the first path.
pub fn percentile_path(paths: &[Vec<PathPoint>], years: u32, p: f64) -> Vec<PathPoint> {
    let Some(first) = paths.first() else {
        return Vec::new();
    };

    let mut cross_section = Vec::with_capacity(paths.len());
    let mut out = Vec::with_capacity(years as usize + 1);
    for idx in 0..=years as usize {
        cross_section.clear();
        cross_section.extend(
            paths
                .iter()
                .filter_map(|path| path.get(idx).map(|pt| pt.portfolio_value)),
        );
        if cross_section.is_empty() {
            continue;
        }

        let value = percentile(&mut cross_section, p);
        out.push(PathPoint {
            year: idx as u32,
            age: first.get(idx).and_then(|pt| pt.age),
            portfolio_value: round_to(value, 2),
        });
    }
    out
}

/// Rounds half away from zero (`f64::round`), so exact `.005` ties go up in
/// magnitude rather than to even.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10_f64.powi(decimals);
    (value * scale).round() / scale
}
