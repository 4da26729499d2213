//! Resource quantity parsing
//!
//! Collectors report usage and capacity as Kubernetes quantity strings.
//! Parsing is lenient: anything that does not start with a number is
//! treated as `0.0` instead of failing the detection pass.

/// Split a quantity into its numeric prefix and unit suffix
fn split_quantity(raw: &str) -> Option<(f64, &str)> {
    let raw = raw.trim();
    let end = raw
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(raw.len());

    let value = raw[..end].parse::<f64>().ok()?;
    Some((value, raw[end..].trim()))
}

/// Parse a CPU quantity into cores ("250m" -> 0.25, "2" -> 2.0)
pub fn parse_cpu(raw: &str) -> f64 {
    match split_quantity(raw) {
        Some((value, "m")) => value / 1000.0,
        Some((value, _)) => value,
        None => 0.0,
    }
}

/// Parse a memory quantity into bytes ("512Mi", "1G", "1048576")
pub fn parse_memory(raw: &str) -> f64 {
    const KI: f64 = 1024.0;
    const K: f64 = 1000.0;

    let Some((value, unit)) = split_quantity(raw) else {
        return 0.0;
    };

    let multiplier = match unit {
        "Ki" => KI,
        "Mi" => KI.powi(2),
        "Gi" => KI.powi(3),
        "Ti" => KI.powi(4),
        "Pi" => KI.powi(5),
        "k" | "K" => K,
        "M" => K.powi(2),
        "G" | "g" => K.powi(3),
        "T" | "t" => K.powi(4),
        "P" | "p" => K.powi(5),
        "m" => 1.0 / K,
        _ => 1.0,
    };

    value * multiplier
}

/// Usage as a percentage of capacity; zero when capacity is unknown
pub fn usage_percent(usage: f64, capacity: f64) -> f64 {
    if capacity == 0.0 {
        return 0.0;
    }
    usage / capacity * 100.0
}
