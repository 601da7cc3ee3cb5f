//! Metrics exposition-format parsing
//!
//! The sole oracle for "did the exporter actually serve metrics" across the
//! harness: a single text line is a numeric sample when it has the shape
//! `metric_name{optional="labels"} value`. Comment lines (`#`) and blank
//! lines are protocol framing, not samples - callers skip them before asking.
//!
//! # Example
//!
//! ```
//! use verkko::metrics::{is_numeric_sample, text_has_sample};
//!
//! assert!(is_numeric_sample("ionic_tx_bytes{port=\"eth0\"} 1.5e9"));
//! assert!(!is_numeric_sample("# HELP ionic_tx_bytes Transmitted bytes"));
//!
//! let payload = "# TYPE up gauge\nup 1\n";
//! assert!(text_has_sample(payload));
//! ```

use regex::Regex;
use std::sync::OnceLock;

/// Line grammar: name, optional brace-delimited label block, numeric value.
/// Label content is unvalidated and matched greedily; the value admits sign,
/// decimals and scientific notation.
fn sample_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([a-zA-Z_:][a-zA-Z0-9_:]*)\s*(\{.*\})?\s+(-?\d+(\.\d+)?([eE][-+]?\d+)?)\s*$")
            .expect("sample line regex is valid")
    })
}

/// One parsed exposition line
///
/// Ephemeral - produced while scanning a payload and discarded with it.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    /// Metric name (`[a-zA-Z_:][a-zA-Z0-9_:]*`)
    pub name: String,
    /// Raw label block including braces, if present
    pub labels: Option<String>,
    /// Sample value
    pub value: f64,
}

/// Whether a single line is a numeric sample
///
/// Callers must skip blank and `#` comment lines first; this recognizer does
/// not special-case them (a comment line simply fails the grammar).
#[must_use]
pub fn is_numeric_sample(line: &str) -> bool {
    sample_line_re().is_match(line)
}

/// Parse a single line into a [`MetricSample`], or `None` if it is not one
#[must_use]
pub fn parse_sample(line: &str) -> Option<MetricSample> {
    let caps = sample_line_re().captures(line)?;
    let value: f64 = caps.get(3)?.as_str().parse().ok()?;

    Some(MetricSample {
        name: caps.get(1)?.as_str().to_string(),
        labels: caps.get(2).map(|m| m.as_str().to_string()),
        value,
    })
}

/// Whether a metrics payload contains at least one numeric sample
///
/// Skips blank lines and `#` comments, then applies the line grammar.
#[must_use]
pub fn text_has_sample(text: &str) -> bool {
    text.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with('#') && is_numeric_sample(line)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_sample() {
        assert!(is_numeric_sample("ionic_tx_packets 42"));
        assert!(is_numeric_sample("up 1"));
    }

    #[test]
    fn test_labeled_sample() {
        assert!(is_numeric_sample(
            "ionic_tx_bytes{device=\"ionic_0\",port=\"1\"} 123456"
        ));
    }

    #[test]
    fn test_signed_and_scientific_values() {
        assert!(is_numeric_sample("delta_gauge -17"));
        assert!(is_numeric_sample("tiny 3.5e-9"));
        assert!(is_numeric_sample("huge{q=\"1\"} 1.5E+9"));
        assert!(is_numeric_sample("frac 0.25"));
    }

    #[test]
    fn test_leading_and_trailing_whitespace() {
        assert!(is_numeric_sample("  padded_metric 7  "));
    }

    #[test]
    fn test_name_charset() {
        assert!(is_numeric_sample("_underscored 1"));
        assert!(is_numeric_sample("ns:subsystem:metric 1"));
        assert!(!is_numeric_sample("9starts_with_digit 1"));
        assert!(!is_numeric_sample("has-dash 1"));
    }

    #[test]
    fn test_non_numeric_value_rejected() {
        assert!(!is_numeric_sample("state running"));
        assert!(!is_numeric_sample("metric_name NaN"));
        assert!(!is_numeric_sample("metric_name"));
    }

    #[test]
    fn test_comment_and_blank_fail_grammar() {
        // Callers skip these before calling; they also fail the grammar
        assert!(!is_numeric_sample("# HELP up Process liveness"));
        assert!(!is_numeric_sample(""));
        assert!(!is_numeric_sample("   "));
    }

    #[test]
    fn test_parse_sample_fields() {
        let sample = parse_sample("ionic_rx_bytes{port=\"eth0\"} 2.5e3").unwrap();
        assert_eq!(sample.name, "ionic_rx_bytes");
        assert_eq!(sample.labels.as_deref(), Some("{port=\"eth0\"}"));
        assert!((sample.value - 2500.0).abs() < f64::EPSILON);

        let bare = parse_sample("up 1").unwrap();
        assert_eq!(bare.name, "up");
        assert_eq!(bare.labels, None);
    }

    #[test]
    fn test_text_has_sample_skips_framing() {
        let payload = "\n# HELP ionic_tx_bytes Transmitted bytes\n# TYPE ionic_tx_bytes counter\nionic_tx_bytes 99\n";
        assert!(text_has_sample(payload));

        let comments_only = "# HELP nothing here\n# TYPE nothing gauge\n\n";
        assert!(!text_has_sample(comments_only));

        assert!(!text_has_sample(""));
        assert!(!text_has_sample("<html>404 not found</html>"));
    }
}
