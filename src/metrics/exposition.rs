//! Text exposition rendering.
//!
//! # Responsibilities
//! - Render a merged view in the fixed text format scrapers expect:
//!   HELP/TYPE comment pair per family, then one `name{labels} value`
//!   line per sample
//! - Escape label values
//!
//! Counter samples carry the `_total` suffix; summaries render `_count`
//! and `_sum` series. A family with no samples still gets its HELP/TYPE
//! pair so a scraper learns the full catalog.

use std::fmt::Write;

use crate::metrics::registry::{FamilySnapshot, MetricKind, SampleValue};

/// Content type of the exposition body.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render merged families into the exposition text format.
pub fn render(families: &[FamilySnapshot]) -> String {
    let mut out = String::new();
    for family in families {
        let name = &family.spec.name;
        let _ = writeln!(out, "# HELP {name} {}", family.spec.help);
        let _ = writeln!(out, "# TYPE {name} {}", family.spec.kind);

        for (label_values, value) in &family.samples {
            let labels = render_labels(&family.spec.label_names, label_values);
            match value {
                SampleValue::Counter(total) => {
                    let _ = writeln!(out, "{name}_total{labels} {total}");
                }
                SampleValue::Summary(summary) => {
                    let _ = writeln!(out, "{name}_count{labels} {}", summary.count);
                    let _ = writeln!(out, "{name}_sum{labels} {}", summary.sum);
                }
            }
        }
    }
    out
}

fn render_labels(names: &[String], values: &[String]) -> String {
    if names.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = names
        .iter()
        .zip(values)
        .map(|(name, value)| format!("{name}=\"{}\"", escape_label_value(value)))
        .collect();
    format!("{{{}}}", pairs.join(","))
}

fn escape_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    out
}
