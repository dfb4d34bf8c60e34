//! Text exposition format output.
//!
//! ```text
//! # HELP backup_exit_code Exit code of the backup check
//! # TYPE backup_exit_code gauge
//! backup_exit_code{host="db1",job="nightly"} 0
//! ```
//!
//! HELP and TYPE are written once per metric name, at its first sample.
//! Labels are sorted by name, so the same input always formats to the same
//! bytes.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::Path;

use crate::collector::Metric;

/// Formats a value like Go's `%g`: shortest round-trip digits, switching to
/// exponent form (`1.5e+06`, `1e-05`) when the decimal exponent is below -4
/// or at least 6. `NaN`, `+Inf` and `-Inf` are spelled out.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }

    let scientific = format!("{:e}", value);
    let Some((mantissa, exponent)) = scientific
        .rsplit_once('e')
        .and_then(|(m, exp)| exp.parse::<i32>().ok().map(|exp| (m, exp)))
    else {
        return value.to_string();
    };
    if (-4..6).contains(&exponent) {
        return value.to_string();
    }
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{}e{}{:02}", mantissa, sign, exponent.unsigned_abs())
}

fn escape_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Renders `metrics` in exposition format, keeping their order.
pub fn format_metrics(metrics: &[Metric]) -> String {
    let mut out = String::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for metric in metrics {
        if seen.insert(metric.name.as_str()) {
            let _ = writeln!(out, "# HELP {} {}", metric.name, escape_help(&metric.help));
            let _ = writeln!(out, "# TYPE {} {}", metric.name, metric.metric_type);
        }

        out.push_str(&metric.name);
        if !metric.labels.is_empty() {
            let labels: Vec<String> = metric
                .labels
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
                .collect();
            let _ = write!(out, "{{{}}}", labels.join(","));
        }
        let _ = writeln!(out, " {}", format_value(metric.value));
    }

    out
}

/// Writes formatted metrics to `writer` (stdout, a socket, a buffer).
pub fn write_metrics<W: Write>(metrics: &[Metric], writer: &mut W) -> io::Result<()> {
    writer.write_all(format_metrics(metrics).as_bytes())?;
    writer.flush()
}

/// Writes metrics to `path` atomically.
///
/// Content goes to a temporary file in the same directory, is synced, then
/// renamed over `path`. Readers see either the old file or the new one.
/// The temporary file is removed if any step fails.
pub fn write_metrics_to_file(metrics: &[Metric], path: &Path) -> io::Result<()> {
    let content = format_metrics(metrics);

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix("metrics.")
        .suffix(".prom")
        .tempfile_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;

    // Temp files start as 0600; the scraping agent usually runs as another user.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
