//! Output formatting for extraction results (table, JSON, markdown, CSV).

use crate::batch::BatchSummary;
use crate::config::OutputFormat;
use crate::extractor::ExtractionReport;
use serde::Serialize;

/// One line of batch output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceRow {
    pub title: String,
    pub url: String,
    pub price: Option<f64>,
    pub status: String,
}

/// One input of the `parse` command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedRow {
    pub input: String,
    pub canonical: Option<String>,
    pub price: Option<f64>,
}

/// Formats results for output.
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    /// Creates a new formatter.
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the outcome of a single extraction.
    pub fn format_report(&self, report: &ExtractionReport) -> String {
        match self.format {
            OutputFormat::Json => self.json_report(report),
            OutputFormat::Table => self.table_report(report),
            OutputFormat::Markdown => self.markdown_report(report),
            OutputFormat::Csv => {
                let row = PriceRow {
                    title: String::new(),
                    url: report.url.clone(),
                    price: report.price,
                    status: report_status(report).to_string(),
                };
                self.csv_rows(std::slice::from_ref(&row))
            }
        }
    }

    /// Formats batch rows followed by the summary.
    pub fn format_rows(&self, rows: &[PriceRow], summary: &BatchSummary) -> String {
        if rows.is_empty() {
            return match self.format {
                OutputFormat::Json => self.json_rows(rows, summary),
                OutputFormat::Csv => format!("{}\n# {}", self.csv_header(), summary),
                _ => "No sites to check.".to_string(),
            };
        }

        match self.format {
            OutputFormat::Json => self.json_rows(rows, summary),
            OutputFormat::Table => self.table_rows(rows, summary),
            OutputFormat::Markdown => self.markdown_rows(rows, summary),
            OutputFormat::Csv => format!("{}\n# {}", self.csv_rows(rows), summary),
        }
    }

    /// Formats offline parse results.
    pub fn format_parsed(&self, rows: &[ParsedRow]) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string())
            }
            OutputFormat::Csv => {
                let mut lines = vec!["input,canonical,price".to_string()];
                for row in rows {
                    lines.push(format!(
                        "{},{},{}",
                        Self::csv_escape(&row.input),
                        row.canonical.as_deref().unwrap_or_default(),
                        row.price.map(|p| p.to_string()).unwrap_or_default()
                    ));
                }
                lines.join("\n")
            }
            OutputFormat::Markdown => {
                let mut lines = vec![
                    "| Input | Canonical | Price |".to_string(),
                    "|-------|-----------|-------|".to_string(),
                ];
                for row in rows {
                    lines.push(format!(
                        "| `{}` | {} | {} |",
                        row.input,
                        row.canonical.as_deref().unwrap_or("-"),
                        price_text(row.price)
                    ));
                }
                lines.join("\n")
            }
            OutputFormat::Table => rows
                .iter()
                .map(|row| match &row.canonical {
                    Some(canonical) => {
                        format!("{:?} -> {} ({})", row.input, canonical, price_text(row.price))
                    }
                    None => format!("{:?} -> no price", row.input),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    // JSON formatting

    fn json_report(&self, report: &ExtractionReport) -> String {
        let attempts: Vec<_> = report
            .attempts
            .iter()
            .map(|record| {
                serde_json::json!({
                    "attempt": record.attempt,
                    "outcome": record.outcome,
                    "error": record.error.as_ref().map(|e| e.to_string()),
                    "backoff_ms": record.backoff.map(|b| b.as_millis() as u64),
                    "screenshot": record.artifact.as_ref().map(|p| p.display().to_string()),
                })
            })
            .collect();

        let value = serde_json::json!({
            "url": report.url,
            "price": report.price,
            "cancelled": report.cancelled,
            "attempts": attempts,
        });

        serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
    }

    fn json_rows(&self, rows: &[PriceRow], summary: &BatchSummary) -> String {
        let value = serde_json::json!({ "sites": rows, "summary": summary });
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
    }

    // Table formatting

    fn table_report(&self, report: &ExtractionReport) -> String {
        let mut lines = Vec::new();

        lines.push(format!("URL:      {}", report.url));
        lines.push(format!("Price:    {}", price_text(report.price)));
        lines.push(format!("Status:   {}", report_status(report)));
        lines.push(format!("Attempts: {}", report.attempts.len()));

        for record in &report.attempts {
            let mut line = format!("  #{} {}", record.attempt, record.outcome);
            if let Some(error) = &record.error {
                line.push_str(&format!(": {}", error));
            }
            if let Some(backoff) = record.backoff {
                line.push_str(&format!(" (retry in {:?})", backoff));
            }
            lines.push(line);
            if let Some(artifact) = &record.artifact {
                lines.push(format!("     screenshot: {}", artifact.display()));
            }
        }

        lines.join("\n")
    }

    fn table_rows(&self, rows: &[PriceRow], summary: &BatchSummary) -> String {
        let price_width = 12;
        let status_width = 12;
        let title_width = 30;

        let mut lines = Vec::new();

        lines.push(format!(
            "{:<title_width$}  {:<price_width$}  {:<status_width$}  {}",
            "Title", "Price", "Status", "URL"
        ));
        lines.push(format!(
            "{:-<title_width$}  {:-<price_width$}  {:-<status_width$}  {:-<40}",
            "", "", "", ""
        ));

        for row in rows {
            lines.push(format!(
                "{:<title_width$}  {:>price_width$}  {:<status_width$}  {}",
                truncate(&row.title, title_width),
                price_text(row.price),
                row.status,
                row.url
            ));
        }

        lines.push(String::new());
        lines.push(summary.to_string());

        lines.join("\n")
    }

    // Markdown formatting

    fn markdown_report(&self, report: &ExtractionReport) -> String {
        let mut lines = Vec::new();

        lines.push(format!("## {}", report.url));
        lines.push(String::new());
        lines.push(format!("- **Price:** {}", price_text(report.price)));
        lines.push(format!("- **Status:** {}", report_status(report)));
        lines.push(format!("- **Attempts:** {}", report.attempts.len()));

        for record in &report.attempts {
            match &record.error {
                Some(error) => {
                    lines.push(format!("  - #{} `{}`: {}", record.attempt, record.outcome, error))
                }
                None => lines.push(format!("  - #{} `{}`", record.attempt, record.outcome)),
            }
        }

        lines.join("\n")
    }

    fn markdown_rows(&self, rows: &[PriceRow], summary: &BatchSummary) -> String {
        let mut lines = Vec::new();

        lines.push("| Title | Price | Status |".to_string());
        lines.push("|-------|-------|--------|".to_string());

        for row in rows {
            lines.push(format!(
                "| [{}]({}) | {} | {} |",
                truncate(&row.title, 40),
                row.url,
                price_text(row.price),
                row.status
            ));
        }

        lines.push(String::new());
        lines.push(format!("*{}*", summary));

        lines.join("\n")
    }

    // CSV formatting

    fn csv_header(&self) -> String {
        "title,url,price,status".to_string()
    }

    fn csv_rows(&self, rows: &[PriceRow]) -> String {
        let mut lines = Vec::new();
        lines.push(self.csv_header());

        for row in rows {
            lines.push(format!(
                "{},{},{},{}",
                Self::csv_escape(&row.title),
                Self::csv_escape(&row.url),
                row.price.map(|p| p.to_string()).unwrap_or_default(),
                Self::csv_escape(&row.status)
            ));
        }

        lines.join("\n")
    }

    fn csv_escape(s: &str) -> String {
        if s.contains(',') || s.contains('"') || s.contains('\n') {
            format!("\"{}\"", s.replace('"', "\"\""))
        } else {
            s.to_string()
        }
    }
}

fn price_text(price: Option<f64>) -> String {
    match price {
        Some(price) => format!("{:.2}", price),
        None => "N/A".to_string(),
    }
}

fn report_status(report: &ExtractionReport) -> &'static str {
    if report.cancelled {
        "cancelled"
    } else if report.is_priced() {
        "priced"
    } else {
        "price unavailable"
    }
}

/// Shortens to `width` characters, marking the cut with "...".
fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let kept: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        s.to_string()
    }
}
