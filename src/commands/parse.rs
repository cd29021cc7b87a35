//! Offline check of the price normalizer and parser.

use crate::config::Config;
use crate::format::{Formatter, ParsedRow};
use crate::price::{canonicalize, normalize};

/// Runs raw fragments through normalization and parsing.
pub struct ParseCommand {
    config: Config,
}

impl ParseCommand {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn execute(&self, inputs: &[String]) -> String {
        let rows: Vec<ParsedRow> = inputs
            .iter()
            .map(|input| {
                let canonical = canonicalize(&normalize(input));
                ParsedRow {
                    input: input.clone(),
                    price: canonical.as_ref().and_then(|c| c.to_f64()),
                    canonical: canonical.map(|c| c.to_string()),
                }
            })
            .collect();

        Formatter::new(self.config.format).format_parsed(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;

    #[test]
    fn test_parse_command() {
        let config = Config { format: OutputFormat::Json, ..Config::default() };
        let output = ParseCommand::new(config)
            .execute(&["1.234".to_string(), "100-150".to_string(), "N/A".to_string()]);

        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value[0]["canonical"], "1234");
        assert_eq!(value[0]["price"], 1234.0);
        assert_eq!(value[1]["price"], 100.0);
        assert!(value[2]["canonical"].is_null());
    }
}
