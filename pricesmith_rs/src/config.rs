use serde::{Deserialize, Serialize};

/// Fixed textual date pattern accepted by the normalizer, e.g. `05-Jan-21`.
pub const DATE_FORMAT: &str = "%d-%b-%y";

/// Header names of the raw input columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSchema {
    pub date: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
    /// Optional label column; its absence is only an error when a feature
    /// that consumes it is requested.
    pub buy_signal: String,
}

impl Default for InputSchema {
    fn default() -> Self {
        Self {
            date: "Date".to_string(),
            open: "open".to_string(),
            high: "high".to_string(),
            low: "low".to_string(),
            close: "close".to_string(),
            volume: "volume".to_string(),
            buy_signal: "BuySignal".to_string(),
        }
    }
}

impl InputSchema {
    /// Header written for a table column. Base columns carry the input's
    /// header names back out; derived columns keep their own names.
    pub fn output_header<'a>(&'a self, column: &'a str) -> &'a str {
        match column {
            "open" => &self.open,
            "high" => &self.high,
            "low" => &self.low,
            "close" => &self.close,
            "volume" => &self.volume,
            "buy_signal" => &self.buy_signal,
            other => other,
        }
    }
}

/// What to do when the output file already exists with different content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// Refuse to replace a differing file.
    #[default]
    Refuse,
    Overwrite,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_headers_follow_input_names() {
        let schema = InputSchema {
            close: "Close".to_string(),
            ..InputSchema::default()
        };
        assert_eq!(schema.output_header("close"), "Close");
        assert_eq!(schema.output_header("buy_signal"), "BuySignal");
        assert_eq!(schema.output_header("open"), "open");
        assert_eq!(schema.output_header("sma_5"), "sma_5");
    }
}
