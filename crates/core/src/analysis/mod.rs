pub mod parse;
pub mod pipeline;
pub mod prompt;

use crate::domain::market::{HistoricalBar, NewsItem, StockSnapshot};
use anyhow::ensure;
use serde::{Deserialize, Serialize};

/// Request boundary for `/analyze`. Validated before any prompt string is
/// built from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub stock: StockSnapshot,
    #[serde(default)]
    pub historical_data: Vec<HistoricalBar>,
    #[serde(default)]
    pub news: Vec<NewsItem>,
}

/// Request boundary for `/report`. `symbol` may differ from the snapshot's
/// (the caller decides what heading the report carries).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    #[serde(default)]
    pub symbol: Option<String>,
    pub stock: StockSnapshot,
    #[serde(default)]
    pub historical_data: Vec<HistoricalBar>,
    #[serde(default)]
    pub news: Vec<NewsItem>,
}

impl AnalyzeRequest {
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_inputs(&self.stock, &self.historical_data)
    }
}

impl ReportRequest {
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_inputs(&self.stock, &self.historical_data)
    }

    pub fn symbol(&self) -> &str {
        self.symbol.as_deref().unwrap_or(&self.stock.symbol)
    }
}

fn validate_inputs(stock: &StockSnapshot, bars: &[HistoricalBar]) -> anyhow::Result<()> {
    ensure!(!stock.symbol.trim().is_empty(), "symbol must be non-empty");
    ensure!(
        stock.price.is_finite() && stock.price > 0.0,
        "price must be a positive finite number (got {})",
        stock.price
    );
    ensure!(
        stock.change_percent.is_finite(),
        "changePercent must be finite"
    );

    // An empty series would make the high/low range collapse to
    // -inf/+inf; reject it at the boundary instead.
    ensure!(
        !bars.is_empty(),
        "historicalData must contain at least one bar"
    );
    for (i, bar) in bars.iter().enumerate() {
        ensure!(
            bar.high.is_finite() && bar.low.is_finite() && bar.close.is_finite(),
            "historicalData[{i}] contains non-finite values"
        );
        ensure!(
            bar.high >= bar.low,
            "historicalData[{i}] has high < low ({} < {})",
            bar.high,
            bar.low
        );
    }

    Ok(())
}
