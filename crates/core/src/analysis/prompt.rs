use crate::domain::analysis::TechnicalIndicators;
use crate::domain::market::{HistoricalBar, NewsItem, StockSnapshot};
use std::fmt::Write as _;

pub const SYSTEM_PERSONA: &str = "You are a professional financial analyst. \
Provide clear, evidence-based assessments. Do not give personalized investment advice.";

const MAX_HEADLINES: usize = 3;

/// High/low range over the trailing series. Callers validate non-emptiness
/// at the request boundary; this guards it again so the fold can never
/// produce infinities.
pub fn compute_indicators(bars: &[HistoricalBar]) -> anyhow::Result<TechnicalIndicators> {
    anyhow::ensure!(!bars.is_empty(), "historical series must be non-empty");

    let high = bars.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = bars.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    let range_percent = if low > 0.0 {
        (high - low) / low * 100.0
    } else {
        0.0
    };

    Ok(TechnicalIndicators {
        high_30d: high,
        low_30d: low,
        range_percent,
    })
}

pub fn analysis_prompt(
    stock: &StockSnapshot,
    indicators: &TechnicalIndicators,
    news: &[NewsItem],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Analyze the stock {} ({}).", stock.name, stock.symbol);
    let _ = writeln!(out);
    push_market_context(&mut out, stock, indicators, news);
    let _ = writeln!(out);
    let _ = writeln!(out, "Structure your reply as:");
    let _ = writeln!(out, "1. A short overall assessment.");
    let _ = writeln!(out, "2. Recommendation: BUY, HOLD, or SELL.");
    let _ = writeln!(out, "3. Target Price: $X.XX (12-month).");
    let _ = writeln!(out, "4. Risks: (bulleted list)");
    let _ = writeln!(out, "5. Opportunities: (bulleted list)");
    out
}

pub fn report_prompt(
    symbol: &str,
    stock: &StockSnapshot,
    indicators: &TechnicalIndicators,
    news: &[NewsItem],
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Write a long-form research report on {symbol} ({}).",
        stock.name
    );
    let _ = writeln!(out);
    push_market_context(&mut out, stock, indicators, news);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Cover business fundamentals, valuation, technical posture, \
         catalysts, and risk factors. Use section headings. Prose, not JSON."
    );
    out
}

fn push_market_context(
    out: &mut String,
    stock: &StockSnapshot,
    indicators: &TechnicalIndicators,
    news: &[NewsItem],
) {
    let _ = writeln!(out, "Current Price: ${:.2}", stock.price);
    let _ = writeln!(out, "Change: {:+.2}%", stock.change_percent);
    let _ = writeln!(out, "Market Cap: ${:.2}B", stock.market_cap / 1e9);
    match stock.pe {
        Some(pe) => {
            let _ = writeln!(out, "P/E Ratio: {pe:.1}");
        }
        None => {
            let _ = writeln!(out, "P/E Ratio: N/A");
        }
    }
    let _ = writeln!(out, "Volume: {:.0}", stock.volume);
    let _ = writeln!(
        out,
        "30-Day Range: ${:.2} - ${:.2}",
        indicators.low_30d, indicators.high_30d
    );

    if !news.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Recent headlines:");
        for item in news.iter().take(MAX_HEADLINES) {
            match item.source.as_deref() {
                Some(source) => {
                    let _ = writeln!(out, "- {} ({source})", item.title);
                }
                None => {
                    let _ = writeln!(out, "- {}", item.title);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_fixtures::*;

    #[test]
    fn indicators_span_the_series() {
        let ind = compute_indicators(&acme_bars()).unwrap();
        assert_eq!(ind.high_30d, 110.0);
        assert_eq!(ind.low_30d, 90.0);
        assert!((ind.range_percent - (20.0 / 90.0 * 100.0)).abs() < 1e-9);
    }

    #[test]
    fn indicators_reject_empty_series() {
        assert!(compute_indicators(&[]).is_err());
    }

    #[test]
    fn prompt_embeds_price_range_and_headlines() {
        let stock = acme_stock();
        let ind = compute_indicators(&acme_bars()).unwrap();
        let prompt = analysis_prompt(&stock, &ind, &acme_news());

        assert!(prompt.contains("Current Price: $100.00"));
        assert!(prompt.contains("Change: +2.50%"));
        assert!(prompt.contains("Market Cap: $5.00B"));
        assert!(prompt.contains("P/E Ratio: 15.0"));
        assert!(prompt.contains("30-Day Range: $90.00 - $110.00"));
        assert!(prompt.contains("- ACME beats earnings (Newswire)"));
        assert!(prompt.contains("Recommendation: BUY, HOLD, or SELL."));
    }

    #[test]
    fn prompt_caps_headlines_at_three() {
        let stock = acme_stock();
        let ind = compute_indicators(&acme_bars()).unwrap();
        let news: Vec<_> = (1..=5)
            .map(|i| crate::domain::market::NewsItem {
                title: format!("Headline {i}"),
                source: None,
            })
            .collect();
        let prompt = analysis_prompt(&stock, &ind, &news);
        assert!(prompt.contains("Headline 3"));
        assert!(!prompt.contains("Headline 4"));
    }

    #[test]
    fn missing_pe_is_rendered_as_na() {
        let mut stock = acme_stock();
        stock.pe = None;
        let ind = compute_indicators(&acme_bars()).unwrap();
        let prompt = analysis_prompt(&stock, &ind, &[]);
        assert!(prompt.contains("P/E Ratio: N/A"));
    }
}
