//! Best-effort extraction of structured fields from a free-text analyst
//! reply. Extraction never fails: anything the patterns miss falls back to
//! the fixed defaults below, and the raw text is always preserved alongside.

use crate::domain::analysis::Recommendation;
use regex::Regex;
use std::sync::OnceLock;

const MAX_BULLETS: usize = 3;

pub const DEFAULT_RISKS: [&str; 3] = ["Market volatility", "Regulatory changes", "Competition"];
pub const DEFAULT_OPPORTUNITIES: [&str; 3] =
    ["Market expansion", "Innovation", "Strategic partnerships"];

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAnalysis {
    pub recommendation: Recommendation,
    pub target_price: Option<f64>,
    pub risks: Vec<String>,
    pub opportunities: Vec<String>,
}

pub fn parse_analysis(text: &str) -> ParsedAnalysis {
    ParsedAnalysis {
        recommendation: extract_recommendation(text),
        target_price: extract_target_price(text),
        risks: extract_bullets_or_default(text, "risks", &DEFAULT_RISKS),
        opportunities: extract_bullets_or_default(text, "opportunities", &DEFAULT_OPPORTUNITIES),
    }
}

fn recommendation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(buy|hold|sell)\b").expect("valid regex"))
}

/// First standalone BUY/HOLD/SELL token, case-insensitive. No token means
/// `hold`.
pub fn extract_recommendation(text: &str) -> Recommendation {
    let Some(m) = recommendation_re().captures(text) else {
        return Recommendation::Hold;
    };
    match m[1].to_ascii_lowercase().as_str() {
        "buy" => Recommendation::Buy,
        "sell" => Recommendation::Sell,
        _ => Recommendation::Hold,
    }
}

fn target_price_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)target\s+price[^\n$]*\$\s*([0-9][0-9,]*(?:\.[0-9]+)?)")
            .expect("valid regex")
    })
}

/// `Target Price: $123.45` style pattern. Absent or unparseable means
/// `None`, never an error.
pub fn extract_target_price(text: &str) -> Option<f64> {
    let caps = target_price_re().captures(text)?;
    caps[1].replace(',', "").parse::<f64>().ok()
}

fn bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:[-•*]|\d+[.)])\s+(.+)$").expect("valid regex"))
}

fn extract_bullets_or_default(text: &str, heading: &str, defaults: &[&str; 3]) -> Vec<String> {
    let bullets = section_bullets(text, heading);
    if bullets.is_empty() {
        defaults.iter().map(|s| s.to_string()).collect()
    } else {
        bullets
    }
}

/// Bullet lines under the named heading, up to the next heading, capped at
/// [`MAX_BULLETS`]. Leading markers (`-`, `•`, `*`, `1.`) are stripped.
pub fn section_bullets(text: &str, heading: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut in_section = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if !in_section {
            if is_heading_for(trimmed, heading) {
                in_section = true;
            }
            continue;
        }

        if let Some(caps) = bullet_re().captures(trimmed) {
            out.push(caps[1].trim().to_string());
            if out.len() == MAX_BULLETS {
                break;
            }
        } else if looks_like_heading(trimmed) {
            break;
        }
    }

    out
}

fn is_heading_for(line: &str, heading: &str) -> bool {
    // Tolerate "Risks:", "4. Risks", "## Key Risks" and similar framings,
    // but not prose sentences that merely mention the word.
    let stripped = line
        .trim_start_matches(|c: char| {
            c.is_ascii_digit() || matches!(c, '#' | '*' | '.' | ')' | ' ')
        })
        .trim_end_matches(|c: char| matches!(c, ':' | '*' | ' '));

    let heading_like = line.trim_end_matches('*').ends_with(':')
        || stripped.split_whitespace().count() <= 3;
    heading_like
        && stripped
            .to_ascii_lowercase()
            .split_whitespace()
            .any(|w| w == heading)
}

fn looks_like_heading(line: &str) -> bool {
    if line.is_empty() {
        return false;
    }
    line.starts_with('#') || line.trim_end_matches('*').ends_with(':')
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
ACME looks fairly valued after the earnings beat.

Recommendation: SELL
Target Price: $142.50

Risks:
- Margin compression
- Customer concentration
• FX exposure
- Litigation overhang
- Key person dependency

Opportunities:
1. New product line
2) International expansion

Conclusion: position sizing matters.
";

    #[test]
    fn extracts_recommendation_token() {
        assert_eq!(extract_recommendation(SAMPLE), Recommendation::Sell);
        assert_eq!(
            extract_recommendation("we suggest you BUY the dip"),
            Recommendation::Buy
        );
    }

    #[test]
    fn missing_recommendation_defaults_to_hold() {
        assert_eq!(
            extract_recommendation("no stance taken here"),
            Recommendation::Hold
        );
    }

    #[test]
    fn extracts_target_price() {
        assert_eq!(extract_target_price(SAMPLE), Some(142.5));
        assert_eq!(
            extract_target_price("Target Price: $1,250.00 over 12 months"),
            Some(1250.0)
        );
    }

    #[test]
    fn missing_target_price_is_none() {
        assert_eq!(extract_target_price("no numbers here"), None);
        assert_eq!(extract_target_price("price target unclear"), None);
    }

    #[test]
    fn risks_capped_at_three_with_markers_stripped() {
        let risks = section_bullets(SAMPLE, "risks");
        assert_eq!(
            risks,
            vec![
                "Margin compression".to_string(),
                "Customer concentration".to_string(),
                "FX exposure".to_string(),
            ]
        );
    }

    #[test]
    fn numbered_bullets_are_recognized() {
        let opportunities = section_bullets(SAMPLE, "opportunities");
        assert_eq!(
            opportunities,
            vec![
                "New product line".to_string(),
                "International expansion".to_string(),
            ]
        );
    }

    #[test]
    fn section_stops_at_next_heading() {
        let text = "\
Risks:
- Only risk

Opportunities:
- Not a risk
";
        assert_eq!(section_bullets(text, "risks"), vec!["Only risk".to_string()]);
    }

    #[test]
    fn absent_section_yields_fixed_defaults() {
        let parsed = parse_analysis("nothing structured at all");
        assert_eq!(
            parsed.risks,
            DEFAULT_RISKS.map(String::from).to_vec()
        );
        assert_eq!(
            parsed.opportunities,
            DEFAULT_OPPORTUNITIES.map(String::from).to_vec()
        );
        assert_eq!(parsed.recommendation, Recommendation::Hold);
        assert_eq!(parsed.target_price, None);
    }

    #[test]
    fn markdown_styled_headings_are_matched() {
        let text = "\
## Key Risks
* rate shock

## Opportunities
* buybacks
";
        assert_eq!(section_bullets(text, "risks"), vec!["rate shock".to_string()]);
        assert_eq!(
            section_bullets(text, "opportunities"),
            vec!["buybacks".to_string()]
        );
    }

    #[test]
    fn parse_is_deterministic() {
        assert_eq!(parse_analysis(SAMPLE), parse_analysis(SAMPLE));
    }
}
