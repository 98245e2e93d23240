use crate::analysis::{parse, prompt, AnalyzeRequest, ReportRequest};
use crate::domain::analysis::AnalysisResult;
use crate::llm::{ChatClient, ChatMessage, ChatRequest};

const TEMPERATURE: f64 = 0.7;
const ANALYSIS_MAX_TOKENS: u32 = 1500;
const REPORT_MAX_TOKENS: u32 = 3000;

/// One analysis pass: prompt, single chat call, best-effort extraction.
/// LLM failures bubble with their [`crate::llm::error::LlmError`] intact so
/// callers can map timeouts separately; extraction never fails.
pub async fn analyze(
    client: &dyn ChatClient,
    req: &AnalyzeRequest,
) -> anyhow::Result<AnalysisResult> {
    req.validate()?;
    let indicators = prompt::compute_indicators(&req.historical_data)?;
    let user_prompt = prompt::analysis_prompt(&req.stock, &indicators, &req.news);

    let completion = client
        .chat(ChatRequest {
            messages: vec![
                ChatMessage::system(prompt::SYSTEM_PERSONA),
                ChatMessage::user(user_prompt),
            ],
            temperature: TEMPERATURE,
            max_tokens: ANALYSIS_MAX_TOKENS,
        })
        .await?;

    tracing::debug!(
        symbol = %req.stock.symbol,
        latency_ms = completion.latency_ms,
        tokens_used = ?completion.tokens_used,
        "analysis completion received"
    );

    let parsed = parse::parse_analysis(&completion.content);

    Ok(AnalysisResult {
        symbol: req.stock.symbol.clone(),
        analysis: completion.content,
        recommendation: parsed.recommendation,
        target_price: parsed.target_price,
        risks: parsed.risks,
        opportunities: parsed.opportunities,
        technical_indicators: indicators,
        generated_at: chrono::Utc::now(),
    })
}

/// Long-form report flow: same context, bigger token budget, no extraction.
pub async fn report(client: &dyn ChatClient, req: &ReportRequest) -> anyhow::Result<String> {
    req.validate()?;
    let indicators = prompt::compute_indicators(&req.historical_data)?;
    let user_prompt = prompt::report_prompt(req.symbol(), &req.stock, &indicators, &req.news);

    let completion = client
        .chat(ChatRequest {
            messages: vec![
                ChatMessage::system(prompt::SYSTEM_PERSONA),
                ChatMessage::user(user_prompt),
            ],
            temperature: TEMPERATURE,
            max_tokens: REPORT_MAX_TOKENS,
        })
        .await?;

    tracing::debug!(
        symbol = %req.symbol(),
        latency_ms = completion.latency_ms,
        "report completion received"
    );

    Ok(completion.content)
}
