use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use analyst_core::analysis::{pipeline, prompt, AnalyzeRequest, ReportRequest};
use analyst_core::llm::openai::OpenAiClient;

#[derive(Debug, Parser)]
#[command(name = "analyst_cli")]
struct Args {
    /// Path to a JSON file with {stock, historicalData, news}.
    #[arg(long)]
    input: std::path::PathBuf,

    /// Produce a long-form report instead of a structured analysis.
    #[arg(long)]
    report: bool,

    /// Print the constructed prompt and exit without any network call.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = analyst_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let raw = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let request: AnalyzeRequest =
        serde_json::from_str(&raw).context("input is not a valid analyze request")?;
    request.validate()?;

    if args.dry_run {
        let indicators = prompt::compute_indicators(&request.historical_data)?;
        let text = if args.report {
            prompt::report_prompt(
                &request.stock.symbol,
                &request.stock,
                &indicators,
                &request.news,
            )
        } else {
            prompt::analysis_prompt(&request.stock, &indicators, &request.news)
        };
        println!("{text}");
        return Ok(());
    }

    let llm = OpenAiClient::from_settings(&settings)?;

    if args.report {
        let report_request = ReportRequest {
            symbol: Some(request.stock.symbol.clone()),
            stock: request.stock,
            historical_data: request.historical_data,
            news: request.news,
        };
        let report = pipeline::report(&llm, &report_request).await;
        match report {
            Ok(text) => println!("{text}"),
            Err(err) => {
                sentry_anyhow::capture_anyhow(&err);
                return Err(err);
            }
        }
        return Ok(());
    }

    let result = match pipeline::analyze(&llm, &request).await {
        Ok(result) => result,
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            return Err(err);
        }
    };

    println!("{}", serde_json::to_string_pretty(&result)?);

    // Persist when a database is configured; a one-shot run without one is
    // still useful, so this only warns.
    match settings.require_database_url() {
        Ok(db_url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(2)
                .connect(db_url)
                .await
                .context("connect DATABASE_URL failed")?;
            analyst_core::storage::migrate(&pool).await?;
            let id = analyst_core::storage::analyses::persist(&pool, &result).await?;
            tracing::info!(symbol = %result.symbol, %id, "persisted analysis snapshot");
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; skipping persistence");
        }
    }

    Ok(())
}

fn init_sentry(settings: &analyst_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
