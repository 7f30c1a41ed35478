//! Command-line interface for analyst-graph
//!
//! # Usage
//!
//! ```bash
//! export OPENAI_API_KEY="sk-..."
//! export TUSHARE_TOKEN="..."        # optional, selects the streamable HTTP tool transport
//!
//! analyst-cli 600519.SH
//! analyst-cli --analysts news,technical --start 2025-01-01 --end 2025-03-31 AAPL
//! analyst-cli --print-graph
//! ```

use analyst_core::{NodeId, OutputField, ResultRecord, Subject, resolve};
use analyst_graph::{AnalysisPipeline, LlmTask, TaskServices, build};
use analyst_llm::OpenAiRunner;
use analyst_mcp::{McpToolCatalog, TransportConfig};
use analyst_prompt::TemplatePromptProvider;
use analyst_utils::AppConfig;
use anyhow::{Context, bail};
use chrono::{Days, NaiveDate};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default analysis window when `--start` is omitted
const DEFAULT_WINDOW_DAYS: u64 = 30;

#[derive(Parser, Debug)]
#[command(name = "analyst-cli", version)]
#[command(about = "Run the multi-analyst stock analysis pipeline", long_about = None)]
struct Args {
    /// Security code, e.g. 600519.SH or AAPL
    #[arg(required_unless_present = "print_graph")]
    stock_code: Option<String>,

    /// Configuration file (defaults to ./conf.yaml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Comma-separated analysts to run, overriding the configuration
    #[arg(short, long, value_delimiter = ',')]
    analysts: Option<Vec<String>>,

    /// First day of the analysis window (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last day of the analysis window (YYYY-MM-DD), defaults to today
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Print the pipeline graph as a Mermaid flowchart and exit
    #[arg(long)]
    print_graph: bool,

    /// Print the final record as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.verbose {
        analyst_utils::init_tracing_with_default("debug");
    } else {
        analyst_utils::init_tracing();
    }

    let config = AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    let selection = args.analysts.as_deref().or(config.analyst_selection());

    if args.print_graph {
        let graph = build(&resolve(selection)?);
        print!("{}", graph.to_mermaid());
        return Ok(());
    }

    let Some(code) = args.stock_code.clone() else {
        bail!("a stock code is required");
    };
    let (start, end) = date_window(args.start, args.end, chrono::Local::now().date_naive());
    let subject = Subject::new(code, start, end);

    let transport = TransportConfig::from_env(&config.tool_service);
    info!(transport = transport.kind(), url = transport.url(), "Tool service selected");

    let services = TaskServices::new(
        Arc::new(OpenAiRunner::from_config(&config)?),
        Arc::new(McpToolCatalog::new(transport)?),
        Arc::new(TemplatePromptProvider::new(config.locale.clone())),
    );
    let pipeline = AnalysisPipeline::new(selection, LlmTask::table(&services))?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            on_interrupt.cancel();
        }
    });

    let record = pipeline.invoke_with_cancellation(subject, cancel).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print!("{}", render_text(&record));
    }

    Ok(())
}

/// Resolve the analysis window; `end` defaults to `today`, `start` to 30 days before `end`
fn date_window(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
) -> (NaiveDate, NaiveDate) {
    let end = end.unwrap_or(today);
    let start = start.unwrap_or_else(|| {
        end.checked_sub_days(Days::new(DEFAULT_WINDOW_DAYS))
            .unwrap_or(NaiveDate::MIN)
    });
    (start, end)
}

fn section_title(field: OutputField) -> &'static str {
    match field {
        OutputField::NewsAnalysis => "News Analysis",
        OutputField::TechnicalAnalysis => "Technical Analysis",
        OutputField::FundamentalsAnalysis => "Fundamental Analysis",
        OutputField::GrowthAnalysis => "Growth Analysis",
        OutputField::ValuationAnalysis => "Valuation Analysis",
        OutputField::RiskAnalysis => "Risk Analysis",
        OutputField::PortfolioRecommendation => "Portfolio Recommendation",
    }
}

/// Human-readable report of a finished record
fn render_text(record: &ResultRecord) -> String {
    let subject = record.subject();
    let mut out = format!(
        "Stock: {}\nPeriod: {} to {}\n",
        subject.code, subject.start_date, subject.end_date
    );
    for id in NodeId::ALL {
        if let Some(text) = record.output_of(id) {
            let title = section_title(id.field());
            out.push_str(&format!("\n## {title}\n\n{}\n", text.trim_end()));
        }
    }
    out
}
