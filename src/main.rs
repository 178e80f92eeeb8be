// ███████╗██╗     ███████╗██╗   ██╗████████╗██╗  ██╗
// ██╔════╝██║     ██╔════╝██║   ██║╚══██╔══╝██║  ██║
// ███████╗██║     █████╗  ██║   ██║   ██║   ███████║
// ╚════██║██║     ██╔══╝  ██║   ██║   ██║   ██╔══██║
// ███████║███████╗███████╗╚██████╔╝   ██║   ██║  ██║
// ╚══════╝╚══════╝╚══════╝ ╚═════╝    ╚═╝   ╚═╝  ╚═╝
//
// E C O U R T S   E D I T I O N
//
// A litigation-history engine for insurance claim review.
// Rust + Tokio + reqwest + scraper + OCR + a circuit breaker
// All to find out whether a claimant sues people for a living.

mod circuit_breaker;
mod classifier;
mod cli;
mod config;
mod cross_reference;
mod error;
mod history;
mod markers;
mod metrics;
mod models;
mod ocr;
mod portal;

use std::sync::Arc;

use anyhow::{bail, Context};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{error, info, info_span, warn, Instrument};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use crate::circuit_breaker::CircuitBreaker;
use crate::classifier::{classify_claim, ChatCompletionsClient, ClaimSubmission};
use crate::cli::Command;
use crate::config::Config;
use crate::cross_reference::{cross_reference, JsonCaseStore};
use crate::history::lookup_history;
use crate::metrics::RunMetrics;
use crate::models::{HistoryReport, QueryRequest};
use crate::ocr::{OcrEngine, TesseractCli};
use crate::portal::captcha::{CaptchaSolver, FixedChallenge};
use crate::portal::client::EcourtsPortal;
use crate::portal::judgments::read_listing;
use crate::portal::submitter::QuerySubmitter;

fn print_banner() {
    let banner = r#"
    ╔══════════════════════════════════════════════════════════════╗
    ║                                                              ║
    ║   ███████╗██╗     ███████╗██╗   ██╗████████╗██╗  ██╗         ║
    ║   ██╔════╝██║     ██╔════╝██║   ██║╚══██╔══╝██║  ██║         ║
    ║   ███████╗██║     █████╗  ██║   ██║   ██║   ███████║         ║
    ║   ╚════██║██║     ██╔══╝  ██║   ██║   ██║   ██╔══██║         ║
    ║   ███████║███████╗███████╗╚██████╔╝   ██║   ██║  ██║         ║
    ║   ╚══════╝╚══════╝╚══════╝ ╚═════╝    ╚═╝   ╚═╝  ╚═╝         ║
    ║                                                              ║
    ║        ⚖  E-COURTS LITIGATION HISTORY ENGINE  ⚖              ║
    ║                                                              ║
    ║   Session:  PHPSESSID + JSESSION + app_token, per run        ║
    ║   CAPTCHA:  OCR, five tries, then honest failure             ║
    ║   Retries:  exactly one session refresh, never more          ║
    ║                                                              ║
    ║   "Everyone is innocent until the docket says otherwise."    ║
    ║                                                              ║
    ╚══════════════════════════════════════════════════════════════╝
    "#;
    // stdout is reserved for results.
    eprintln!("{banner}");
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_current_span(true)
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    }
}

/// What one lookup run sends back to the printer.
struct RunOutcome {
    run_id: Uuid,
    party: String,
    result: Result<HistoryReport, String>,
}

#[derive(Serialize)]
struct FailedLookup<'a> {
    party: &'a str,
    error: &'a str,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::from_env());
    init_tracing(config.log_json);

    let command = cli::parse_args();
    print_banner();

    match command {
        Command::History { queries } => run_history(config, queries).await,
        Command::CrossRef {
            petitioner,
            advocate,
            store,
        } => {
            let path = store.unwrap_or_else(|| config.case_store_path.clone());
            let store = JsonCaseStore::from_path(&path)
                .with_context(|| format!("failed to load case store {}", path.display()))?;
            let result = cross_reference(&store, petitioner.as_deref(), advocate.as_deref());
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Classify { claim } => {
            let raw = std::fs::read_to_string(&claim)
                .with_context(|| format!("failed to read claim {}", claim.display()))?;
            let submission: ClaimSubmission =
                serde_json::from_str(&raw).context("claim file is not a valid claim JSON object")?;

            let llm = ChatCompletionsClient::from_config(&config).context("failed to build the LLM client")?;
            let verdict = classify_claim(&llm, &submission).await.context("classification failed")?;

            let flagged = verdict.is_flagged();
            if flagged {
                warn!(claimant = %submission.full_name, "Claim flagged as potential fraud");
            }
            println!(
                "{}",
                serde_json::json!({
                    "prediction": verdict.prediction,
                    "reasoning": verdict.reasoning,
                    "probability_score": verdict.probability_score,
                    "flagged": flagged,
                })
            );
            Ok(())
        }
        Command::SolveCaptcha { image, arithmetic } => {
            let bytes = std::fs::read(&image).with_context(|| format!("failed to read {}", image.display()))?;
            let ocr = TesseractCli::new(config.tesseract_bin.as_str());
            let metrics = RunMetrics::new();
            let solver = CaptchaSolver::new(&ocr, config.captcha_max_attempts, &metrics);
            let mut source = FixedChallenge(bytes);

            let answer = if arithmetic {
                solver.solve_arithmetic(&mut source).await?.to_string()
            } else {
                solver.solve_text(&mut source).await?
            };
            println!("{answer}");
            Ok(())
        }
        Command::Judgments { page } => {
            let html = std::fs::read_to_string(&page)
                .with_context(|| format!("failed to read {}", page.display()))?;
            match read_listing(&html) {
                Ok(tallies) => {
                    info!(records = tallies.len(), "Judgment listing parsed");
                    for tally in &tallies {
                        println!("{}", serde_json::to_string(tally)?);
                    }
                    Ok(())
                }
                Err(rejection) => bail!("judgment search refused the page: {rejection:?}"),
            }
        }
    }
}

// ═══════════════════════════════════════════
// PARALLEL LOOKUPS
// ═══════════════════════════════════════════
//
// One tokio task per party. Each task owns its own Session from start to
// finish; only the HTTP client, the breaker and the counters are shared.
// The semaphore caps how many runs hit the portal at once, and every run is
// wrapped in the external timeout.
async fn run_history(config: Arc<Config>, queries: Vec<QueryRequest>) -> anyhow::Result<()> {
    let total = queries.len();
    let metrics = Arc::new(RunMetrics::new());
    let breaker = Arc::new(CircuitBreaker::new(
        "ecourts-portal",
        config.circuit_breaker_failure_threshold,
        config.circuit_breaker_reset_timeout,
        config.circuit_breaker_success_threshold,
    ));
    let portal = Arc::new(EcourtsPortal::new(&config, breaker.clone()).context("failed to build the portal client")?);
    let ocr: Arc<dyn OcrEngine> = Arc::new(TesseractCli::new(config.tesseract_bin.as_str()));
    let limiter = Arc::new(Semaphore::new(config.max_parallel_runs.max(1)));
    let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded::<RunOutcome>();

    info!(parties = total, max_parallel = config.max_parallel_runs, "Spawning lookup runs");

    let handles: Vec<_> = queries
        .into_iter()
        .map(|query| {
            let config = config.clone();
            let metrics = metrics.clone();
            let portal = portal.clone();
            let ocr = ocr.clone();
            let limiter = limiter.clone();
            let outcome_tx = outcome_tx.clone();

            tokio::spawn(async move {
                let Ok(_permit) = limiter.acquire_owned().await else {
                    return;
                };

                let run_id = Uuid::new_v4();
                let span = info_span!("lookup", %run_id, party = %query.party_name);

                let result = async {
                    let solver = CaptchaSolver::new(ocr.as_ref(), config.captcha_max_attempts, &metrics);
                    let submitter = QuerySubmitter::new(portal.as_ref(), solver, &metrics);

                    match tokio::time::timeout(config.run_timeout, lookup_history(&submitter, &query, &metrics)).await {
                        Ok(Ok(report)) => Ok(report),
                        Ok(Err(e)) => {
                            error!(kind = e.kind(), error = %e, "Lookup failed");
                            Err(e.to_string())
                        }
                        Err(_) => {
                            error!(timeout_secs = config.run_timeout.as_secs(), "Lookup timed out");
                            Err(format!("lookup exceeded {}s", config.run_timeout.as_secs()))
                        }
                    }
                }
                .instrument(span)
                .await;

                metrics.record_run(result.is_ok());
                let _ = outcome_tx.send(RunOutcome {
                    run_id,
                    party: query.party_name,
                    result,
                });
            })
        })
        .collect();

    // Only the tasks hold senders now.
    drop(outcome_tx);

    for joined in join_all(handles).await {
        if let Err(e) = joined {
            error!(error = %e, "Lookup task panicked");
        }
    }

    let mut failures = 0;
    while let Ok(outcome) = outcome_rx.try_recv() {
        let line = match &outcome.result {
            Ok(report) => serde_json::to_string(report)?,
            Err(message) => {
                failures += 1;
                serde_json::to_string(&FailedLookup {
                    party: &outcome.party,
                    error: message,
                })?
            }
        };
        info!(run_id = %outcome.run_id, party = %outcome.party, ok = outcome.result.is_ok(), "Run reported");
        println!("{line}");
    }

    info!(
        metrics = %serde_json::to_string(&metrics.snapshot())?,
        breaker = %breaker.state(),
        breaker_trips = breaker.total_trips(),
        "All lookups finished"
    );

    if failures > 0 {
        bail!("{failures} of {total} lookups failed");
    }
    Ok(())
}
