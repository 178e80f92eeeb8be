use std::path::PathBuf;

use crate::models::{CaseStatus, QueryRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// One party-name lookup per query, each in its own session.
    History { queries: Vec<QueryRequest> },
    CrossRef {
        petitioner: Option<String>,
        advocate: Option<String>,
        store: Option<PathBuf>,
    },
    Classify { claim: PathBuf },
    SolveCaptcha { image: PathBuf, arithmetic: bool },
    /// Parse a saved judgment-search listing page.
    Judgments { page: PathBuf },
}

enum ParseOutcome {
    Command(Command),
    Help,
}

fn usage() {
    eprintln!(
        "usage:
  ecourts_sleuth history --name <party> [--name <party> ...] --year <yyyy>
                         --state <code> --district <code> --complex <code>
                         [--status pending|disposed|both]
  ecourts_sleuth cross-ref [--petitioner <name>] [--advocate <name>] [--store <path>]
  ecourts_sleuth classify --claim <path.json>
  ecourts_sleuth solve-captcha --image <path> [--arithmetic]
  ecourts_sleuth judgments --page <path.html>
"
    );
}

fn value_for(flag: &str, args: &mut impl Iterator<Item = String>) -> Result<String, String> {
    args.next()
        .filter(|v| !v.starts_with("--"))
        .ok_or_else(|| format!("{flag} requires a value"))
}

fn required<T>(value: Option<T>, flag: &str) -> Result<T, String> {
    value.ok_or_else(|| format!("{flag} is required"))
}

fn parse_history(mut args: impl Iterator<Item = String>) -> Result<ParseOutcome, String> {
    let mut names = Vec::new();
    let mut year = None;
    let mut state = None;
    let mut district = None;
    let mut complex = None;
    let mut status = CaseStatus::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--name" => names.push(value_for("--name", &mut args)?),
            "--year" => {
                let raw = value_for("--year", &mut args)?;
                year = Some(
                    raw.parse::<u16>()
                        .map_err(|_| format!("--year expects a year, got {raw:?}"))?,
                );
            }
            "--state" => state = Some(value_for("--state", &mut args)?),
            "--district" => district = Some(value_for("--district", &mut args)?),
            "--complex" => complex = Some(value_for("--complex", &mut args)?),
            "--status" => status = value_for("--status", &mut args)?.parse()?,
            "-h" | "--help" => return Ok(ParseOutcome::Help),
            other => return Err(format!("unknown history argument {other:?}")),
        }
    }

    if names.is_empty() {
        return Err("--name is required".to_string());
    }
    let registration_year = required(year, "--year")?;
    let state_code = required(state, "--state")?;
    let district_code = required(district, "--district")?;
    let court_complex_code = required(complex, "--complex")?;

    let queries = names
        .into_iter()
        .map(|party_name| QueryRequest {
            party_name,
            registration_year,
            case_status: status,
            state_code: state_code.clone(),
            district_code: district_code.clone(),
            court_complex_code: court_complex_code.clone(),
        })
        .collect();

    Ok(ParseOutcome::Command(Command::History { queries }))
}

fn parse_cross_ref(mut args: impl Iterator<Item = String>) -> Result<ParseOutcome, String> {
    let mut petitioner = None;
    let mut advocate = None;
    let mut store = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--petitioner" => petitioner = Some(value_for("--petitioner", &mut args)?),
            "--advocate" => advocate = Some(value_for("--advocate", &mut args)?),
            "--store" => store = Some(PathBuf::from(value_for("--store", &mut args)?)),
            "-h" | "--help" => return Ok(ParseOutcome::Help),
            other => return Err(format!("unknown cross-ref argument {other:?}")),
        }
    }

    if petitioner.is_none() && advocate.is_none() {
        return Err("cross-ref needs --petitioner, --advocate, or both".to_string());
    }

    Ok(ParseOutcome::Command(Command::CrossRef {
        petitioner,
        advocate,
        store,
    }))
}

fn parse_args_impl(mut args: impl Iterator<Item = String>) -> Result<ParseOutcome, String> {
    let Some(command) = args.next() else {
        return Err("missing command".to_string());
    };

    match command.as_str() {
        "history" => parse_history(args),
        "cross-ref" => parse_cross_ref(args),
        "classify" => {
            let mut claim = None;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--claim" => claim = Some(PathBuf::from(value_for("--claim", &mut args)?)),
                    "-h" | "--help" => return Ok(ParseOutcome::Help),
                    other => return Err(format!("unknown classify argument {other:?}")),
                }
            }
            Ok(ParseOutcome::Command(Command::Classify {
                claim: required(claim, "--claim")?,
            }))
        }
        "solve-captcha" => {
            let mut image = None;
            let mut arithmetic = false;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--image" => image = Some(PathBuf::from(value_for("--image", &mut args)?)),
                    "--arithmetic" => arithmetic = true,
                    "-h" | "--help" => return Ok(ParseOutcome::Help),
                    other => return Err(format!("unknown solve-captcha argument {other:?}")),
                }
            }
            Ok(ParseOutcome::Command(Command::SolveCaptcha {
                image: required(image, "--image")?,
                arithmetic,
            }))
        }
        "judgments" => {
            let mut page = None;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--page" => page = Some(PathBuf::from(value_for("--page", &mut args)?)),
                    "-h" | "--help" => return Ok(ParseOutcome::Help),
                    other => return Err(format!("unknown judgments argument {other:?}")),
                }
            }
            Ok(ParseOutcome::Command(Command::Judgments {
                page: required(page, "--page")?,
            }))
        }
        "-h" | "--help" | "help" => Ok(ParseOutcome::Help),
        other => Err(format!("unknown command {other:?}")),
    }
}

pub fn parse_args() -> Command {
    match parse_args_impl(std::env::args().skip(1)) {
        Ok(ParseOutcome::Command(command)) => command,
        Ok(ParseOutcome::Help) => {
            usage();
            std::process::exit(0);
        }
        Err(error) => {
            eprintln!("error: {error}");
            usage();
            std::process::exit(2);
        }
    }
}
