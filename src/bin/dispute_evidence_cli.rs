use std::{fs, path::Path, path::PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use stateset_disputes::{
    config::{self, EngineConfig},
    errors::ErrorResponse,
    evidence::validate_for_case,
    models::{DisputeCase, EvidencePackage},
    schema::{parse_requests, FieldType, KlarnaForm},
};
use tracing::debug;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let engine_config = config::load_config().unwrap_or_else(|err| {
        eprintln!("Falling back to default configuration: {}", err);
        EngineConfig::default()
    });
    config::init_tracing(engine_config.log_level(), engine_config.log_json);

    match cli.command {
        Commands::Schema { file } => handle_schema(&file, cli.json),
        Commands::Check {
            case_file,
            package_file,
        } => handle_check(&engine_config, &case_file, &package_file, cli.json),
    }
}

#[derive(Parser)]
#[command(
    name = "dispute-evidence-cli",
    about = "Inspect vendor requirement schemas and dry-run evidence validation",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a Klarna `requests_raw` document and print the resulting form
    Schema {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Validate an evidence package against a case
    Check {
        #[arg(value_name = "CASE_FILE")]
        case_file: PathBuf,
        #[arg(value_name = "PACKAGE_FILE")]
        package_file: PathBuf,
    },
}

#[derive(Serialize)]
struct Verdict {
    case_id: String,
    vendor: String,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorResponse>,
}

fn handle_schema(file: &Path, json: bool) -> Result<()> {
    let raw: Value = read_json(file)?;
    let schema = parse_requests(Some(&raw));
    debug!(requests = schema.requests.len(), "parsed requirement schema");
    let form = schema.seed_form();

    if json {
        return print_json(&form);
    }

    if form.requests.is_empty() {
        println!("No further information requested");
        return Ok(());
    }
    print_form(&form);
    Ok(())
}

fn handle_check(
    engine_config: &EngineConfig,
    case_file: &Path,
    package_file: &Path,
    json: bool,
) -> Result<()> {
    let case: DisputeCase = read_json(case_file)?;
    let package: EvidencePackage = read_json(package_file)?;

    let result = validate_for_case(&case, &package, engine_config.note_max_chars);
    let verdict = Verdict {
        case_id: case.case_id.to_string(),
        vendor: case.vendor.to_string(),
        valid: result.is_ok(),
        error: result.err().map(|err| err.to_response()),
    };

    if json {
        print_json(&verdict)?;
    } else {
        match &verdict.error {
            None => println!("Case {} ({}): ready to submit", verdict.case_id, verdict.vendor),
            Some(error) => println!(
                "Case {} ({}): not ready: {}",
                verdict.case_id, verdict.vendor, error.message
            ),
        }
    }

    if !verdict.valid {
        std::process::exit(1);
    }
    Ok(())
}

fn print_form(form: &KlarnaForm) {
    for request in &form.requests {
        println!("Request {}", request.request_id);
        for field in &request.fields {
            println!("  {:<40} {}", field.label, describe(field.field_type, &field.options));
        }
        if let Some(block) = &request.shipment_block {
            let mode = if block.multiple {
                "one or more shipments"
            } else {
                "one shipment"
            };
            println!("  Shipment details ({})", mode);
            if let Some(entry) = block.entries.first() {
                for field in entry {
                    println!("    {:<38} {}", field.label, describe(field.field_type, &field.options));
                }
            }
        }
    }
}

fn describe(field_type: FieldType, options: &[String]) -> String {
    match field_type {
        FieldType::Text => "text".to_string(),
        FieldType::TextArea => "long text".to_string(),
        FieldType::Date => "date".to_string(),
        FieldType::UploadFile => "file upload".to_string(),
        FieldType::DropDown => format!("one of: {}", options.join(", ")),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON")?;
    println!("{}", rendered);
    Ok(())
}
