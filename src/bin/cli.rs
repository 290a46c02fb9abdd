use std::io::Read;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;

use editor_relay::error::RelayError;
use editor_relay::paths;
use editor_relay::pipeline::{PipelineRunReport, PipelineStep};
use editor_relay::relay::Relay;
use editor_relay::settings::{self, SettingsOverrides};

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "editor-relay-cli",
    about = "Discover and invoke editor operations",
    version,
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config directory override
    #[arg(long, global = true, env = "EDITOR_RELAY_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Editor host command endpoint
    #[arg(long, global = true)]
    host_url: Option<String>,

    /// Host call timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Maximum steps per pipeline
    #[arg(long, global = true)]
    max_steps: Option<usize>,

    /// Output raw JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List operation categories
    Categories,
    /// List operations (names only) in one or more categories
    List {
        #[arg(required = true)]
        categories: Vec<String>,
    },
    /// Show full parameter schemas for named operations
    Describe {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Tiered help: categories, a category's operations, or one operation
    Help { topic: Option<String> },
    /// Invoke one operation on the host
    Invoke {
        name: String,
        /// Parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },
    /// Run a pipeline from a JSON file (`-` for stdin)
    Pipeline { file: String },
    /// Show the operations a category would make directly callable
    Activate { category: String },
    /// Print the agent tool list
    Tools,
}

// ── Input helpers ────────────────────────────────────────────────

fn parse_params(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("--params is not valid JSON: {e}"))
}

/// A pipeline file is either a bare array of steps or `{ "steps": [...] }`.
fn read_pipeline(file: &str) -> Result<Vec<PipelineStep>, String> {
    let text = if file == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("Failed to read stdin: {e}"))?;
        buf
    } else {
        std::fs::read_to_string(file).map_err(|e| format!("Failed to read {file}: {e}"))?
    };

    let value: Value = serde_json::from_str(&text).map_err(|e| format!("{file}: {e}"))?;
    let steps = match value {
        Value::Object(mut map) => map.remove("steps").unwrap_or(Value::Null),
        other => other,
    };
    serde_json::from_value(steps).map_err(|e| format!("{file}: invalid steps: {e}"))
}

fn settings_overrides(cli: &Cli) -> SettingsOverrides {
    SettingsOverrides {
        host_url: cli.host_url.clone(),
        timeout_secs: cli.timeout,
        max_pipeline_steps: cli.max_steps,
        ..SettingsOverrides::default()
    }
}

// ── Output formatting ────────────────────────────────────────────

fn print_json<T: Serialize>(value: &T) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

fn print_value(value: &Value, raw_json: bool) {
    match value {
        Value::String(s) if !raw_json => println!("{s}"),
        other => print_json(other),
    }
}

fn print_report(report: &PipelineRunReport) {
    for step in &report.steps {
        let status = if step.success { "ok" } else { "FAILED" };
        println!("[{status}] {} ({}) {}ms", step.id, step.operation, step.duration_ms);
        if let Some(result) = &step.result {
            println!("  {}", serde_json::to_string(result).unwrap_or_default());
        }
        if let Some(error) = &step.error {
            println!("  {:?}: {}", error.code, error.message);
        }
    }
    println!(
        "{}/{} steps completed in {}ms",
        report.completed_steps, report.total_steps, report.duration_ms
    );
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {message}");
    process::exit(1);
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    editor_relay::logging::init(cli.verbose);

    let config_dir = cli.config_dir.clone().unwrap_or_else(paths::default_config_dir);
    let overrides = settings_overrides(&cli);
    let settings = settings::resolve_settings(&config_dir, &overrides).unwrap_or_else(|e| fail(e));
    let relay = Relay::from_settings(&settings, &config_dir);
    let raw = cli.json;

    match cli.command {
        Commands::Categories => {
            let categories = relay.categories();
            if raw {
                print_json(&categories);
            } else {
                for c in &categories {
                    println!("{:<12} {:>3}  {}", c.name, c.operation_count, c.description);
                }
            }
        }
        Commands::List { categories } => {
            let operations = relay.list_operations(&categories);
            if raw {
                print_json(&operations);
            } else if operations.is_empty() {
                println!("No operations in {}", categories.join(", "));
            } else {
                for op in &operations {
                    println!("{:<10} {:<20} {}", op.category, op.name, op.description);
                }
            }
        }
        Commands::Describe { names } => {
            let described = relay.describe_operations(&names);
            if raw {
                print_json(&described);
            } else {
                for op in &described.operations {
                    println!("{}", relay.help(Some(&op.name)));
                    println!();
                }
                if !described.missing.is_empty() {
                    eprintln!("Unknown: {}", described.missing.join(", "));
                }
            }
        }
        Commands::Help { topic } => println!("{}", relay.help(topic.as_deref())),
        Commands::Invoke { name, params } => {
            let params = parse_params(&params).unwrap_or_else(|e| fail(e));
            match relay.invoke(&name, params).await {
                Ok(result) => print_value(&result, raw),
                Err(e) => report_error(&e, raw),
            }
        }
        Commands::Pipeline { file } => {
            let steps = read_pipeline(&file).unwrap_or_else(|e| fail(e));
            match relay.run_pipeline(steps).await {
                Ok(report) => {
                    if raw {
                        print_json(&report);
                    } else {
                        print_report(&report);
                    }
                    if !report.success {
                        process::exit(1);
                    }
                }
                Err(e) => report_error(&e, raw),
            }
        }
        Commands::Activate { category } => match relay.activate_category(&category) {
            Ok(activation) => {
                if raw {
                    print_json(&activation);
                } else {
                    println!("{}: {}", activation.category, activation.newly_activated.join(", "));
                }
            }
            Err(e) => report_error(&e, raw),
        },
        Commands::Tools => print_json(&relay.tools()),
    }
}

fn report_error(error: &RelayError, raw: bool) -> ! {
    if raw {
        print_json(&serde_json::json!({ "ok": false, "error": error }));
        process::exit(1);
    }
    fail(error)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_read_pipeline_accepts_both_shapes() {
        let dir = std::env::temp_dir().join("editor_relay_cli_pipeline");
        std::fs::create_dir_all(&dir).unwrap();

        let wrapped = dir.join("wrapped.json");
        std::fs::write(
            &wrapped,
            r#"{ "steps": [ { "id": "c", "operationName": "create_cube", "staticParams": { "size": 2 } } ] }"#,
        )
        .unwrap();
        let steps = read_pipeline(wrapped.to_str().unwrap()).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].id.as_deref(), Some("c"));

        let bare = dir.join("bare.json");
        std::fs::write(&bare, r#"[ { "operation": "get_scene_info" } ]"#).unwrap();
        let steps = read_pipeline(bare.to_str().unwrap()).unwrap();
        assert_eq!(steps[0].operation_name, "get_scene_info");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_parse_params_rejects_bad_json() {
        assert!(parse_params("{ size: 2 }").is_err());
        assert_eq!(parse_params(r#"{ "size": 2 }"#).unwrap()["size"], 2);
    }

    #[test]
    fn test_cli_parses_invoke() {
        let cli = Cli::try_parse_from([
            "editor-relay-cli",
            "--json",
            "invoke",
            "create_cube",
            "--params",
            r#"{"size":1}"#,
        ])
        .unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Invoke { ref name, .. } if name == "create_cube"));
    }

    #[test]
    fn test_cli_parses_max_steps_after_subcommand() {
        let cli = Cli::try_parse_from(["editor-relay-cli", "pipeline", "steps.json", "--max-steps", "5"])
            .unwrap();
        assert_eq!(settings_overrides(&cli).max_pipeline_steps, Some(5));
        assert!(matches!(cli.command, Commands::Pipeline { ref file } if file == "steps.json"));

        let cli = Cli::try_parse_from(["editor-relay-cli", "tools"]).unwrap();
        assert_eq!(cli.max_steps, None);
    }
}
