use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Deserialize;

use sigmaspl_convert::ConversionProfile;
use sigmaspl_engine::{
    NewProfile, NewSysmonConfig, Orchestrator, SigmaToSplRequest, SplToSigmaRequest, Store,
};
use sigmaspl_parser::{parse_condition, parse_sigma_rule};

#[derive(Parser)]
#[command(name = "sigmaspl")]
#[command(about = "Translate Sigma detection rules to Splunk SPL and back")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a Sigma YAML rule to SPL
    Convert {
        /// Path to a Sigma YAML file ("-" reads stdin)
        path: PathBuf,

        /// Field-mapping profile YAML file
        #[arg(short, long)]
        profile: Option<PathBuf>,

        /// Override the target index
        #[arg(long)]
        index: Option<String>,

        /// Override the target sourcetype
        #[arg(long)]
        sourcetype: Option<String>,

        /// Relative time range, e.g. 24h (rendered as earliest=-24h)
        #[arg(long = "time-range")]
        time_range: Option<String>,

        /// Print the full conversion report as JSON instead of bare SPL
        #[arg(long)]
        json: bool,
    },

    /// Convert an SPL query to a Sigma YAML rule
    Reverse {
        /// The SPL query ("-" reads stdin)
        query: String,

        /// Field-mapping profile YAML file (used as the inverse index)
        #[arg(short, long)]
        profile: Option<PathBuf>,

        /// Title for the generated rule
        #[arg(long)]
        title: Option<String>,

        /// Severity level for the generated rule
        #[arg(long)]
        level: Option<String>,

        /// Maturity status for the generated rule
        #[arg(long)]
        status: Option<String>,

        /// Print the full conversion report as JSON instead of bare YAML
        #[arg(long)]
        json: bool,
    },

    /// Parse a Sigma YAML file and print the AST as JSON
    Parse {
        /// Path to a Sigma YAML file ("-" reads stdin)
        path: PathBuf,

        /// Pretty-print JSON output
        #[arg(short, long, default_value_t = true)]
        pretty: bool,
    },

    /// Parse a condition expression and print the AST
    Condition {
        /// The condition expression to parse
        expr: String,
    },

    /// Check required event IDs against a Sysmon configuration
    Coverage {
        /// Required event IDs, comma-separated (e.g. 1,3,22)
        #[arg(long, value_delimiter = ',')]
        required: Vec<u32>,

        /// Rule category for the audit-policy side of the check
        #[arg(long)]
        category: Option<String>,

        /// Sysmon coverage YAML file (name + enabled_event_ids)
        #[arg(long = "sysmon-config")]
        sysmon_config: Option<PathBuf>,
    },
}

/// On-disk shape of a Sysmon coverage description.
#[derive(Deserialize)]
struct SysmonFile {
    name: String,
    #[serde(default)]
    enabled_event_ids: BTreeSet<u32>,
    #[serde(default)]
    disabled_event_ids: BTreeSet<u32>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(message) = run(cli) {
        eprintln!("error: {message}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Commands::Convert {
            path,
            profile,
            index,
            sourcetype,
            time_range,
            json,
        } => convert(path, profile, index, sourcetype, time_range, json),
        Commands::Reverse {
            query,
            profile,
            title,
            level,
            status,
            json,
        } => reverse(query, profile, title, level, status, json),
        Commands::Parse { path, pretty } => parse(path, pretty),
        Commands::Condition { expr } => condition(&expr),
        Commands::Coverage {
            required,
            category,
            sysmon_config,
        } => coverage(required, category, sysmon_config),
    }
}

fn convert(
    path: PathBuf,
    profile: Option<PathBuf>,
    index: Option<String>,
    sourcetype: Option<String>,
    time_range: Option<String>,
    json: bool,
) -> Result<(), String> {
    let sigma_yaml = read_input(&path)?;

    // Parse up front for warnings and ATT&CK tags; the orchestrator parses
    // again as part of the conversion.
    let parsed = parse_sigma_rule(&sigma_yaml).map_err(|e| e.to_string())?;
    for warning in &parsed.warnings {
        eprintln!("warning: {warning}");
    }
    let techniques = parsed.rule.attack_techniques();
    if !techniques.is_empty() {
        eprintln!("attack techniques: {}", techniques.join(", "));
    }

    let orchestrator = orchestrator_with_profile(profile)?;
    let response = orchestrator
        .sigma_to_spl(&SigmaToSplRequest {
            sigma_yaml,
            profile_id: None,
            name: None,
            index_override: index,
            sourcetype_override: sourcetype,
            time_range,
        })
        .map_err(|e| e.to_string())?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&response).map_err(|e| e.to_string())?
        );
    } else {
        for gap in &response.gaps {
            eprintln!("gap: {} ({}): {}", gap.field, gap.location, gap.impact);
        }
        println!("{}", response.spl.unwrap_or_default());
    }
    Ok(())
}

fn reverse(
    query: String,
    profile: Option<PathBuf>,
    title: Option<String>,
    level: Option<String>,
    status: Option<String>,
    json: bool,
) -> Result<(), String> {
    let spl_query = if query == "-" {
        read_stdin()?
    } else {
        query
    };

    let orchestrator = orchestrator_with_profile(profile)?;
    let response = orchestrator
        .spl_to_sigma(&SplToSigmaRequest {
            spl_query,
            profile_id: None,
            title,
            level,
            status,
            author: None,
            description: None,
        })
        .map_err(|e| e.to_string())?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&response).map_err(|e| e.to_string())?
        );
    } else {
        if let Some(notes) = &response.correlation_notes {
            for line in notes.lines() {
                eprintln!("note: {line}");
            }
        }
        print!("{}", response.sigma_yaml.unwrap_or_default());
    }
    Ok(())
}

fn parse(path: PathBuf, pretty: bool) -> Result<(), String> {
    let sigma_yaml = read_input(&path)?;
    let parsed = parse_sigma_rule(&sigma_yaml).map_err(|e| e.to_string())?;
    for warning in &parsed.warnings {
        eprintln!("warning: {warning}");
    }
    let rendered = if pretty {
        serde_json::to_string_pretty(&parsed.rule)
    } else {
        serde_json::to_string(&parsed.rule)
    };
    println!("{}", rendered.map_err(|e| e.to_string())?);
    Ok(())
}

fn condition(expr: &str) -> Result<(), String> {
    let parsed = parse_condition(expr).map_err(|e| e.to_string())?;
    println!("{parsed}");
    Ok(())
}

fn coverage(
    required: Vec<u32>,
    category: Option<String>,
    sysmon_config: Option<PathBuf>,
) -> Result<(), String> {
    let store = Arc::new(Store::new());
    if let Some(path) = sysmon_config {
        let text = std::fs::read_to_string(&path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        let file: SysmonFile = serde_yaml::from_str(&text).map_err(|e| e.to_string())?;
        let config = store
            .add_sysmon_config(NewSysmonConfig {
                name: file.name,
                enabled_event_ids: file.enabled_event_ids,
                disabled_event_ids: file.disabled_event_ids,
                ..Default::default()
            })
            .map_err(|e| e.to_string())?;
        store.activate_sysmon(config.id).map_err(|e| e.to_string())?;
    }

    let orchestrator = Orchestrator::new(store);
    let result = orchestrator.check_coverage(&required, category.as_deref());
    println!(
        "{}",
        serde_json::to_string_pretty(&result).map_err(|e| e.to_string())?
    );
    Ok(())
}

/// Build an orchestrator whose store holds the profile from `path` (if any)
/// as the default profile.
fn orchestrator_with_profile(path: Option<PathBuf>) -> Result<Orchestrator, String> {
    let store = Arc::new(Store::new());
    if let Some(path) = path {
        let text = std::fs::read_to_string(&path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        let view: ConversionProfile = serde_yaml::from_str(&text).map_err(|e| e.to_string())?;
        let profile = store
            .create_profile(NewProfile {
                name: path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("profile")
                    .to_string(),
                default_index: view.default_index.clone(),
                default_sourcetype: view.default_sourcetype.clone(),
                cim_enabled: view.cim_enabled,
                is_default: true,
                macros: view.macros.clone(),
                ..Default::default()
            })
            .map_err(|e| e.to_string())?;
        store
            .replace_mappings(profile.id, view.mappings)
            .map_err(|e| e.to_string())?;
    }
    Ok(Orchestrator::new(store))
}

fn read_input(path: &Path) -> Result<String, String> {
    if path.as_os_str() == "-" {
        read_stdin()
    } else {
        std::fs::read_to_string(path).map_err(|e| format!("cannot read {}: {e}", path.display()))
    }
}

fn read_stdin() -> Result<String, String> {
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .map_err(|e| e.to_string())?;
    Ok(buffer)
}
