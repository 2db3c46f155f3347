use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "mlens",
    version,
    about = "Inline SQL-driven metric annotations for code locations",
    after_help = r#"Examples:
  mlens import --project . --file usage-data.sql
  mlens query --project . --sql "SELECT count(*) FROM method_calls"
  mlens annotate --project . --settings markers.yaml --elements elements.json
  mlens check-rules --settings markers.yaml
"#
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Execute a SQL script against the metric store (exclusive write).
    Import {
        #[arg(long, default_value = ".")]
        project: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
        /// SQL script file to execute.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Inline SQL to execute instead of --file.
        #[arg(long)]
        sql: Option<String>,
    },
    /// Run one read query and print the materialized result as JSON.
    Query {
        #[arg(long, default_value = ".")]
        project: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        sql: String,
    },
    /// Evaluate marker configs over a batch of code elements.
    Annotate {
        #[arg(long, default_value = ".")]
        project: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
        /// Marker settings YAML (templates, rules, feature evaluators).
        #[arg(long)]
        settings: PathBuf,
        /// JSON file with code elements and their resolved contexts.
        #[arg(long)]
        elements: PathBuf,
    },
    /// Validate rule boundaries and colors in a settings file.
    CheckRules {
        #[arg(long)]
        settings: PathBuf,
    },
}
