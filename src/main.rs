use anyhow::{Result, bail};
use clap::Parser;
use mlens::context::{ContextInfo, StaticResolver};
use mlens::db::Database;
use mlens::model::CodeElement;
use mlens::pipeline::{CancelToken, MetricPipeline};
use mlens::settings::MarkerSettings;
use mlens::cli;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;

fn default_db_path(project: &PathBuf) -> PathBuf {
    project.join(".mlens").join(".mlens.sqlite")
}

/// One line of the `annotate` input file: a code element plus the context
/// the host resolved for its anchor.
#[derive(Deserialize)]
struct ElementRecord {
    #[serde(flatten)]
    element: CodeElement,
    #[serde(default)]
    context: ContextInfo,
}

fn main() -> Result<()> {
    let _logger = flexi_logger::Logger::try_with_env_or_str("info")?.start()?;
    let args = cli::Args::parse();

    match args.command {
        cli::Command::Import {
            project,
            db,
            file,
            sql,
        } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&project));
            let sql = match (file, sql) {
                (Some(path), None) => std::fs::read_to_string(&path)?,
                (None, Some(sql)) => sql,
                _ => bail!("pass exactly one of --file or --sql"),
            };
            let database = Database::new(&db_path);
            database.execute_write(&sql)?;
            println!("{}", serde_json::to_string_pretty(&json!({ "status": "ok" }))?);
            Ok(())
        }
        cli::Command::Query { project, db, sql } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&project));
            let database = Database::new(&db_path);
            let result = database.execute_read(&sql)?;
            println!("{}", serde_json::to_string_pretty(&*result)?);
            Ok(())
        }
        cli::Command::Annotate {
            project,
            db,
            settings,
            elements,
        } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&project));
            let settings = MarkerSettings::load(&settings)?;
            let content = std::fs::read_to_string(&elements)?;
            let records: Vec<ElementRecord> = serde_json::from_str(&content)?;

            let mut resolver = StaticResolver::new();
            let mut batch = Vec::with_capacity(records.len());
            for record in records {
                resolver.insert(record.element.anchor.clone(), record.context);
                batch.push(record.element);
            }

            let database = Database::new(&db_path);
            let pipeline = MetricPipeline::new(&database, &resolver);
            let annotations = pipeline.collect(&batch, &settings, &CancelToken::new())?;
            println!("{}", serde_json::to_string_pretty(&annotations)?);
            Ok(())
        }
        cli::Command::CheckRules { settings } => {
            let settings = MarkerSettings::load(&settings)?;
            let problems = settings.validate();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "problems": problems }))?
            );
            if !problems.is_empty() {
                bail!("{} invalid rule(s)", problems.len());
            }
            Ok(())
        }
    }
}
