use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use planner_store::decode_planner_days;
use serde_json::Value;
use std::{fs, path::PathBuf};

#[derive(Parser)]
#[command(name = "xtask", about = "Planner workspace tasks")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Validate a persisted days file against schemas/planner_days.schema.json
    ValidateDays { file: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::ValidateDays { file } => validate_days(&file),
    }
}

fn count(v: &Value, field: &str) -> usize {
    v.get(field).and_then(Value::as_array).map_or(0, Vec::len)
}

fn validate_days(path: &PathBuf) -> Result<()> {
    let schema_text = include_str!("../../schemas/planner_days.schema.json");
    let schema: Value = serde_json::from_str(schema_text)?;
    let compiled = jsonschema::validator_for(&schema)?;
    let data_text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let data: Value = serde_json::from_str(&data_text).with_context(|| "parse json")?;

    // What the store would keep on load.
    let decoded = decode_planner_days(&data);
    let raw_days = data.as_object().map_or(0, |o| o.len());
    let (mut dropped_projects, mut dropped_tasks) = (0, 0);
    if let Some(obj) = data.as_object() {
        for (iso, day) in obj {
            let kept = decoded.get(iso);
            dropped_projects += count(day, "projects").saturating_sub(kept.map_or(0, |d| d.projects.len()));
            dropped_tasks += count(day, "tasks").saturating_sub(kept.map_or(0, |d| d.tasks.len()));
        }
    }
    println!(
        "decoder keeps {}/{} day(s); drops {} project(s), {} task(s)",
        decoded.len(), raw_days, dropped_projects, dropped_tasks
    );

    let errors: Vec<_> = compiled.iter_errors(&data).collect();
    if !errors.is_empty() {
        eprintln!("Invalid: {}", path.display());
        for e in errors {
            eprintln!("- {}", e);
        }
        std::process::exit(1);
    }
    println!("OK: {}", path.display());
    Ok(())
}
