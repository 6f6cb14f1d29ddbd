// planner/src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use planner_store::{
    config::{ConfigLayer, ConfigManager},
    prune::{prune_old_days, PruneOptions},
    DayRecord, DayScope, PlannerStore,
};

#[derive(Parser)]
#[command(name = "planner", version, about = "Inspect and edit the local planner store")]
struct Args {
    /// Workspace whose `.planner/config.toml` is layered over the user config
    #[arg(long, default_value = ".")]
    workspace: PathBuf,
    /// Storage directory (overrides config)
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Day to operate on (YYYY-MM-DD); defaults to the persisted focus day
    #[arg(long, global = true)]
    date: Option<String>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print one day's projects and tasks
    Show,
    AddProject { name: String },
    AddTask {
        title: String,
        #[arg(long)]
        project: Option<String>,
    },
    ToggleTask { id: String },
    /// Flip a project and every task in it
    ToggleProject { id: String },
    /// Drop days older than the retention window
    Prune {
        #[arg(long)]
        max_age_days: Option<i64>,
    },
    /// Print the Monday-start week around the day
    Week,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let cm = ConfigManager::load(&args.workspace).context("load config")?;
    if let Some(dir) = args.data_dir.clone() {
        let mut overlay = ConfigLayer::default();
        overlay.storage.dir = Some(dir);
        cm.apply_runtime_overlay(overlay);
    }
    let config = cm.get();
    let store = PlannerStore::open_configured(&config).context("open planner store")?;
    let iso = args.date.clone().unwrap_or_else(|| store.focus());
    let scope = store.day_scope(iso.clone());

    match args.cmd {
        Cmd::Show => print_day(&iso, &scope.record()),
        Cmd::AddProject { name } => report("project", scope.add_project(&name)),
        Cmd::AddTask { title, project } => report("task", scope.add_task(&title, project.as_deref())),
        Cmd::ToggleTask { id } => toggled(&scope, &id, scope.toggle_task(&id)),
        Cmd::ToggleProject { id } => toggled(&scope, &id, scope.toggle_project(&id)),
        Cmd::Prune { max_age_days } => {
            let before = store.days().len();
            let window = max_age_days.unwrap_or(i64::from(config.retention.max_age_days));
            let after = store.set_days(|prev| prune_old_days(prev, PruneOptions::default().max_age_days(window))).len();
            info!(window, removed = before - after, "prune finished");
            println!("removed {} day(s), {} left", before - after, after);
        }
        Cmd::Week => {
            let week = store.week(&iso);
            for day in &week.days {
                let rec = store.day(day);
                let marker = if week.is_today(day) { "*" } else { " " };
                println!("{marker} {day}  {}/{}", rec.done_count, rec.total_count);
            }
        }
    }

    store.close().context("flush planner store")?;
    Ok(())
}

fn report(kind: &str, id: Option<String>) {
    match id {
        Some(id) => println!("added {kind} {id}"),
        None => println!("nothing added: empty name"),
    }
}

fn toggled(scope: &DayScope<'_>, id: &str, changed: bool) {
    if !changed {
        println!("no such id on {}: {id}", scope.iso());
        return;
    }
    let rec = scope.record();
    let state = rec.task(id).map(|t| t.done).or_else(|| rec.project(id).map(|p| p.done));
    println!("{id} -> {}", if state == Some(true) { "done" } else { "open" });
}

fn print_day(iso: &str, day: &DayRecord) {
    println!("{iso}  {}/{} done", day.done_count, day.total_count);
    if let Some(focus) = &day.focus { println!("focus: {focus}"); }
    let check = |done: bool| if done { "[x]" } else { "[ ]" };
    for p in &day.projects {
        println!("{} {} ({})", check(p.done), p.name, p.id);
        for t in day.project_tasks(&p.id) {
            println!("    {} {} ({})", check(t.done), t.title, t.id);
        }
    }
    for t in day.tasks.iter().filter(|t| t.project_id.as_deref().is_none_or(|pid| day.project(pid).is_none())) {
        println!("{} {} ({})", check(t.done), t.title, t.id);
    }
    if let Some(notes) = &day.notes { println!("notes: {notes}"); }
}
