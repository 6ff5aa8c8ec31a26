use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::{Context, Result, eyre};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use mockable::DefaultClock;
use todostore::{Config, Priority, Saved, TaskForm, TaskId, TaskStore, display};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "todostore")]
#[command(about = "Local to-do list backed by SQLite with live-updating views")]
#[command(version)]
struct Cli {
    /// Directory holding the task database (overrides the config file)
    #[arg(short, long)]
    store_path: Option<PathBuf>,

    /// Path to a YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a task
    Add {
        /// Task description
        #[arg(required = true, num_args = 1..)]
        description: Vec<String>,

        /// high|medium|low or 1|2|3 (default: high)
        #[arg(short, long)]
        priority: Option<String>,
    },

    /// Edit an existing task; unspecified fields keep their stored value
    Edit {
        id: TaskId,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        priority: Option<String>,
    },

    /// Delete a task
    Delete { id: TaskId },

    /// Show all tasks, most recently changed first
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one task
    Show {
        id: TaskId,

        #[arg(long)]
        json: bool,
    },

    /// Interactive session with a live task list
    Shell,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with_writer(std::io::stderr)
        .init();

    let store_path = cli.store_path.clone().unwrap_or_else(|| config.resolved_store_path());
    let store = TaskStore::open(&store_path, DefaultClock)
        .with_context(|| format!("Failed to open task store at {}", store_path.display()))?;

    match cli.command {
        Commands::Add { description, priority } => {
            let mut form = TaskForm::create();
            form.set_description(description.join(" "));
            if let Some(p) = priority {
                form.select_priority_input(&p)?;
            }
            report(form.submit(&store).wait()?);
        }
        Commands::Edit { id, description, priority } => {
            let mut form = TaskForm::edit(&store, id)?;
            if let Some(d) = description {
                form.set_description(d);
            }
            if let Some(p) = priority {
                form.select_priority_input(&p)?;
            }
            report(form.submit(&store).wait()?);
        }
        Commands::Delete { id } => {
            if store.delete(id).wait()? {
                println!("Deleted task {}", id);
            } else {
                println!("Task {} does not exist", id);
            }
        }
        Commands::List { json } => {
            let tasks = store
                .get_all()
                .first()
                .ok_or_else(|| eyre!("Store closed before answering"))??;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                println!("{}", display::format_list(&tasks, &config.date_format));
            }
        }
        Commands::Show { id, json } => {
            let task = store
                .get_by_id(id)
                .first()
                .ok_or_else(|| eyre!("Store closed before answering"))??
                .ok_or_else(|| eyre!("Task {} does not exist", id))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&task)?);
            } else {
                println!("{}", display::format_row(&task, &config.date_format));
            }
        }
        Commands::Shell => run_shell(&store, &config)?,
    }

    Ok(())
}

fn report(saved: Saved) {
    match saved {
        Saved::Created(id) => println!("Added task {}", id),
        Saved::Updated(id) => println!("Updated task {}", id),
        Saved::Missing(id) => println!("Task {} does not exist, nothing changed", id),
    }
}

/// Line commands understood inside `shell`
#[derive(Parser)]
#[command(no_binary_name = true, disable_help_flag = true)]
enum ShellCommand {
    Add {
        #[arg(short, long)]
        priority: Option<Priority>,
        #[arg(required = true, num_args = 1..)]
        description: Vec<String>,
    },
    Edit {
        id: TaskId,
        #[arg(short, long)]
        priority: Option<Priority>,
        #[arg(num_args = 0..)]
        description: Vec<String>,
    },
    #[command(alias = "rm")]
    Delete { id: TaskId },
    #[command(alias = "exit")]
    Quit,
}

/// The list re-renders on its own thread on every emission while commands
/// are read from stdin. Writes are fire-and-forget; their effect shows up
/// through the next emission.
fn run_shell(store: &TaskStore, config: &Config) -> Result<()> {
    let stop = AtomicBool::new(false);
    let mut tasks = store.get_all();

    thread::scope(|s| -> Result<()> {
        let render = s.spawn(|| {
            while !stop.load(Ordering::Relaxed) {
                match tasks.recv_timeout(Duration::from_millis(200)) {
                    Some(Ok(rows)) => {
                        println!("\n{}", display::format_list(&rows, &config.date_format));
                        print!("{} ", ">".bold());
                        let _ = std::io::stdout().flush();
                    }
                    Some(Err(err)) => {
                        eprintln!("{} {}", "storage failure:".red().bold(), err);
                        break;
                    }
                    None if !tasks.is_active() => break,
                    None => {}
                }
            }
        });

        let session = read_commands(store);

        stop.store(true, Ordering::Relaxed);
        render.join().map_err(|_| eyre!("Render thread panicked"))?;
        session
    })
}

fn read_commands(store: &TaskStore) -> Result<()> {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read input")?;
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }

        match ShellCommand::try_parse_from(words) {
            Ok(ShellCommand::Add { priority, description }) => {
                let mut form = TaskForm::create();
                form.set_description(description.join(" "));
                if let Some(p) = priority {
                    form.select_priority(p);
                }
                form.submit(store);
            }
            Ok(ShellCommand::Edit { id, priority, description }) => {
                let mut form = TaskForm::edit(store, id)?;
                if !description.is_empty() {
                    form.set_description(description.join(" "));
                }
                if let Some(p) = priority {
                    form.select_priority(p);
                }
                form.submit(store);
            }
            Ok(ShellCommand::Delete { id }) => {
                store.delete(id);
            }
            Ok(ShellCommand::Quit) => break,
            Err(err) => eprintln!("{}", err),
        }
    }
    Ok(())
}
