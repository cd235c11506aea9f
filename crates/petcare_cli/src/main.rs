mod cli;
mod input;

use clap::{CommandFactory, Parser};
use cli::{Cli, Command, ListCommand, collect_config_overrides};
use input::{parse_datetime, parse_recurrence, parse_task_type};
use petcare_core::config::{Config, load_config_with_fallback, merge_overrides};
use petcare_core::dispatcher::SweepReport;
use petcare_core::error::AppError;
use petcare_core::model::{HealthLogEntry, Reminder, RecurrenceKind, Task};
use petcare_core::notify::gateway_from_env;
use petcare_core::task_api::{NewTask, PetCare, local_offset};
use petcare_core::worker::ReminderWorker;
use serde::Serialize;
use std::io::{self, BufRead};
use std::sync::Arc;
use tabled::{Table, Tabled};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Pet")]
    pet_id: String,
    #[tabled(rename = "Type")]
    task_type: String,
    #[tabled(rename = "Due")]
    due: String,
    #[tabled(rename = "Repeats")]
    repeats: String,
    #[tabled(rename = "Status")]
    status: String,
}

#[derive(Tabled)]
struct ReminderRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Task")]
    task_id: String,
    #[tabled(rename = "At")]
    at: String,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Tabled)]
struct LogRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Type")]
    entry_type: String,
    #[tabled(rename = "Description")]
    description: String,
}

fn format_instant(instant: OffsetDateTime) -> String {
    instant
        .format(&Rfc3339)
        .unwrap_or_else(|_| instant.to_string())
}

fn status_label(task: &Task, now: OffsetDateTime) -> &'static str {
    if task.is_done {
        "done"
    } else if task.due_date < now {
        "overdue"
    } else {
        "pending"
    }
}

fn repeats_label(task: &Task) -> String {
    match task.recurring.kind {
        RecurrenceKind::None => "-".to_string(),
        kind => format!("{} x{}", kind.as_str(), task.recurring.interval),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn print_tasks_plain(tasks: &[Task], now: OffsetDateTime) {
    if tasks.is_empty() {
        println!("No tasks.");
        return;
    }
    let rows = tasks.iter().map(|task| TaskRow {
        id: task.id.clone(),
        pet_id: task.pet_id.clone(),
        task_type: task.task_type.to_string(),
        due: format_instant(task.due_date),
        repeats: repeats_label(task),
        status: status_label(task, now).to_string(),
    });
    println!("{}", Table::new(rows));
}

fn print_reminders_plain(reminders: &[Reminder]) {
    if reminders.is_empty() {
        println!("No pending reminders.");
        return;
    }
    let rows = reminders.iter().map(|reminder| ReminderRow {
        id: reminder.id.clone(),
        task_id: reminder.task_id.clone(),
        at: format_instant(reminder.reminder_time),
        message: reminder.message.clone(),
    });
    println!("{}", Table::new(rows));
}

fn print_logs_plain(entries: &[HealthLogEntry]) {
    if entries.is_empty() {
        println!("No health log entries.");
        return;
    }
    let rows = entries.iter().map(|entry| LogRow {
        date: format_instant(entry.date),
        entry_type: entry.entry_type.clone(),
        description: entry.description.clone(),
    });
    println!("{}", Table::new(rows));
}

fn print_sweep_plain(report: &SweepReport) {
    println!(
        "Sweep finished: {} sent ({} delivered, {} failed, {} without target), {} not due",
        report.marked_sent(),
        report.delivered,
        report.delivery_failed,
        report.no_target,
        report.not_due
    );
}

fn normalize_parse_error(err: clap::Error) -> AppError {
    let rendered = err.to_string();
    let first_line = rendered.lines().next().unwrap_or("invalid command").trim();
    let message = first_line
        .strip_prefix("error: ")
        .unwrap_or(first_line)
        .to_string();
    AppError::invalid_input(message)
}

fn split_command_line(line: &str) -> Result<Vec<String>, AppError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escape = false;

    for ch in line.chars() {
        if escape {
            if ch != '"' && ch != '\\' {
                current.push('\\');
            }
            current.push(ch);
            escape = false;
            continue;
        }

        if in_quotes && ch == '\\' {
            escape = true;
            continue;
        }

        if ch == '"' {
            in_quotes = !in_quotes;
            continue;
        }

        if ch.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                args.push(current.clone());
                current.clear();
            }
            continue;
        }

        current.push(ch);
    }

    if in_quotes {
        return Err(AppError::invalid_input("unterminated quote in command"));
    }

    if !current.is_empty() {
        args.push(current);
    }

    Ok(args)
}

fn print_help() {
    let mut cmd = Cli::command();
    let help = cmd.render_help();
    println!("{help}");
}

fn init_logging(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn base_config() -> Config {
    let loaded = load_config_with_fallback();
    init_logging(&loaded.config);
    if let Some(err) = loaded.error {
        warn!(error = %err, "config could not be loaded, using defaults");
    }
    loaded.config
}

fn require_owner(cli: &Cli) -> Result<String, AppError> {
    match cli.owner.as_deref().map(str::trim) {
        Some(owner) if !owner.is_empty() => Ok(owner.to_string()),
        _ => Err(AppError::invalid_input(
            "owner is required (--owner or PETCARE_OWNER)",
        )),
    }
}

fn run_command(cli: Cli, base: &Config) -> Result<(), AppError> {
    let overrides =
        collect_config_overrides(&cli.config_override).map_err(AppError::invalid_input)?;
    let config = merge_overrides(base, &overrides);
    let api = PetCare::open(&config)?;
    let offset = local_offset();

    match &cli.command {
        Command::Add {
            id,
            pet_id,
            task_type,
            due,
            recurring,
            interval,
            note,
        } => {
            let owner = require_owner(&cli)?;
            let new_task = NewTask {
                id: id.clone(),
                pet_id: pet_id.clone(),
                task_type: parse_task_type(task_type)?,
                due_date: parse_datetime(due, offset)?,
                recurring: parse_recurrence(recurring, *interval)?,
                note: note.clone(),
            };
            let task = api.create_task(&owner, new_task)?;
            if cli.json {
                print_json(&task)?;
            } else {
                println!(
                    "Added task: {} {} for {} due {}",
                    task.id,
                    task.task_type,
                    task.pet_id,
                    format_instant(task.due_date)
                );
            }
        }
        Command::Done {
            id,
            message,
            message_flag,
        } => {
            let owner = require_owner(&cli)?;
            let note = message_flag.as_deref().or(message.as_deref());
            let task = api.complete_task(&owner, id, note)?;
            if cli.json {
                print_json(&task)?;
            } else {
                println!("Completed task: {} ({})", task.task_type, task.id);
            }
        }
        Command::Show { id } => {
            let owner = require_owner(&cli)?;
            let task = api.get_task(&owner, id)?;
            if cli.json {
                print_json(&task)?;
            } else {
                print_tasks_plain(std::slice::from_ref(&task), api.clock().now());
                if let Some(note) = task.note.as_deref() {
                    println!("Note: {note}");
                }
            }
        }
        Command::List { list } => {
            let owner = require_owner(&cli)?;
            let now = api.clock().now();
            let tasks = match list {
                ListCommand::Today => {
                    api.daily_tasks(&owner, now.to_offset(offset).date(), offset)?
                }
                ListCommand::Upcoming => api.upcoming_tasks(&owner, offset)?,
            };
            if cli.json {
                print_json(&tasks)?;
            } else {
                print_tasks_plain(&tasks, now);
            }
        }
        Command::Remind {
            task_id,
            datetime,
            message,
        } => {
            let owner = require_owner(&cli)?;
            let at = parse_datetime(datetime, offset)?;
            let reminder = api.schedule_reminder(&owner, task_id, at, message)?;
            if cli.json {
                print_json(&reminder)?;
            } else {
                println!(
                    "Scheduled reminder: {} at {}",
                    reminder.id,
                    format_instant(reminder.reminder_time)
                );
            }
        }
        Command::Reminders => {
            let owner = require_owner(&cli)?;
            let reminders = api.pending_reminders(&owner)?;
            if cli.json {
                print_json(&reminders)?;
            } else {
                print_reminders_plain(&reminders);
            }
        }
        Command::RegisterTarget { target } => {
            let owner = require_owner(&cli)?;
            let registered = api.register_push_target(&owner, target)?;
            if cli.json {
                print_json(&registered)?;
            } else {
                println!("Registered push target for {}", registered.owner_id);
            }
        }
        Command::Logs { pet_id } | Command::Timeline { pet_id } => {
            let owner = require_owner(&cli)?;
            let entries = if matches!(cli.command, Command::Logs { .. }) {
                api.pet_logs(&owner, pet_id)?
            } else {
                api.pet_timeline(&owner, pet_id)?
            };
            if cli.json {
                print_json(&entries)?;
            } else {
                print_logs_plain(&entries);
            }
        }
        Command::Sweep => {
            let dispatcher = api.dispatcher(gateway_from_env(config.notifications));
            let report = dispatcher.sweep()?;
            if cli.json {
                print_json(&report)?;
            } else {
                print_sweep_plain(&report);
            }
        }
        Command::Serve => {
            let dispatcher = Arc::new(api.dispatcher(gateway_from_env(config.notifications)));
            serve(dispatcher, &config)?;
        }
    }

    Ok(())
}

fn serve(
    dispatcher: Arc<petcare_core::dispatcher::ReminderDispatcher>,
    config: &Config,
) -> Result<(), AppError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let period = config.sweep_interval();

    runtime.block_on(async move {
        let handle = ReminderWorker::new(dispatcher, period).start();
        println!(
            "Reminder worker running every {}s, press Ctrl-C to stop",
            period.as_secs()
        );
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "could not listen for Ctrl-C");
        }
        info!("shutting down reminder worker");
        handle.shutdown().await;
    });

    Ok(())
}

fn run_interactive(base: &Config) -> Result<(), AppError> {
    let mut input = String::new();
    let stdin = io::stdin();
    let mut stdin_lock = stdin.lock();

    loop {
        input.clear();
        let bytes = stdin_lock.read_line(&mut input)?;

        if bytes == 0 {
            break;
        }

        let line = input.trim();
        if line.is_empty() {
            continue;
        }

        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        if line == "help" || line == "?" {
            print_help();
            continue;
        }

        let args = match split_command_line(line) {
            Ok(args) => args,
            Err(err) => {
                eprintln!("ERROR: {}", err);
                continue;
            }
        };

        if args.is_empty() {
            continue;
        }

        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push("petcare".to_string());
        argv.extend(args);

        let cli = match Cli::try_parse_from(argv) {
            Ok(cli) => cli,
            Err(err) => {
                eprintln!("ERROR: {}", normalize_parse_error(err));
                continue;
            }
        };

        if matches!(cli.command, Command::Serve) {
            eprintln!("ERROR: {}", AppError::invalid_input("serve is not available here"));
            continue;
        }

        if let Err(err) = run_command(cli, base) {
            eprintln!("ERROR: {}", err);
        }
    }

    Ok(())
}

fn main() {
    let base = base_config();

    let mut args = std::env::args_os();
    args.next();
    if args.next().is_none() {
        if let Err(err) = run_interactive(&base) {
            eprintln!("ERROR: {}", err);
            std::process::exit(1);
        }
        return;
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            if matches!(
                err.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            ) {
                err.exit();
            }
            eprintln!("ERROR: {}", normalize_parse_error(err));
            std::process::exit(1);
        }
    };

    if let Err(err) = run_command(cli, &base) {
        eprintln!("ERROR: {}", err);
        std::process::exit(1);
    }
}
