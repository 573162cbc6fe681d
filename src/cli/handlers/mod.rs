use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::app::{App, AppPaths};
use crate::cli::commands::*;
use crate::cli::output::*;
use crate::extension::Extension;
use crate::io::config_io;
use crate::io::recovery::{self, RecoveryEntry};
use crate::io::refresh::MarkerRefresh;
use crate::model::config::Config;
use crate::model::log::{BucketRef, LogEntry};
use crate::ops::log_ops::MutationOutcome;
use crate::ops::quota::Prompt;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// A creation the quota gate refused. Reported with exit code 2.
#[derive(Debug, thiserror::Error)]
pub enum Blocked {
    #[error("free log limit reached ({0} logs), upgrade to keep logging")]
    Logs(u64),
    #[error("free bucket limit reached ({0} buckets)")]
    Buckets(usize),
    #[error("free preset limit reached ({0} presets)")]
    Presets(usize),
}

impl Blocked {
    pub const EXIT_CODE: i32 = 2;
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CmdResult {
    let json = cli.json;
    let data_dir = match cli.data_dir {
        Some(dir) => PathBuf::from(dir),
        None => config_io::default_data_dir(),
    };
    let config = config_io::read_config(&data_dir)?;
    let paths = AppPaths::resolve(&data_dir, &config);

    match cli.command {
        // The widget never opens the application's store
        Commands::Widget(cmd) => cmd_widget(cmd, &paths, &config, json),
        Commands::Recovery(args) => cmd_recovery(args, &paths, json),
        command => {
            let hook = Arc::new(MarkerRefresh::new(&paths.shared_dir));
            let mut app = App::init(paths, config, hook)?;
            let result = run_app_command(&mut app, command, json);
            app.close()?;
            result
        }
    }
}

fn run_app_command(app: &mut App, command: Commands, json: bool) -> CmdResult {
    match command {
        Commands::Log(args) => cmd_log(app, args, json),
        Commands::List(args) => cmd_list(app, args, json),
        Commands::Assign(args) => cmd_assign(app, args),
        Commands::Delete(args) => cmd_delete(app, args),
        Commands::Sync => cmd_sync(app, json),
        Commands::Quota => cmd_quota(app, json),
        Commands::Entitle(args) => cmd_entitle(app, args),
        Commands::Seen(args) => cmd_seen(app, args),
        Commands::Bucket(args) => cmd_bucket(app, args, json),
        Commands::Preset(args) => cmd_preset(app, args, json),
        Commands::Stats => cmd_stats(app, json),
        Commands::Wipe(args) => cmd_wipe(app, args),
        // Handled in dispatch without an App
        Commands::Widget(_) | Commands::Recovery(_) => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------------

fn cmd_log(app: &mut App, args: LogArgs, json: bool) -> CmdResult {
    if !app.can_create_log() {
        return Err(Blocked::Logs(app.gate().limits().free_log_cap).into());
    }
    let entry = app.capture(args.text);
    app.record_log_created();
    let nudges = app.take_nudges();
    let remaining = app.logs_remaining();

    if json {
        let output = CaptureJson {
            log: &entry,
            remaining: remaining_to_json(remaining),
            nudges,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", format_capture(&entry));
        for line in format_nudges(nudges, remaining) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_list(app: &mut App, args: ListArgs, json: bool) -> CmdResult {
    let logs = if args.unsorted {
        app.unsorted_logs()
    } else if args.today {
        app.today_logs()
    } else if let Some(ref date) = args.date {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| format!("invalid date '{}': {}", date, e))?;
        app.logs_for_date(date)
    } else {
        app.all_logs()
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&logs)?);
        return Ok(());
    }
    if logs.is_empty() {
        println!("no logs");
        return Ok(());
    }
    let buckets = app.buckets();
    for log in &logs {
        println!("{}", format_log_line(log, &buckets));
    }
    Ok(())
}

fn cmd_assign(app: &mut App, args: AssignArgs) -> CmdResult {
    let bucket = if args.archive {
        BucketRef::Archived
    } else if args.unsort {
        BucketRef::Unsorted
    } else {
        BucketRef::from_wire(args.bucket_id.as_deref())
    };
    let label = match &bucket {
        BucketRef::Unsorted => "unsorted".to_string(),
        BucketRef::Archived => "archived".to_string(),
        BucketRef::InBucket(id) => id.clone(),
    };
    match app.assign_bucket(&args.id, bucket) {
        MutationOutcome::Applied => {
            println!("{} -> {}", args.id, label);
            Ok(())
        }
        MutationOutcome::NotFound => Err(format!("log not found: {}", args.id).into()),
    }
}

fn cmd_delete(app: &mut App, args: DeleteArgs) -> CmdResult {
    match app.delete_log(&args.id) {
        MutationOutcome::Applied => {
            println!("deleted {}", args.id);
            Ok(())
        }
        MutationOutcome::NotFound => Err(format!("log not found: {}", args.id).into()),
    }
}

fn cmd_sync(app: &mut App, json: bool) -> CmdResult {
    let report = app.on_foreground();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.shared_available {
        println!(
            "{} logs ({} from widget, {} widget captures counted)",
            report.merged, report.imported, report.widget_captures
        );
    } else {
        println!("{} logs (widget container unavailable)", report.merged);
    }
    Ok(())
}

fn cmd_stats(app: &mut App, json: bool) -> CmdResult {
    let counts = app.daily_counts();
    if json {
        println!("{}", serde_json::to_string_pretty(&daily_counts_to_json(&counts))?);
        return Ok(());
    }
    if counts.is_empty() {
        println!("no logs");
    }
    for (date, count) in &counts {
        println!("{}  {}", date, count);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entitlement
// ---------------------------------------------------------------------------

fn cmd_quota(app: &mut App, json: bool) -> CmdResult {
    if json {
        println!("{}", serde_json::to_string_pretty(&quota_to_json(app.gate()))?);
    } else {
        for line in format_quota(app.gate()) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_entitle(app: &mut App, args: EntitleArgs) -> CmdResult {
    app.set_entitled(args.entitled);
    println!("tier: {}", app.gate().tier());
    Ok(())
}

fn cmd_seen(app: &mut App, args: SeenArgs) -> CmdResult {
    let prompt = match args.prompt {
        PromptArg::SoftPrompt => Prompt::SoftPrompt,
        PromptArg::Badge => Prompt::Badge,
        PromptArg::Paywall => Prompt::Paywall,
    };
    app.mark_seen(prompt);
    Ok(())
}

// ---------------------------------------------------------------------------
// Buckets and presets
// ---------------------------------------------------------------------------

fn cmd_bucket(app: &mut App, args: BucketCmd, json: bool) -> CmdResult {
    match args.action.unwrap_or(BucketAction::List) {
        BucketAction::List => {
            let buckets = app.buckets();
            if json {
                println!("{}", serde_json::to_string_pretty(&buckets)?);
            } else {
                for bucket in &buckets {
                    println!("{}", format_bucket_line(bucket));
                }
            }
        }
        BucketAction::Add(add) => {
            if !app.can_create_bucket() {
                return Err(Blocked::Buckets(app.gate().limits().free_bucket_cap).into());
            }
            let bucket = app.add_bucket(&add.name)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&bucket)?);
            } else {
                println!("{}", format_bucket_line(&bucket));
            }
        }
        BucketAction::Rename(rename) => {
            if !app.rename_bucket(&rename.id, &rename.name)?.applied() {
                return Err(format!("bucket not found: {}", rename.id).into());
            }
            println!("renamed {}", rename.id);
        }
        BucketAction::Rm(rm) => {
            if !app.remove_bucket(&rm.id).applied() {
                return Err(format!("bucket not found: {}", rm.id).into());
            }
            println!("removed {}", rm.id);
        }
    }
    Ok(())
}

fn cmd_preset(app: &mut App, args: PresetCmd, json: bool) -> CmdResult {
    match args.action.unwrap_or(PresetAction::List) {
        PresetAction::List => {
            let presets = app.presets();
            if json {
                println!("{}", serde_json::to_string_pretty(&presets)?);
            } else {
                for preset in &presets {
                    println!("{}", format_preset_line(preset));
                }
            }
        }
        PresetAction::Add(add) => {
            if !app.can_create_preset() {
                return Err(Blocked::Presets(app.gate().limits().free_preset_cap).into());
            }
            let preset = app.add_preset(
                &add.label,
                &add.text,
                add.icon.as_deref(),
                add.bucket_id.as_deref(),
            )?;
            if json {
                println!("{}", serde_json::to_string_pretty(&preset)?);
            } else {
                println!("{}", format_preset_line(&preset));
            }
        }
        PresetAction::Rm(rm) => {
            if !app.remove_preset(&rm.id).applied() {
                return Err(format!("preset not found: {}", rm.id).into());
            }
            println!("removed {}", rm.id);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Maintenance
// ---------------------------------------------------------------------------

fn cmd_wipe(app: &mut App, args: WipeArgs) -> CmdResult {
    if !args.yes {
        return Err("refusing to erase all data without --yes".into());
    }
    app.wipe();
    println!("logs, buckets and presets erased");
    Ok(())
}

fn cmd_recovery(args: RecoveryArgs, paths: &AppPaths, json: bool) -> CmdResult {
    if args.path {
        let dir = if args.widget { &paths.shared_dir } else { &paths.local_dir };
        println!("{}", recovery::recovery_log_path(dir).display());
        return Ok(());
    }
    let limit = args.limit.unwrap_or(10);

    // The widget can only write to the shared container, so its log lives there
    let mut sources = vec![("widget", paths.shared_dir.as_path())];
    if !args.widget {
        sources.insert(0, ("app", paths.local_dir.as_path()));
    }
    let mut entries: Vec<(&'static str, RecoveryEntry)> = sources
        .into_iter()
        .flat_map(|(store, dir)| {
            recovery::read_recovery_entries(dir, Some(limit))
                .into_iter()
                .map(move |entry| (store, entry))
        })
        .collect();
    entries.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp));
    entries.truncate(limit);

    if json {
        let items: Vec<_> = entries
            .iter()
            .map(|(store, entry)| recovery_to_json(*store, entry))
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("recovery log is empty");
        return Ok(());
    }
    for (i, (store, entry)) in entries.iter().enumerate() {
        if i > 0 {
            println!();
        }
        for line in format_recovery_entry(store, entry) {
            println!("{}", line);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Widget extension
// ---------------------------------------------------------------------------

fn cmd_widget(cmd: WidgetCmd, paths: &AppPaths, config: &Config, json: bool) -> CmdResult {
    let hook = Arc::new(MarkerRefresh::new(&paths.shared_dir));
    let extension = Extension::open(&paths.shared_dir, config, hook);

    match cmd.action {
        WidgetAction::Log(args) => {
            let entry = extension
                .capture(args.text)
                .ok_or("widget capture was not stored")?;
            print_widget_capture(&entry, json)
        }
        WidgetAction::Preset(args) => {
            let entry = extension
                .capture_preset(&args.id)
                .ok_or_else(|| format!("preset not found or not stored: {}", args.id))?;
            print_widget_capture(&entry, json)
        }
        WidgetAction::Count => {
            let count = extension.today_count();
            if json {
                println!("{}", serde_json::json!({ "today": count }));
            } else {
                println!("{}", count);
            }
            Ok(())
        }
    }
}

fn print_widget_capture(entry: &LogEntry, json: bool) -> CmdResult {
    if json {
        println!("{}", serde_json::to_string_pretty(entry)?);
    } else {
        println!("{}", format_capture(entry));
    }
    Ok(())
}
