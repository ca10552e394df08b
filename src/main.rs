mod app;
mod archive;
mod atomic;
mod backups;
mod cli;
mod completions;
mod config;
mod doctor;
mod document;
mod domain;
mod listing;
mod locks;
mod logging;
mod migrate;
mod store;
mod ui;

use std::path::{Path, PathBuf};

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn print_json(value: &impl serde::Serialize) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).expect("json serialization should work")
    );
}

fn run() -> Result<(), app::AppError> {
    use clap::Parser;
    use cli::{Commands, TagSubcommands};
    use domain::bug::BugPatch;
    use domain::priority::Priority;
    use listing::{DoneFilter, SortKey, TaskListFilter};

    let cli = cli::Cli::parse();
    logging::init(cli.verbose);

    if let Commands::Completions(args) = &cli.command {
        return completions::run_completions_command(args.shell.as_deref(), args.install);
    }

    let settings = config::Settings::resolve(cli.db.as_deref(), cli.config.as_deref())?;
    let palette = ui::Palette::auto();

    match cli.command {
        Commands::Init(args) => {
            let target = match (args.db_path, args.dir) {
                (Some(path), _) => absolute(&path)?,
                (None, Some(dir)) => absolute(&dir)?.join(config::DB_FILE_NAME),
                (None, None) => settings.db_path.clone(),
            };
            let home = dirs::home_dir();
            let outcome = config::init_config(
                &settings.location,
                &target,
                args.force,
                &domain::dates::now_utc_rfc3339(),
                home.as_deref(),
            )?;
            if outcome.written {
                println!("config written to {}", settings.location.path().display());
            } else {
                println!(
                    "config already points at {} (use --force to replace it)",
                    outcome.db_path.display()
                );
            }
            let app = app::App::open(&outcome.db_path, settings.backups.clone());
            if app.init()? {
                println!("created {}", app.path().display());
            } else {
                println!("using existing {}", app.path().display());
            }
        }
        Commands::Config => {
            println!("config file:  {}", settings.location.path().display());
            let configured = if settings.config.db_path.is_empty() {
                "(not set)".to_string()
            } else {
                settings.config.db_path.clone()
            };
            println!("configured:   {configured}");
            println!(
                "document:     {} (from {})",
                settings.db_path.display(),
                settings.db_source
            );
            println!(
                "archive:      {}",
                store::archive_path_for(&settings.db_path).display()
            );
            let backups_dir = settings
                .backups
                .dir()
                .map(|dir| dir.display().to_string())
                .unwrap_or_else(|| "(next to the document)".to_string());
            println!(
                "backups:      {} (keep {})",
                backups_dir,
                settings.backups.keep()
            );
            println!("precedence:   --db > TODO_DB > config > default");
        }
        Commands::Path => {
            println!("{}", settings.db_path.display());
        }
        Commands::Add(args) => {
            let app = app::App::from_settings(&settings);
            let priority = match args.priority.as_deref() {
                Some(raw) => raw.parse::<Priority>()?,
                None => Priority::None,
            };
            let due = args
                .due
                .as_deref()
                .map(domain::dates::parse_due)
                .transpose()?;
            let task = app.add(app::NewTask {
                text: args.text.join(" "),
                priority,
                due,
                tags: args.tags,
            })?;
            println!("added #{} {}", task.id, task.text);
        }
        Commands::Ls(args) => {
            let app = app::App::from_settings(&settings);
            let sort = args.sort.parse::<SortKey>()?;
            let filter = TaskListFilter {
                done: if args.pending {
                    DoneFilter::Pending
                } else if args.done {
                    DoneFilter::Done
                } else {
                    DoneFilter::Any
                },
                tag: args.tag,
                query: args.search,
                bugs_only: args.bugs,
            };
            let (heading, tasks) = if args.archived {
                ("Archived", app.list_archived(&filter, sort)?)
            } else {
                ("Tasks", app.list(&filter, sort)?)
            };
            if args.json {
                print_json(&tasks);
            } else {
                let palette = if args.plain {
                    ui::Palette::plain()
                } else {
                    palette
                };
                ui::print_task_list(
                    heading,
                    &tasks,
                    &filter,
                    sort,
                    &palette,
                    domain::dates::today_utc(),
                );
            }
        }
        Commands::Show(args) => {
            let app = app::App::from_settings(&settings);
            let task = app.show(args.id)?;
            if args.json {
                print_json(&task);
            } else {
                ui::print_task_show(&task, &palette);
            }
        }
        Commands::Done(args) => {
            let app = app::App::from_settings(&settings);
            let done = !args.undo;
            for change in app.set_done(&args.ids, done)? {
                let verb = match (done, change.changed) {
                    (true, true) => "done",
                    (false, true) => "reopened",
                    (true, false) => "already done",
                    (false, false) => "already pending",
                };
                println!("{verb} #{} {}", change.id, change.text);
            }
        }
        Commands::Rm(args) => {
            let app = app::App::from_settings(&settings);
            let task = app.remove(args.id)?;
            println!("removed #{} {}", task.id, task.text);
        }
        Commands::Edit(args) => {
            let app = app::App::from_settings(&settings);
            let task = app.edit(args.id, &args.text.join(" "))?;
            println!("updated #{} {}", task.id, task.text);
        }
        Commands::Pri(args) => {
            let app = app::App::from_settings(&settings);
            let priority = args.priority.parse::<Priority>()?;
            let task = app.set_priority(args.id, priority)?;
            println!("#{} priority {}", task.id, display_or_none(task.priority.as_str()));
        }
        Commands::Due(args) => {
            let app = app::App::from_settings(&settings);
            let due = if args.due.trim().eq_ignore_ascii_case("none") {
                None
            } else {
                Some(domain::dates::parse_due(&args.due)?)
            };
            let task = app.set_due(args.id, due)?;
            let label = task
                .due
                .map(domain::dates::format_due)
                .unwrap_or_default();
            println!("#{} due {}", task.id, display_or_none(&label));
        }
        Commands::Tag(args) => {
            let app = app::App::from_settings(&settings);
            match args.command {
                TagSubcommands::Add(change) => {
                    let outcome = app.add_tag(change.id, &change.tag)?;
                    let verb = if outcome.changed { "tagged" } else { "already tagged" };
                    println!("{verb} #{} #{}", outcome.task.id, outcome.tag);
                }
                TagSubcommands::Rm(change) => {
                    let outcome = app.remove_tag(change.id, &change.tag)?;
                    let verb = if outcome.changed { "untagged" } else { "not tagged" };
                    println!("{verb} #{} #{}", outcome.task.id, outcome.tag);
                }
            }
        }
        Commands::Bug(args) => {
            let app = app::App::from_settings(&settings);
            let patch = BugPatch {
                status: args.status.as_deref().map(str::parse).transpose()?,
                assignee: args.assignee,
                severity: args.severity.as_deref().map(str::parse).transpose()?,
                steps: args.steps,
                environment: args.environment,
                clear: args.clear,
            };
            let task = app.update_bug(args.id, &patch)?;
            ui::print_task_show(&task, &palette);
        }
        Commands::ClearDone => {
            let app = app::App::from_settings(&settings);
            let removed = app.clear_done()?;
            println!("cleared {removed} done task(s)");
        }
        Commands::Archive => {
            let app = app::App::from_settings(&settings);
            let moved = app.archive_done()?;
            if moved == 0 {
                println!("nothing to archive");
            } else {
                println!(
                    "archived {moved} task(s) to {}",
                    app.archive_path().display()
                );
            }
        }
        Commands::Stats(args) => {
            let app = app::App::from_settings(&settings);
            let stats = app.stats()?;
            if args.json {
                print_json(&stats);
            } else {
                ui::print_stats(&stats, &palette);
            }
        }
        Commands::Doctor(args) => {
            let app = app::App::from_settings(&settings);
            let report = app.doctor(doctor::DoctorOptions {
                fix: args.fix,
                restore: args.restore,
            })?;
            if args.json {
                print_json(&report);
            } else {
                ui::print_doctor_report(&report, &palette);
            }
            if !report.ok() {
                return Err(app::AppError::InvalidArgument(format!(
                    "doctor found {} issue(s); {}",
                    report.issues.len(),
                    report.remedy()
                )));
            }
        }
        Commands::Migrate(args) => {
            let app = app::App::from_settings(&settings);
            let outcome = app.migrate(args.dry_run)?;
            ui::print_migration(&outcome, &palette);
        }
        Commands::Restore => {
            let app = app::App::from_settings(&settings);
            let backup = app.restore()?;
            println!(
                "restored {} from {}",
                app.path().display(),
                backup.display()
            );
        }
        Commands::Completions(args) => {
            completions::run_completions_command(args.shell.as_deref(), args.install)?;
        }
    }

    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf, app::AppError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

fn display_or_none(value: &str) -> &str {
    if value.is_empty() {
        "none"
    } else {
        value
    }
}
