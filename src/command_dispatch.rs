//! Purpose: Hold top-level CLI command dispatch for `carpanel`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: The store is opened once per command, after config overrides are applied.
//! Invariants: Commands that need no store (`config`, `serve`) never probe the server.

use super::*;
use carpanel::api::{CarPanel, CsvStore, parse_id};

pub(super) fn dispatch_command(
    command: Command,
    settings: Settings,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Config { command } => {
            match command {
                ConfigCommand::Show => {
                    let value = serde_json::to_value(&settings.config).map_err(|err| {
                        Error::new(ErrorKind::Internal)
                            .with_message("failed to encode config")
                            .with_source(err)
                    })?;
                    emit_json(json!({
                        "path": settings.config_path.display().to_string(),
                        "config": value,
                    }));
                }
                ConfigCommand::SetBackend { backend } => {
                    // Persist only the backend; other overrides stay per-invocation.
                    let mut config = Config::load(&settings.config_path)?;
                    config.backend = backend.into();
                    config.save(&settings.config_path)?;
                    emit_json(json!({
                        "path": settings.config_path.display().to_string(),
                        "backend": config.backend.to_string(),
                        "note": "restart running panels to switch backends",
                    }));
                }
            }
            Ok(RunOutcome::ok())
        }
        Command::Serve {
            bind,
            db,
            allow_non_loopback,
        } => {
            let config = serve::ServeConfig {
                bind,
                db_path: db,
                allow_non_loopback,
            };
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config))?;
            Ok(RunOutcome::ok())
        }
        command => {
            if let Command::Export { to, .. } = &command {
                ensure_export_target(&settings.config, to)?;
            }
            let panel = CarPanel::new(settings.config.open_store()?);
            run_record_command(command, &panel)
        }
    }
}

fn run_record_command(command: Command, panel: &CarPanel) -> Result<RunOutcome, Error> {
    match command {
        Command::List => {
            let cars = panel.list()?;
            let values: Vec<Value> = cars.iter().map(car_json).collect();
            emit_json(json!({ "backend": panel.backend(), "cars": values }));
        }
        Command::Get { id } => {
            let id = parse_id(&id)?;
            let Some(car) = panel.get(id)? else {
                return Err(Error::new(ErrorKind::NotFound)
                    .with_message(format!("car {id} not found"))
                    .with_hint("List ids with `carpanel list`."));
            };
            emit_json(car_json(&car));
        }
        Command::Add { id, values } => {
            let car = panel.add(values.into_fields(id))?;
            emit_json(json!({ "created": car_json(&car) }));
        }
        Command::Update { id, values } => {
            let id = parse_id(&id)?;
            let changes = values.into_fields();
            if changes.is_empty() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("update needs at least one field to change")
                    .with_hint("Pass --brand, --model, --year, or --convertible."));
            }
            let car = panel.patch(id, &changes)?;
            emit_json(json!({ "updated": car_json(&car) }));
        }
        Command::Delete { id } => {
            let id = parse_id(&id)?;
            panel.remove(id)?;
            emit_json(json!({ "deleted": id }));
        }
        Command::NextId => {
            let id = panel.next_id()?;
            emit_json(json!({ "next_id": id }));
        }
        Command::Export { to, force } => {
            if to.exists() && !force {
                return Err(Error::new(ErrorKind::AlreadyExists)
                    .with_message("export target already exists")
                    .with_path(&to)
                    .with_hint("Re-run with --force to overwrite or choose another path."));
            }
            let target = CsvStore::init(&to, &[])?;
            let exported = panel.copy_to(&target)?;
            emit_json(json!({
                "from": panel.backend(),
                "path": to.display().to_string(),
                "exported": exported,
            }));
        }
        Command::Config { .. } | Command::Serve { .. } => {
            return Err(Error::new(ErrorKind::Internal)
                .with_message("command does not operate on records"));
        }
    }
    Ok(RunOutcome::ok())
}

/// Export truncates its target first, so it must never be the file being read.
fn ensure_export_target(config: &Config, to: &std::path::Path) -> Result<(), Error> {
    if config.backend != Backend::Csv {
        return Ok(());
    }
    let same_file = match (std::fs::canonicalize(&config.csv.path), std::fs::canonicalize(to)) {
        (Ok(source), Ok(target)) => source == target,
        _ => false,
    };
    if same_file {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("export target is the configured csv file")
            .with_path(to)
            .with_hint("Choose a different --to path."));
    }
    Ok(())
}
