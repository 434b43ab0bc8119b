//! Purpose: `carpanel` CLI entry point.
//! Role: Binary crate root; parses args, picks the store once, runs one command.
//! Invariants: Successful commands print JSON on stdout.
//! Invariants: Errors are human text on a TTY and a JSON envelope otherwise, on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`; an unreachable
//! remote store exits non-zero before any record operation runs.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod serve;

use carpanel::api::{Car, CarFields, Error, ErrorKind, Field, to_exit_code};
use carpanel::config::{Backend, Config, DEFAULT_CONFIG_FILE};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome { exit_code });
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `carpanel --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing(cli.verbose);
    let color_mode = cli.color;
    let settings = Settings::from_cli(&cli).map_err(|err| (err, color_mode))?;

    command_dispatch::dispatch_command(cli.command, settings)
        .map_err(add_io_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "carpanel",
    version,
    about = "Manage car records in a JSON document server or a CSV file",
    long_about = None,
    after_help = r#"EXAMPLES
  $ carpanel serve --db cars.json          # Terminal 1: local document server
  $ carpanel add --brand Honda --model Civic --year 1999 --convertible no
  $ carpanel list
  $ carpanel --backend csv --file cars.csv get 4
  $ carpanel export --to cars.csv          # copy the configured store into a CSV file"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = DEFAULT_CONFIG_FILE,
        help = "Config file with the backend choice",
        value_hint = ValueHint::FilePath
    )]
    config: PathBuf,
    #[arg(long, value_enum, help = "Override the configured backend")]
    backend: Option<BackendCli>,
    #[arg(long, help = "Document server base url (json backend)")]
    url: Option<String>,
    #[arg(long, help = "CSV file path (csv backend)", value_hint = ValueHint::FilePath)]
    file: Option<PathBuf>,
    #[arg(long, help = "Request timeout in milliseconds (json backend)")]
    timeout_ms: Option<u64>,
    #[arg(short, long, action = clap::ArgAction::Count, help = "Log more (-v debug, -vv trace)")]
    verbose: u8,
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum BackendCli {
    Json,
    Csv,
}

impl From<BackendCli> for Backend {
    fn from(value: BackendCli) -> Self {
        match value {
            BackendCli::Json => Backend::Json,
            BackendCli::Csv => Backend::Csv,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "List every car, ascending by id")]
    List,
    #[command(about = "Show one car")]
    Get { id: String },
    #[command(about = "Add a car; the id defaults to the smallest unused one")]
    Add {
        #[arg(long)]
        id: Option<String>,
        #[command(flatten)]
        values: CarArgs,
    },
    #[command(about = "Change fields of an existing car; omitted fields keep their value")]
    Update {
        id: String,
        #[command(flatten)]
        values: CarPatchArgs,
    },
    #[command(about = "Delete a car")]
    Delete { id: String },
    #[command(name = "next-id", about = "Show the id the next added car would get")]
    NextId,
    #[command(about = "Copy every car from the configured store into a new CSV file")]
    Export {
        #[arg(long, value_hint = ValueHint::FilePath)]
        to: PathBuf,
        #[arg(long, help = "Overwrite the target file if it exists")]
        force: bool,
    },
    #[command(about = "Show or change the config file")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    #[command(about = "Run a local JSON document server for the /cars collection")]
    Serve {
        #[arg(long, default_value = "127.0.0.1:3000")]
        bind: SocketAddr,
        #[arg(long, help = "JSON file holding {\"cars\": [...]}", value_hint = ValueHint::FilePath)]
        db: Option<PathBuf>,
        #[arg(long)]
        allow_non_loopback: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    #[command(about = "Print the effective configuration")]
    Show,
    #[command(name = "set-backend", about = "Persist the backend choice")]
    SetBackend {
        #[arg(value_enum)]
        backend: BackendCli,
    },
}

#[derive(clap::Args)]
struct CarArgs {
    #[arg(long)]
    brand: String,
    #[arg(long)]
    model: String,
    #[arg(long)]
    year: String,
    #[arg(long, help = "yes/no or true/false")]
    convertible: String,
}

#[derive(clap::Args)]
struct CarPatchArgs {
    #[arg(long)]
    brand: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    year: Option<String>,
    #[arg(long, help = "yes/no or true/false")]
    convertible: Option<String>,
}

impl CarArgs {
    fn into_fields(self, id: Option<String>) -> CarFields {
        let mut fields = CarFields::new();
        if let Some(id) = id {
            fields.insert(Field::Id.name().to_string(), id);
        }
        fields.insert(Field::Brand.name().to_string(), self.brand);
        fields.insert(Field::Model.name().to_string(), self.model);
        fields.insert(Field::ProductionYear.name().to_string(), self.year);
        fields.insert(Field::Convertible.name().to_string(), self.convertible);
        fields
    }
}

impl CarPatchArgs {
    fn into_fields(self) -> CarFields {
        [
            (Field::Brand, self.brand),
            (Field::Model, self.model),
            (Field::ProductionYear, self.year),
            (Field::Convertible, self.convertible),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|value| (field.name().to_string(), value)))
        .collect()
    }
}

/// Config file values with command-line overrides applied.
struct Settings {
    config_path: PathBuf,
    config: Config,
}

impl Settings {
    fn from_cli(cli: &Cli) -> Result<Self, Error> {
        let mut config = Config::load(&cli.config)?;
        if let Some(backend) = cli.backend {
            config.backend = backend.into();
        }
        if let Some(url) = &cli.url {
            config.remote.base_url = url.clone();
        }
        if let Some(file) = &cli.file {
            config.csv.path = file.clone();
        }
        if let Some(timeout_ms) = cli.timeout_ms {
            config.remote.timeout_ms = timeout_ms;
        }
        Ok(Self {
            config_path: cli.config.clone(),
            config,
        })
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_env("CARPANEL_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Io => err.with_hint("I/O error. Check the path, permissions, and disk space."),
        ErrorKind::Remote => {
            err.with_hint("The document server did not complete the request. Retry or check its log.")
        }
        ErrorKind::Validation => err.with_hint(format!(
            "Years must be {}-{}; convertible is yes/no/true/false; ids are positive integers.",
            carpanel::api::MIN_PRODUCTION_YEAR,
            carpanel::api::MAX_PRODUCTION_YEAR
        )),
        _ => err,
    }
}

fn car_json(car: &Car) -> Value {
    serde_json::to_value(car).unwrap_or(Value::Null)
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    err.message()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:?}", err.kind()))
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut current = err.source();
    while let Some(source) = current {
        causes.push(source.to_string());
        current = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(field) = err.field() {
        inner.insert("field".to_string(), json!(field.name()));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(status) = err.status() {
        inner.insert("status".to_string(), json!(status));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = vec![format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    )];
    let label = |name: &str| colorize_label(name, use_color, AnsiColor::Yellow);

    if let Some(hint) = err.hint() {
        lines.push(format!("{} {hint}", label("hint:")));
    }
    if let Some(path) = err.path() {
        lines.push(format!("{} {}", label("path:"), path.display()));
    }
    if let Some(status) = err.status() {
        lines.push(format!("{} {status}", label("status:")));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("{} {cause}", label("caused by:")));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
