//! xkb-group CLI
//!
//! Show and switch the active keyboard group of the X session.

mod render;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use xkb_group::{Session, SessionOptions, SymbolTable, X11Backend, XkbBackend};
use xkb_group_config::{Config, LogLevel, DEFAULT_CONFIG_PATH};

use crate::render::Snapshot;

#[derive(Parser, Debug)]
#[command(name = "xkb-group")]
#[command(about = "Show and switch the active XKB keyboard group")]
#[command(version)]
struct Cli {
    /// Path to configuration file [default: ~/.config/xkb-group/config.kdl]
    #[arg(short, long)]
    config: Option<String>,

    /// X display to connect to (overrides the config file and $DISPLAY)
    #[arg(short, long)]
    display: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(flatten)]
    Group(GroupCommand),

    /// Decode a symbols string without contacting the X server
    Symbols {
        /// Symbols string, e.g. "pc+us+ru(phonetic):2+inet(evdev)"
        raw: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Validate the configuration file
    Validate,
}

/// Commands that talk to the X server
#[derive(Subcommand, Debug)]
enum GroupCommand {
    /// Show all groups and the current one
    Show {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List groups, marking the current one
    List {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the current group number
    Get,

    /// Switch to a group by number
    Set {
        /// Group number, starting at 0
        num: u8,
    },

    /// Switch to a group by its name (e.g. "English (US)")
    SetName { name: String },

    /// Switch to a group by its layout symbol (e.g. "us")
    SetSymbol { symbol: String },

    /// Switch to the next group, wrapping around
    Next,

    /// Switch to the previous group, wrapping around
    Prev,

    /// Cycle through groups, printing the state after each switch
    Demo,
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Expand tilde in config path
    let (config_path, required) = match &cli.config {
        Some(path) => (expand_path(path), true),
        None => (expand_path(DEFAULT_CONFIG_PATH), false),
    };

    match cli.command {
        Commands::Validate => {
            init_tracing(LogLevel::default());
            cmd_validate(&config_path)
        }
        Commands::Symbols { raw, json } => {
            let options = load_options(&config_path, required, cli.display)?;
            cmd_symbols(&raw, &options, json)
        }
        Commands::Group(command) => {
            let options = load_options(&config_path, required, cli.display)?;
            let mut session = Session::open_with(X11Backend::new(), options).into_diagnostic()?;
            run(&mut session, command)
        }
    }
}

/// Load the configuration, start logging and build the session options
fn load_options(
    config_path: &Path,
    required: bool,
    display: Option<String>,
) -> miette::Result<SessionOptions> {
    let config = xkb_group_config::load_config(config_path, required)?;
    init_tracing(config.global.log_level);
    tracing::debug!(path = %config_path.display(), "Configuration loaded");

    Ok(session_options(&config, display))
}

fn init_tracing(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_filter())),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn expand_path(path: &str) -> PathBuf {
    shellexpand::tilde(path).into_owned().into()
}

fn session_options(config: &Config, display: Option<String>) -> SessionOptions {
    let defaults = SessionOptions::default();
    SessionOptions {
        display: display.or_else(|| config.display.clone()),
        ignored_symbols: config
            .ignore_symbols
            .clone()
            .unwrap_or(defaults.ignored_symbols),
    }
}

fn run<B: XkbBackend>(session: &mut Session<B>, command: GroupCommand) -> miette::Result<()> {
    match command {
        GroupCommand::Show { json } => cmd_show(session, json),
        GroupCommand::List { json } => cmd_list(session, json),
        GroupCommand::Get => {
            println!("{}", session.group_num().into_diagnostic()?);
            Ok(())
        }
        GroupCommand::Set { num } => {
            session.set_group_num(num).into_diagnostic()?;
            print_current(session)
        }
        GroupCommand::SetName { name } => {
            session.set_group_name(&name).into_diagnostic()?;
            print_current(session)
        }
        GroupCommand::SetSymbol { symbol } => {
            session.set_group_symbol(&symbol).into_diagnostic()?;
            print_current(session)
        }
        GroupCommand::Next => {
            session.rotate_group(1).into_diagnostic()?;
            print_current(session)
        }
        GroupCommand::Prev => {
            session.rotate_group(-1).into_diagnostic()?;
            print_current(session)
        }
        GroupCommand::Demo => cmd_demo(session),
    }
}

fn cmd_show<B: XkbBackend>(session: &mut Session<B>, json: bool) -> miette::Result<()> {
    let snapshot = Snapshot::capture(session).into_diagnostic()?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&snapshot).into_diagnostic()?
        );
    } else {
        println!("{}", render::render_block(&snapshot));
    }
    Ok(())
}

fn cmd_list<B: XkbBackend>(session: &mut Session<B>, json: bool) -> miette::Result<()> {
    let groups = session.groups_data().into_diagnostic()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&groups).into_diagnostic()?);
    } else {
        let current = session.group_num().into_diagnostic()?;
        println!("{}", render::render_list(&groups, current));
    }
    Ok(())
}

fn print_current<B: XkbBackend>(session: &mut Session<B>) -> miette::Result<()> {
    let current = session.group_data().into_diagnostic()?;
    println!("{}", render::describe(&current));
    Ok(())
}

fn cmd_demo<B: XkbBackend>(session: &mut Session<B>) -> miette::Result<()> {
    println!("{}", render::render_block(&Snapshot::capture(session).into_diagnostic()?));

    for delta in [2, -3, -2] {
        session.rotate_group(delta).into_diagnostic()?;
        println!("{}", render::render_block(&Snapshot::capture(session).into_diagnostic()?));
    }
    Ok(())
}

fn cmd_symbols(raw: &str, options: &SessionOptions, json: bool) -> miette::Result<()> {
    let table = SymbolTable::parse(raw, options.ignored_symbols.as_slice()).into_diagnostic()?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(table.records()).into_diagnostic()?
        );
    } else {
        println!("{}", render::render_symbols(&table));
    }
    Ok(())
}

fn cmd_validate(config_path: &Path) -> miette::Result<()> {
    println!("Validating configuration: {}", config_path.display());

    let config = xkb_group_config::parse_config(config_path)?;

    println!("Configuration is valid!");
    println!("  Log level: {}", config.global.log_level.as_filter());
    println!(
        "  Display: {}",
        config.display.as_deref().unwrap_or("<from $DISPLAY>")
    );
    match &config.ignore_symbols {
        Some(symbols) => println!("  Ignored symbols: {}", symbols.join(", ")),
        None => println!("  Ignored symbols: <default>"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_flag_overrides_config() {
        let config = Config {
            display: Some(":0".to_string()),
            ..Config::default()
        };

        let options = session_options(&config, Some(":5".to_string()));
        assert_eq!(options.display, Some(":5".to_string()));

        let options = session_options(&config, None);
        assert_eq!(options.display, Some(":0".to_string()));
    }

    #[test]
    fn test_ignored_symbols_default_when_unconfigured() {
        let options = session_options(&Config::default(), None);
        assert_eq!(options.ignored_symbols, SessionOptions::default().ignored_symbols);

        let config = Config {
            ignore_symbols: Some(vec!["pc105".to_string()]),
            ..Config::default()
        };
        assert_eq!(
            session_options(&config, None).ignored_symbols,
            vec!["pc105".to_string()]
        );
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["xkb-group", "--display", ":1", "set", "2"]).unwrap();
        assert_eq!(cli.display, Some(":1".to_string()));
        assert!(matches!(cli.command, Commands::Group(GroupCommand::Set { num: 2 })));

        let cli = Cli::try_parse_from(["xkb-group", "set-symbol", "ru"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Group(GroupCommand::SetSymbol { ref symbol }) if symbol == "ru"
        ));

        let cli = Cli::try_parse_from(["xkb-group", "symbols", "pc+us"]).unwrap();
        assert!(matches!(cli.command, Commands::Symbols { ref raw, json: false } if raw == "pc+us"));

        assert!(Cli::try_parse_from(["xkb-group", "set", "-1"]).is_err());
    }
}
