// File: ./src/cli.rs
//! Command-line parsing and help text for the `mdsync` binary.
use anyhow::Result;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Keep syncing until interrupted.
    Watch { root: Option<PathBuf> },
    /// One pass, then exit.
    Scan { root: Option<PathBuf> },
    Lists,
    Show { list: String },
    /// Write a config file pointing at `root`.
    Init { root: PathBuf },
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: Command,
    /// `--root`: directory for config and data instead of the platform default.
    pub override_root: Option<PathBuf>,
}

/// Parses `args` (without the binary name).
///
/// No command means `watch`. Global flags may appear anywhere.
pub fn parse_args(args: &[String]) -> Result<Invocation> {
    let mut override_root = None;
    let mut positional: Vec<&str> = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-r" | "--root" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("{} requires a directory", arg))?;
                override_root = Some(PathBuf::from(value));
            }
            "-h" | "--help" | "help" => {
                return Ok(Invocation {
                    command: Command::Help,
                    override_root,
                });
            }
            flag if flag.starts_with('-') && flag.len() > 1 => {
                anyhow::bail!("Unknown option '{}'", flag);
            }
            other => positional.push(other),
        }
    }

    let mut rest = positional.into_iter();
    let command = match rest.next() {
        None => Command::Watch { root: None },
        Some("watch") => Command::Watch {
            root: rest.next().map(PathBuf::from),
        },
        Some("scan") => Command::Scan {
            root: rest.next().map(PathBuf::from),
        },
        Some("lists") => Command::Lists,
        Some("show") => Command::Show {
            list: rest
                .next()
                .ok_or_else(|| anyhow::anyhow!("show requires a list name"))?
                .to_string(),
        },
        Some("init") => Command::Init {
            root: rest
                .next()
                .map(PathBuf::from)
                .ok_or_else(|| anyhow::anyhow!("init requires a directory to watch"))?,
        },
        Some(other) => anyhow::bail!("Unknown command '{}'. Try --help.", other),
    };

    if let Some(extra) = rest.next() {
        anyhow::bail!("Unexpected argument '{}'", extra);
    }

    Ok(Invocation {
        command,
        override_root,
    })
}

pub fn print_help(binary_name: &str) {
    println!(
        "mdsync v{} - Keep Markdown checklists and reminders in sync",
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("USAGE:");
    println!("    {} [--root <path>] [watch [<dir>]]", binary_name);
    println!("    {} scan [<dir>]", binary_name);
    println!("    {} lists", binary_name);
    println!("    {} show <list>", binary_name);
    println!("    {} init <dir>", binary_name);
    println!("    {} --help", binary_name);
    println!();
    println!("COMMANDS:");
    println!("    watch [<dir>]         Sync continuously until Ctrl-C (default).");
    println!("    scan [<dir>]          Run a single pass and print what changed.");
    println!("    lists                 Show the lists in the reminders store.");
    println!("    show <list>           Show the reminders of one list.");
    println!("    init <dir>            Create a config file that watches <dir>.");
    println!();
    println!("OPTIONS:");
    println!("    -r, --root <path>     Use a different directory for config and data.");
    println!("    -h, --help            Show this help message.");
    println!();
    println!("FILES:");
    println!("    Every '<List>.todo.md' under the watched directory is synced with");
    println!("    the reminders list '<List>'. Lines look like:");
    println!("        - [ ] Buy milk");
    println!("        - [x] Call mom – Saturday 12 Jul at 9:00 PM");
    println!("    Reminders created elsewhere are added under '## Added in Reminders'.");
    println!();
}
