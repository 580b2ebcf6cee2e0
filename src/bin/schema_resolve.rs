//! Resolves a schema expression against a runtime snapshot and prints JSON.
//!
//! With `--module`, resolution follows the include pipeline: that module's
//! wires first, then the registry fallback. Without it (or with `--all`) the
//! registry is scanned directly. `--all` prints every match as an array;
//! otherwise the single chosen resource is printed and an unresolved
//! expression exits non-zero.

use anyhow::{Context, Result, anyhow, bail};
use schemalink::config::ResolverConfig;
use schemalink::{
    IncludeResolver, ModuleId, RuntimeSnapshot, StateMask, compile, resolve_via_registry,
    schema_expression,
};
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SCHEMALINK_LOG";
const SNAPSHOT_ENV: &str = "SCHEMALINK_SNAPSHOT";

fn main() {
    init_logging();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse()?;
    let snapshot = RuntimeSnapshot::load(&cli.snapshot)?;

    let mut config = ResolverConfig::from_env()?;
    if let Some(states) = cli.states {
        config.fallback_states = states;
    }
    if cli.no_fallback {
        config.registry_fallback = false;
    }

    if cli.all {
        let filter = compile(&cli.expression)?;
        let matches = resolve_via_registry(&snapshot, &filter, config.fallback_states).to_vec();
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }

    let resolved = match cli.module {
        Some(module) => {
            if snapshot.module(module).is_none() {
                bail!("module {module} is not present in {}", cli.snapshot.display());
            }
            IncludeResolver::new(&snapshot, config).resolve(&cli.expression, module)?
        }
        None => {
            if !config.registry_fallback {
                bail!("--module is required when the registry fallback is disabled");
            }
            let filter = compile(&cli.expression)?;
            resolve_via_registry(&snapshot, &filter, config.fallback_states)
                .first()
                .ok_or_else(|| {
                    anyhow!(
                        "no module in states '{}' provides schema expression '{}'",
                        config.fallback_states,
                        cli.expression
                    )
                })?
        }
    };
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}

struct Cli {
    snapshot: PathBuf,
    module: Option<ModuleId>,
    states: Option<StateMask>,
    all: bool,
    no_fallback: bool,
    expression: String,
}

impl Cli {
    fn parse() -> Result<Self> {
        let mut args = env::args_os().skip(1);
        let mut snapshot: Option<PathBuf> = env::var_os(SNAPSHOT_ENV).map(PathBuf::from);
        let mut module = None;
        let mut states = None;
        let mut all = false;
        let mut no_fallback = false;
        let mut expression: Option<String> = None;

        while let Some(arg_os) = args.next() {
            let arg = os_to_string(arg_os)?;
            match arg.as_str() {
                "--snapshot" => snapshot = Some(PathBuf::from(next_value(&mut args, "--snapshot")?)),
                "--module" => {
                    let raw = next_value(&mut args, "--module")?;
                    let id = raw
                        .parse::<u64>()
                        .with_context(|| format!("Failed to parse --module '{raw}' as a module id"))?;
                    module = Some(ModuleId(id));
                }
                "--states" => states = Some(StateMask::parse(&next_value(&mut args, "--states")?)?),
                "--all" => all = true,
                "--no-fallback" => no_fallback = true,
                "--help" | "-h" => {
                    println!("{}", usage());
                    std::process::exit(0);
                }
                flag if flag.starts_with("--") => bail!("Unknown option {flag}\n\n{}", usage()),
                value => {
                    if expression.is_some() {
                        bail!("Only one schema expression may be given\n\n{}", usage());
                    }
                    expression = Some(value.to_string());
                }
            }
        }

        let snapshot = snapshot
            .ok_or_else(|| anyhow!("Missing --snapshot (or {SNAPSHOT_ENV})\n\n{}", usage()))?;
        let expression =
            expression.ok_or_else(|| anyhow!("Missing schema expression\n\n{}", usage()))?;
        let expression = schema_expression(&expression)
            .map(str::to_string)
            .unwrap_or(expression);

        Ok(Self {
            snapshot,
            module,
            states,
            all,
            no_fallback,
            expression,
        })
    }
}

fn next_value(args: &mut impl Iterator<Item = OsString>, flag: &str) -> Result<String> {
    let value = args.next().ok_or_else(|| anyhow!("Missing value for {flag}"))?;
    os_to_string(value)
}

fn os_to_string(value: OsString) -> Result<String> {
    value
        .into_string()
        .map_err(|raw| anyhow!("Invalid UTF-8 in argument {raw:?}"))
}

fn usage() -> &'static str {
    "Usage: schema-resolve --snapshot PATH [--module ID] [--states LIST] [--all] [--no-fallback] EXPRESSION\n\n\
Options:\n  --snapshot PATH   runtime snapshot JSON (default: $SCHEMALINK_SNAPSHOT)\n  --module ID       including module; its wires are consulted first\n  --states LIST     module states accepted by the registry scan (e.g. resolved,active)\n  --all             print every registry match instead of the first\n  --no-fallback     never scan the registry when wiring finds nothing\n"
}
