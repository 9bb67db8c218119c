//! Command-line interface for dynaload plugin modules.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use dynaload_core::config::env_vars;
use dynaload_core::host::discover_in;
use dynaload_core::{
    HostTables, InstalledModule, LoaderBackend, LoaderConfig, ModuleLoader, NativeBackend,
    PluginHost, Store, SymbolNaming, Value,
};
use serde_json::json;

/// Dynaload - load and call native plugin modules.
#[derive(Parser, Debug)]
#[command(name = "dynaload")]
#[command(author, version, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Loader configuration file (TOML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Show a module's evaluation string and function table.
    Info {
        /// Path to the module.
        #[arg(required = true)]
        path: PathBuf,
    },
    /// Check that a module loads and accepts the host tables.
    Validate {
        /// Path to the module.
        #[arg(required = true)]
        path: PathBuf,
    },
    /// List plugin modules in the search paths.
    List {
        /// Directory to scan instead of the configured search paths.
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Call one function of a module and print the resulting store.
    Call {
        /// Path to the module.
        #[arg(required = true)]
        path: PathBuf,
        /// Function name or index.
        #[arg(required = true)]
        function: String,
        /// Store entry as key=type:value (int, double, str, ptr).
        #[arg(short = 'a', long = "arg")]
        args: Vec<String>,
        /// Print the store as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match &args.config {
        Some(path) => LoaderConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => LoaderConfig::from_env()?,
    };

    match args.command {
        Command::Info { path } => run_info(&config, &path),
        Command::Validate { path } => run_validate(&config, &path),
        Command::List { dir } => run_list(config, dir),
        Command::Call {
            path,
            function,
            args,
            json,
        } => run_call(&config, &path, &function, &args, json),
    }
}

fn init_logging(verbose: bool) {
    // Check if JSON logging is requested
    let json_logging = std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_directive = if verbose { "dynaload=debug" } else { "dynaload=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }
}

fn run_info(config: &LoaderConfig, path: &Path) -> Result<()> {
    let module = ModuleLoader::with_config(config.clone()).open(path)?;

    println!("Module:   {}", module.path().display());
    println!("Backend:  {}", NativeBackend::NAME);
    println!("LoadOnce: {}", if module.load_once() { "yes" } else { "no" });
    println!("Symbols:  {}", naming_label(SymbolNaming::BUILD));
    println!("Evalstr:  {}", module.evalstr());
    println!("Functions ({}):", module.functions().len());
    for (index, entry) in module.functions().iter().enumerate() {
        if entry.signature().is_empty() {
            println!("  [{}] {}", index, entry.name());
        } else {
            println!("  [{}] {}  ({})", index, entry.name(), entry.signature());
        }
    }

    module.close()?;
    Ok(())
}

fn naming_label(naming: SymbolNaming) -> &'static str {
    match naming {
        SymbolNaming::Plain => "plain",
        SymbolNaming::Underscored => "underscore-prefixed",
    }
}

fn open_installed(config: &LoaderConfig, path: &Path) -> Result<InstalledModule> {
    let module = ModuleLoader::with_config(config.clone())
        .open(path)?
        .install(&HostTables::default())?;
    Ok(module)
}

fn run_validate(config: &LoaderConfig, path: &Path) -> Result<()> {
    let module = open_installed(config, path)?;
    println!(
        "OK: {} ({} functions)",
        module.path().display(),
        module.functions().len()
    );
    module.close()?;
    Ok(())
}

fn run_list(config: LoaderConfig, dir: Option<PathBuf>) -> Result<()> {
    let found = match dir {
        Some(dir) => {
            if !dir.is_dir() {
                bail!("Not a directory: {}", dir.display());
            }
            discover_in(&[dir])
        }
        None => PluginHost::with_config(config).discover(),
    };

    if found.is_empty() {
        println!("No plugins found.");
        return Ok(());
    }
    for path in found {
        println!("{}", path.display());
    }
    Ok(())
}

/// Parses `key=type:value`.
fn parse_store_arg(arg: &str) -> Result<(String, Value)> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected key=type:value, got `{}`", arg))?;
    if key.is_empty() {
        bail!("Empty key in `{}`", arg);
    }
    let value: Value = value.parse().with_context(|| format!("Invalid argument `{}`", arg))?;
    Ok((key.to_string(), value))
}

fn run_call(
    config: &LoaderConfig,
    path: &Path,
    function: &str,
    args: &[String],
    json_output: bool,
) -> Result<()> {
    let mut store = Store::new();
    for arg in args {
        let (key, value) = parse_store_arg(arg)?;
        store.set(key, value);
    }

    let module = open_installed(config, path)?;
    match module.functions().position(function) {
        Some(index) => module.call(index, &mut store)?,
        None => match function.parse::<usize>() {
            Ok(index) => module.call(index, &mut store)?,
            Err(_) => module.call_by_name(function, &mut store)?,
        },
    }

    if json_output {
        let map: serde_json::Map<String, serde_json::Value> = store
            .sorted()
            .into_iter()
            .map(|(key, value)| (key.to_string(), value_to_json(value)))
            .collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
    } else {
        for (key, value) in store.sorted() {
            println!("{} = {}", key, value);
        }
    }

    module.close()?;
    Ok(())
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Int(v) => json!(v),
        Value::Double(v) => json!(v),
        Value::Str(v) => json!(v.to_string_lossy()),
        Value::Pointer(p) => json!(format!("{:#x}", *p as usize)),
        Value::Object(o) => json!({ "class": o.class(), "ptr": format!("{:#x}", o.as_ptr() as usize) }),
    }
}
