#![forbid(unsafe_code)]

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use miette::{IntoDiagnostic, NamedSource, miette};
use wgsl_ir::transform::RobustnessConfig;

use wgslc::config::{self, Config};
use wgslc::{Compilation, CompileOptions, Emit};

#[derive(Parser, Debug)]
#[command(name = "wgslc", version, about = "WGSL front-end compiler")]
struct Cli {
    /// Configuration file. Defaults to the nearest `wgslc.toml` above the first input.
    #[arg(long)]
    config: Option<PathBuf>,

    /// What to print for each file that compiles.
    #[arg(long, value_enum)]
    emit: Option<Emit>,

    /// Keep only this entry point and what it uses.
    #[arg(long = "entry-point")]
    entry_point: Option<String>,

    /// Clamp dynamic indices into bounds.
    #[arg(long, default_value_t = false)]
    robustness: bool,

    /// Zero workgroup variables at the start of each compute entry point.
    #[arg(long = "zero-init-workgroup", default_value_t = false)]
    zero_init_workgroup: bool,

    /// Skip constant folding.
    #[arg(long = "no-fold", default_value_t = false)]
    no_fold: bool,

    /// Disable an extension or language feature (repeatable).
    #[arg(long = "disable")]
    disable: Vec<String>,

    /// Log stage boundaries at debug level.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn load_config(cli: &Cli) -> miette::Result<Config> {
    let path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => cli.files.first().and_then(|f| {
            let start = f.canonicalize().unwrap_or_else(|_| f.clone());
            config::find_config(&start)
        }),
    };
    match path {
        Some(path) => {
            log::debug!("using config {}", path.display());
            Ok(Config::load(&path)?)
        }
        None => Ok(Config::default()),
    }
}

/// File values first, then flags on top.
fn build_options(cli: &Cli, config: &Config) -> miette::Result<CompileOptions> {
    let mut options = config.compile_options()?;
    for name in &cli.disable {
        if !options.features.disable(name) {
            return Err(miette!("unknown feature '{name}'"));
        }
    }
    if cli.entry_point.is_some() {
        options.target.entry_point = cli.entry_point.clone();
    }
    if cli.robustness && options.target.robustness.is_none() {
        options.target.robustness = Some(RobustnessConfig::default());
    }
    if cli.zero_init_workgroup {
        options.target.zero_init_workgroup_memory = true;
    }
    if cli.no_fold {
        options.target.fold_constants = false;
    }
    Ok(options)
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn render_diagnostics(compilation: &Compilation, source: &str) {
    for d in compilation.diagnostics.iter() {
        let named = NamedSource::new(&compilation.file_name, source.to_string());
        let report = miette::Report::new(d.clone()).with_source_code(named);
        eprintln!("{report:?}");
    }
}

fn emit(out: &mut impl Write, compilation: &Compilation, emit: Emit, many: bool) -> io::Result<()> {
    let text = match emit {
        Emit::None => return Ok(()),
        Emit::Ir => match &compilation.module {
            Some(module) => wgsl_ir::disassemble(module),
            None => return Ok(()),
        },
        Emit::Ast => match &compilation.ast {
            Some(ast) => format!("{ast:#?}\n"),
            None => return Ok(()),
        },
    };
    if many {
        writeln!(out, "// {}", compilation.file_name)?;
    }
    out.write_all(text.as_bytes())
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    let options = build_options(&cli, &config)?;
    let mode = cli.emit.or(config.emit).unwrap_or_default();

    let mut inputs = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        let src = fs::read_to_string(path)
            .into_diagnostic()
            .map_err(|e| e.wrap_err(format!("failed to read {}", path.display())))?;
        inputs.push((display_path(path), src));
    }

    let results = wgslc::compile_many(&inputs, &options);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut failed = 0;
    for (compilation, (_, source)) in results.iter().zip(&inputs) {
        render_diagnostics(compilation, source);
        if !compilation.succeeded() {
            failed += 1;
        }
        emit(&mut out, compilation, mode, inputs.len() > 1).into_diagnostic()?;
    }
    out.flush().into_diagnostic()?;

    if failed > 0 {
        return Err(miette!(
            "{failed} of {} file(s) failed to compile",
            inputs.len()
        ));
    }
    Ok(())
}
