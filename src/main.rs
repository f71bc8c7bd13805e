use std::{fs, path::PathBuf, process};

use anyhow::Context;
use log::LevelFilter;
use palc::Parser;

use cvm::{StdHost, Vm, VmConfig};

#[derive(Parser)]
#[command(name = "cvm", after_long_help = "Compiles a small C subset to bytecode and runs it.")]
struct Cli {
    /// Print the compiled bytecode instead of running it
    #[arg(short, long)]
    source: bool,
    /// Trace every executed instruction
    #[arg(short, long)]
    debug: bool,
    /// Heap and stack size in bytes
    #[arg(long)]
    pool_size: Option<usize>,
    /// C source file
    path: PathBuf,
    /// Arguments passed on to `main`
    args: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    let env = env_logger::Env::default().default_filter_or("warn");
    let mut logger = env_logger::Builder::from_env(env);
    if cli.debug {
        logger.filter_module("cvm", LevelFilter::Trace);
    }
    logger.init();

    match run(&cli) {
        Ok(code) => process::exit(code as i32),
        Err(e) => {
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<i64> {
    let source = fs::read(&cli.path)
        .with_context(|| format!("could not open({})", cli.path.display()))?;

    let program = cvm::compile(&source).context("compilation failed")?;
    if cli.source {
        print!("{}", program);
        return Ok(0);
    }

    let config = cli
        .pool_size
        .map(VmConfig::with_pool_size)
        .unwrap_or_default();
    let path = cli.path.to_string_lossy();
    let args: Vec<&str> = std::iter::once(path.as_ref())
        .chain(cli.args.iter().map(String::as_str))
        .collect();

    let mut vm = Vm::load(&program, &args, StdHost::new(), config)?;
    let code = vm.run().context("runtime error")?;
    Ok(code)
}
