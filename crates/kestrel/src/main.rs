use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use kestrel_core::metadata::TargetMetadata;
use kestrel_core::types::{Address, ProcessId};
use kestrel_core::{Program, ProgramConfig, Result as ProgramResult};
use kestrel_utils::{c_string, info, init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingGuard};

/// Inspect a core dump, the running kernel, or a running process.
#[derive(Parser, Debug)]
#[command(name = "kestrel")]
#[command(version)]
#[command(about = "Inspect core dumps, the live kernel, and live processes", long_about = None)]
struct Cli
{
    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Report missing debug information as warnings
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    /// Directory to use in place of /proc
    #[arg(long, global = true)]
    proc_root: Option<PathBuf>,

    /// Kernel image with debug information
    #[arg(long, global = true)]
    vmlinux: Option<PathBuf>,

    #[command(subcommand)]
    target: Target,
}

#[derive(Subcommand, Debug)]
enum Target
{
    /// Open an ELF core dump (userspace core or vmcore)
    Core
    {
        /// Path to the core dump
        path: PathBuf,
        #[command(flatten)]
        queries: Queries,
    },
    /// Open the running kernel through /proc/kcore
    Kernel
    {
        #[command(flatten)]
        queries: Queries,
    },
    /// Open a running process by PID
    Pid
    {
        /// Process ID (PID) to open
        pid: ProcessId,
        #[command(flatten)]
        queries: Queries,
    },
}

impl Target
{
    fn queries(&self) -> &Queries
    {
        match self {
            Target::Core { queries, .. } | Target::Kernel { queries } | Target::Pid { queries, .. } => queries,
        }
    }
}

/// Lookups to run once the program is open
#[derive(Args, Debug)]
struct Queries
{
    /// Attribute an address to a symbol and mapping (hex 0x1000 or decimal)
    #[arg(long = "address", value_parser = parse_number)]
    addresses: Vec<u64>,

    /// Look up a symbol by name
    #[arg(long = "symbol")]
    symbols: Vec<String>,

    /// Look up a type by name (e.g. "struct task_struct")
    #[arg(long = "type")]
    types: Vec<String>,

    /// Read memory starting at this address
    #[arg(long, value_parser = parse_number)]
    read: Option<u64>,

    /// Number of bytes to read with --read
    #[arg(short, long, default_value_t = 16)]
    length: usize,
}

fn parse_number(text: &str) -> Result<u64, String>
{
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|err| format!("invalid number '{text}': {err}"))
}

fn main()
{
    let cli = Cli::parse();

    let _guard = match start_logging(cli.log_level) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run(&cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn start_logging(level: Option<LogLevel>) -> Result<LoggingGuard, kestrel_utils::LoggingError>
{
    match level {
        Some(level) => init_logging_with_level(level, LogFormat::Pretty),
        None => init_logging(),
    }
}

fn config_for(cli: &Cli) -> ProgramConfig
{
    let mut config = ProgramConfig::from_env();
    if cli.verbose {
        config = config.verbose(true);
    }
    if let Some(root) = &cli.proc_root {
        config = config.with_proc_root(root);
    }
    if let Some(vmlinux) = &cli.vmlinux {
        config = config.with_vmlinux(vmlinux);
    }
    config
}

fn run(cli: &Cli) -> ProgramResult<()>
{
    let config = config_for(cli);
    let program = match &cli.target {
        Target::Core { path, .. } => {
            info!("Opening core dump {}", path.display());
            Program::from_core_dump(path, &config)?
        }
        Target::Kernel { .. } => {
            info!("Opening running kernel");
            Program::from_kernel(&config)?
        }
        Target::Pid { pid, .. } => {
            info!("Opening process {}", pid);
            Program::from_pid(*pid, &config)?
        }
    };

    print_program_info(&program);
    run_queries(&program, cli.target.queries())
}

fn print_program_info(program: &Program)
{
    println!("Program Information:");
    println!("  Kind: {}", if program.is_kernel() { "Linux kernel" } else { "userspace" });
    println!("  Platform: {}", program.platform());
    println!("  Word Size: {}", program.word_size());
    println!("  Flags: {:?}", program.flags());
    println!("  Live: {}", program.is_live());
    println!("  Symbols: {}", program.symbol_count());

    match program.metadata() {
        TargetMetadata::Kernel(info) => {
            println!("  Release: {}", c_string(info.osrelease().as_bytes()));
            println!("  KASLR Offset: 0x{:x}", info.kaslr_offset());
        }
        TargetMetadata::Process(mappings) => {
            println!("  Mappings: {}", mappings.len());
            let width = usize::from(program.word_size()) * 2;
            for mapping in mappings.as_slice() {
                println!(
                    "    {:0width$x}-{:0width$x} {:08x} {}{}",
                    mapping.start(),
                    mapping.end(),
                    mapping.file_offset(),
                    c_string(mapping.path().as_bytes()),
                    if mapping.elf().is_some() { "" } else { " (no ELF)" },
                );
            }
        }
    }
}

fn run_queries(program: &Program, queries: &Queries) -> ProgramResult<()>
{
    for name in &queries.symbols {
        match program.find_symbol(name) {
            Some(symbol) => println!(
                "symbol {}: 0x{:x} (size {})",
                c_string(name.as_bytes()),
                symbol.address,
                symbol.size
            ),
            None => println!("symbol {}: not found", c_string(name.as_bytes())),
        }
    }

    for &value in &queries.addresses {
        let address = Address::new(value);
        let symbol = program
            .symbol_at(address)
            .map(|symbol| format!("{}+0x{:x}", symbol.name, value.wrapping_sub(symbol.address)));
        let mapping = program
            .process_mappings()
            .and_then(|mappings| mappings.lookup(program.platform().mask_address(address)))
            .map(|hit| format!("{}+0x{:x}", hit.mapping.path(), hit.file_offset));
        println!(
            "address {address}: symbol {}, mapping {}",
            symbol.as_deref().unwrap_or("-"),
            mapping.as_deref().unwrap_or("-"),
        );
    }

    for name in &queries.types {
        match program.find_type(name)? {
            Some(ty) => {
                let size = ty.size.map_or_else(|| "incomplete".to_string(), |size| size.to_string());
                println!("type {}: {:?}, size {size}", ty.display_name(), ty.kind);
                for member in &ty.members {
                    println!(
                        "    {} {} @ bit {}",
                        member.type_name.as_deref().unwrap_or("?"),
                        member.name.as_deref().unwrap_or("<anonymous>"),
                        member.bit_offset.map_or_else(|| "?".to_string(), |offset| offset.to_string()),
                    );
                }
                for enumerator in &ty.enumerators {
                    println!("    {} = {}", enumerator.name, enumerator.value);
                }
            }
            None => println!("type {}: not found", c_string(name.as_bytes())),
        }
    }

    if let Some(start) = queries.read {
        let bytes = program.read(Address::new(start), queries.length)?;
        print_hexdump(program, start, &bytes);
    }

    Ok(())
}

fn print_hexdump(program: &Program, start: u64, bytes: &[u8])
{
    let width = usize::from(program.word_size()) * 2;
    for (index, chunk) in bytes.chunks(16).enumerate() {
        let address = program.platform().wrapping_add(start, index as u64 * 16);
        let hex: Vec<String> = chunk.iter().map(|byte| format!("{byte:02x}")).collect();
        println!("{address:0width$x}  {:<47}  {}", hex.join(" "), c_string(chunk));
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_parse_number()
    {
        assert_eq!(parse_number("0x1000"), Ok(0x1000));
        assert_eq!(parse_number("0XfF"), Ok(0xff));
        assert_eq!(parse_number("4096"), Ok(4096));
        assert!(parse_number("0xzz").is_err());
        assert!(parse_number("").is_err());
    }

    #[test]
    fn test_cli_parses_queries()
    {
        let cli = Cli::try_parse_from([
            "kestrel",
            "core",
            "/tmp/core",
            "--symbol",
            "main",
            "--address",
            "0x401000",
            "--read",
            "0x1000",
            "--length",
            "32",
        ])
        .unwrap();
        assert!(matches!(cli.target, Target::Core { .. }));
        let queries = cli.target.queries();
        assert_eq!(queries.symbols, ["main"]);
        assert_eq!(queries.addresses, [0x40_1000]);
        assert_eq!(queries.read, Some(0x1000));
        assert_eq!(queries.length, 32);
    }

    #[test]
    fn test_cli_flags_layer_over_config()
    {
        let cli = Cli::try_parse_from(["kestrel", "--verbose", "--proc-root", "/tmp/proc", "pid", "42"]).unwrap();
        assert!(matches!(cli.target, Target::Pid { pid, .. } if pid == ProcessId(42)));
        assert!(cli.target.queries().symbols.is_empty());
        let config = config_for(&cli);
        assert!(config.verbose);
        assert_eq!(config.proc_root, PathBuf::from("/tmp/proc"));
    }
}
