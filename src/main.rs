//! dimc-probe: DIMC conformance probe for a simulated vector cluster

use std::env;
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use dimc_probe::config::Config;
use dimc_probe::harness::{run_case, CaseOutcome, HarnessConfig, TestCase};

const USAGE: &str = "\
Usage: dimc-probe [CASE] [OPTIONS]

Cases:
  small       8 elements, probe and row sweep (default)
  large       512 elements, grouped row writes and readback
  identity    copy only, no DIMC ops
  all         every case in turn

Options:
  --cores N          cores in the cluster
  --vlen BITS        vector register width
  --latency CYCLES   cycles each DIMC op stays in flight
  --max-cycles N     cycle limit per case
  --trace            print the event trace
  --print-config     print the effective configuration and exit
  -h, --help         show this help";

/// Parsed command line.
struct Options {
    cases: Vec<TestCase>,
    trace: bool,
    print_config: bool,
    harness: HarnessConfig,
}

fn main() -> ExitCode {
    // Initialize logging
    env_logger::init();

    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<bool> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        println!("{}", USAGE);
        return Ok(true);
    }

    let options = parse_args(&args, Config::get())?;
    if options.print_config {
        print_config(&options.harness);
        return Ok(true);
    }
    options.harness.validate()?;

    let mut passed = true;
    for case in options.cases {
        let name = case.name;
        let outcome = run_case(case, &options.harness)?;
        print_outcome(name, &outcome, options.trace);

        match outcome.report.verify() {
            Ok(()) => println!("PASS: {}", name),
            Err(e) => {
                println!("FAIL: {}: {}", name, e);
                passed = false;
            }
        }
        println!();
    }

    Ok(passed)
}

fn parse_args(args: &[String], config: &Config) -> Result<Options> {
    let mut harness = config.harness();
    let mut case_name: Option<&str> = None;
    let mut trace = false;
    let mut print_config = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--trace" => trace = true,
            "--print-config" => print_config = true,
            "--cores" => harness.cores = flag_value(&mut iter, "--cores")?,
            "--vlen" => harness.vlen = flag_value(&mut iter, "--vlen")?,
            "--latency" => harness.accel_latency = flag_value(&mut iter, "--latency")?,
            "--max-cycles" => harness.max_cycles = flag_value(&mut iter, "--max-cycles")?,
            flag if flag.starts_with('-') => bail!("unknown option '{}'\n\n{}", flag, USAGE),
            name => {
                if let Some(previous) = case_name {
                    bail!("more than one case given ('{}' and '{}')", previous, name);
                }
                case_name = Some(name);
            }
        }
    }

    let cases = match case_name.unwrap_or("small") {
        "all" => TestCase::all(),
        name => vec![TestCase::by_name(name).ok_or_else(|| {
            anyhow!("unknown case '{}' (expected one of {:?} or 'all')", name, TestCase::NAMES)
        })?],
    };

    Ok(Options {
        cases,
        trace,
        print_config,
        harness,
    })
}

fn flag_value<'a, T>(iter: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = iter.next().ok_or_else(|| anyhow!("{} needs a value", flag))?;
    raw.parse()
        .with_context(|| format!("invalid value '{}' for {}", raw, flag))
}

fn print_config(harness: &HarnessConfig) {
    println!("Effective configuration");
    println!("=======================");
    println!("cores               = {}", harness.cores);
    println!("vlen                = {}", harness.vlen);
    println!("scratchpad_bytes    = {}", harness.scratchpad_bytes);
    println!("scratchpad_fill     = 0x{:02X}", harness.scratchpad_fill);
    println!("dma_bytes_per_cycle = {}", harness.dma_bytes_per_cycle);
    println!("max_cycles          = {}", harness.max_cycles);
    println!("accel_latency       = {}", harness.accel_latency);
    println!();
    match Config::user_config_path() {
        Some(path) => println!("User config: {}", path.display()),
        None => println!("User config: (no config directory)"),
    }
    println!();
    println!("Sample config:");
    print!("{}", Config::sample_config());
}

fn print_outcome(name: &str, outcome: &CaseOutcome, trace: bool) {
    println!("Case: {}", name);
    println!("==========");
    print!("{}", outcome.report);
    println!();
    println!(
        "Halted after {} cycles: {} DMA transfers ({} bytes), {} barrier releases",
        outcome.cycles,
        outcome.dma.transfers_completed,
        outcome.dma.bytes_moved,
        outcome.barriers.total_completions
    );

    if trace {
        println!();
        println!("Trace ({} events):", outcome.trace.len());
        for event in &outcome.trace {
            println!("  {:>6}  {:?}", event.cycle(), event);
        }
    }
}
