// Copyright (c) 2017-2021 Fabian Schuiki

//! A tool to rewrite functions into Gated-SSA form

#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;

use anyhow::{anyhow, Context, Result};
use clap::Arg;
use gsaflow::{
    analysis::DOMINATOR_TREE_TIME,
    assembly::{write_dot, write_module},
    module::{FunctionOutcome, Module},
    opt::prelude::*,
};
use std::{
    fs::File,
    io::{BufWriter, Read, Write},
    str::FromStr,
    sync::atomic::Ordering,
};

fn main() -> Result<()> {
    let matches = app_from_crate!()
        .about("Rewrites the functions of an IR module into Gated-SSA form.")
        .arg(
            Arg::with_name("verbosity")
                .short("v")
                .multiple(true)
                .help(HELP_VERBOSITY.lines().next().unwrap_or_default())
                .long_help(HELP_VERBOSITY),
        )
        .arg(
            Arg::with_name("input")
                .help("JSON module to transform")
                .required(true),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .help("File to write output to; stdout if omitted"),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .takes_value(true)
                .possible_values(&["text", "json", "dot"])
                .default_value("text")
                .help("Format of the output"),
        )
        .arg(
            Arg::with_name("time-passes")
                .short("t")
                .long("time")
                .help("Print execution time statistics"),
        )
        .arg(
            Arg::with_name("single-threaded")
                .short("s")
                .long("no-parallel")
                .help("Do not parallelize execution"),
        )
        .arg(
            Arg::with_name("verify")
                .long("verify")
                .help("Verify every transformed function"),
        )
        .get_matches();

    // Configure the logger.
    let verbose = std::cmp::max(1, matches.occurrences_of("verbosity") as usize) - 1;
    let quiet = !matches.is_present("verbosity");
    stderrlog::new()
        .module("gsaflow")
        .module("gsa_opt")
        .quiet(quiet)
        .verbosity(verbose)
        .init()?;

    // Configure rayon to be single-threaded if requested.
    if matches.is_present("single-threaded") {
        info!("Limiting to one rayon worker thread");
        rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build_global()?;
    }

    // Prepare the time tracking.
    let mut times = vec![];
    let tinit = time::precise_time_ns();

    // Read the input.
    let t0 = time::precise_time_ns();
    let module = {
        let path = matches
            .value_of("input")
            .ok_or_else(|| anyhow!("No input file given"))?;
        let mut contents = String::new();
        File::open(path)
            .and_then(|mut f| f.read_to_string(&mut contents))
            .with_context(|| format!("Failed to read input `{}`", path))?;
        Module::from_json(&contents).with_context(|| format!("Failed to parse `{}`", path))?
    };
    let t1 = time::precise_time_ns();
    times.push(("parse".to_owned(), t1 - t0));

    // Transform the functions.
    let ctx = PassContext {
        verify: matches.is_present("verify"),
    };
    let t0 = time::precise_time_ns();
    let outcomes = module.transform(&ctx);
    let t1 = time::precise_time_ns();
    times.push(("gsa".to_owned(), t1 - t0));
    for outcome in &outcomes {
        if let FunctionOutcome::Failed(err) = outcome {
            error!("{}", err);
        }
    }

    // Write the output.
    let t0 = time::precise_time_ns();
    let format = matches
        .value_of("format")
        .map(Format::from_str)
        .transpose()?
        .unwrap_or(Format::Text);
    let written = match matches.value_of("output") {
        Some(path) => {
            let output = File::create(path)
                .with_context(|| format!("Failed to create output `{}`", path))?;
            let output = BufWriter::with_capacity(1 << 20, output);
            write_output(output, format, &module, &outcomes)
        }
        None => write_output(std::io::stdout().lock(), format, &module, &outcomes),
    };
    written.context("Failed to write output")?;
    let t1 = time::precise_time_ns();
    times.push(("output".to_owned(), t1 - t0));

    // Final time stat.
    let tfinal = time::precise_time_ns();
    times.push(("total".to_owned(), tfinal - tinit));

    // Print execution time statistics if requested by the user.
    if matches.is_present("time-passes") {
        eprintln!("Execution Time Statistics:");
        for (mut name, ns) in times {
            name.push(':');
            eprintln!("  {:10}  {:8.3} ms", name, ns as f64 * 1.0e-6);
        }
        eprintln!("");
        eprintln!("Structure Statistics:");
        eprintln!(
            "  Dominator Tree Construction: {:8.3} ms",
            DOMINATOR_TREE_TIME.load(Ordering::SeqCst) as f64 * 1.0e-6
        );
    }

    // Dump some threading statistics.
    info!("Used {} rayon worker threads", rayon::current_num_threads());

    Ok(())
}

/// The output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Text,
    Json,
    Dot,
}

impl FromStr for Format {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Format> {
        match s {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            "dot" => Ok(Format::Dot),
            _ => Err(anyhow!("Unknown output format `{}`", s)),
        }
    }
}

fn write_output(
    mut output: impl Write,
    format: Format,
    module: &Module,
    outcomes: &[FunctionOutcome],
) -> Result<()> {
    match format {
        Format::Text => write_module(&mut output, outcomes)?,
        Format::Json => {
            serde_json::to_writer_pretty(&mut output, &module.to_record(outcomes))?;
            writeln!(output)?;
        }
        Format::Dot => {
            for cfg in outcomes.iter().filter_map(FunctionOutcome::cfg) {
                write_dot(&mut output, cfg)?;
            }
        }
    }
    output.flush()?;
    Ok(())
}

static HELP_VERBOSITY: &str = "Increase message verbosity

This option can be specified multiple times to increase the level of verbosity \
in the output:

-v      Only print errors
-vv     Also print warnings
-vvv    Also print info messages
-vvvv   Also print debug messages
-vvvvv  Also print detailed tracing messages
";
