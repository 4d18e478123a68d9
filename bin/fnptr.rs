// Report the possible targets of every call site in an SSA module, and turn
// indirect calls with a single possible target into direct calls.

use std::process::ExitCode;
use std::str::FromStr;

use clap::{Parser, ValueEnum};
use derive_more::Display;
use tracing::{error, info};

use fnptr_analysis::commons::Valid;
use fnptr_analysis::error::{Error, Result};
use fnptr_analysis::logging::{init_logging, LogLevel};
use fnptr_analysis::middle_end::analysis::call_targets::{ResolveOptions, DEFAULT_MAX_DEPTH};
use fnptr_analysis::middle_end::optimization::devirtualize::{analyze, apply, DriverOptions};
use fnptr_analysis::middle_end::ssa::{self, Module};

// Input/output file types
#[derive(Display, Clone, Copy, Debug, PartialEq, Eq)]
enum FileType {
    Ssa,
    Json,
    Dot,
}

// File names with associated file types.  This is used for determining input
// and output file types from file names.
#[derive(Clone, Debug)]
struct File {
    typ: FileType,
    name: String,
}

impl FromStr for File {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        use FileType::*;

        let name = String::from(s);
        let typ = s
            .rsplit_once('.')
            .and_then(|(_, extension)| match extension {
                "ssa" => Some(Ssa),
                "json" => Some(Json),
                "dot" => Some(Dot),
                _ => None,
            })
            .ok_or_else(|| {
                format!("Expected a file name with one of the following extensions: ssa, json, dot. Got {s}")
            })?;

        Ok(File { typ, name })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    #[default]
    Text,
    Json,
}

// Command-line arguments
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// The module to analyze (.ssa or .json).
    input_file: File,

    /// Where to write the rewritten module (.ssa, .json) or the resolved call
    /// graph (.dot).
    #[arg(short, long)]
    output: Option<File>,

    /// How to print the report on stdout.
    #[arg(long, value_enum, default_value_t)]
    format: ReportFormat,

    /// Recursion depth bound for a single call site.
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Only report; leave every call site as it is.
    #[arg(long)]
    no_rewrite: bool,

    #[arg(long, value_enum, default_value_t)]
    log_level: LogLevel,
}

fn read(path: &str) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.into(),
        source,
    })
}

fn load(file: &File) -> Result<Valid<Module>> {
    let input = read(&file.name)?;

    let module: Module = match file.typ {
        FileType::Ssa => input.parse()?,
        FileType::Json => serde_json::from_str(&input)?,
        FileType::Dot => return Err(Error::FileType(file.name.clone())),
    };

    Ok(module.validate()?)
}

fn run(args: &Args) -> Result<()> {
    let module = load(&args.input_file)?;
    info!(
        input = %args.input_file.name,
        functions = module.0.functions.len(),
        "loaded module"
    );

    let options = DriverOptions {
        resolve: ResolveOptions {
            max_depth: args.max_depth,
        },
        rewrite: !args.no_rewrite,
    };
    let report = analyze(&module, &options);

    match args.format {
        ReportFormat::Text => print!("{report}"),
        ReportFormat::Json => println!("{}", report.to_json()?),
    }

    let Some(output) = &args.output else {
        return Ok(());
    };

    let contents = match output.typ {
        FileType::Dot => ssa::dump_call_graph(&module.0, &report.call_edges()),
        FileType::Ssa => apply(module, &report)?.0.to_string(),
        FileType::Json => serde_json::to_string_pretty(&apply(module, &report)?.0)?,
    };

    std::fs::write(&output.name, contents).map_err(|source| Error::Io {
        path: output.name.clone().into(),
        source,
    })?;
    info!(output = %output.name, typ = %output.typ, "wrote output");

    Ok(())
}

pub fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_level);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
