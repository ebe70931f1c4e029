use anyhow::{Context, Result};
use clap::Parser;
use ffidecl::{DeclKind, RenderOpts, Session, Target};
use log::{debug, info, warn};
use serde::Serialize;
use std::path::PathBuf;

/// ffidecl - parse a C declaration file and print canonical signatures
#[derive(Parser)]
#[command(name = "ffidecl")]
#[command(version)]
#[command(about = "parse C declarations and print canonical type signatures", long_about = None)]
struct Cli {
    /// path to the declaration file (cdef subset of C)
    input: PathBuf,

    /// suppress informational messages (only show declarations)
    #[arg(short = 'q', long)]
    quiet: bool,

    /// verbose logging to console (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// output JSON records instead of C declarations
    #[arg(short = 'j', long)]
    json: bool,

    /// data model used for layout and convention rendering
    #[arg(long, default_value = "host", value_parser = ["host", "ilp32", "lp64", "llp64"])]
    target: String,

    /// append size and alignment to each printed declaration
    #[arg(long)]
    sizes: bool,
}

#[derive(Serialize)]
struct Record {
    kind: DeclKind,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cdecl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    align: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logger(cli.verbose, cli.quiet);

    let target = match cli.target.as_str() {
        "ilp32" => Target::ilp32(),
        "lp64" => Target::lp64(),
        "llp64" => Target::llp64(),
        _ => Target::host(),
    };
    let opts = RenderOpts::for_pointer_size(target.pointer_size);

    info!("input: {}", cli.input.display());

    let text = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;

    let session = Session::new();
    session
        .cdef(&text)
        .with_context(|| format!("failed to parse {}", cli.input.display()))?;

    let mut decls = session.declarations();
    if decls.is_empty() {
        warn!("no declarations found in the input");
        return Ok(());
    }
    decls.sort_by(|a, b| a.1.cmp(&b.1));

    let mut records = Vec::new();
    for (kind, name, entry) in decls {
        let cdecl = match kind {
            DeclKind::Function | DeclKind::Variable | DeclKind::ExternPython => {
                match session.cname_decl(entry.ty, &name, &opts) {
                    Ok(s) => Some(s),
                    Err(e) => {
                        warn!("skipping {} {}: {}", kind, name, e);
                        continue;
                    }
                }
            }
            DeclKind::Typedef => match session.cname_decl(entry.ty, &name, &opts) {
                Ok(s) => Some(format!("typedef {}", s)),
                Err(e) => {
                    debug!("typedef {} has no C spelling: {}", name, e);
                    None
                }
            },
            DeclKind::Constant => match entry.value {
                // evaluated #define / enum constants print as defines
                Some(_) => None,
                // const-qualified globals print like variables
                None => match session.cname_decl(entry.ty, &name, &opts) {
                    Ok(s) => Some(format!("const {}", s)),
                    Err(e) => {
                        warn!("skipping constant {}: {}", name, e);
                        continue;
                    }
                },
            },
            _ => continue,
        };

        let (size, align) = if cli.sizes {
            match session.layout_of(entry.ty, &target) {
                Ok(l) => (Some(l.size), Some(l.align)),
                Err(_) => (None, None),
            }
        } else {
            (None, None)
        };

        records.push(Record {
            kind,
            name,
            cdecl,
            value: entry.value,
            size,
            align,
        });
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    for r in &records {
        match (&r.cdecl, r.value) {
            (Some(decl), _) => {
                if let (Some(size), Some(align)) = (r.size, r.align) {
                    println!("{}; /* size {}, align {} */", decl, size, align);
                } else {
                    println!("{};", decl);
                }
            }
            (None, Some(value)) => println!("#define {} {}", r.name, value),
            (None, None) => {}
        }
    }

    Ok(())
}

fn init_logger(verbose: u8, quiet: bool) {
    // If quiet mode is enabled, only show warnings and errors
    let log_level = if quiet {
        log::LevelFilter::Warn
    } else {
        match verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();
}
