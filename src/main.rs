use std::path::PathBuf;

use clap::Parser as ClapParser;

use lumen::core::diag::Span;
use lumen::driver::check::check_files;

#[derive(ClapParser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Source files to check
    files: Vec<PathBuf>,

    /// Additional library search path (repeatable)
    #[clap(long = "lib-path")]
    lib_paths: Vec<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.files.is_empty() {
        eprintln!("error: no input files");
        std::process::exit(2);
    }

    let outcome = match check_files(&args.files, args.lib_paths) {
        Ok(outcome) => outcome,
        Err(error) => {
            eprintln!("error: {error}");
            std::process::exit(2);
        }
    };

    for (uri, bundle) in &outcome.bundles {
        for error in &bundle.parse {
            report(uri.as_str(), error.span(), &error.to_string());
        }
        for error in &bundle.resolve {
            report(uri.as_str(), error.span(), &error.to_string());
        }
        for error in &bundle.types {
            report(uri.as_str(), error.span(), &error.to_string());
        }
        for error in &bundle.verify {
            report(uri.as_str(), error.span(), &error.to_string());
        }
    }

    if outcome.fatal_count() > 0 {
        std::process::exit(1);
    }
}

fn report(uri: &str, span: Span, message: &str) {
    println!("{uri}:{}:{}: {message}", span.start.line, span.start.column);
}
