use clap::Parser;
use rcminus::diagnostics::DiagnosticManager;
use rcminus::source::SourceFile;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
  /// Input C- source file, or `-` for standard input.
  input: PathBuf,

  /// Write the assembly listing here instead of standard output.
  #[arg(short, long, value_name = "FILE")]
  output: Option<PathBuf>,

  /// Print the AST in labeled bracket notation instead of assembly.
  #[arg(long)]
  dump_ast: bool,

  /// Print the classified word stream instead of assembly.
  #[arg(long, conflicts_with = "dump_ast")]
  dump_tokens: bool,
}

fn main() {
  let cli = Cli::parse();

  let (name, text) = match read_input(&cli.input) {
    Ok(input) => input,
    Err(err) => {
      eprintln!("rcminus: {}: {err}", cli.input.display());
      process::exit(1);
    }
  };

  let source = SourceFile::new(name, &text);
  let diagman = DiagnosticManager::new(&source);

  let result = if cli.dump_ast {
    rcminus::dump_ast(&source, &diagman)
  } else if cli.dump_tokens {
    rcminus::dump_tokens(&source, &diagman)
  } else {
    rcminus::generate_assembly(&source, &diagman)
  };

  match result {
    Ok(listing) => {
      if let Err(err) = write_output(cli.output.as_deref(), &listing) {
        eprintln!("rcminus: error: {err}");
        process::exit(1);
      }
    }
    Err(err) => {
      // The diagnostics themselves were already rendered by the
      // manager's terminal handler.
      eprintln!("{err}");
      process::exit(1);
    }
  }
}

fn read_input(path: &Path) -> io::Result<(String, String)> {
  if path.as_os_str() == "-" {
    let mut text = String::new();
    io::stdin().read_to_string(&mut text)?;
    Ok(("<stdin>".into(), text))
  } else {
    Ok((path.display().to_string(), fs::read_to_string(path)?))
  }
}

fn write_output(path: Option<&Path>, listing: &str) -> io::Result<()> {
  match path {
    Some(path) if path.as_os_str() != "-" => fs::write(path, listing),
    _ => io::stdout().write_all(listing.as_bytes()),
  }
}
