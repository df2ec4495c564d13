use std::env;
use std::io;
use std::io::Write;
use std::process;

use tracing::info;
use tracing_subscriber::EnvFilter;

use hyperchart::{
  Debinarize, Error, Grammar, GrammarStatic, HyperGraph, Lattice, ParseCoarse, ParseOptions,
  Viterbi, WeightsOne,
};

fn usage(prog_name: &str) -> String {
  format!(
    r"Usage: {} GRAMMAR... [options]

Grammars are ordered from coarsest to finest. With more than one grammar,
every grammar but the finest prunes the next one.

Options:
  -h, --help                  Print this message
  -o, --options OPTIONS       Parse options, e.g. 'goal=[ROOT],yield=source'
  -t, --thresholds T1,T2,...  Posterior thresholds, one per coarse grammar
  -d, --debinarize            Merge binarized nodes back into their parents
  -q, --quiet                 Only print the score of each forest

Set RUST_LOG (e.g. RUST_LOG=hyperchart=debug) to trace the parser.",
    prog_name
  )
}

fn parse(
  parser: &ParseCoarse<WeightsOne<Viterbi>>,
  sentence: &str,
  debinarize: bool,
  quiet: bool,
) -> Result<(), Error> {
  let lattice: Lattice = sentence.parse()?;
  let result = parser.parse_detailed(&lattice);
  if result.relaxations > 0 {
    info!(relaxations = result.relaxations, factor = result.factor, "thresholds relaxed");
  }

  let graph: HyperGraph = if debinarize {
    Debinarize.apply(&result.graph)
  } else {
    result.graph
  };

  if !graph.is_valid() {
    println!("No parse");
    return Ok(());
  }

  println!(
    "Parsed {} node{}, {} edge{}",
    graph.nodes.len(),
    if graph.nodes.len() == 1 { "" } else { "s" },
    graph.edges.len(),
    if graph.edges.len() == 1 { "" } else { "s" }
  );
  if !quiet {
    println!("{}", graph);
  }
  println!("viterbi: {}", graph.inside(&WeightsOne::<Viterbi>::new()));

  Ok(())
}

struct Args {
  grammars: Vec<String>,
  options: ParseOptions,
  thresholds: Vec<f64>,
  debinarize: bool,
  quiet: bool,
}

impl Args {
  fn make_error_message(msg: &str, prog_name: impl AsRef<str>) -> String {
    format!("argument error: {}.\n\n{}", msg, usage(prog_name.as_ref()))
  }

  fn parse(v: Vec<String>) -> Result<Self, String> {
    if v.is_empty() {
      return Err(Self::make_error_message("bad argument vector", "hyperchart"));
    }

    let mut iter = v.into_iter();
    let prog_name = iter.next().unwrap_or_default();

    let mut grammars = Vec::new();
    let mut options = ParseOptions::default();
    let mut thresholds = Vec::new();
    let mut debinarize = false;
    let mut quiet = false;

    while let Some(o) = iter.next() {
      if o == "-h" || o == "--help" {
        println!("{}", usage(&prog_name));
        process::exit(0);
      } else if o == "-d" || o == "--debinarize" {
        debinarize = true;
      } else if o == "-q" || o == "--quiet" {
        quiet = true;
      } else if o == "-o" || o == "--options" {
        let Some(value) = iter.next() else {
          return Err(Self::make_error_message("missing parse options", prog_name));
        };
        options = value
          .parse()
          .map_err(|e: Error| Self::make_error_message(&e.to_string(), &prog_name))?;
      } else if o == "-t" || o == "--thresholds" {
        let Some(value) = iter.next() else {
          return Err(Self::make_error_message("missing thresholds", prog_name));
        };
        thresholds = value
          .split(',')
          .map(|t| t.trim().parse::<f64>())
          .collect::<Result<Vec<f64>, _>>()
          .map_err(|e| Self::make_error_message(&format!("bad threshold: {}", e), &prog_name))?;
      } else if o.starts_with('-') {
        return Err(Self::make_error_message("invalid arguments", prog_name));
      } else {
        grammars.push(o);
      }
    }

    if grammars.is_empty() {
      return Err(Self::make_error_message("missing grammar", prog_name));
    }
    // a single threshold applies to every coarse grammar
    if thresholds.len() == 1 && grammars.len() > 2 {
      thresholds = vec![thresholds[0]; grammars.len() - 1];
    }

    Ok(Self {
      grammars,
      options,
      thresholds,
      debinarize,
      quiet,
    })
  }
}

fn main() -> Result<(), Error> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(io::stderr)
    .init();

  let opts = match Args::parse(env::args().collect()) {
    Ok(opts) => opts,
    Err(msg) => {
      eprintln!("{}", msg);
      process::exit(255);
    }
  };

  let grammars = opts
    .grammars
    .iter()
    .map(|path| GrammarStatic::read_from_file(path).map(Grammar::from))
    .collect::<Result<Vec<_>, _>>()?;
  info!(grammars = grammars.len(), "grammars loaded");

  let parser = ParseCoarse::new(
    grammars,
    opts.thresholds,
    WeightsOne::<Viterbi>::new(),
    opts.options,
  )?;

  let mut input = String::new();
  loop {
    print!("> ");
    io::stdout().flush()?;

    match io::stdin().read_line(&mut input) {
      Ok(_) => {
        if input.is_empty() {
          // ctrl+d
          return Ok(());
        }
        if !input.trim().is_empty() {
          parse(&parser, input.trim(), opts.debinarize, opts.quiet)?;
        }
        input.clear();
      }
      Err(error) => return Err(error.into()),
    }
  }
}
