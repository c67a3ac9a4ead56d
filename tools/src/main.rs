use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use zipbnf::{Ambiguity, CompileOptions, Grammar, ParseOptions};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Policy {
    First,
    Error,
    Packed,
}

#[derive(Parser)]
#[command(name = "zipbnf")]
#[command(about = "Parse input against a BNF grammar and print the parse tree")]
struct Args {
    /// Grammar file, the first rule is the start rule
    grammar: PathBuf,
    /// Inputs to parse, read lines interactively when none are given
    inputs: Vec<String>,
    /// How to resolve ambiguous parses
    #[arg(long, value_enum, default_value = "first")]
    ambiguity: Policy,
    /// Split input on whitespace instead of one symbol per char
    #[arg(long)]
    words: bool,
    /// Record the input span of every node
    #[arg(long)]
    spans: bool,
    /// Keep `{tag, children: [value]}` nodes as they are
    #[arg(long)]
    no_collapse: bool,
    /// Compile multi-char literals to one token per char
    #[arg(long)]
    split_literals: bool,
    #[arg(long)]
    json: bool,
    /// Print how many trees the input has instead of the tree
    #[arg(long)]
    count: bool,
    /// Print the number of trees and ambiguous nodes instead of the tree
    #[arg(long)]
    stats: bool,
    /// Print the compiled grammar
    #[arg(long)]
    dump_grammar: bool,
    /// -v debug, -vv trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl From<Policy> for Ambiguity {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::First => Ambiguity::First,
            Policy::Error => Ambiguity::Error,
            Policy::Packed => Ambiguity::Packed,
        }
    }
}

fn init_logging(verbose: u8) -> anyhow::Result<()> {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    simplelog::TermLogger::init(
        level,
        simplelog::ConfigBuilder::new()
            .set_time_format_custom(&[])
            .build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Never,
    )
    .context("cannot initialize logging")
}

fn run(args: &Args, grammar: &Grammar, opts: &ParseOptions, input: &str) -> anyhow::Result<()> {
    let tree = match args.words {
        true => zipbnf::parse(input.split_whitespace(), grammar, opts)?,
        false => zipbnf::parse_str(input, grammar, opts)?,
    };
    let Some(tree) = tree else {
        println!("no parse");
        return Ok(());
    };
    if args.count {
        println!("{}", tree.count_trees());
    } else if args.stats {
        let stats = tree.stats();
        println!("trees: {}, ambiguous nodes: {}, groups: {}",
                 stats.trees, stats.ambiguous_nodes, stats.untagged_nodes);
    } else if args.json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
    } else {
        println!("{}", tree.print());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let text = std::fs::read_to_string(&args.grammar)
        .with_context(|| format!("cannot read {}", args.grammar.display()))?;
    let compile_opts = CompileOptions::default().split_literals(args.split_literals);
    let grammar = zipbnf::compile_with(&text, &compile_opts)
        .with_context(|| format!("cannot compile {}", args.grammar.display()))?;
    if args.dump_grammar {
        print!("{}", grammar);
    }
    let opts = ParseOptions::default()
        .ambiguity(args.ambiguity.into())
        .collapse_single_token_children(!args.no_collapse)
        .record_spans(args.spans);

    if !args.inputs.is_empty() {
        for input in &args.inputs {
            run(&args, &grammar, &opts, input)?;
        }
        return Ok(());
    }

    use rustyline::error::ReadlineError;
    let mut rl = rustyline::DefaultEditor::new()?;
    loop {
        match rl.readline("~> ") {
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(()),
            Err(e) => return Err(e).context("readline failed"),
            Ok(line) => {
                let _ = rl.add_history_entry(&line);
                if let Err(e) = run(&args, &grammar, &opts, &line) {
                    println!("{:#}", e);
                }
            }
        }
    }
}
