//! akh-chain CLI: forward chaining over a facts file.

use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use akh_chainer::chainer::{ForwardChainer, JsonLinesSink, RuleBase, TraceSink};
use akh_chainer::kb::{add_term, load_facts, render, KnowledgeBase, MemoryKb};
use akh_chainer::sexpr::parse_term;

#[derive(Parser)]
#[command(name = "akh-chain", version, about = "Forward-chaining inference engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chain forward from a source fact and print what was derived.
    Run {
        /// Facts file: a sequence of terms such as `(Inheritance Concept:cat Concept:animal)`.
        #[arg(long)]
        kb: PathBuf,

        /// Rule base (TOML).
        #[arg(long)]
        rules: PathBuf,

        /// Starting fact, e.g. `Concept:cat` or `(Set Concept:a Concept:b)`.
        #[arg(long)]
        source: String,

        /// Override the rule base's job count.
        #[arg(long)]
        jobs: Option<usize>,

        /// Override the rule base's iteration bound (negative for unbounded).
        #[arg(long, allow_negative_numbers = true)]
        max_iterations: Option<i64>,

        /// Seed the random number generator.
        #[arg(long)]
        seed: Option<u64>,

        /// Restrict premise matching to these facts (repeatable).
        #[arg(long)]
        focus: Vec<String>,

        /// Write every inference record as a JSON line to this file.
        #[arg(long)]
        trace: Option<PathBuf>,
    },

    /// Parse a rule base and list its rules.
    Check {
        /// Rule base (TOML).
        #[arg(long)]
        rules: PathBuf,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            kb: kb_path,
            rules,
            source,
            jobs,
            max_iterations,
            seed,
            focus,
            trace,
        } => {
            let mut rule_base = RuleBase::load(&rules)?;
            if let Some(jobs) = jobs {
                rule_base.config.jobs = jobs;
            }
            if let Some(max) = max_iterations {
                rule_base.config.maximum_iterations = max;
            }
            if seed.is_some() {
                rule_base.config.seed = seed;
            }

            let kb = Arc::new(MemoryKb::new());
            let facts = std::fs::read_to_string(&kb_path).into_diagnostic()?;
            let loaded = load_facts(kb.as_ref(), &facts)?;
            println!("Loaded {} facts ({} atoms) from {}", loaded.len(), kb.len(), kb_path.display());

            let source = add_term(kb.as_ref(), &parse_term(&source)?)?;
            let mut focus_ids = Vec::new();
            for text in &focus {
                focus_ids.push(add_term(kb.as_ref(), &parse_term(text)?)?);
            }

            let mut builder = ForwardChainer::builder(kb.clone(), rule_base, source).focus_set(focus_ids);
            let mut trace_file = None;
            if let Some(path) = &trace {
                let file = std::fs::File::create(path).into_diagnostic()?;
                let sink = Arc::new(JsonLinesSink::new(BufWriter::new(file)));
                builder = builder.trace_sink(Arc::clone(&sink) as Arc<dyn TraceSink>);
                trace_file = Some(sink);
            }
            let chainer = builder.build()?;

            match chainer.run() {
                Some(reason) => println!("Stopped after {} iterations: {reason}", chainer.iteration()),
                None => println!("No sources; applied every rule once"),
            }
            // Write errors surface here rather than being lost on drop.
            if let Some(sink) = &trace_file {
                sink.flush().into_diagnostic()?;
            }

            let results = chainer.results_set();
            println!("Derived {} facts:", results.len());
            for fact in results {
                println!("  {}", render(kb.as_ref(), fact));
            }
        }

        Commands::Check { rules } => {
            let rule_base = RuleBase::load(&rules)?;
            println!(
                "Rule base '{}': {} rules, max iterations {}, jobs {}",
                rule_base.name,
                rule_base.rules.len(),
                rule_base.config.maximum_iterations_str(),
                rule_base.config.jobs,
            );
            for rule in &rule_base.rules {
                println!(
                    "  {rule}  [tv {:.2} {:.2}, cost {}]",
                    rule.tv.mean, rule.tv.confidence, rule.cost
                );
            }
        }
    }

    Ok(())
}
