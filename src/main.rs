//! paideia CLI: rule-based study-guide tutor.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use paideia::enrich::{EnrichConfig, OllamaConfig, OllamaEnricher};
use paideia::fact::FactValue;
use paideia::kb::KnowledgeBase;
use paideia::tutor::{Response, Tutor, TutorConfig};

#[derive(Parser)]
#[command(name = "paideia", version, about = "Rule-based study-guide tutor")]
struct Cli {
    /// Directory with extra knowledge packs (loaded after the bundled ones).
    #[arg(long, global = true)]
    kb_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question.
    Ask {
        /// The question to ask.
        question: String,

        /// Profile attribute, e.g. --profile sleep_hours=5. Repeatable.
        #[arg(long, value_parser = parse_profile_attr)]
        profile: Vec<(String, String)>,

        /// Print the reasoning trace after the answer.
        #[arg(long)]
        explain: bool,

        /// Polish the explanation with a local Ollama model.
        #[arg(long)]
        enrich: bool,

        /// Ollama model for --enrich.
        #[arg(long, default_value = "llama3.2")]
        enrich_model: String,
    },

    /// Interactive session; clarification dialogues span turns.
    Repl {
        /// Profile attribute, e.g. --profile stress_level=high. Repeatable.
        #[arg(long, value_parser = parse_profile_attr)]
        profile: Vec<(String, String)>,
    },

    /// Inspect the knowledge base.
    Kb {
        #[command(subcommand)]
        action: KbAction,
    },
}

#[derive(Subcommand)]
enum KbAction {
    /// List all authored topic tags.
    Topics,
    /// Show the rules for one topic.
    Rules {
        /// Topic tag, e.g. animal_tissues.
        topic: String,
    },
    /// Load the packs and report refused records and authoring warnings.
    Validate,
    /// Export all rules as JSON, keyed by topic.
    Export,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let kb = load_kb(cli.kb_dir.as_deref())?;

    match cli.command {
        Commands::Ask {
            question,
            profile,
            explain,
            enrich,
            enrich_model,
        } => {
            let config = TutorConfig {
                enrich: EnrichConfig {
                    enabled: enrich,
                    ..EnrichConfig::default()
                },
                ..TutorConfig::default()
            };
            let mut tutor = Tutor::with_kb(kb, config);
            if enrich {
                tutor = tutor.with_enricher(Arc::new(OllamaEnricher::new(OllamaConfig {
                    model: enrich_model,
                    ..OllamaConfig::default()
                })));
            }
            apply_profile(&mut tutor, &profile)?;

            let response = tutor.process_query(&question);
            print_response(&response);
            if explain {
                println!("\n--- reasoning trace ---");
                println!("{}", tutor.get_explanation());
            }
        }

        Commands::Repl { profile } => {
            let mut tutor = Tutor::with_kb(kb, TutorConfig::default());
            apply_profile(&mut tutor, &profile)?;
            repl(&mut tutor)?;
        }

        Commands::Kb { action } => match action {
            KbAction::Topics => {
                for topic in kb.all_topics() {
                    println!("{topic}");
                }
            }
            KbAction::Rules { topic } => {
                let rules = kb.lookup(&topic);
                if rules.is_empty() {
                    println!("no rules for topic \"{topic}\"");
                }
                for rule in rules {
                    println!(
                        "{} (cf {:.2}, priority {}) — {}",
                        rule.id, rule.cf, rule.priority, rule.response.concept
                    );
                }
            }
            KbAction::Validate => {
                let report = kb.load_report();
                println!(
                    "{} packs, {} rules, {} topics",
                    report.packs_loaded,
                    report.rules_loaded,
                    kb.all_topics().len()
                );
                for err in &report.refused {
                    println!("refused: {err}");
                }
                for warning in &report.warnings {
                    println!("warning: {warning}");
                }
                if report.refused.is_empty() && report.warnings.is_empty() {
                    println!("no refused records, no warnings");
                }
            }
            KbAction::Export => {
                let mut export = serde_json::Map::new();
                for topic in kb.all_topics() {
                    let rules = kb.lookup(&topic);
                    export.insert(topic, serde_json::to_value(&rules).into_diagnostic()?);
                }
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::Value::Object(export))
                        .into_diagnostic()?
                );
            }
        },
    }

    Ok(())
}

fn load_kb(dir: Option<&std::path::Path>) -> Result<KnowledgeBase> {
    match dir {
        Some(dir) => KnowledgeBase::bundled_with_dir(dir).map_err(|e| miette::Report::new(e)),
        None => Ok(KnowledgeBase::bundled()),
    }
}

fn parse_profile_attr(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| format!("expected name=value, got \"{s}\""))
}

fn apply_profile(tutor: &mut Tutor, attrs: &[(String, String)]) -> Result<()> {
    for (name, value) in attrs {
        tutor
            .update_profile(name.clone(), FactValue::parse(value))
            .map_err(miette::Report::new)?;
    }
    Ok(())
}

fn print_response(response: &Response) {
    match response {
        Response::Answer {
            concept,
            explanation,
            topic,
            subtopic,
            examples,
            aggregate_cf,
            confidence_level,
            fired_rule_ids,
            ..
        } => {
            println!("# {concept}");
            println!("{explanation}");
            if !examples.is_empty() {
                println!("\nExamples:");
                for example in examples {
                    println!("  - {example}");
                }
            }
            let place = if subtopic.is_empty() {
                topic.clone()
            } else {
                format!("{topic} / {subtopic}")
            };
            println!("\n[{place}] confidence {aggregate_cf:.2} ({confidence_level})");
            println!("rules: {}", fired_rule_ids.join(", "));
        }
        Response::Clarify {
            prompt,
            allowed_values,
            ..
        } => {
            println!("{prompt}");
            println!("({})", allowed_values.join(" / "));
        }
        Response::NoMatch { reason } => {
            println!("Sorry — {reason}.");
        }
    }
}

fn repl(tutor: &mut Tutor) -> Result<()> {
    println!("paideia tutor — ask a question, or :help for commands");
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush().into_diagnostic()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).into_diagnostic()? == 0 {
            break; // EOF
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            ":quit" | ":exit" | ":q" => break,
            ":help" => {
                println!(":profile name=value  set a profile attribute");
                println!(":profile             show the profile");
                println!(":clear-profile       clear the profile");
                println!(":explain             show the last reasoning trace");
                println!(":reset               drop the clarification dialogue");
                println!(":quit                leave");
            }
            ":explain" => println!("{}", tutor.get_explanation()),
            ":reset" => {
                tutor.reset_dialogue();
                println!("dialogue reset");
            }
            ":clear-profile" => {
                tutor.clear_profile();
                println!("profile cleared");
            }
            ":profile" => {
                if tutor.get_profile().is_empty() {
                    println!("(empty)");
                }
                for (name, value) in tutor.get_profile().iter() {
                    println!("{name} = {value}");
                }
            }
            _ if line.starts_with(":profile ") => {
                match parse_profile_attr(line.trim_start_matches(":profile ").trim()) {
                    Ok((name, value)) => {
                        match tutor.update_profile(name, FactValue::parse(&value)) {
                            Ok(()) => println!("ok"),
                            Err(e) => println!("rejected: {e}"),
                        }
                    }
                    Err(e) => println!("{e}"),
                }
            }
            question => {
                let response = tutor.process_query(question);
                print_response(&response);
            }
        }
    }
    Ok(())
}
