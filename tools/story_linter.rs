/// Story Linter: validates a story graph's structure and authoring quality.
///
/// Usage: story_linter <story.ron>

use clap::Parser;
use forest_flow::core::graph::StoryGraph;
use forest_flow::core::variant::has_personalizable_verb;
use forest_flow::schema::node::Outcome;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "story_linter", about = "Check a story file for errors and authoring problems")]
struct Args {
    /// Story file in RON.
    story: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();

    let contents = match std::fs::read_to_string(&args.story) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: Failed to read '{}': {}", args.story.display(), e);
            process::exit(1);
        }
    };

    let graph = match StoryGraph::parse_ron_unchecked(&contents) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("ERROR: Failed to parse story file: {}", e);
            process::exit(1);
        }
    };

    println!("Loaded {} nodes, start '{}'", graph.len(), graph.start());

    let errors = graph.problems();
    let warnings = lint_story(&graph);

    println!("\n=== Story Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len()
    );

    if !errors.is_empty() {
        process::exit(1);
    }
}

fn lint_story(graph: &StoryGraph) -> Vec<String> {
    let mut warnings = Vec::new();

    let reachable = graph.reachable();
    for node in graph.nodes() {
        if !reachable.contains(node.id.as_str()) {
            warnings.push(format!("Node '{}' is unreachable from '{}'", node.id, graph.start()));
        }
    }

    for outcome in Outcome::ALL {
        let pool = graph.endings().pool(outcome);
        if pool.len() != 3 {
            warnings.push(format!(
                "Ending pool '{}' has {} endings (expected 3)",
                outcome.name(),
                pool.len()
            ));
        }
    }

    for node in graph.nodes() {
        for (i, choice) in node.choices.iter().enumerate() {
            // The opening choice is shown verbatim anyway.
            if node.id == graph.start() && i == 0 {
                continue;
            }
            if !has_personalizable_verb(&choice.text) {
                warnings.push(format!(
                    "Choice {} of '{}' has no personalizable verb: \"{}\"",
                    i, node.id, choice.text
                ));
            }
        }
    }

    let mut seeds: HashMap<u64, Vec<&str>> = HashMap::new();
    for node in graph.nodes() {
        seeds.entry(node.seed).or_default().push(node.id.as_str());
    }
    let mut duplicated: Vec<_> = seeds.into_iter().filter(|(_, ids)| ids.len() > 1).collect();
    duplicated.sort();
    for (seed, ids) in duplicated {
        warnings.push(format!("Seed {} is shared by {}", seed, ids.join(", ")));
    }

    warnings
}
