//! schematree CLI: build, query, and inspect schema trees.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::Result;

use schematree::tree::SchemaTree;
use schematree::workflow::config::{preset, WorkflowConfig};
use schematree::workflow::Workflow;

#[derive(Parser)]
#[command(name = "schematree", version, about = "Property co-occurrence recommender")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a schema tree from an N-Triples corpus (two passes).
    Build {
        /// Corpus path; .gz files are decompressed on the fly.
        #[arg(long)]
        input: PathBuf,

        /// Output tree path; a .gz suffix selects the legacy format.
        #[arg(long)]
        output: PathBuf,

        /// Only read the first N subjects (0 = all).
        #[arg(long, default_value = "0")]
        first_n: u64,

        /// Fold type statements into the property stream.
        #[arg(long)]
        typed: bool,

        /// Reserved minimum support threshold.
        #[arg(long, default_value = "1")]
        min_support: u32,

        /// Also write property frequencies as CSV next to the tree.
        #[arg(long)]
        prop_freqs: bool,

        /// Also write type frequencies as CSV next to the tree.
        #[arg(long)]
        type_freqs: bool,
    },

    /// Recommend additional properties for a partial property set.
    Recommend {
        /// Path of a saved schema tree.
        #[arg(long)]
        tree: PathBuf,

        /// Query properties (comma-separated IRIs).
        #[arg(long, default_value = "")]
        properties: String,

        /// Query types (comma-separated IRIs).
        #[arg(long, default_value = "")]
        types: String,

        /// Workflow configuration file (JSON layer stack).
        #[arg(long, conflicts_with = "preset")]
        workflow: Option<PathBuf>,

        /// Named workflow preset.
        #[arg(long, default_value = "direct")]
        preset: String,

        /// Number of recommendations to print.
        #[arg(long, default_value = "10")]
        top: usize,
    },

    /// Show statistics of a saved schema tree.
    Info {
        /// Path of a saved schema tree.
        #[arg(long)]
        tree: PathBuf,
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
        Commands::Build {
            input,
            output,
            first_n,
            typed,
            min_support,
            prop_freqs,
            type_freqs,
        } => {
            let tree = SchemaTree::create(&input, first_n, typed, min_support)?;
            tree.save(&output)?;
            println!(
                "Built tree over {} subjects ({} properties) -> {}",
                tree.subject_count(),
                tree.dictionary().len(),
                output.display()
            );

            if prop_freqs {
                let path = output.with_extension("propfreqs.csv");
                tree.write_property_frequencies(&path)?;
                println!("Property frequencies -> {}", path.display());
            }
            if type_freqs {
                let path = output.with_extension("typefreqs.csv");
                tree.write_type_frequencies(&path)?;
                println!("Type frequencies -> {}", path.display());
            }
        }

        Commands::Recommend {
            tree,
            properties,
            types,
            workflow,
            preset: preset_name,
            top,
        } => {
            let tree = SchemaTree::load(&tree)?;
            let workflow: Workflow = match workflow {
                Some(path) => WorkflowConfig::from_file(&path)?.build()?,
                None => preset(&preset_name)?,
            };

            let properties: Vec<&str> = split_list(&properties);
            let types: Vec<&str> = split_list(&types);
            let query = tree.build_property_list(&properties, &types);
            let recommendations = workflow.recommend(&tree, &query);

            if recommendations.is_empty() {
                println!("No recommendations.");
            }
            for (rank, candidate) in recommendations.top(top).iter().enumerate() {
                println!(
                    "{:2}. {} ({:.4})",
                    rank + 1,
                    candidate.property.label(),
                    candidate.probability
                );
            }
        }

        Commands::Info { tree } => {
            let tree = SchemaTree::load(&tree)?;
            let (properties, types) = tree.dictionary().counts();
            println!("schematree info");
            println!("  subjects:    {}", tree.subject_count());
            println!("  properties:  {properties}");
            println!("  types:       {types}");
            println!("  min support: {}", tree.min_support());
            println!("  typed:       {}", tree.typed());
        }
    }

    Ok(())
}

fn split_list(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
