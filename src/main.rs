use clap::{Parser, Subcommand};
use course_scout::Result;
use course_scout::commands::{
    extract_course, index_course, probe_course, search_course, show_config,
};

#[derive(Parser)]
#[command(name = "course-scout")]
#[command(about = "Resilient LMS course content discovery and search")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe which API endpoints a course exposes
    Probe {
        /// Course ID or name to probe
        course: String,
    },
    /// Build the content index for a course
    Extract {
        /// Course ID or name to extract
        course: String,
        /// Ignore the cached index and rebuild
        #[arg(long)]
        force: bool,
        /// Use web discovery even when APIs are available
        #[arg(long, conflicts_with = "no_web")]
        web: bool,
        /// Disable web discovery and extract from the APIs only
        #[arg(long)]
        no_web: bool,
    },
    /// Search a course's indexed content
    Search {
        /// Course ID or name to search in
        course: String,
        /// Query text
        query: String,
        /// Include semantic matches and intent-aware reranking
        #[arg(long)]
        semantic: bool,
    },
    /// Build or rebuild the semantic index for a course
    Index {
        /// Course ID or name to index
        course: String,
    },
    /// Show the active configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Probe { course } => {
            probe_course(&course).await?;
        }
        Commands::Extract {
            course,
            force,
            web,
            no_web,
        } => {
            extract_course(&course, force, web, no_web).await?;
        }
        Commands::Search {
            course,
            query,
            semantic,
        } => {
            search_course(&course, &query, semantic).await?;
        }
        Commands::Index { course } => {
            index_course(&course).await?;
        }
        Commands::Config { show } => {
            show_config(show)?;
        }
    }

    Ok(())
}
