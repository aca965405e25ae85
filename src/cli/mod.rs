//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "tenant-search",
    version,
    about = "Domain-scoped retrieval and ranking over merchant catalogs",
    long_about = "tenant-search resolves a storefront domain to its tenant, retrieves matching \
                  pages and products through keyword, vector and fallback tiers, merges products \
                  with the content describing them and ranks the result."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/tenant-search/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index a catalog file and search it
    Search {
        /// Search query text
        query: String,

        /// Catalog JSON file (domain, tenant_id, products, pages)
        #[arg(long, value_name = "FILE")]
        catalog: PathBuf,

        /// Domain to search as (defaults to the catalog's domain)
        #[arg(short, long)]
        domain: Option<String>,

        /// Maximum number of results to return
        #[arg(short, long)]
        limit: Option<usize>,

        /// Minimum similarity in [0, 1]
        #[arg(short, long)]
        threshold: Option<f32>,

        /// Shopper budget for price ranking
        #[arg(short, long)]
        budget: Option<f64>,

        /// Group page hits by chunk index
        #[arg(long)]
        group: bool,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Manage domain to tenant registrations
    Tenants {
        #[command(subcommand)]
        action: TenantAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum TenantAction {
    /// Register (or re-point) a domain
    Register {
        /// Public storefront domain
        domain: String,

        /// Tenant identifier
        tenant_id: String,
    },

    /// List registered domains
    List,

    /// Resolve a domain to its tenant
    Resolve {
        /// Domain to resolve
        domain: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Print the configuration file path
    Path,
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::try_parse_from([
            "tenant-search",
            "search",
            "10mtr extension cables",
            "--catalog",
            "shop.json",
            "--threshold",
            "0.15",
            "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Search {
                query,
                threshold,
                json,
                limit,
                ..
            } => {
                assert_eq!(query, "10mtr extension cables");
                assert_eq!(threshold, Some(0.15));
                assert!(json);
                assert_eq!(limit, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
