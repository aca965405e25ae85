use std::path::{Path, PathBuf};
use std::sync::Arc;
use tenant_search::catalog::CatalogFile;
use tenant_search::cli::{Cli, Commands, ConfigAction, TenantAction};
use tenant_search::config::{expand_tilde, Config};
use tenant_search::embedding::{EmbeddingProvider, FastEmbedProvider};
use tenant_search::engine::SearchEngine;
use tenant_search::error::{Result, TenantSearchError};
use tenant_search::retrieval::{group_by_chunk, RankedResult, ResultItem, SearchOptions};
use tenant_search::tenant::{SqliteDomainStore, TenantId, TenantResolver};

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Search {
            query,
            catalog,
            domain,
            limit,
            threshold,
            budget,
            group,
            json,
        } => {
            let args = SearchArgs {
                query,
                catalog,
                domain,
                limit,
                threshold,
                budget,
                group,
                json,
            };
            cmd_search(cli.config, args)?;
        }
        Commands::Tenants { action } => {
            cmd_tenants(cli.config, action)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "tenant_search=debug"
    } else {
        "tenant_search=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| TenantSearchError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })
}

struct SearchArgs {
    query: String,
    catalog: PathBuf,
    domain: Option<String>,
    limit: Option<usize>,
    threshold: Option<f32>,
    budget: Option<f64>,
    group: bool,
    json: bool,
}

fn cmd_search(config_path: Option<PathBuf>, args: SearchArgs) -> Result<()> {
    let config = load_config(config_path)?;

    let provider: Option<Arc<dyn EmbeddingProvider>> =
        match FastEmbedProvider::new(&config.embedding.model) {
            Ok(provider) => Some(Arc::new(provider)),
            Err(e) => {
                tracing::warn!(error = %e, "Embedding model unavailable, searching without vectors");
                None
            }
        };

    runtime()?.block_on(run_search(&config, args, provider))
}

async fn run_search(
    config: &Config,
    args: SearchArgs,
    provider: Option<Arc<dyn EmbeddingProvider>>,
) -> Result<()> {
    let file = CatalogFile::load(&args.catalog)?;
    let domain = args.domain.clone().unwrap_or_else(|| file.domain.clone());
    let limit = args.limit.unwrap_or(config.search.default_limit);
    let threshold = args.threshold.unwrap_or(config.search.default_threshold);
    let options = SearchOptions {
        budget: args.budget,
        ..SearchOptions::default()
    };

    let engine = SearchEngine::build(config, SqliteDomainStore::in_memory()?, provider)?;
    let report = engine.load_catalog(file).await?;
    tracing::info!(
        products = report.products,
        pages = report.pages,
        failed = report.failed,
        "Catalog indexed"
    );

    let outcome = engine
        .orchestrator()
        .search_detailed(&domain, &args.query, limit, threshold, &options)
        .await?;

    for run in &outcome.strategies_run {
        tracing::debug!(
            strategy = %run.method,
            status = ?run.status,
            candidates = run.candidates,
            added = run.added,
            "Strategy summary"
        );
    }

    if args.json {
        let value = if args.group {
            serde_json::to_value(group_by_chunk(&outcome.results))
        } else {
            serde_json::to_value(&outcome)
        };
        let json = value
            .and_then(|v| serde_json::to_string_pretty(&v))
            .map_err(|e| TenantSearchError::Json {
                source: e,
                context: "Failed to serialize results".to_string(),
            })?;
        println!("{}", json);
        return Ok(());
    }

    if outcome.results.is_empty() {
        println!("No results for '{}' on {}", args.query, domain);
        return Ok(());
    }

    if args.group {
        for group in group_by_chunk(&outcome.results) {
            println!(
                "\nChunk {} (avg similarity {:.2})",
                group.chunk_index, group.average_similarity
            );
            for result in &group.results {
                print_result(result);
            }
        }
    } else {
        for (i, result) in outcome.results.iter().enumerate() {
            print!("{:>2}. ", i + 1);
            print_result(result);
        }
    }

    Ok(())
}

fn print_result(result: &RankedResult) {
    let (kind, title) = match &result.item {
        ResultItem::Product(p) => ("product", p.product.name.as_str()),
        ResultItem::Content(c) => ("page", c.title.as_str()),
    };
    println!("[{:.3}] {} {}", result.final_score, kind, title);
    if let Some(url) = result.item.url().filter(|u| !u.is_empty()) {
        println!("      {}", url);
    }
    if let ResultItem::Product(p) = &result.item {
        if let Some(content) = &p.content {
            println!("      see also: {}", content.title);
        }
    }
    println!("      {}", result.explanation);
}

fn cmd_tenants(config_path: Option<PathBuf>, action: TenantAction) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_domain_store(&config)?;

    match action {
        TenantAction::Register { domain, tenant_id } => {
            store.register(&domain, &TenantId::new(tenant_id.clone()))?;
            println!("✓ Registered {} → {}", domain, tenant_id);
        }
        TenantAction::List => {
            let records = store.list()?;
            if records.is_empty() {
                println!("No tenants registered");
            }
            for record in records {
                println!(
                    "{:<40} {:<20} {}",
                    record.domain,
                    record.tenant_id.as_str(),
                    record.created_at
                );
            }
        }
        TenantAction::Resolve { domain } => {
            let negative_ttl = config.tenants.negative_ttl()?;
            let resolver = TenantResolver::new(Arc::new(store), negative_ttl);
            match runtime()?.block_on(resolver.resolve(&domain)) {
                Some(tenant) => println!("{} → {}", domain, tenant),
                None => println!("{} is not registered", domain),
            }
        }
    }

    Ok(())
}

fn open_domain_store(config: &Config) -> Result<SqliteDomainStore> {
    let path = config.tenant_db_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TenantSearchError::Io {
            source: e,
            context: format!("Failed to create data directory: {:?}", parent),
        })?;
    }
    SqliteDomainStore::new(&path)
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path)?;
            let mut value = serde_json::to_value(&config).map_err(|e| TenantSearchError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            if let Some(section) = section {
                value = value.get(&section).cloned().ok_or_else(|| {
                    TenantSearchError::Config(format!("Unknown config section: {}", section))
                })?;
            }

            let json = serde_json::to_string_pretty(&value).map_err(|e| TenantSearchError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| TenantSearchError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
        ConfigAction::Path => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };
            println!("{}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'tenant-search config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        return Ok(config);
    }

    let config = Config::load(&path)?;
    ensure_data_dir(&config.storage.data_dir)?;
    Ok(config)
}

fn ensure_data_dir(data_dir: &Path) -> Result<()> {
    let dir = expand_tilde(data_dir)?;
    std::fs::create_dir_all(&dir).map_err(|e| TenantSearchError::Io {
        source: e,
        context: format!("Failed to create data directory: {:?}", dir),
    })
}
