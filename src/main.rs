// src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use gemstone::filesystem::RepositoryLayout;
use gemstone::integrity::{audit_repository, verify_archive_file};
use gemstone::packages::{Dependency, GemArchive};
use gemstone::repository::{self, FileFetcher, Fetcher, HttpFetcher, NamePattern, RemoteSource, RepositoryIndex};
use gemstone::resolver::install::InstallContext;
use gemstone::resolver::{ArchiveInstaller, Domain, Resolver};
use gemstone::version::Requirement;
use gemstone::Config;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "gemstone")]
#[command(author, version, about = "Resolve, install and audit packages", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Install root (overrides the configuration)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a package and its dependencies
    Install {
        name: String,
        /// Version requirement, e.g. ">= 1.0, < 2"
        #[arg(short = 'v', long = "version")]
        requirement: Option<String>,
        /// Install only the named package
        #[arg(long)]
        ignore_dependencies: bool,
        /// Where to look for candidates: local, remote or both
        #[arg(long, value_parser = parse_domain)]
        domain: Option<Domain>,
    },
    /// Download a package archive into the current directory
    Fetch {
        name: String,
        #[arg(short = 'v', long = "version")]
        requirement: Option<String>,
    },
    /// Synchronize the remote indexes and report what they list
    Update,
    /// Search remote repositories
    Search {
        /// Exact name, or a regular expression with --regex
        pattern: Option<String>,
        #[arg(long)]
        regex: bool,
        /// Search installed packages instead
        #[arg(long)]
        installed: bool,
    },
    /// List installed packages with newer remote versions
    Outdated,
    /// Show the dependencies of installed packages
    Dependency {
        name: String,
        #[arg(short = 'v', long = "version")]
        requirement: Option<String>,
    },
    /// Audit installed packages, or verify one archive
    Check {
        /// Verify this archive's checksum instead of auditing
        #[arg(long)]
        verify: Option<PathBuf>,
    },
}

fn parse_domain(text: &str) -> std::result::Result<Domain, String> {
    match text {
        "local" => Ok(Domain::Local),
        "remote" => Ok(Domain::Remote),
        "both" => Ok(Domain::Both),
        other => Err(format!("unknown domain '{}' (expected local, remote or both)", other)),
    }
}

/// HTTP for http(s) URIs, the filesystem for everything else
struct SourceFetcher {
    http: HttpFetcher,
    file: FileFetcher,
}

impl SourceFetcher {
    fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: config.http.fetcher()?,
            file: FileFetcher,
        })
    }

    fn for_uri(&self, uri: &str) -> &dyn Fetcher {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            &self.http
        } else {
            &self.file
        }
    }
}

impl Fetcher for SourceFetcher {
    fn fetch(&self, uri: &str) -> gemstone::Result<Vec<u8>> {
        self.for_uri(uri).fetch(uri)
    }

    fn fetch_size(&self, uri: &str) -> gemstone::Result<u64> {
        self.for_uri(uri).fetch_size(uri)
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => {
            let default_path = Path::new("gemstone.toml");
            if default_path.exists() {
                Config::load(default_path)?
            } else {
                Config::default()
            }
        }
    };

    if let Some(root) = &cli.root {
        config.root = root.clone();
    } else if let Some(home) = std::env::var_os("GEMSTONE_HOME") {
        config.root = PathBuf::from(home);
    }
    Ok(config)
}

fn requirement(text: Option<&str>) -> Result<Requirement> {
    Ok(Requirement::parse(text.unwrap_or_default())?)
}

fn sync(config: &Config, fetcher: &dyn Fetcher) -> Result<Vec<RemoteSource>> {
    Ok(repository::sync_sources(&config.sources, fetcher, config.bulk_threshold)?)
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let layout = RepositoryLayout::new(&config.root);

    match cli.command {
        Some(Commands::Install {
            name,
            requirement: req,
            ignore_dependencies,
            domain,
        }) => {
            let fetcher = SourceFetcher::new(&config)?;
            let domain = domain.unwrap_or(config.domain);
            let sources = if domain.includes_remote() {
                sync(&config, &fetcher)?
            } else {
                Vec::new()
            };

            let resolver = Resolver::new(std::env::current_dir()?, sources)
                .with_domain(domain)
                .with_platforms(config.platform_set()?);
            let root = Dependency::new(name, requirement(req.as_deref())?);
            let plan = resolver.resolve(&root, ignore_dependencies)?;
            info!("Installing {} packages into {}", plan.len(), layout.root().display());

            let installed: HashSet<String> = RepositoryIndex::from_installed(&layout)
                .full_names()
                .map(str::to_string)
                .collect();
            let installer = ArchiveInstaller::new(layout.clone());
            let context = InstallContext::new(&layout, &fetcher, &installer);

            for spec in context.install_plan(&plan, &installed)? {
                println!("Successfully installed {}", spec.full_name());
            }
            Ok(())
        }
        Some(Commands::Fetch { name, requirement: req }) => {
            let fetcher = SourceFetcher::new(&config)?;
            let resolver = Resolver::new(std::env::current_dir()?, sync(&config, &fetcher)?)
                .with_domain(Domain::Remote)
                .with_platforms(config.platform_set()?);
            let plan = resolver.resolve(&Dependency::new(name, requirement(req.as_deref())?), true)?;

            for candidate in plan.iter() {
                let uri = repository::wire::archive_uri(&candidate.source.origin, &candidate.spec.file_name());
                std::fs::write(candidate.spec.file_name(), fetcher.fetch(&uri)?)?;
                println!("Downloaded {}", candidate.spec.full_name());
            }
            Ok(())
        }
        Some(Commands::Update) => {
            let fetcher = SourceFetcher::new(&config)?;
            for source in sync(&config, &fetcher)? {
                println!("{}: {} specifications ({})", source.uri, source.index.len(), source.index.signature());
            }
            Ok(())
        }
        Some(Commands::Search {
            pattern,
            regex,
            installed,
        }) => {
            let pattern = match pattern {
                None => NamePattern::All,
                Some(p) if regex => NamePattern::regex(&p)?,
                Some(p) => NamePattern::exact(p),
            };

            let indexes = if installed {
                vec![RepositoryIndex::from_installed(&layout)]
            } else {
                let fetcher = SourceFetcher::new(&config)?;
                sync(&config, &fetcher)?.into_iter().map(|s| s.index).collect()
            };

            let mut count = 0;
            for index in &indexes {
                for spec in index.search(&pattern, &Requirement::any()) {
                    match spec.summary() {
                        Some(summary) => println!("{} - {}", spec.full_name(), summary),
                        None => println!("{}", spec.full_name()),
                    }
                    count += 1;
                }
            }
            if count == 0 {
                println!("No packages found.");
            }
            Ok(())
        }
        Some(Commands::Outdated) => {
            let fetcher = SourceFetcher::new(&config)?;
            let mut remote = RepositoryIndex::new();
            for source in sync(&config, &fetcher)? {
                for spec in source.index.iter() {
                    remote.add_spec(spec.clone());
                }
            }

            let local = RepositoryIndex::from_installed(&layout);
            let remote_latest = remote.latest_per_name();
            for name in local.outdated(&remote) {
                let current = local.latest_per_name().get(&name).map(|s| s.version().to_string());
                let newest = remote_latest.get(&name).map(|s| s.version().to_string());
                println!(
                    "{} ({} < {})",
                    name,
                    current.unwrap_or_default(),
                    newest.unwrap_or_default()
                );
            }
            Ok(())
        }
        Some(Commands::Dependency { name, requirement: req }) => {
            let index = RepositoryIndex::from_installed(&layout);
            let specs = index.find_name(&name, &requirement(req.as_deref())?);
            if specs.is_empty() {
                return Err(anyhow::anyhow!("No installed package matches {}", name));
            }

            for spec in specs {
                println!("Package {}", spec.full_name());
                for dep in spec.dependencies() {
                    println!("  {}", dep);
                }
            }
            Ok(())
        }
        Some(Commands::Check { verify }) => {
            if let Some(path) = verify {
                verify_archive_file(&path)?;
                println!("{}: checksum OK", path.display());
                return Ok(());
            }

            let index = RepositoryIndex::from_installed(&layout);
            let report = audit_repository(&index, &layout, &GemArchive);
            for (full_name, findings) in report.iter() {
                if findings.is_empty() {
                    continue;
                }
                println!("{} has {} problems", full_name, findings.len());
                for finding in findings {
                    println!("  {}", finding);
                }
            }

            if report.is_clean() {
                println!("All {} installed packages verified", index.len());
            }
            Ok(())
        }
        None => {
            // No command provided, show help
            println!("Gemstone v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'gemstone --help' for usage information");
            Ok(())
        }
    }
}
