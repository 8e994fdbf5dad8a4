use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::DateTime;
use clap::{Parser, Subcommand};

use vcs_wrapper::backend::{Backend, BackendKind, SvnBackend, SvnOptions};
use vcs_wrapper::cache::{Cache, CacheConfig};
use vcs_wrapper::checkout::{Checkout, Entry};
use vcs_wrapper::diff::LineType;
use vcs_wrapper::resource::{
    Authored, Blameable, Diffable, Fetchable, Logged, Node, Resource, Versioned,
};

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    name = "vcs-wrapper",
    about = "Read-only access to Git, Subversion, Mercurial, Bazaar and CVS working copies"
)]
struct Cli {
    /// Metadata cache directory
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Cache size limit in bytes
    #[arg(long, global = true)]
    cache_size: Option<u64>,

    /// Share of the size limit to keep after a cleanup, in (0, 1]
    #[arg(long, global = true)]
    cleanup_fraction: Option<f64>,

    /// Backend to use instead of detecting it from the working copy
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    /// Subversion user name
    #[arg(long, global = true)]
    username: Option<String>,

    /// Subversion password
    #[arg(long, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check out a repository into a new working copy
    Checkout {
        /// git, svn, hg, bzr or cvs
        kind: BackendKind,
        /// Repository URL (cvs: <cvsroot>#<module>[#<tag>])
        source: String,
        /// Directory to check out into
        dir: PathBuf,
    },

    /// Bring a working copy up to date, or to a given version
    Update {
        dir: PathBuf,
        #[arg(long)]
        version: Option<String>,
    },

    /// List a directory
    Ls {
        dir: PathBuf,
        #[arg(default_value = "/")]
        path: String,
        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
    },

    /// Show version, author and mime type of a file or directory
    Info {
        dir: PathBuf,
        #[arg(default_value = "/")]
        path: String,
    },

    /// Show the history of a file or directory
    Log {
        dir: PathBuf,
        #[arg(default_value = "/")]
        path: String,
    },

    /// Show per-line attribution of a file
    Blame {
        dir: PathBuf,
        path: String,
        #[arg(long)]
        version: Option<String>,
    },

    /// Show changes of a resource between two versions
    Diff {
        dir: PathBuf,
        path: String,
        version: String,
        /// Defaults to the working copy version
        current: Option<String>,
    },

    /// Print a file, from the working copy or at a version
    Cat {
        dir: PathBuf,
        path: String,
        #[arg(long)]
        version: Option<String>,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let cache = match open_cache(&cli) {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = run(&cli, &cache);

    match cache.teardown() {
        Ok(stats) if stats.entries_removed > 0 => log::info!(
            "cache cleanup removed {} entries ({} bytes)",
            stats.entries_removed,
            stats.bytes_removed
        ),
        Ok(_) => {}
        Err(e) => log::warn!("cache teardown failed: {}", e),
    }

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn open_cache(cli: &Cli) -> CliResult<Cache> {
    let mut config = match &cli.cache_dir {
        Some(dir) => CacheConfig::new(dir),
        None => CacheConfig::default(),
    };
    if let Some(size) = cli.cache_size {
        config = config.with_max_size(size);
    }
    if let Some(fraction) = cli.cleanup_fraction {
        config = config.with_cleanup_fraction(fraction);
    }
    Ok(Cache::open(config)?)
}

fn run(cli: &Cli, cache: &Arc<Cache>) -> CliResult {
    match &cli.command {
        Commands::Checkout { kind, source, dir } => cmd_checkout(cli, cache, *kind, source, dir),
        Commands::Update { dir, version } => cmd_update(cli, cache, dir, version.as_deref()),
        Commands::Ls {
            dir,
            path,
            recursive,
        } => cmd_ls(&open(cli, cache, dir)?, path, *recursive),
        Commands::Info { dir, path } => cmd_info(&open(cli, cache, dir)?, path),
        Commands::Log { dir, path } => cmd_log(&open(cli, cache, dir)?, path),
        Commands::Blame { dir, path, version } => {
            cmd_blame(&open(cli, cache, dir)?, path, version.as_deref())
        }
        Commands::Diff {
            dir,
            path,
            version,
            current,
        } => cmd_diff(&open(cli, cache, dir)?, path, version, current.as_deref()),
        Commands::Cat { dir, path, version } => {
            cmd_cat(&open(cli, cache, dir)?, path, version.as_deref())
        }
    }
}

fn backend_for(cli: &Cli, kind: BackendKind) -> Arc<dyn Backend> {
    match kind {
        BackendKind::Svn => Arc::new(SvnBackend::new(SvnOptions {
            username: cli.username.clone(),
            password: cli.password.clone(),
        })),
        other => other.backend(),
    }
}

fn open(cli: &Cli, cache: &Arc<Cache>, dir: &Path) -> CliResult<Checkout> {
    let kind = match cli.backend {
        Some(kind) => kind,
        None => BackendKind::detect(dir)?,
    };
    Ok(Checkout::open(dir, backend_for(cli, kind), cache.clone())?)
}

fn cmd_checkout(
    cli: &Cli,
    cache: &Arc<Cache>,
    kind: BackendKind,
    source: &str,
    dir: &Path,
) -> CliResult {
    let checkout = Checkout::initialize(dir, backend_for(cli, kind), cache.clone(), source)?;
    println!("Checked out {} into {}", source, checkout.local_path().display());
    Ok(())
}

fn cmd_update(cli: &Cli, cache: &Arc<Cache>, dir: &Path, version: Option<&str>) -> CliResult {
    let mut checkout = open(cli, cache, dir)?;
    if checkout.update(version)? {
        println!("Updated {}", dir.display());
    } else {
        println!("Already up to date");
    }
    Ok(())
}

fn cmd_ls(checkout: &Checkout, path: &str, recursive: bool) -> CliResult {
    let dir = checkout
        .get(path)?
        .into_directory()
        .ok_or_else(|| format!("not a directory: {}", path))?;

    let nodes: Vec<Node> = if recursive {
        dir.walk()?.into_iter().skip(1).collect()
    } else {
        dir.children()?.to_vec()
    };
    let mut paths: Vec<&str> = nodes.iter().map(Node::path).collect();
    paths.sort_unstable();
    for path in paths {
        println!("{}", path);
    }
    Ok(())
}

fn cmd_info(checkout: &Checkout, path: &str) -> CliResult {
    let entry = checkout.get(path)?;
    let (version, author) = match &entry {
        Entry::Root(root) => (root.version_string()?, root.author(None)?),
        Entry::File(file) => (file.version_string()?, file.author(None)?),
        Entry::Directory(dir) => (dir.version_string()?, dir.author(None)?),
    };
    println!("Path:    {}", entry.path());
    println!("Version: {}", version);
    println!("Author:  {}", author);
    if let Entry::File(file) = &entry {
        println!("Type:    {}", file.mime_type()?);
    }
    Ok(())
}

fn cmd_log(checkout: &Checkout, path: &str) -> CliResult {
    let entry = checkout.get(path)?;
    let log = match &entry {
        Entry::Root(root) => root.log()?,
        Entry::File(file) => file.log()?,
        Entry::Directory(dir) => dir.log()?,
    };

    for item in log.iter().rev() {
        println!("{:<12} {:<20} {}", short(&item.version), item.author, format_time(item.timestamp));
        for line in item.message.lines() {
            println!("    {}", line);
        }
        println!();
    }
    Ok(())
}

fn cmd_blame(checkout: &Checkout, path: &str, version: Option<&str>) -> CliResult {
    let file = checkout
        .get(path)?
        .into_file()
        .ok_or_else(|| format!("not a file: {}", path))?;

    let Some(lines) = file.blame(version)? else {
        println!("{}: binary file, no blame available", file.path());
        return Ok(());
    };
    for line in lines {
        println!("{:<12} {:<20} {}", short(&line.version), line.author, line.content);
    }
    Ok(())
}

fn cmd_diff(checkout: &Checkout, path: &str, version: &str, current: Option<&str>) -> CliResult {
    let entry = checkout.get(path)?;
    let diff = match &entry {
        Entry::Root(root) => root.diff(version, current)?,
        Entry::File(file) => file.diff(version, current)?,
        Entry::Directory(dir) => dir.diff(version, current)?,
    };

    for file in diff {
        println!("--- {}", file.from);
        println!("+++ {}", file.to);
        for chunk in &file.chunks {
            println!(
                "@@ -{},{} +{},{} @@",
                chunk.start, chunk.start_range, chunk.end, chunk.end_range
            );
            for line in &chunk.lines {
                let marker = match line.kind {
                    LineType::Added => '+',
                    LineType::Removed => '-',
                    LineType::Unchanged => ' ',
                };
                println!("{}{}", marker, line.content);
            }
        }
    }
    Ok(())
}

fn cmd_cat(checkout: &Checkout, path: &str, version: Option<&str>) -> CliResult {
    use std::io::Write;

    let file = checkout
        .get(path)?
        .into_file()
        .ok_or_else(|| format!("not a file: {}", path))?;
    let content = match version {
        Some(version) => file.versioned_content(version)?,
        None => file.contents()?,
    };
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&content)?;
    stdout.flush()?;
    Ok(())
}

fn short(version: &str) -> &str {
    version.get(..12).unwrap_or(version)
}

fn format_time(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|date| date.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}
