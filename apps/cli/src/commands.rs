//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use greylit_core::{Escalator, ExportMode, RunHalt, RunReport, export_sets};
use greylit_records::RecordsClient;
use greylit_search::SearchClient;
use greylit_shared::{
    AppConfig, Priority, QuerySpec, RecordsConfig, SearchConfig, TierSet, config_file_path,
    init_config, load_config, load_config_from, load_plan, parse_website_list,
};
use tracing::{info, warn};

use crate::progress::{RecordsProgress, SearchProgress};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Greylit: tiered grey-literature search.
#[derive(Parser)]
#[command(
    name = "greylit",
    version,
    about = "Search websites for grey literature with tiered Custom Search queries.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.greylit/greylit.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Search every website through the query tiers and export the results.
    Search(SearchArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

#[derive(Args)]
pub(crate) struct SearchArgs {
    /// TOML plan file with `websites`, `target_count` and `[[tiers]]`.
    #[arg(long)]
    plan: Option<PathBuf>,

    /// Website to search (repeatable).
    #[arg(long = "site")]
    sites: Vec<String>,

    /// File with one website per line; `#` starts a comment line.
    #[arg(long)]
    sites_file: Option<PathBuf>,

    #[command(flatten)]
    tiers: TierArgs,

    /// Stop escalating once a website has this many unique results (max 40).
    #[arg(long)]
    target: Option<usize>,

    /// Directory for CSV files.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write one combined CSV for the run instead of one per website.
    #[arg(long)]
    combined: bool,

    /// Also save the results to Airtable.
    #[arg(long)]
    send: bool,

    /// Skip the Airtable duplicate-link check.
    #[arg(long, requires = "send")]
    no_dup_check: bool,
}

/// Term groups for each tier. Tier 1 uses the short flag names.
#[derive(Args)]
pub(crate) struct TierArgs {
    /// Tier 1: all of these words.
    #[arg(long = "all")]
    all1: Option<String>,
    /// Tier 1: this exact phrase.
    #[arg(long = "exact")]
    exact1: Option<String>,
    /// Tier 1: any of these words.
    #[arg(long = "any")]
    any1: Option<String>,
    /// Tier 1: none of these words.
    #[arg(long = "none")]
    none1: Option<String>,

    /// Tier 2: all of these words.
    #[arg(long = "tier2-all")]
    all2: Option<String>,
    /// Tier 2: this exact phrase.
    #[arg(long = "tier2-exact")]
    exact2: Option<String>,
    /// Tier 2: any of these words.
    #[arg(long = "tier2-any")]
    any2: Option<String>,
    /// Tier 2: none of these words.
    #[arg(long = "tier2-none")]
    none2: Option<String>,

    /// Tier 3: all of these words.
    #[arg(long = "tier3-all")]
    all3: Option<String>,
    /// Tier 3: this exact phrase.
    #[arg(long = "tier3-exact")]
    exact3: Option<String>,
    /// Tier 3: any of these words.
    #[arg(long = "tier3-any")]
    any3: Option<String>,
    /// Tier 3: none of these words.
    #[arg(long = "tier3-none")]
    none3: Option<String>,
}

impl TierArgs {
    fn groups(&self) -> [(Priority, [&Option<String>; 4]); 3] {
        [
            (Priority::First, [&self.all1, &self.exact1, &self.any1, &self.none1]),
            (Priority::Second, [&self.all2, &self.exact2, &self.any2, &self.none2]),
            (Priority::Third, [&self.all3, &self.exact3, &self.any3, &self.none3]),
        ]
    }

    fn is_empty(&self) -> bool {
        self.groups()
            .iter()
            .all(|(_, terms)| terms.iter().all(|t| t.is_none()))
    }

    fn tier_set(&self) -> Result<TierSet> {
        let specs = self.groups().into_iter().filter_map(|(priority, [all, exact, any, none])| {
            let text = |t: &Option<String>| t.clone().unwrap_or_default();
            let spec = QuerySpec::new(priority)
                .all_words(text(all))
                .exact_phrase(text(exact))
                .any_words(text(any))
                .exclude_words(text(none));
            (!spec.is_empty()).then_some(spec)
        });
        Ok(TierSet::from_specs(specs)?)
    }
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "greylit=info",
        1 => "greylit=debug",
        _ => "greylit=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Search(args) => cmd_search(config_path.as_deref(), args).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_deref()).await,
        },
    }
}

fn read_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

/// Websites, tiers and target resolved from plan file, flags and config.
struct ResolvedPlan {
    websites: Vec<String>,
    tiers: TierSet,
    target: usize,
}

fn resolve_plan(args: &SearchArgs, config: &AppConfig) -> Result<ResolvedPlan> {
    let plan = args.plan.as_deref().map(load_plan).transpose()?;

    let mut websites = plan.as_ref().map(|p| p.websites.clone()).unwrap_or_default();
    if let Some(path) = &args.sites_file {
        let text = std::fs::read_to_string(path)
            .map_err(|e| eyre!("cannot read sites file {}: {e}", path.display()))?;
        websites.extend(parse_website_list(&text));
    }
    websites.extend(args.sites.iter().cloned());
    if websites.is_empty() {
        return Err(eyre!("no websites given: use --site, --sites-file or a plan file"));
    }

    let tiers = match &plan {
        Some(_) if !args.tiers.is_empty() => {
            return Err(eyre!("tier flags cannot be combined with a plan file"));
        }
        Some(plan) => plan.tier_set()?,
        None => args.tiers.tier_set()?,
    };
    if tiers.is_empty() {
        return Err(eyre!("no search terms given for any tier"));
    }

    let target = args
        .target
        .or_else(|| plan.as_ref().and_then(|p| p.target_count))
        .unwrap_or(config.search.target_count);

    Ok(ResolvedPlan {
        websites,
        tiers,
        target,
    })
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_search(config_path: Option<&Path>, args: SearchArgs) -> Result<()> {
    let config = read_config(config_path)?;
    let plan = resolve_plan(&args, &config)?;

    // Resolve every credential before the first request.
    let search_config = SearchConfig::resolve(&config)?;
    let records_config = if args.send {
        let mut records = RecordsConfig::resolve(&config)?;
        if args.no_dup_check {
            records.check_duplicates = false;
        }
        Some(records)
    } else {
        None
    };

    let interrupt = Arc::new(AtomicBool::new(false));
    tokio::spawn(watch_interrupt(Arc::clone(&interrupt)));

    let client = SearchClient::new(search_config)?;
    info!(
        websites = plan.websites.len(),
        keys = client.key_count(),
        target = plan.target,
        "starting search"
    );
    let escalator = Escalator::new(client).with_interrupt(Arc::clone(&interrupt));

    let progress = SearchProgress::new();
    let report = escalator
        .run(&plan.websites, &plan.tiers, plan.target, &progress)
        .await;
    progress.finish();
    let report = report?;

    let mode = if args.combined || config.export.combined {
        ExportMode::Combined
    } else {
        ExportMode::PerWebsite
    };
    let out_dir = args
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.export.output_dir));
    let files = export_sets(&report.sets, &out_dir, mode, chrono::Utc::now().date_naive())?;

    print_summary(&report, &files);

    if let Some(records_config) = records_config {
        if report.total_results() == 0 {
            println!("  Nothing to save to Airtable.");
        } else {
            let records =
                RecordsClient::new(records_config)?.with_interrupt(Arc::clone(&interrupt));
            let progress = RecordsProgress::new();
            let stats = records.save_results(&report.sets, &progress).await;
            progress.finish();
            println!(
                "  Airtable: {} processed, {} created, {} duplicates, {} errors",
                stats.processed, stats.created, stats.duplicates, stats.errors
            );
        }
    }

    match report.halt {
        Some(RunHalt::RateLimited(err)) => {
            if !report.skipped.is_empty() {
                eprintln!("  Not searched: {}", report.skipped.join(", "));
            }
            Err(err.into())
        }
        Some(RunHalt::Interrupted) => {
            eprintln!(
                "  Interrupted. {} website(s) not searched.",
                report.skipped.len()
            );
            Ok(())
        }
        None => Ok(()),
    }
}

/// First Ctrl-C stops the run at the next safe point; a second one exits.
async fn watch_interrupt(flag: Arc<AtomicBool>) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    warn!("interrupt received, stopping at the next website or record; press Ctrl-C again to quit");
    flag.store(true, Ordering::SeqCst);

    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("  Aborted.");
        std::process::exit(130);
    }
}

fn print_summary(report: &RunReport, files: &[PathBuf]) {
    println!();
    println!("  Run:       {}", report.run_id);
    println!("  Websites:  {}", report.sets.len());
    println!("  Results:   {}", report.total_results());
    for failure in report.failures() {
        println!("  Partial:   {failure}");
    }
    for file in files {
        println!("  CSV:       {}", file.display());
    }
    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = read_config(path)?;
    let source = match path {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };
    println!("# {}", source.display());
    println!("{}", toml::to_string_pretty(&config)?);

    let mut envs: Vec<&str> = vec![config.search.engine_id_env.as_str()];
    envs.extend(config.search.api_key_envs.iter().map(String::as_str));
    envs.push(&config.records.token_env);
    envs.push(&config.records.base_id_env);
    println!("# environment");
    for name in envs {
        let state = if std::env::var_os(name).is_some() { "set" } else { "missing" };
        println!("#   {name}: {state}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> SearchArgs {
        let mut argv = vec!["greylit", "search"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Search(args) => args,
            Command::Config { .. } => panic!("expected search"),
        }
    }

    #[test]
    fn tier_flags_build_a_tier_set() {
        let args = parse(&[
            "--site",
            "example.com",
            "--all",
            "flood report",
            "--tier3-any",
            "pdf doc",
        ]);
        let plan = resolve_plan(&args, &AppConfig::default()).unwrap();

        assert_eq!(plan.websites, vec!["example.com"]);
        assert_eq!(plan.target, 40);
        let tier1 = plan.tiers.get(Priority::First).unwrap();
        assert_eq!(tier1.all_words, "flood report");
        assert!(plan.tiers.get(Priority::Second).is_none());
        assert_eq!(plan.tiers.get(Priority::Third).unwrap().any_words, "pdf doc");
    }

    #[test]
    fn missing_websites_or_terms_are_rejected() {
        let args = parse(&["--all", "flood"]);
        assert!(resolve_plan(&args, &AppConfig::default()).is_err());

        let args = parse(&["--site", "example.com"]);
        assert!(resolve_plan(&args, &AppConfig::default()).is_err());
    }

    #[test]
    fn target_flag_wins() {
        let args = parse(&["--site", "a.org", "--all", "flood", "--target", "15"]);
        let plan = resolve_plan(&args, &AppConfig::default()).unwrap();
        assert_eq!(plan.target, 15);
    }

    #[test]
    fn dup_check_flag_requires_send() {
        let argv = ["greylit", "search", "--site", "a.org", "--no-dup-check"];
        assert!(Cli::try_parse_from(argv).is_err());
    }
}
