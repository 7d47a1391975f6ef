//! Tiered search escalation: website → tier → page, with URL deduplication.
//!
//! For each website the escalator walks the non-empty query tiers in order,
//! requesting pages until the tier's page cap, a short page, or the target
//! count is reached. The page that crosses the target is kept whole.
//! Lower tiers only run while the website is still under target.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};

use greylit_search::{KeyRotation, PageRequest, PageSource};
use greylit_shared::{
    GreylitError, MAX_RESULTS_PER_WEBSITE, PAGE_SIZE, PageFailure, Priority, QuerySpec, RawResult,
    Result, ResultSet, RunId, SearchResult, TierSet,
};

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called before a website's first request.
    fn website_started(&self, website: &str, current: usize, total: usize);
    /// Called after each page is merged.
    fn page_fetched(&self, website: &str, tier: Priority, page: u32, unique: usize);
    /// Called when a website is done (complete or partial).
    fn website_finished(&self, set: &ResultSet);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn website_started(&self, _website: &str, _current: usize, _total: usize) {}
    fn page_fetched(&self, _website: &str, _tier: Priority, _page: u32, _unique: usize) {}
    fn website_finished(&self, _set: &ResultSet) {}
}

// ---------------------------------------------------------------------------
// RunReport
// ---------------------------------------------------------------------------

/// Why a run stopped before reaching the last website.
#[derive(Debug)]
pub enum RunHalt {
    /// Every search API key hit its quota.
    RateLimited(GreylitError),
    /// The operator interrupted the run between websites.
    Interrupted,
}

/// Outcome of a multi-website run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: RunId,
    /// Result sets in the order the websites were searched.
    pub sets: Vec<ResultSet>,
    /// Websites never searched because the run halted.
    pub skipped: Vec<String>,
    pub halt: Option<RunHalt>,
    pub elapsed: std::time::Duration,
}

impl RunReport {
    pub fn total_results(&self) -> usize {
        self.sets.iter().map(ResultSet::len).sum()
    }

    /// Page failures recorded on partial result sets.
    pub fn failures(&self) -> impl Iterator<Item = &PageFailure> {
        self.sets.iter().filter_map(|s| s.failure.as_ref())
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self.halt, Some(RunHalt::RateLimited(_)))
    }
}

// ---------------------------------------------------------------------------
// Escalator
// ---------------------------------------------------------------------------

/// Runs tiered searches through a [`PageSource`].
pub struct Escalator<S> {
    source: S,
    interrupt: Option<Arc<AtomicBool>>,
}

impl<S: PageSource> Escalator<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            interrupt: None,
        }
    }

    /// Stop between websites once `flag` is set.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Search one website through up to three tiers.
    ///
    /// A non-quota page failure is recorded on the returned set as a
    /// [`PageFailure`]; running out of keys is an error.
    pub async fn search(
        &self,
        website: &str,
        tiers: &TierSet,
        target: usize,
        rotation: &mut KeyRotation,
    ) -> Result<ResultSet> {
        let website = validate_website(website)?;
        let target = effective_target(target)?;

        let (set, fatal) = self
            .escalate(website, tiers, target, rotation, &SilentProgress)
            .await;
        match fatal {
            Some(err) => Err(err),
            None => Ok(set),
        }
    }

    /// Search every website in turn, one to completion before the next.
    ///
    /// Only configuration problems are returned as errors. Quota exhaustion
    /// and interruption end the run early and are recorded on the report,
    /// which keeps every result gathered up to that point.
    #[instrument(skip_all, fields(websites = websites.len(), target = target))]
    pub async fn run(
        &self,
        websites: &[String],
        tiers: &TierSet,
        target: usize,
        progress: &dyn ProgressReporter,
    ) -> Result<RunReport> {
        let start = Instant::now();
        let target = effective_target(target)?;
        let websites = dedup_websites(websites);
        let run_id = RunId::new();

        // Fresh rotation per run: keys spent in an earlier run are retried.
        let mut rotation = KeyRotation::new();

        info!(
            %run_id,
            websites = websites.len(),
            tiers = tiers.active().count(),
            target,
            "starting search run"
        );

        let mut report = RunReport {
            run_id,
            sets: Vec::with_capacity(websites.len()),
            skipped: Vec::new(),
            halt: None,
            elapsed: Default::default(),
        };

        let total = websites.len();
        for (i, website) in websites.iter().enumerate() {
            if self.interrupted() {
                warn!(remaining = total - i, "run interrupted");
                report.halt = Some(RunHalt::Interrupted);
                report.skipped = websites[i..].to_vec();
                break;
            }

            progress.website_started(website, i + 1, total);
            let (set, fatal) = self
                .escalate(website, tiers, target, &mut rotation, progress)
                .await;
            progress.website_finished(&set);
            report.sets.push(set);

            if let Some(err) = fatal {
                error!(error = %err, remaining = total - i - 1, "halting run");
                report.halt = Some(RunHalt::RateLimited(err));
                report.skipped = websites[i + 1..].to_vec();
                break;
            }
        }

        report.elapsed = start.elapsed();

        info!(
            run_id = %report.run_id,
            searched = report.sets.len(),
            skipped = report.skipped.len(),
            results = report.total_results(),
            failures = report.failures().count(),
            elapsed_ms = report.elapsed.as_millis(),
            "search run complete"
        );

        Ok(report)
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Escalate through the tiers for one website.
    ///
    /// Returns the accumulated set and, when the key pool ran dry, the
    /// run-level error. Page failures end up on the set instead.
    #[instrument(skip(self, tiers, rotation, progress))]
    async fn escalate(
        &self,
        website: &str,
        tiers: &TierSet,
        target: usize,
        rotation: &mut KeyRotation,
        progress: &dyn ProgressReporter,
    ) -> (ResultSet, Option<GreylitError>) {
        let mut set = ResultSet::new(website);
        let mut seen: HashSet<String> = HashSet::new();
        let mut fatal = None;

        'tiers: for spec in tiers.active() {
            if set.len() >= target {
                break;
            }
            set.queries.push(spec.describe(website));

            for page in 1..=spec.priority.page_cap() {
                let request = PageRequest {
                    website,
                    query: spec,
                    page,
                };

                match self.source.fetch_page(&request, rotation).await {
                    Ok(items) => {
                        let full_page = items.len() >= PAGE_SIZE;
                        let added = merge_page(&mut set, &mut seen, items, spec, website);
                        debug!(tier = %spec.priority, page, added, unique = set.len(), "page merged");
                        progress.page_fetched(website, spec.priority, page, set.len());

                        if set.len() >= target || !full_page {
                            break;
                        }
                    }
                    Err(err @ GreylitError::RateLimitExhausted { .. }) => {
                        fatal = Some(err);
                        break 'tiers;
                    }
                    Err(err) => {
                        warn!(tier = %spec.priority, page, error = %err, "page failed, keeping partial results");
                        set.failure = Some(page_failure(&request, err));
                        break 'tiers;
                    }
                }
            }
        }

        set.results.truncate(MAX_RESULTS_PER_WEBSITE);
        (set, fatal)
    }
}

/// Append unseen links from `items`, tagged with the spec's tier.
fn merge_page(
    set: &mut ResultSet,
    seen: &mut HashSet<String>,
    items: Vec<RawResult>,
    spec: &QuerySpec,
    website: &str,
) -> usize {
    let mut added = 0;
    for raw in items {
        if raw.link.trim().is_empty() {
            debug!(title = %raw.title, "dropping result without link");
            continue;
        }
        if seen.insert(raw.link.clone()) {
            set.results
                .push(SearchResult::from_raw(raw, spec.priority, website));
            added += 1;
        }
    }
    added
}

fn page_failure(request: &PageRequest<'_>, err: GreylitError) -> PageFailure {
    match err {
        GreylitError::PageFetch {
            website,
            tier,
            page,
            message,
        } => PageFailure {
            website,
            tier,
            page,
            message,
        },
        other => PageFailure {
            website: request.website.to_string(),
            tier: request.query.priority,
            page: request.page,
            message: other.to_string(),
        },
    }
}

fn validate_website(website: &str) -> Result<&str> {
    let trimmed = website.trim();
    if trimmed.is_empty() {
        return Err(GreylitError::config("website is empty"));
    }
    Ok(trimmed)
}

fn effective_target(target: usize) -> Result<usize> {
    if target == 0 {
        return Err(GreylitError::config("target result count must be at least 1"));
    }
    if target > MAX_RESULTS_PER_WEBSITE {
        warn!(
            target,
            max = MAX_RESULTS_PER_WEBSITE,
            "target above the per-website ceiling, clamping"
        );
        return Ok(MAX_RESULTS_PER_WEBSITE);
    }
    Ok(target)
}

/// Trim, drop blanks, and keep the first occurrence of each website.
fn dedup_websites(websites: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    websites
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .filter(|w| seen.insert(w.to_string()))
        .map(String::from)
        .collect()
}
