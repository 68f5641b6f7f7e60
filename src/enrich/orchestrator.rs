//! Enrichment Orchestrator
//!
//! Drives a full run: scan the page source, merge into the page cache,
//! group merged records by winner, optionally resolve group membership,
//! then enrich each winner's records through the entity caches with a
//! bounded worker pool. Errors local to one record or one winner never
//! abort the run; only a scan-phase failure is fatal.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cache::{
    BundleCache, CacheStats, EntityCache, IdentityCache, PageCache, ScanCutoff, StatsSnapshot,
    OWNED_SETS_BUCKET, PROGRESS_BUCKET,
};
use crate::config::Config;
use crate::enrich::sources::{
    BundleResolver, ItemProgressFetcher, MembershipLister, OwnedSetFetcher, OwnedSetResult,
    ProfileResolver, Scanner,
};
use crate::error::{CoreError, Result};
use crate::models::{now_secs, EnrichedRecord, EntityEntry, OwnedSet, PrizeRef, Record};
use crate::store::KeyValueStore;
use crate::tasks::run_pool;

/// Neutral progress value for items whose fetch failed or is unavailable.
const PROGRESS_UNKNOWN: &str = "N/A";

// == Scan Mode ==
/// Which winners a run enriches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanMode {
    /// Exactly one target winner
    Single(String),
    /// Every distinct winner in the merged set
    All,
    /// Winners restricted to a group's membership
    Group(String),
}

// == Run State ==
/// Observable state of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Scanning,
    ResolvingMembership,
    Enriching,
    Done,
    Failed,
}

// == Sources ==
/// The collaborator set an orchestrator runs against.
#[derive(Clone)]
pub struct Sources {
    pub scanner: Arc<dyn Scanner>,
    pub profiles: Arc<dyn ProfileResolver>,
    pub owned_sets: Arc<dyn OwnedSetFetcher>,
    pub progress: Arc<dyn ItemProgressFetcher>,
    pub bundles: Arc<dyn BundleResolver>,
    pub members: Arc<dyn MembershipLister>,
}

// == Run Report ==
/// What a completed run produced.
#[derive(Debug)]
pub struct RunReport {
    /// Normalized page key the run scanned
    pub page_key: String,
    /// The merged record set after the scan
    pub records: Vec<Record>,
    /// One row per (record, winner) pair in scope
    pub enriched: Vec<EnrichedRecord>,
    /// Winners fully enriched
    pub identities_enriched: usize,
    /// Winners skipped (unresolvable or fetch-failed)
    pub identities_skipped: usize,
    /// Cache counters at the end of the run
    pub stats: StatsSnapshot,
}

// == Orchestrator ==
/// One orchestrator owns the caches over a shared store and runs scans
/// sequentially; overlapping runs against the same page key are outside its
/// contract (single writer per key).
pub struct Orchestrator {
    config: Config,
    page_cache: PageCache,
    entity_cache: EntityCache,
    bundle_cache: BundleCache,
    identity_cache: IdentityCache,
    sources: Sources,
    stats: Arc<CacheStats>,
    state: RwLock<RunState>,
}

impl Orchestrator {
    // == Constructor ==
    /// Builds the orchestrator and its caches over a shared store.
    pub fn new(config: Config, store: Arc<dyn KeyValueStore>, sources: Sources) -> Self {
        let stats = Arc::new(CacheStats::new());
        let page_cache = PageCache::new(
            Arc::clone(&store),
            config.page_cache_capacity,
            Arc::clone(&stats),
        );
        let entity_cache = EntityCache::new(
            Arc::clone(&store),
            Duration::from_secs(config.sweep_cooldown_secs()),
            Arc::clone(&stats),
        );
        let bundle_cache = BundleCache::new(Arc::clone(&store), Arc::clone(&stats));
        let identity_cache = IdentityCache::new(store, Arc::clone(&stats));

        Self {
            config,
            page_cache,
            entity_cache,
            bundle_cache,
            identity_cache,
            sources,
            stats,
            state: RwLock::new(RunState::Idle),
        }
    }

    /// Current run state.
    pub async fn state(&self) -> RunState {
        *self.state.read().await
    }

    async fn set_state(&self, next: RunState) {
        *self.state.write().await = next;
    }

    /// The entity cache, for callers wiring a background sweep task.
    pub fn entity_cache(&self) -> EntityCache {
        self.entity_cache.clone()
    }

    /// The page cache, for explicit cache management.
    pub fn page_cache(&self) -> PageCache {
        self.page_cache.clone()
    }

    // == Run ==
    /// Executes one full scan-and-enrich run.
    ///
    /// Scan-phase failures abort the run and leave the caches as they were;
    /// everything already persisted stays visible to the next run.
    pub async fn run(&self, page_key: &str, mode: ScanMode) -> Result<RunReport> {
        let page_key = PageCache::normalize_page_key(page_key);
        info!(page_key = page_key.as_str(), ?mode, "Starting run");

        // -- Scanning --
        self.set_state(RunState::Scanning).await;
        let scanned = match self.scan(&page_key).await {
            Ok(records) => records,
            Err(err) => {
                warn!(page_key = page_key.as_str(), "Scan failed: {}", err);
                self.set_state(RunState::Failed).await;
                return Err(CoreError::ScanFailed(err.to_string()));
            }
        };

        let outcome = match self.page_cache.merge_and_save(&page_key, scanned).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.set_state(RunState::Failed).await;
                return Err(err);
            }
        };
        let records = outcome.entry.records.clone();

        // -- Membership (group mode only) --
        let membership = match &mode {
            ScanMode::Group(group_key) => {
                self.set_state(RunState::ResolvingMembership).await;
                match self.resolve_membership(group_key).await {
                    Ok(members) => Some(members),
                    Err(err) => {
                        warn!(group_key = group_key.as_str(), "Membership resolution failed: {}", err);
                        self.set_state(RunState::Failed).await;
                        return Err(err);
                    }
                }
            }
            _ => None,
        };

        // -- Enriching --
        self.set_state(RunState::Enriching).await;
        let groups = group_by_winner(&records, &mode, membership.as_ref());

        let mut enriched = Vec::new();
        let mut identities_enriched = 0;
        let mut identities_skipped = 0;

        for (winner, winner_records) in groups {
            match self.enrich_identity(&winner, winner_records.clone()).await {
                Ok(rows) => {
                    enriched.extend(rows);
                    identities_enriched += 1;
                }
                Err(CoreError::Storage(msg)) => {
                    // Storage failures are not per-identity noise; abort
                    self.set_state(RunState::Failed).await;
                    return Err(CoreError::Storage(msg));
                }
                Err(err) => {
                    warn!(winner = winner.as_str(), "Skipping identity: {}", err);
                    enriched.extend(blank_rows(winner_records, &winner));
                    identities_skipped += 1;
                }
            }
        }

        // Surface the deferred eviction before reporting; a failure there
        // does not undo an otherwise complete run
        match outcome.eviction.await {
            Ok(Ok(evicted)) if evicted > 0 => {
                debug!(evicted, "Post-save eviction trimmed the page cache")
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) => warn!("Post-save eviction failed: {}", err),
            Err(err) => warn!("Post-save eviction task aborted: {}", err),
        }

        self.set_state(RunState::Done).await;
        info!(
            page_key = page_key.as_str(),
            records = records.len(),
            rows = enriched.len(),
            identities_enriched,
            identities_skipped,
            "Run complete"
        );

        Ok(RunReport {
            page_key,
            records,
            enriched,
            identities_enriched,
            identities_skipped,
            stats: self.stats.snapshot(),
        })
    }

    // == Scanning ==
    /// Follows pagination until the source is exhausted or the cutoff
    /// policy fires. The page that triggers the cutoff still enters the
    /// merge in full; only further page requests stop.
    async fn scan(&self, page_key: &str) -> Result<Vec<Record>> {
        let prior = self.page_cache.load(page_key).await?;
        let last_refresh = prior.map(|entry| entry.last_refresh).unwrap_or(0);
        let cutoff = ScanCutoff::new(self.config.safety_window_secs(), last_refresh);
        let now = now_secs();

        let mut batch = Vec::new();
        let mut page_index = 0;
        loop {
            let page = self.sources.scanner.fetch_page(page_key, page_index).await?;
            if page.is_empty() {
                break;
            }
            let stop = page.iter().any(|r| cutoff.should_stop(r.ts, now));
            batch.extend(page);
            if stop {
                debug!(page_key, page_index, "Scan cutoff reached");
                break;
            }
            page_index += 1;
        }

        debug!(page_key, pages = page_index + 1, records = batch.len(), "Scan finished");
        Ok(batch)
    }

    // == Membership ==
    /// Exhausts the paginated membership listing into a normalized set.
    async fn resolve_membership(&self, group_key: &str) -> Result<HashSet<String>> {
        let mut members = HashSet::new();
        let mut page_index = 0;
        loop {
            let page = self
                .sources
                .members
                .fetch_members_page(group_key, page_index)
                .await?;
            if page.is_empty() {
                break;
            }
            members.extend(page.iter().map(|m| IdentityCache::normalize_name(m)));
            page_index += 1;
        }
        debug!(group_key, members = members.len(), "Membership resolved");
        Ok(members)
    }

    // == Identity Enrichment ==
    /// Enriches one winner's records: resolve the external id, fetch the
    /// owned set once, then fan the records out over the worker pool.
    async fn enrich_identity(
        &self,
        winner: &str,
        records: Vec<Record>,
    ) -> Result<Vec<EnrichedRecord>> {
        let external_id = self.resolve_identity(winner).await?;
        let owned = self.load_owned_set(&external_id).await?;

        if owned.restricted {
            // Nothing to fetch per item, and not worth the requests either
            debug!(winner, "Owned set restricted, skipping per-item fetches");
            return Ok(blank_rows(records, winner));
        }

        let owned = Arc::new(owned.value);
        let results: Arc<Mutex<Vec<EnrichedRecord>>> =
            Arc::new(Mutex::new(Vec::with_capacity(records.len())));

        let entity_cache = self.entity_cache.clone();
        let bundle_cache = self.bundle_cache.clone();
        let progress_fetcher = Arc::clone(&self.sources.progress);
        let bundle_resolver = Arc::clone(&self.sources.bundles);
        let external_id = Arc::new(external_id);
        let winner_name = Arc::new(winner.to_string());
        let ttl_secs = self.config.entity_ttl_secs();
        let sink = Arc::clone(&results);

        run_pool(
            records,
            self.config.enrichment_concurrency,
            move |record: Record| {
                let entity_cache = entity_cache.clone();
                let bundle_cache = bundle_cache.clone();
                let progress_fetcher = Arc::clone(&progress_fetcher);
                let bundle_resolver = Arc::clone(&bundle_resolver);
                let external_id = Arc::clone(&external_id);
                let winner_name = Arc::clone(&winner_name);
                let owned = Arc::clone(&owned);
                let sink = Arc::clone(&sink);
                async move {
                    // Failures stay inside the task: the record gets neutral
                    // values and the pool keeps running
                    let (playtime, progress) = match enrich_record(
                        &record,
                        &external_id,
                        &owned,
                        &entity_cache,
                        &bundle_cache,
                        progress_fetcher.as_ref(),
                        bundle_resolver.as_ref(),
                        ttl_secs,
                    )
                    .await
                    {
                        Ok(pair) => pair,
                        Err(err) => {
                            warn!(gid = record.gid.as_str(), "Enrichment task failed: {}", err);
                            (None, Some(PROGRESS_UNKNOWN.to_string()))
                        }
                    };
                    sink.lock().await.push(EnrichedRecord {
                        record,
                        winner: winner_name.as_ref().clone(),
                        playtime_minutes: playtime,
                        progress,
                    });
                }
            },
        )
        .await;

        let mut guard = results.lock().await;
        Ok(std::mem::take(&mut *guard))
    }

    /// Resolves a winner name to an external id through the permanent
    /// identity cache.
    async fn resolve_identity(&self, winner: &str) -> Result<String> {
        if let Some(id) = self.identity_cache.get(winner).await? {
            return Ok(id);
        }
        let id = self
            .sources
            .profiles
            .resolve_external_identity(winner)
            .await?;
        self.identity_cache.put(winner, &id).await?;
        Ok(id)
    }

    /// Loads the owned set through the entity cache, fetching once per TTL
    /// window. Empty fetch results are cached as the restricted sentinel.
    async fn load_owned_set(&self, external_id: &str) -> Result<EntityEntry<OwnedSet>> {
        let ttl_secs = self.config.entity_ttl_secs();
        if let Some(entry) = self
            .entity_cache
            .get_fresh::<OwnedSet>(OWNED_SETS_BUCKET, external_id, ttl_secs)
            .await?
        {
            return Ok(entry);
        }

        match self.sources.owned_sets.fetch_owned_set(external_id).await? {
            OwnedSetResult::Owned(set) if !set.is_empty() => {
                self.entity_cache
                    .put(OWNED_SETS_BUCKET, external_id, set.clone())
                    .await?;
                Ok(EntityEntry::new(set, false))
            }
            // An empty enumeration and an explicit refusal cache the same
            // way; they are indistinguishable upstream
            OwnedSetResult::Owned(_) | OwnedSetResult::Restricted => {
                self.entity_cache
                    .put_restricted(OWNED_SETS_BUCKET, external_id, OwnedSet::new())
                    .await?;
                Ok(EntityEntry::new(OwnedSet::new(), true))
            }
        }
    }
}

// == Record Enrichment ==
/// Resolves one record's item ids, playtime, and progress string.
#[allow(clippy::too_many_arguments)]
async fn enrich_record(
    record: &Record,
    external_id: &str,
    owned: &OwnedSet,
    entity_cache: &EntityCache,
    bundle_cache: &BundleCache,
    progress_fetcher: &dyn ItemProgressFetcher,
    bundle_resolver: &dyn BundleResolver,
    ttl_secs: u64,
) -> Result<(Option<u64>, Option<String>)> {
    let items = match record.prize {
        PrizeRef::App(id) => vec![id],
        PrizeRef::Sub(id) => resolve_bundle(id, bundle_cache, bundle_resolver).await?,
    };

    let playtime = playtime_of(owned, &items);

    let mut progresses = Vec::with_capacity(items.len());
    for item in &items {
        progresses.push(
            item_progress(external_id, *item, entity_cache, progress_fetcher, ttl_secs).await?,
        );
    }
    let progress = combine_progress(&progresses);

    Ok((playtime, Some(progress)))
}

/// Resolves bundle membership through the permanent bundle cache.
async fn resolve_bundle(
    bundle_id: u32,
    cache: &BundleCache,
    resolver: &dyn BundleResolver,
) -> Result<Vec<u32>> {
    if let Some(entry) = cache.get(bundle_id).await? {
        return Ok(entry.items);
    }
    let items = resolver.resolve_bundle_items(bundle_id).await?;
    cache.put(bundle_id, items.clone()).await?;
    Ok(items)
}

/// Fetches one item's progress through the entity cache.
async fn item_progress(
    external_id: &str,
    item_id: u32,
    cache: &EntityCache,
    fetcher: &dyn ItemProgressFetcher,
    ttl_secs: u64,
) -> Result<String> {
    let key = format!("{}:{}", external_id, item_id);
    if let Some(entry) = cache
        .get_fresh::<String>(PROGRESS_BUCKET, &key, ttl_secs)
        .await?
    {
        return Ok(entry.value);
    }
    let progress = fetcher.fetch_item_progress(external_id, item_id).await?;
    cache.put(PROGRESS_BUCKET, &key, progress.clone()).await?;
    Ok(progress)
}

// == Grouping ==
/// Partitions records by normalized winner name, restricted to the mode's
/// scope. BTreeMap keeps identity order deterministic across runs.
fn group_by_winner(
    records: &[Record],
    mode: &ScanMode,
    membership: Option<&HashSet<String>>,
) -> BTreeMap<String, Vec<Record>> {
    let target = match mode {
        ScanMode::Single(name) => Some(IdentityCache::normalize_name(name)),
        _ => None,
    };

    let mut groups: BTreeMap<String, Vec<Record>> = BTreeMap::new();
    for record in records {
        for winner in &record.winners {
            let key = IdentityCache::normalize_name(winner);
            if let Some(target) = &target {
                if &key != target {
                    continue;
                }
            }
            if let Some(members) = membership {
                if !members.contains(&key) {
                    continue;
                }
            }
            groups.entry(key).or_default().push(record.clone());
        }
    }
    groups
}

/// Rows for a skipped or restricted identity: every value neutral.
fn blank_rows(records: Vec<Record>, winner: &str) -> Vec<EnrichedRecord> {
    records
        .into_iter()
        .map(|record| EnrichedRecord {
            record,
            winner: winner.to_string(),
            playtime_minutes: None,
            progress: None,
        })
        .collect()
}

/// Total usage minutes over the items present in the owned set; `None` when
/// none of them are owned.
fn playtime_of(owned: &OwnedSet, items: &[u32]) -> Option<u64> {
    let mut total = 0;
    let mut any = false;
    for item in items {
        if let Some(minutes) = owned.get(item) {
            total += minutes;
            any = true;
        }
    }
    any.then_some(total)
}

/// Parses a `"done/total"` string.
fn parse_progress(progress: &str) -> Option<(u64, u64)> {
    let (done, total) = progress.split_once('/')?;
    Some((done.trim().parse().ok()?, total.trim().parse().ok()?))
}

/// Combines per-item progress strings into one: a lone item keeps its
/// string, a bundle sums the parseable fractions, and anything without a
/// parseable fraction reads as unknown.
fn combine_progress(progresses: &[String]) -> String {
    match progresses {
        [] => PROGRESS_UNKNOWN.to_string(),
        [single] => single.clone(),
        many => {
            let mut done = 0;
            let mut total = 0;
            let mut any = false;
            for p in many {
                if let Some((d, t)) = parse_progress(p) {
                    done += d;
                    total += t;
                    any = true;
                }
            }
            if any {
                format!("{}/{}", done, total)
            } else {
                PROGRESS_UNKNOWN.to_string()
            }
        }
    }
}
