//! Concurrent multi-profile resolver
//!
//! Resolves the shared region and, per profile, the account identity. Profiles
//! are resolved in parallel under a concurrency cap; one profile failing never
//! stops the others.

use super::profile::ProfileSelection;
use crate::config::Config;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

/// Default cap on concurrent identity lookups
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 50;

/// Loads region and account identity for one profile
///
/// Implementations own credential loading; the resolver only schedules calls.
#[async_trait]
pub trait IdentitySource: Send + Sync + 'static {
    /// Region configured for `selection`
    async fn region(&self, selection: &ProfileSelection) -> anyhow::Result<String>;

    /// Load `selection`'s credentials and fetch its account identity
    async fn account_id(&self, selection: &ProfileSelection) -> anyhow::Result<String>;
}

/// Why a profile could not be resolved
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Failed to resolve region from profile {context}: {source}")]
    Region {
        context: String,
        source: anyhow::Error,
    },

    #[error("Failed to resolve account for profile {context}: {source}")]
    Account {
        context: String,
        source: anyhow::Error,
    },

    #[error("Resolution cancelled for profile {context}")]
    Cancelled { context: String },

    #[error("Resolution task for profile {context} failed: {source}")]
    Join {
        context: String,
        source: tokio::task::JoinError,
    },
}

impl ResolveError {
    /// Key of the profile this error belongs to
    pub fn context(&self) -> &str {
        match self {
            Self::Region { context, .. }
            | Self::Account { context, .. }
            | Self::Cancelled { context }
            | Self::Join { context, .. } => context,
        }
    }
}

/// Outcome of one resolution pass
///
/// A pass never fails as a whole: `failure` carries one representative error
/// while `accounts` holds every profile that did resolve.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Shared region; `None` in multi-region mode or when the lookup failed
    pub region: Option<String>,
    /// Account identity keyed by [`ProfileSelection::key`]
    pub accounts: BTreeMap<String, String>,
    /// Number of profiles attempted
    pub attempted: usize,
    /// One of the failures, if any. Which one is not deterministic.
    pub failure: Option<ResolveError>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    pub fn account(&self, selection: &ProfileSelection) -> Option<&str> {
        self.accounts.get(selection.key()).map(String::as_str)
    }

    /// Non-blocking warning for the user when the pass was partial
    pub fn warning(&self) -> Option<String> {
        let failure = self.failure.as_ref()?;
        let resolved = self.accounts.len();
        let message = match self.attempted.saturating_sub(resolved) {
            0 => failure.to_string(),
            1 => format!(
                "{} of {} profiles resolved; one failed: {}",
                resolved, self.attempted, failure
            ),
            failed => format!(
                "{} of {} profiles resolved; {} failed, including: {}",
                resolved, self.attempted, failed, failure
            ),
        };
        Some(message)
    }
}

/// Resolves identities across profiles under a concurrency cap
pub struct Resolver<S> {
    source: Arc<S>,
    max_concurrent: usize,
    multi_region: bool,
}

impl<S: IdentitySource> Resolver<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            max_concurrent: DEFAULT_MAX_CONCURRENT_FETCHES,
            multi_region: false,
        }
    }

    /// Resolver using the cap and region mode from `config`
    pub fn from_config(source: Arc<S>, config: &Config) -> Self {
        Self::new(source)
            .with_max_concurrent(config.effective_max_concurrent_fetches())
            .with_multi_region(config.is_multi_region())
    }

    /// Cap on in-flight lookups (at least 1)
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// In multi-region mode no shared region is looked up
    pub fn with_multi_region(mut self, multi_region: bool) -> Self {
        self.multi_region = multi_region;
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Resolve every profile in `selections` (the default chain when empty)
    pub async fn resolve(
        &self,
        selections: &[ProfileSelection],
        cancel: &CancellationToken,
    ) -> Resolution {
        let default_chain = [ProfileSelection::DefaultChain];
        let selections = if selections.is_empty() {
            &default_chain[..]
        } else {
            selections
        };

        if selections.len() == 1 && !self.multi_region {
            return self.resolve_inline(&selections[0], cancel).await;
        }

        let total = selections.len();
        tracing::info!(
            "Resolving {} profiles (max {} concurrent, multi-region: {})",
            total,
            self.max_concurrent,
            self.multi_region
        );

        let mut region = None;
        let mut region_failure = None;
        if !self.multi_region {
            match lookup_region(self.source.as_ref(), &selections[0], cancel).await {
                Ok(r) => region = Some(r),
                Err(e) => region_failure = Some(e),
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let accounts = Arc::new(Mutex::new(BTreeMap::new()));
        // One slot per unit, so recording a failure never waits
        let (failure_tx, mut failure_rx) = mpsc::channel::<ResolveError>(total);

        let mut handles = Vec::with_capacity(total);
        for selection in selections {
            let context = selection.key().to_string();
            let handle = tokio::spawn(run_unit(
                Arc::clone(&self.source),
                selection.clone(),
                Arc::clone(&semaphore),
                Arc::clone(&accounts),
                failure_tx.clone(),
                cancel.clone(),
            ));
            handles.push((context, handle));
        }

        for (context, handle) in handles {
            if let Err(source) = handle.await {
                tracing::warn!("Resolution task for profile {} failed: {}", context, source);
                let _ = failure_tx.try_send(ResolveError::Join { context, source });
            }
        }
        drop(failure_tx);

        let accounts = std::mem::take(&mut *accounts.lock().await);
        let failure = failure_rx.try_recv().ok().or(region_failure);

        tracing::info!("Resolved {} of {} profiles", accounts.len(), total);

        Resolution {
            region,
            accounts,
            attempted: total,
            failure,
        }
    }

    /// Single profile without multi-region: no tasks, runs on the caller's task
    async fn resolve_inline(
        &self,
        selection: &ProfileSelection,
        cancel: &CancellationToken,
    ) -> Resolution {
        let mut resolution = Resolution {
            attempted: 1,
            ..Resolution::default()
        };

        match lookup_region(self.source.as_ref(), selection, cancel).await {
            Ok(region) => resolution.region = Some(region),
            Err(e) => resolution.failure = Some(e),
        }

        match resolve_account(self.source.as_ref(), selection, cancel).await {
            Ok(account) => {
                resolution
                    .accounts
                    .insert(selection.key().to_string(), account);
            }
            Err(e) => resolution.failure = Some(e),
        }

        resolution
    }
}

/// One fan-out unit: wait for a permit, resolve, record the outcome
async fn run_unit<S: IdentitySource + ?Sized>(
    source: Arc<S>,
    selection: ProfileSelection,
    semaphore: Arc<Semaphore>,
    accounts: Arc<Mutex<BTreeMap<String, String>>>,
    failure_tx: mpsc::Sender<ResolveError>,
    cancel: CancellationToken,
) {
    let context = selection.key().to_string();

    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            tracing::warn!("Semaphore closed, skipping profile {}", context);
            let _ = failure_tx.try_send(ResolveError::Cancelled { context });
            return;
        }
    };

    match resolve_account(source.as_ref(), &selection, &cancel).await {
        Ok(account) => {
            accounts.lock().await.insert(context, account);
        }
        Err(e) => {
            let _ = failure_tx.try_send(e);
        }
    }
}

async fn lookup_region<S: IdentitySource + ?Sized>(
    source: &S,
    selection: &ProfileSelection,
    cancel: &CancellationToken,
) -> Result<String, ResolveError> {
    let context = selection.key().to_string();
    if cancel.is_cancelled() {
        return Err(ResolveError::Cancelled { context });
    }

    match source.region(selection).await {
        Ok(region) => {
            tracing::debug!("Profile {} region: {}", context, region);
            Ok(region)
        }
        Err(source) => {
            tracing::warn!("Region lookup for profile {} failed: {}", context, source);
            Err(ResolveError::Region { context, source })
        }
    }
}

async fn resolve_account<S: IdentitySource + ?Sized>(
    source: &S,
    selection: &ProfileSelection,
    cancel: &CancellationToken,
) -> Result<String, ResolveError> {
    let context = selection.key().to_string();
    if cancel.is_cancelled() {
        tracing::debug!("Skipping profile {}: cancelled", context);
        return Err(ResolveError::Cancelled { context });
    }

    tracing::debug!("Resolving account for profile {}", context);
    match source.account_id(selection).await {
        Ok(account) => {
            tracing::debug!("Profile {} account: {}", context, account);
            Ok(account)
        }
        Err(source) => {
            tracing::warn!("Account lookup for profile {} failed: {}", context, source);
            Err(ResolveError::Account { context, source })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    tokio::task_local! {
        static CALLER: ();
    }

    /// Scripted source that records how lookups were scheduled
    #[derive(Default)]
    struct FakeSource {
        failing: HashSet<String>,
        panicking: HashSet<String>,
        region_fails: bool,
        delay: Duration,
        region_calls: AtomicUsize,
        account_calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        off_caller_task: AtomicUsize,
    }

    impl FakeSource {
        fn failing(mut self, key: &str) -> Self {
            self.failing.insert(key.to_string());
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl IdentitySource for FakeSource {
        async fn region(&self, _selection: &ProfileSelection) -> anyhow::Result<String> {
            self.region_calls.fetch_add(1, Ordering::SeqCst);
            if self.region_fails {
                anyhow::bail!("no region configured");
            }
            Ok("europe-west1".to_string())
        }

        async fn account_id(&self, selection: &ProfileSelection) -> anyhow::Result<String> {
            self.account_calls.fetch_add(1, Ordering::SeqCst);
            if CALLER.try_with(|_| ()).is_err() {
                self.off_caller_task.fetch_add(1, Ordering::SeqCst);
            }

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let key = selection.key();
            if self.panicking.contains(key) {
                panic!("credential loader crashed");
            }
            if self.failing.contains(key) {
                anyhow::bail!("token expired");
            }
            Ok(format!("number-{}", key))
        }
    }

    fn named(count: usize) -> Vec<ProfileSelection> {
        (0..count)
            .map(|i| ProfileSelection::Named(format!("p{}", i)))
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_never_exceeds_cap() {
        let source = Arc::new(FakeSource::default().with_delay(Duration::from_millis(20)));
        let resolver = Resolver::new(Arc::clone(&source)).with_max_concurrent(3);

        let resolution = resolver.resolve(&named(10), &CancellationToken::new()).await;

        assert!(resolution.is_complete());
        assert_eq!(resolution.accounts.len(), 10);
        assert_eq!(source.account_calls.load(Ordering::SeqCst), 10);
        // Reaches the cap but never passes it
        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_one_failure_is_isolated() {
        let source = Arc::new(FakeSource::default().failing("p2"));
        let resolver = Resolver::new(Arc::clone(&source));

        let resolution = resolver.resolve(&named(4), &CancellationToken::new()).await;

        assert_eq!(resolution.accounts.len(), 3);
        assert!(!resolution.accounts.contains_key("p2"));
        assert_eq!(resolution.account(&ProfileSelection::Named("p0".into())), Some("number-p0"));
        let failure = resolution.failure.as_ref().unwrap();
        assert!(matches!(failure, ResolveError::Account { .. }));
        assert_eq!(failure.context(), "p2");
        assert_eq!(
            resolution.warning().unwrap(),
            "3 of 4 profiles resolved; one failed: \
             Failed to resolve account for profile p2: token expired"
        );
    }

    #[tokio::test]
    async fn test_single_profile_runs_on_caller_task() {
        let source = Arc::new(FakeSource::default());
        let resolver = Resolver::new(Arc::clone(&source));
        let selections = [ProfileSelection::DefaultChain];

        let resolution = CALLER
            .scope((), resolver.resolve(&selections, &CancellationToken::new()))
            .await;

        assert_eq!(resolution.region.as_deref(), Some("europe-west1"));
        assert_eq!(resolution.accounts.get("@default").map(String::as_str), Some("number-@default"));
        assert_eq!(source.account_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.off_caller_task.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_multiple_profiles_fan_out() {
        let source = Arc::new(FakeSource::default());
        let resolver = Resolver::new(Arc::clone(&source));

        let resolution = CALLER
            .scope((), resolver.resolve(&named(2), &CancellationToken::new()))
            .await;

        assert!(resolution.is_complete());
        assert_eq!(source.region_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.off_caller_task.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_multi_region_skips_region_and_fans_out() {
        let source = Arc::new(FakeSource::default());
        let resolver = Resolver::new(Arc::clone(&source)).with_multi_region(true);

        let resolution = CALLER
            .scope((), resolver.resolve(&named(1), &CancellationToken::new()))
            .await;

        assert!(resolution.region.is_none());
        assert_eq!(resolution.accounts.len(), 1);
        assert_eq!(source.region_calls.load(Ordering::SeqCst), 0);
        assert_eq!(source.off_caller_task.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_selection_uses_default_chain() {
        let source = Arc::new(FakeSource::default());
        let resolver = Resolver::new(source);

        let resolution = resolver.resolve(&[], &CancellationToken::new()).await;

        assert_eq!(resolution.attempted, 1);
        assert!(resolution.accounts.contains_key("@default"));
    }

    #[tokio::test]
    async fn test_region_failure_keeps_accounts() {
        let source = Arc::new(FakeSource {
            region_fails: true,
            ..FakeSource::default()
        });
        let resolver = Resolver::new(source);

        let resolution = resolver.resolve(&named(3), &CancellationToken::new()).await;

        assert!(resolution.region.is_none());
        assert_eq!(resolution.accounts.len(), 3);
        assert!(matches!(resolution.failure, Some(ResolveError::Region { .. })));
        assert_eq!(
            resolution.warning().unwrap(),
            "Failed to resolve region from profile p0: no region configured"
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let source = Arc::new(FakeSource::default());
        let resolver = Resolver::new(Arc::clone(&source));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let resolution = resolver.resolve(&named(5), &cancel).await;

        assert!(resolution.accounts.is_empty());
        assert!(matches!(resolution.failure, Some(ResolveError::Cancelled { .. })));
        assert_eq!(source.account_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            resolution.warning().unwrap().split(';').next(),
            Some("0 of 5 profiles resolved")
        );
    }

    #[tokio::test]
    async fn test_panicking_unit_reported() {
        let mut fake = FakeSource::default();
        fake.panicking.insert("p1".to_string());
        let resolver = Resolver::new(Arc::new(fake));

        let resolution = resolver.resolve(&named(3), &CancellationToken::new()).await;

        assert_eq!(resolution.accounts.len(), 2);
        match resolution.failure {
            Some(ResolveError::Join { ref context, .. }) => assert_eq!(context, "p1"),
            other => panic!("expected join failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unit_without_permit_records_failure() {
        let source = Arc::new(FakeSource::default());
        let semaphore = Arc::new(Semaphore::new(1));
        semaphore.close();
        let accounts = Arc::new(Mutex::new(BTreeMap::new()));
        let (failure_tx, mut failure_rx) = mpsc::channel(1);

        run_unit(
            Arc::clone(&source),
            ProfileSelection::Named("p0".into()),
            semaphore,
            Arc::clone(&accounts),
            failure_tx,
            CancellationToken::new(),
        )
        .await;

        assert!(accounts.lock().await.is_empty());
        assert_eq!(source.account_calls.load(Ordering::SeqCst), 0);
        let failure = failure_rx.try_recv().expect("failure recorded");
        assert!(matches!(failure, ResolveError::Cancelled { .. }));
        assert_eq!(failure.context(), "p0");
    }

    #[test]
    fn test_cap_is_at_least_one() {
        let resolver = Resolver::new(Arc::new(FakeSource::default())).with_max_concurrent(0);
        assert_eq!(resolver.max_concurrent(), 1);
    }

    #[test]
    fn test_from_config() {
        let config = Config {
            max_concurrent_fetches: Some(7),
            regions: vec!["us-east1".into(), "europe-west1".into()],
            ..Config::default()
        };
        let resolver = Resolver::from_config(Arc::new(FakeSource::default()), &config);
        assert_eq!(resolver.max_concurrent(), 7);
        assert!(resolver.multi_region);
    }
}
