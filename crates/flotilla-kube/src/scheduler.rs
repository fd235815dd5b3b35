//! Bounded dependency scheduler
//!
//! Runs an action for every release, starting a release only once all the
//! charts it depends on have completed, with at most `concurrency` actions in
//! flight at any instant.
//!
//! Work is event driven: each completion strips the finished chart from the
//! remaining dependency sets and the loop immediately claims whatever became
//! ready. Independent releases have no ordering among themselves.
//!
//! The first failure wins. Once it is latched no new action starts, actions
//! already running are left to finish, and any later failures are logged and
//! dropped.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use flotilla_core::ReleaseSpec;
use flotilla_core::release::remove_from_dependencies;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{KubeError, Result};

type Pending = Arc<Mutex<Vec<ReleaseSpec>>>;
type Failure = Arc<Mutex<Option<KubeError>>>;

/// Run `action` for every release in dependency order
///
/// A `concurrency` of 0 means unbounded. Returns the first action error, or
/// [`KubeError::Starved`] if some releases could never become ready.
pub async fn schedule<F, Fut>(
    releases: Vec<ReleaseSpec>,
    concurrency: usize,
    action: F,
) -> Result<()>
where
    F: Fn(ReleaseSpec) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    if releases.is_empty() {
        return Ok(());
    }

    let permits = match concurrency {
        0 => releases.len(),
        limit => limit.min(releases.len()),
    };
    tracing::debug!(releases = releases.len(), permits, "scheduling releases");

    let pending: Pending = Arc::new(Mutex::new(releases));
    let failure: Failure = Arc::new(Mutex::new(None));
    let semaphore = Arc::new(Semaphore::new(permits));
    let action = Arc::new(action);
    let mut tasks = JoinSet::new();

    loop {
        if !is_latched(&failure) {
            for release in claim_ready(&pending) {
                let pending = Arc::clone(&pending);
                let failure = Arc::clone(&failure);
                let semaphore = Arc::clone(&semaphore);
                let action = Arc::clone(&action);

                tasks.spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return;
                    };
                    if is_latched(&failure) {
                        tracing::debug!(
                            release = %release.release_name,
                            "skipped after earlier failure"
                        );
                        return;
                    }

                    let chart = release.name.clone();
                    let release_name = release.release_name.clone();
                    tracing::debug!(release = %release_name, "release started");

                    match (*action)(release).await {
                        Ok(()) => {
                            tracing::debug!(release = %release_name, "release finished");
                            let mut pending =
                                pending.lock().unwrap_or_else(PoisonError::into_inner);
                            remove_from_dependencies(&mut pending, &chart);
                        }
                        Err(e) => latch(&failure, e),
                    }
                });
            }
        }

        match tasks.join_next().await {
            Some(Ok(())) => {}
            Some(Err(e)) => latch(
                &failure,
                KubeError::Backend(format!("release task aborted: {}", e)),
            ),
            None => break,
        }
    }

    if let Some(e) = failure.lock().unwrap_or_else(PoisonError::into_inner).take() {
        return Err(e);
    }

    let mut starved: Vec<String> = pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(|r| r.name.clone())
        .collect();
    if starved.is_empty() {
        Ok(())
    } else {
        starved.sort();
        Err(KubeError::Starved { releases: starved })
    }
}

/// Remove and return every release with no outstanding dependency
///
/// Claiming happens under the lock so a release can never be picked up twice.
fn claim_ready(pending: &Mutex<Vec<ReleaseSpec>>) -> Vec<ReleaseSpec> {
    let mut pending = pending.lock().unwrap_or_else(PoisonError::into_inner);
    let (ready, blocked): (Vec<_>, Vec<_>) = std::mem::take(&mut *pending)
        .into_iter()
        .partition(|r| !r.has_dependencies());
    *pending = blocked;
    ready
}

fn is_latched(failure: &Mutex<Option<KubeError>>) -> bool {
    failure
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .is_some()
}

fn latch(failure: &Mutex<Option<KubeError>>, error: KubeError) {
    let mut slot = failure.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_none() {
        tracing::error!(error = %error, "release failed, no new releases will be started");
        *slot = Some(error);
    } else {
        tracing::warn!(error = %error, "additional release failure dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendEvent, DeploymentBackend, InstallOptions, MockBackend};
    use futures::FutureExt;
    use futures::future::BoxFuture;
    use std::collections::HashMap;
    use std::time::Duration;

    fn installer(
        backend: &MockBackend,
    ) -> impl Fn(ReleaseSpec) -> BoxFuture<'static, Result<()>> + use<> {
        let backend = backend.clone();
        move |release| {
            let backend = backend.clone();
            async move {
                backend
                    .install_or_upgrade(&release, "dev", &InstallOptions::default())
                    .await
            }
            .boxed()
        }
    }

    fn release(name: &str, deps: &[&str]) -> ReleaseSpec {
        ReleaseSpec::new("dev", name, "1.0").with_dependencies(deps.iter().copied())
    }

    fn independent(count: usize) -> Vec<ReleaseSpec> {
        (0..count).map(|i| release(&format!("svc{}", i), &[])).collect()
    }

    /// Position of each event for a release name
    fn positions(events: &[BackendEvent]) -> (HashMap<String, usize>, HashMap<String, usize>) {
        let mut started = HashMap::new();
        let mut finished = HashMap::new();
        for (index, event) in events.iter().enumerate() {
            match event {
                BackendEvent::Started(name) => started.insert(name.clone(), index),
                BackendEvent::Finished(name) => finished.insert(name.clone(), index),
            };
        }
        (started, finished)
    }

    fn assert_dependencies_finished_first(releases: &[ReleaseSpec], events: &[BackendEvent]) {
        let (started, finished) = positions(events);
        for release in releases {
            let start = started[&release.release_name];
            for dep in &release.dependencies {
                let dep_release = format!("dev-{}", dep);
                assert!(
                    finished[&dep_release] < start,
                    "{} started before dependency {} finished",
                    release.release_name,
                    dep
                );
            }
        }
    }

    #[tokio::test]
    async fn test_empty_list() {
        let backend = MockBackend::new();
        schedule(Vec::new(), 3, installer(&backend)).await.unwrap();
        assert!(backend.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_respects_concurrency_limit() {
        let backend = MockBackend::new().with_delay(Duration::from_millis(100));

        schedule(independent(6), 2, installer(&backend)).await.unwrap();

        assert_eq!(backend.max_in_flight(), 2);
        assert_eq!(backend.deployed("dev").len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_concurrency_is_unbounded() {
        let backend = MockBackend::new().with_delay(Duration::from_millis(100));

        schedule(independent(5), 0, installer(&backend)).await.unwrap();

        assert_eq!(backend.max_in_flight(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_above_release_count() {
        let backend = MockBackend::new().with_delay(Duration::from_millis(100));

        schedule(independent(3), 10, installer(&backend)).await.unwrap();

        assert_eq!(backend.max_in_flight(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dependents_run_last_with_single_worker() {
        let backend = MockBackend::new().with_delay(Duration::from_millis(10));
        let releases = vec![
            release("kaa", &["cassandra", "mariadb"]),
            release("cassandra", &[]),
            release("mariadb", &[]),
        ];

        schedule(releases.clone(), 1, installer(&backend)).await.unwrap();

        let installs = backend.installs();
        assert_eq!(installs.len(), 3);
        assert_eq!(installs[2], "dev-kaa");
        assert!(installs[..2].contains(&"dev-cassandra".to_string()));
        assert!(installs[..2].contains(&"dev-mariadb".to_string()));
        assert_eq!(backend.max_in_flight(), 1);
        assert_dependencies_finished_first(&releases, &backend.events());
    }

    /// Layered DAG of up to five levels; each release depends on a pseudo-random
    /// subset of the releases in earlier levels
    fn layered_dag(seed: u64) -> Vec<ReleaseSpec> {
        let mut state = seed;
        let mut next = move || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) as usize
        };

        let depth = 2 + next() % 4;
        let mut earlier: Vec<String> = Vec::new();
        let mut releases = Vec::new();
        for level in 0..depth {
            let width = 1 + next() % 4;
            let mut this_level = Vec::new();
            for index in 0..width {
                let name = format!("l{}n{}", level, index);
                let deps: Vec<&str> = earlier
                    .iter()
                    .filter(|_| next() % 3 == 0)
                    .map(String::as_str)
                    .collect();
                releases.push(release(&name, &deps));
                this_level.push(name);
            }
            earlier.extend(this_level);
        }
        releases.reverse();
        releases
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_starts_before_dependencies() {
        for seed in 1..=20u64 {
            let backend = MockBackend::new().with_delay(Duration::from_millis(5));
            let releases = layered_dag(seed);
            assert!(!flotilla_core::has_cycle(&releases));

            let limit = (seed % 4) as usize;
            schedule(releases.clone(), limit, installer(&backend))
                .await
                .unwrap();

            assert_eq!(backend.deployed("dev").len(), releases.len());
            assert_dependencies_finished_first(&releases, &backend.events());
            if limit > 0 {
                assert!(backend.max_in_flight() <= limit);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_error_stops_new_work() {
        let backend = MockBackend::new().with_delay(Duration::from_millis(10));
        backend.fail_release("dev-cassandra");
        let releases = vec![
            release("cassandra", &[]),
            release("mariadb", &[]),
            release("kaa", &["cassandra"]),
        ];

        let result = schedule(releases, 2, installer(&backend)).await;

        match result {
            Err(KubeError::Deployment { release, .. }) => assert_eq!(release, "dev-cassandra"),
            other => panic!("expected deployment error, got {:?}", other),
        }
        assert!(!backend.installs().contains(&"dev-kaa".to_string()));
        // mariadb was already running and is allowed to finish
        assert!(
            backend
                .events()
                .contains(&BackendEvent::Finished("dev-mariadb".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_error_reported() {
        let backend = MockBackend::new().with_delay(Duration::from_millis(10));
        for name in ["dev-a", "dev-b", "dev-c"] {
            backend.fail_release(name);
        }

        let result = schedule(
            vec![release("a", &[]), release("b", &[]), release("c", &[])],
            3,
            installer(&backend),
        )
        .await;

        assert!(matches!(result, Err(KubeError::Deployment { .. })));
        assert_eq!(backend.installs().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_new_start_after_failure_with_single_worker() {
        let backend = MockBackend::new().with_delay(Duration::from_millis(10));
        for name in ["dev-a", "dev-b", "dev-c"] {
            backend.fail_release(name);
        }

        let result = schedule(
            vec![release("a", &[]), release("b", &[]), release("c", &[])],
            1,
            installer(&backend),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(backend.installs().len(), 1);
    }

    #[tokio::test]
    async fn test_dangling_dependency_starves() {
        let backend = MockBackend::new();
        let releases = vec![
            release("kaa", &["ghost"]),
            release("api", &["kaa"]),
            release("mariadb", &[]),
        ];

        let result = schedule(releases, 2, installer(&backend)).await;

        match result {
            Err(KubeError::Starved { releases }) => assert_eq!(releases, vec!["api", "kaa"]),
            other => panic!("expected starvation, got {:?}", other),
        }
        assert_eq!(backend.installs(), vec!["dev-mariadb"]);
    }

    #[tokio::test]
    async fn test_closure_action() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);

        schedule(
            vec![release("b", &["a"]), release("a", &[])],
            0,
            move |release: ReleaseSpec| {
                let recorder = Arc::clone(&recorder);
                async move {
                    recorder.lock().unwrap().push(release.name);
                    Ok::<(), KubeError>(())
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
    }
}
