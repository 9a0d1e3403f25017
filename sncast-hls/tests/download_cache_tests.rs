//! Download cache tests against a local episode host

mod helpers;

use helpers::EpisodeHost;
use sncast_hls::cache::DownloadCache;
use sncast_hls::Error;
use std::collections::HashMap;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);

fn payload() -> Vec<u8> {
    (0..200_000u32).map(|i| (i % 251) as u8).collect()
}

async fn host_with(name: &str, delay: Duration) -> EpisodeHost {
    let mut files = HashMap::new();
    files.insert(name.to_string(), payload());
    EpisodeHost::start(files, delay).await
}

#[tokio::test]
async fn test_concurrent_callers_share_one_fetch() {
    let host = host_with("sn0042.mp3", Duration::from_millis(200)).await;
    let dir = tempfile::tempdir().unwrap();
    let cache = DownloadCache::new(dir.path().to_path_buf(), 2, TIMEOUT).unwrap();
    let url = host.url("sn0042.mp3");

    let callers: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let url = url.clone();
            tokio::spawn(async move { cache.ensure_downloaded(&url, "sn0042.mp3").await })
        })
        .collect();

    let mut paths = Vec::new();
    for caller in callers {
        paths.push(caller.await.unwrap().unwrap());
    }

    let expected = dir.path().join("sn0042.mp3");
    assert!(paths.iter().all(|p| *p == expected));
    assert_eq!(host.hits(), 1);
    assert_eq!(cache.fetch_count(), 1);
    assert_eq!(std::fs::read(&expected).unwrap(), payload());
    assert!(!cache.is_downloading("sn0042.mp3"));
}

#[tokio::test]
async fn test_present_file_not_fetched_again() {
    let host = host_with("sn0001.mp3", Duration::ZERO).await;
    let dir = tempfile::tempdir().unwrap();
    let cache = DownloadCache::new(dir.path().to_path_buf(), 2, TIMEOUT).unwrap();
    let url = host.url("sn0001.mp3");

    cache.ensure_downloaded(&url, "sn0001.mp3").await.unwrap();
    cache.ensure_downloaded(&url, "sn0001.mp3").await.unwrap();

    assert_eq!(host.hits(), 1);
    assert!(cache.is_present("sn0001.mp3"));
}

#[tokio::test]
async fn test_failed_fetch_leaves_nothing_and_frees_slot() {
    let host = host_with("sn0001.mp3", Duration::ZERO).await;
    let dir = tempfile::tempdir().unwrap();
    let cache = DownloadCache::new(dir.path().to_path_buf(), 2, TIMEOUT).unwrap();
    let url = host.url("sn0404.mp3");

    let result = cache.ensure_downloaded(&url, "sn0404.mp3").await;
    assert!(matches!(result, Err(Error::Download(_))));

    assert!(!dir.path().join("sn0404.mp3").exists());
    assert!(!dir.path().join("sn0404.mp3.part").exists());
    assert!(!cache.is_downloading("sn0404.mp3"));
    assert!(cache.downloading().is_empty());

    // The slot is free, so a second call fetches again
    let retry = cache.ensure_downloaded(&url, "sn0404.mp3").await;
    assert!(retry.is_err());
    assert_eq!(host.hits(), 2);
}

#[tokio::test]
async fn test_joiners_see_the_same_failure() {
    let host = host_with("sn0001.mp3", Duration::from_millis(200)).await;
    let dir = tempfile::tempdir().unwrap();
    let cache = DownloadCache::new(dir.path().to_path_buf(), 1, TIMEOUT).unwrap();
    let url = host.url("missing.mp3");

    let (a, b) = tokio::join!(
        cache.ensure_downloaded(&url, "missing.mp3"),
        cache.ensure_downloaded(&url, "missing.mp3"),
    );

    assert!(matches!(a, Err(Error::Download(_))));
    assert!(matches!(b, Err(Error::Download(_))));
    assert_eq!(host.hits(), 1);
}

#[tokio::test]
async fn test_in_flight_name_is_reported() {
    let host = host_with("sn0007.mp3", Duration::from_millis(300)).await;
    let dir = tempfile::tempdir().unwrap();
    let cache = DownloadCache::new(dir.path().to_path_buf(), 1, TIMEOUT).unwrap();

    let worker = {
        let cache = cache.clone();
        let url = host.url("sn0007.mp3");
        tokio::spawn(async move { cache.ensure_downloaded(&url, "sn0007.mp3").await })
    };

    assert!(helpers::wait_until_async(TIMEOUT, || cache.is_downloading("sn0007.mp3")).await);
    assert_eq!(cache.downloading(), vec!["sn0007.mp3".to_string()]);
    // Not visible under the final name until complete
    assert!(!cache.is_present("sn0007.mp3"));

    worker.await.unwrap().unwrap();
    assert!(cache.is_present("sn0007.mp3"));
}

#[test]
fn test_fetch_cancelled_with_its_runtime_frees_the_name() {
    let host_rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let host = host_rt.block_on(host_with("sn0009.mp3", Duration::from_millis(500)));
    let url = host.url("sn0009.mp3");

    let dir = tempfile::tempdir().unwrap();
    let cache = DownloadCache::new(dir.path().to_path_buf(), 1, TIMEOUT).unwrap();

    // Start the fetch on a runtime that is torn down while it is in flight
    let doomed = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    doomed.block_on(async {
        let attempt = tokio::time::timeout(
            Duration::from_millis(100),
            cache.ensure_downloaded(&url, "sn0009.mp3"),
        )
        .await;
        assert!(attempt.is_err(), "fetch should still be waiting on the host");
        assert!(cache.is_downloading("sn0009.mp3"));
    });
    drop(doomed);

    assert!(!cache.is_downloading("sn0009.mp3"));
    assert!(!cache.is_present("sn0009.mp3"));

    // A later caller starts a fresh fetch instead of joining a dead one
    let retry = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let path = retry
        .block_on(cache.ensure_downloaded(&url, "sn0009.mp3"))
        .unwrap();
    assert_eq!(std::fs::read(path).unwrap(), payload());
    assert_eq!(cache.fetch_count(), 2);

    drop(host);
}
