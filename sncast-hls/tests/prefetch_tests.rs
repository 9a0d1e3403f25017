//! Prefetch coordinator: accessing episode N warms episode N+1

mod helpers;

use helpers::{sine_wav_bytes, wait_until_async, EpisodeHost};
use sncast_common::{Catalog, EpisodeKey};
use sncast_hls::audio::SymphoniaDecoder;
use sncast_hls::cache::{DownloadCache, SegmentCache};
use sncast_hls::prefetch::PrefetchCoordinator;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(10);

struct Fixture {
    host: EpisodeHost,
    _dir: tempfile::TempDir,
    downloads: DownloadCache,
    segments: Arc<SegmentCache>,
    prefetch: PrefetchCoordinator,
}

/// Catalog of episodes 1..=3; the host only has files for the numbers in `hosted`
async fn fixture(hosted: &[u32]) -> Fixture {
    let mut files = HashMap::new();
    for n in hosted {
        files.insert(format!("sn{:04}.wav", n), sine_wav_bytes(4_000, 440.0));
    }
    let host = EpisodeHost::start(files, Duration::from_millis(20)).await;

    let mut m3u = String::from("#EXTM3U\n");
    for n in 1..=3 {
        m3u.push_str(&format!("#EXTINF:-1, {n} - Episode #{n} | date | Title {n}\n"));
        m3u.push_str(&format!("{}\n", host.url(&format!("sn{:04}.wav", n))));
    }
    let catalog = Arc::new(Catalog::parse(&m3u));

    let dir = tempfile::tempdir().unwrap();
    let downloads = DownloadCache::new(dir.path().to_path_buf(), 2, WAIT).unwrap();
    let segments = Arc::new(SegmentCache::new(Arc::new(SymphoniaDecoder::new()), 3));
    let prefetch = PrefetchCoordinator::new(catalog, downloads.clone(), Arc::clone(&segments));

    Fixture {
        host,
        _dir: dir,
        downloads,
        segments,
        prefetch,
    }
}

#[tokio::test]
async fn test_access_warms_successor() {
    let f = fixture(&[1, 2, 3]).await;
    let e1 = EpisodeKey::new(1);
    let e2 = EpisodeKey::new(2);

    let chain = f.prefetch.on_access(e1).expect("successor exists");
    chain.await.unwrap();

    assert!(f.downloads.is_present("sn0002.wav"));
    assert!(wait_until_async(WAIT, || f.segments.is_loaded(e2)).await);
    // The accessed episode itself is not fetched by prefetch
    assert!(!f.downloads.is_present("sn0001.wav"));
    assert!(f.prefetch.pending().is_empty());
}

#[tokio::test]
async fn test_last_episode_has_nothing_to_prefetch() {
    let f = fixture(&[1, 2, 3]).await;
    assert!(f.prefetch.on_access(EpisodeKey::new(3)).is_none());
    assert!(f.prefetch.on_access(EpisodeKey::new(42)).is_none());
    assert_eq!(f.host.hits(), 0);
}

#[tokio::test]
async fn test_repeated_access_starts_one_chain() {
    let f = fixture(&[1, 2, 3]).await;
    let e1 = EpisodeKey::new(1);

    let first = f.prefetch.on_access(e1);
    let second = f.prefetch.on_access(e1);
    assert!(first.is_some());
    assert!(second.is_none());

    first.unwrap().await.unwrap();
    assert_eq!(f.host.hits(), 1);

    // Successor already cached or loading: nothing more to do
    assert!(wait_until_async(WAIT, || f.segments.is_loaded(EpisodeKey::new(2))).await);
    assert!(f.prefetch.on_access(e1).is_none());
}

#[tokio::test]
async fn test_failed_prefetch_is_swallowed() {
    // Episode 2 is missing from the host
    let f = fixture(&[1]).await;
    let e2 = EpisodeKey::new(2);

    let chain = f.prefetch.on_access(EpisodeKey::new(1)).unwrap();
    chain.await.expect("prefetch task must not panic");

    assert!(!f.downloads.is_present("sn0002.wav"));
    assert!(!f.segments.is_loaded(e2));
    assert!(!f.segments.is_loading(e2));
    assert!(f.prefetch.pending().is_empty());
}
