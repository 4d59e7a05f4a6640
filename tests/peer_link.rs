use std::{net::{IpAddr, Ipv4Addr}, time::Duration};

use chat_relay::{
    client::link::{fetch, PeerLink},
    protocol::LinkNotice,
    AppErr,
};

const LOCAL: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

#[tokio::test]
async fn fetch_copies_the_file_directly() {
    let seeder = tempfile::tempdir().unwrap();
    let fetcher = tempfile::tempdir().unwrap();
    let src = seeder.path().join("song_v2.ogg");
    let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 253) as u8).collect();
    std::fs::write(&src, &payload).unwrap();

    let (link, _serving) = PeerLink::open(&src, LOCAL, Duration::from_secs(10)).await.unwrap();
    let notice = link.notice();
    assert_eq!(notice.port, link.addr.port());
    assert_eq!(
        link.advertisement(),
        format!("--send_by_link {}_127.0.0.1:{}", src.display(), link.addr.port())
    );

    // parsed back from the advertised text, as a receiver would
    let parsed = LinkNotice::parse(&notice.to_string()).unwrap();
    let (dest, n) = fetch(&parsed, fetcher.path()).await.unwrap();
    assert_eq!(dest, fetcher.path().join("dist-song_v2.ogg"));
    assert_eq!(n as usize, payload.len());
    assert_eq!(std::fs::read(&dest).unwrap(), payload);

    // the link serves more than one peer while it lives
    let other = tempfile::tempdir().unwrap();
    let (again, _) = fetch(&parsed, other.path()).await.unwrap();
    assert_eq!(std::fs::read(again).unwrap(), payload);
}

#[tokio::test]
async fn link_closes_after_its_window() {
    let seeder = tempfile::tempdir().unwrap();
    let src = seeder.path().join("a.txt");
    std::fs::write(&src, b"short lived").unwrap();

    let (link, serving) = PeerLink::open(&src, LOCAL, Duration::from_millis(200)).await.unwrap();
    let served = tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .expect("listener stops on its own")
        .unwrap();
    assert_eq!(served, 0);

    let fetcher = tempfile::tempdir().unwrap();
    let err = fetch(&link.notice(), fetcher.path()).await.unwrap_err();
    assert!(matches!(err, AppErr::LinkExpired), "{err}");
    assert!(!fetcher.path().join("dist-a.txt").exists());
}

#[tokio::test]
async fn missing_seed_file_reads_as_expired() {
    let seeder = tempfile::tempdir().unwrap();
    let src = seeder.path().join("gone.txt");
    std::fs::write(&src, b"x").unwrap();
    let (link, _serving) = PeerLink::open(&src, LOCAL, Duration::from_secs(10)).await.unwrap();
    std::fs::remove_file(&src).unwrap();

    let fetcher = tempfile::tempdir().unwrap();
    let err = fetch(&link.notice(), fetcher.path()).await.unwrap_err();
    assert!(matches!(err, AppErr::LinkExpired), "{err}");
}
