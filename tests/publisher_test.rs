//! Integration tests for the publisher, using an in-memory platform.

use std::path::Path;
use std::sync::{Arc, Mutex};

use antarctica_today_social::error::{PublishError, Result};
use antarctica_today_social::ledger::{CoveredDate, LedgerStore};
use antarctica_today_social::platforms::{
    ImageAttachment, PlatformAdapter, PlatformKind, PostLimits, RemoteImage, RemotePost,
    ReplyTarget, SessionState,
};
use antarctica_today_social::publisher::{Manifest, ManifestImage, PlatformSession, Publisher};
use async_trait::async_trait;
use tempfile::TempDir;

const HEADER: &str = "post_id,date_covered,reply_to_id,timestamp,text,img1,img1_alt,img2,img2_alt,img3,img3_alt,img4,img4_alt,comments\n";

/// What the fake platform holds, shared with the test body.
#[derive(Debug, Default)]
struct Remote {
    posts: Vec<RemotePost>,
    submitted: Vec<(String, Option<String>)>,
    logins: usize,
    reject_login: bool,
    reject_posts: bool,
}

struct FakePlatform {
    name: &'static str,
    remote: Arc<Mutex<Remote>>,
    logged_in: bool,
    cached: bool,
}

impl FakePlatform {
    fn new(name: &'static str, remote: Arc<Mutex<Remote>>) -> Self {
        Self {
            name,
            remote,
            logged_in: false,
            cached: false,
        }
    }
}

#[async_trait]
impl PlatformAdapter for FakePlatform {
    fn platform(&self) -> &str {
        self.name
    }

    fn state(&self) -> SessionState {
        match (self.logged_in, self.cached) {
            (false, _) => SessionState::Unauthenticated,
            (true, false) => SessionState::Authenticated,
            (true, true) => SessionState::ThreadCached,
        }
    }

    async fn login(&mut self) -> Result<()> {
        let mut remote = self.remote.lock().unwrap();
        remote.logins += 1;
        if remote.reject_login {
            return Err(PublishError::AuthenticationFailure {
                platform: self.name.to_string(),
                message: "bad password".to_string(),
            });
        }
        self.logged_in = true;
        Ok(())
    }

    async fn fetch_thread(&mut self, _root_id: &str) -> Result<Vec<RemotePost>> {
        self.cached = true;
        Ok(self.remote.lock().unwrap().posts.clone())
    }

    async fn get_post(&self, post_id: &str) -> Result<RemotePost> {
        self.remote
            .lock()
            .unwrap()
            .posts
            .iter()
            .find(|p| p.post_id == post_id)
            .cloned()
            .ok_or_else(|| PublishError::RemoteUnavailable {
                platform: self.name.to_string(),
                message: "404".to_string(),
            })
    }

    async fn create_post(
        &mut self,
        text: &str,
        images: &[ImageAttachment],
        reply_target: &ReplyTarget,
    ) -> Result<String> {
        PostLimits {
            post_limit: 300,
            alt_text_limit: 100,
        }
        .check(self.name, text, images)?;

        let mut remote = self.remote.lock().unwrap();
        if remote.reject_posts {
            return Err(PublishError::RemoteUnavailable {
                platform: self.name.to_string(),
                message: "503 Service Unavailable".to_string(),
            });
        }
        let parent = match reply_target {
            ReplyTarget::Root => None,
            ReplyTarget::ReplyTo(id) => Some(id.clone()),
        };
        let id = format!("{}-{}", self.name, remote.posts.len() + 1);
        remote.submitted.push((text.to_string(), parent.clone()));
        remote.posts.push(RemotePost {
            post_id: id.clone(),
            reply_to_id: parent,
            author: "icesheet".to_string(),
            timestamp: Some("2023-12-17T15:00:00.000Z".to_string()),
            text: text.to_string(),
            images: images
                .iter()
                .map(|i| RemoteImage {
                    url: format!("https://cdn.example/{}", i.path.display()),
                    alt_text: Some(i.alt_text.clone()),
                })
                .collect(),
        });
        self.cached = false;
        Ok(id)
    }
}

fn date(s: &str) -> CoveredDate {
    s.parse().unwrap()
}

fn remote_post(id: &str, parent: Option<&str>) -> RemotePost {
    RemotePost {
        post_id: id.to_string(),
        reply_to_id: parent.map(str::to_string),
        author: "icesheet".to_string(),
        timestamp: Some("2023-12-15T15:00:00.000Z".to_string()),
        text: format!("post {id}"),
        images: Vec::new(),
    }
}

/// A ledger seeded by hand with the root post only.
fn seed_ledger(dir: &Path, name: &str) -> LedgerStore {
    let path = dir.join(name);
    std::fs::write(&path, format!("{HEADER}A,2023.12.15,,,,,,,,,,,,\n")).unwrap();
    LedgerStore::new(path)
}

fn platform(
    kind: PlatformKind,
    store: LedgerStore,
    suffix: &str,
    posts: Vec<RemotePost>,
) -> (PlatformSession, Arc<Mutex<Remote>>) {
    let remote = Arc::new(Mutex::new(Remote {
        posts,
        ..Remote::default()
    }));
    let adapter = FakePlatform::new(kind.as_str(), Arc::clone(&remote));
    (
        PlatformSession::new(kind, Box::new(adapter), store, suffix),
        remote,
    )
}

#[tokio::test]
async fn test_publish_appends_reply_to_tip() {
    let dir = TempDir::new().unwrap();
    let store = seed_ledger(dir.path(), "bluesky_posts.csv");
    let (session, remote) = platform(
        PlatformKind::Bluesky,
        store.clone(),
        "\n\n#Antarctica",
        vec![remote_post("A", None)],
    );
    let mut publisher = Publisher::new(vec![session]);

    let outcomes = publisher
        .publish("Melt update", &[], date("2023.12.16"))
        .await;
    assert_eq!(outcomes.len(), 1);
    let published = outcomes[0].result.as_ref().unwrap();
    assert!(published.created);
    assert_eq!(published.tip, "bluesky-2");

    let submitted = remote.lock().unwrap().submitted.clone();
    assert_eq!(
        submitted,
        vec![(
            "Melt update\n\n#Antarctica".to_string(),
            Some("A".to_string())
        )]
    );

    let ledger = store.load().await.unwrap();
    let ids: Vec<&str> = ledger.records().iter().map(|r| r.post_id.as_str()).collect();
    assert_eq!(ids, vec!["A", "bluesky-2"]);
    let tail = ledger.tail().unwrap();
    assert_eq!(tail.reply_to_id.as_deref(), Some("A"));
    assert_eq!(tail.covered_date, Some(date("2023.12.16")));
    assert_eq!(tail.text, "Melt update\n\n#Antarctica");
    assert!(!tail.is_complete());

    // The seeded root picked up its remote fields and kept its date.
    let root = ledger.get("A").unwrap();
    assert!(root.is_complete());
    assert_eq!(root.covered_date, Some(date("2023.12.15")));
}

#[tokio::test]
async fn test_republishing_same_date_does_not_post_again() {
    let dir = TempDir::new().unwrap();
    let store = seed_ledger(dir.path(), "bluesky_posts.csv");
    let (session, remote) = platform(PlatformKind::Bluesky, store.clone(), "", vec![remote_post("A", None)]);
    let mut publisher = Publisher::new(vec![session]);

    let first = publisher.publish("Melt update", &[], date("2023.12.16")).await;
    let first_tip = first[0].result.as_ref().unwrap().tip.clone();

    let second = publisher.publish("Melt update", &[], date("2023.12.16")).await;
    let second = second[0].result.as_ref().unwrap();
    assert!(!second.created);
    assert_eq!(second.tip, first_tip);

    let older = publisher.publish("Melt update", &[], date("2023.12.10")).await;
    assert!(!older[0].result.as_ref().unwrap().created);

    assert_eq!(remote.lock().unwrap().submitted.len(), 1);
    assert_eq!(store.load().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_already_covered_date_skips_remote_entirely() {
    let dir = TempDir::new().unwrap();
    let store = seed_ledger(dir.path(), "mastodon_posts.csv");
    let (session, remote) = platform(PlatformKind::Mastodon, store, "", vec![remote_post("A", None)]);
    let mut publisher = Publisher::new(vec![session]);

    let outcomes = publisher.publish("Melt update", &[], date("2023.12.15")).await;
    let published = outcomes[0].result.as_ref().unwrap();
    assert!(!published.created);
    assert_eq!(published.tip, "A");

    let remote = remote.lock().unwrap();
    assert_eq!(remote.logins, 0);
    assert!(remote.submitted.is_empty());
}

#[tokio::test]
async fn test_manual_post_is_picked_up_before_replying() {
    let dir = TempDir::new().unwrap();
    let store = seed_ledger(dir.path(), "mastodon_posts.csv");
    let (session, remote) = platform(
        PlatformKind::Mastodon,
        store.clone(),
        "",
        vec![remote_post("A", None), remote_post("M", Some("A"))],
    );
    let mut publisher = Publisher::new(vec![session]);

    let outcomes = publisher.publish("Melt update", &[], date("2023.12.16")).await;
    assert!(outcomes[0].is_ok());
    assert_eq!(
        remote.lock().unwrap().submitted[0].1.as_deref(),
        Some("M")
    );

    let ledger = store.load().await.unwrap();
    let ids: Vec<&str> = ledger.records().iter().map(|r| r.post_id.as_str()).collect();
    assert_eq!(ids, vec!["A", "M", "mastodon-3"]);
    assert_eq!(ledger.get("M").unwrap().covered_date, None);
    assert_eq!(ledger.tail().unwrap().covered_date, Some(date("2023.12.16")));
}

#[tokio::test]
async fn test_one_platform_failing_does_not_stop_the_other() {
    let dir = TempDir::new().unwrap();
    let (bluesky, bluesky_remote) = platform(
        PlatformKind::Bluesky,
        seed_ledger(dir.path(), "bluesky_posts.csv"),
        "",
        vec![remote_post("A", None)],
    );
    let (mastodon, mastodon_remote) = platform(
        PlatformKind::Mastodon,
        seed_ledger(dir.path(), "mastodon_posts.csv"),
        "",
        vec![remote_post("A", None)],
    );
    bluesky_remote.lock().unwrap().reject_login = true;
    let mut publisher = Publisher::new(vec![bluesky, mastodon]);

    let outcomes = publisher.publish("Melt update", &[], date("2023.12.16")).await;
    assert_eq!(outcomes[0].platform, PlatformKind::Bluesky);
    assert!(matches!(
        outcomes[0].result,
        Err(PublishError::AuthenticationFailure { .. })
    ));
    assert_eq!(outcomes[1].platform, PlatformKind::Mastodon);
    assert!(outcomes[1].is_ok());
    assert_eq!(mastodon_remote.lock().unwrap().submitted.len(), 1);
}

#[tokio::test]
async fn test_failed_post_leaves_ledger_without_new_record() {
    let dir = TempDir::new().unwrap();
    let store = seed_ledger(dir.path(), "bluesky_posts.csv");
    let (session, remote) = platform(PlatformKind::Bluesky, store.clone(), "", vec![remote_post("A", None)]);
    remote.lock().unwrap().reject_posts = true;
    let mut publisher = Publisher::new(vec![session]);

    let outcomes = publisher.publish("Melt update", &[], date("2023.12.16")).await;
    assert!(matches!(
        outcomes[0].result,
        Err(PublishError::RemoteUnavailable { .. })
    ));
    assert_eq!(store.load().await.unwrap().len(), 1);

    // Operator re-runs once the platform is back.
    remote.lock().unwrap().reject_posts = false;
    let outcomes = publisher.publish("Melt update", &[], date("2023.12.16")).await;
    assert!(outcomes[0].result.as_ref().unwrap().created);
    assert_eq!(store.load().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_sync_refreshes_submitted_record_and_tags_tail() {
    let dir = TempDir::new().unwrap();
    let store = seed_ledger(dir.path(), "bluesky_posts.csv");
    let (session, remote) = platform(PlatformKind::Bluesky, store.clone(), "", vec![remote_post("A", None)]);
    let mut publisher = Publisher::new(vec![session]);

    let image = ImageAttachment::new("plots/melt_map.png", "Map of melt");
    publisher
        .publish("Melt update", std::slice::from_ref(&image), date("2023.12.16"))
        .await;
    let before = store.load().await.unwrap();
    assert_eq!(
        before.tail().unwrap().images[0].reference.as_deref(),
        Some("plots/melt_map.png")
    );

    // Posted by hand on the platform, then recorded with `sync --date`.
    {
        let mut remote = remote.lock().unwrap();
        remote.posts.push(remote_post("manual", Some("bluesky-2")));
    }
    let tail = publisher
        .sync(PlatformKind::Bluesky, Some(date("2023.12.17")), Some("posted from phone"))
        .await
        .unwrap();
    assert_eq!(tail.post_id, "manual");
    assert_eq!(tail.covered_date, Some(date("2023.12.17")));
    assert_eq!(tail.comment.as_deref(), Some("posted from phone"));

    let after = store.load().await.unwrap();
    let refreshed = after.get("bluesky-2").unwrap();
    assert!(refreshed.is_complete());
    assert_eq!(refreshed.covered_date, Some(date("2023.12.16")));
    assert_eq!(
        refreshed.images[0].reference.as_deref(),
        Some("https://cdn.example/plots/melt_map.png")
    );
}

#[tokio::test]
async fn test_sync_unknown_platform_is_an_error() {
    let dir = TempDir::new().unwrap();
    let (session, _remote) = platform(
        PlatformKind::Bluesky,
        seed_ledger(dir.path(), "bluesky_posts.csv"),
        "",
        vec![remote_post("A", None)],
    );
    let mut publisher = Publisher::new(vec![session]);
    assert!(publisher
        .sync(PlatformKind::Mastodon, None, None)
        .await
        .is_err());
}

#[tokio::test]
async fn test_publish_update_from_manifest() {
    let dir = TempDir::new().unwrap();
    let store = seed_ledger(dir.path(), "bluesky_posts.csv");
    let (session, remote) = platform(PlatformKind::Bluesky, store.clone(), "", vec![remote_post("A", None)]);
    let mut publisher = Publisher::new(vec![session]);

    let manifest = Manifest {
        covered_date: date("2023.12.16"),
        text: "Surface melt on 16 December 2023".to_string(),
        images: vec![ManifestImage {
            path: dir.path().join("melt_map.png"),
            alt_text: "Map of melt".to_string(),
        }],
    };
    let outcomes = publisher.publish_update(&manifest, &manifest).await.unwrap();
    assert!(outcomes[0].is_ok());

    let remote = remote.lock().unwrap();
    let posted = remote.posts.last().unwrap();
    assert_eq!(posted.text, "Surface melt on 16 December 2023");
    assert_eq!(posted.images[0].alt_text.as_deref(), Some("Map of melt"));

    let ledger = store.load().await.unwrap();
    assert_eq!(ledger.tail().unwrap().covered_date, Some(date("2023.12.16")));
}

#[tokio::test]
async fn test_publish_update_rejects_five_images() {
    let dir = TempDir::new().unwrap();
    let (session, remote) = platform(
        PlatformKind::Bluesky,
        seed_ledger(dir.path(), "bluesky_posts.csv"),
        "",
        vec![remote_post("A", None)],
    );
    let mut publisher = Publisher::new(vec![session]);

    let manifest = Manifest {
        covered_date: date("2023.12.16"),
        text: "Too many plots".to_string(),
        images: (1..=5)
            .map(|i| ManifestImage {
                path: format!("plot{i}.png").into(),
                alt_text: String::new(),
            })
            .collect(),
    };
    let err = publisher.publish_update(&manifest, &manifest).await.unwrap_err();
    assert!(matches!(err, PublishError::TooManyImages { count: 5, max: 4 }));
    assert_eq!(remote.lock().unwrap().logins, 0);
}
