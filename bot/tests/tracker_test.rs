mod common;

use common::*;
use etterna::Msd;
use etternabot::db::Store;
use etternabot::models::Cursor;
use etternabot::tracker::{CycleReport, PlayTracker};
use std::time::Duration;

const JESSE: i64 = 7;

async fn jesse_in_two_channels() -> Harness {
    let h = Harness::new();
    h.api.add_user(JESSE, "jesse", 20.0);
    h.api.add_song(song(55, "Sandstorm"));

    h.register("s1", Some("c1"), "jesse", "d1").await;
    h.register("s2", Some("c2"), "jesse", "d1").await;
    h.register("s3", None, "jesse", "d1").await;
    h
}

#[tokio::test]
async fn announces_rating_gain_to_every_score_channel() {
    let h = jesse_in_two_channels().await;
    let sandstorm = song(55, "Sandstorm");

    h.api
        .add_score(JESSE, score(&key(1), 98.2, 1.0, &sandstorm, at(1, 12)));
    h.api.set_overall("jesse", 20.15);

    let report = PlayTracker::new(h.bot.clone()).track_all().await.unwrap();

    assert_eq!(
        report,
        CycleReport {
            checked: 1,
            announced: 1,
            ..CycleReport::default()
        }
    );

    let sent = h.dispatcher.rich();
    let channels: Vec<&str> = sent.iter().map(|(c, _)| c.as_str()).collect();
    assert_eq!(channels, ["c1", "c2"]);

    for (_, message) in &sent {
        assert!(message
            .description
            .contains("➤ **Overall:** 20.15 (+0.15)"));
        assert!(!message.description.contains("Stream:"));
        assert_eq!(message.author.as_ref().unwrap().name, "Recent play by jesse");
    }

    let cached = h.store.get_cached_user("jesse").await.unwrap().unwrap();
    assert_eq!(cached.msd.overall, 20.15);
    assert_eq!(
        cached.cursor,
        Some(Cursor {
            key: key(1),
            date: at(1, 12),
        })
    );

    for (server, expected) in [("s1", Some(55)), ("s2", Some(55)), ("s3", None)] {
        let config = h.store.get_server_config(server).await.unwrap().unwrap();
        assert_eq!(config.last_song_id, expected, "server {}", server);
    }
}

#[tokio::test]
async fn same_play_is_announced_once() {
    let h = jesse_in_two_channels().await;
    let tracker = PlayTracker::new(h.bot.clone());

    h.api
        .add_score(JESSE, score(&key(1), 98.2, 1.0, &song(55, "Sandstorm"), at(1, 12)));

    let first = tracker.track_all().await.unwrap();
    assert_eq!(first.announced, 1);

    h.dispatcher.clear();

    let second = tracker.track_all().await.unwrap();
    assert_eq!(second.unchanged, 1);
    assert_eq!(second.announced, 0);
    assert!(h.dispatcher.sent().is_empty());
}

#[tokio::test]
async fn overwritten_score_with_new_date_is_a_new_play() {
    let h = jesse_in_two_channels().await;
    let tracker = PlayTracker::new(h.bot.clone());
    let sandstorm = song(55, "Sandstorm");

    h.api
        .add_score(JESSE, score(&key(1), 98.2, 1.0, &sandstorm, at(1, 12)));
    tracker.track_all().await.unwrap();
    h.dispatcher.clear();

    h.api
        .replace_score(JESSE, score(&key(1), 99.1, 1.0, &sandstorm, at(1, 13)));

    let report = tracker.track_all().await.unwrap();
    assert_eq!(report.announced, 1);
    assert_eq!(h.dispatcher.rich().len(), 2);

    let cached = h.store.get_cached_user("jesse").await.unwrap().unwrap();
    assert_eq!(cached.cursor.map(|c| c.date), Some(at(1, 13)));
}

#[tokio::test]
async fn play_below_threshold_without_gain_is_suppressed_but_consumed() {
    let h = jesse_in_two_channels().await;
    let tracker = PlayTracker::new(h.bot.clone());

    h.api
        .add_score(JESSE, score(&key(1), 93.4, 1.0, &song(55, "Sandstorm"), at(1, 12)));

    let report = tracker.track_all().await.unwrap();
    assert_eq!(report.suppressed, 1);
    assert!(h.dispatcher.sent().is_empty());

    let cached = h.store.get_cached_user("jesse").await.unwrap().unwrap();
    assert_eq!(cached.cursor.map(|c| c.key), Some(key(1)));

    let again = tracker.track_all().await.unwrap();
    assert_eq!(again.unchanged, 1);
}

#[tokio::test]
async fn skips_invalid_and_zero_rated_scores() {
    let h = jesse_in_two_channels().await;
    let sandstorm = song(55, "Sandstorm");
    h.api.add_song(song(56, "Flowers"));

    let mut failed = score(&key(1), 40.0, 1.0, &sandstorm, at(2, 12));
    failed.msd = Msd::default();
    h.api.add_score(JESSE, failed);

    h.api
        .add_score(JESSE, score(&key(2), 99.0, 1.0, &sandstorm, at(2, 11)));
    h.api.set_valid(&key(2), false);

    h.api
        .add_score(JESSE, score(&key(3), 98.0, 1.1, &song(56, "Flowers"), at(2, 10)));

    let report = PlayTracker::new(h.bot.clone()).track_all().await.unwrap();
    assert_eq!(report.announced, 1);

    let cached = h.store.get_cached_user("jesse").await.unwrap().unwrap();
    assert_eq!(cached.cursor.map(|c| c.key), Some(key(3)));

    let (_, message) = &h.dispatcher.rich()[0];
    assert!(message.description.contains("Flowers (1.1x)"));
}

#[tokio::test]
async fn one_failing_user_does_not_stop_the_cycle() {
    let h = jesse_in_two_channels().await;

    // Registered and cached, but the site has no scores for them.
    h.api.add_user(8, "ghost", 15.0);
    h.register("s1", Some("c1"), "ghost", "d2").await;

    h.api
        .add_score(JESSE, score(&key(1), 98.2, 1.0, &song(55, "Sandstorm"), at(1, 12)));

    let report = PlayTracker::new(h.bot.clone()).track_all().await.unwrap();

    assert_eq!(report.checked, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.announced, 1);
}

#[tokio::test]
async fn failed_channel_does_not_block_the_others() {
    let h = jesse_in_two_channels().await;
    h.dispatcher.break_channel("c1");

    h.api
        .add_score(JESSE, score(&key(1), 98.2, 1.0, &song(55, "Sandstorm"), at(1, 12)));

    let report = PlayTracker::new(h.bot.clone()).track_all().await.unwrap();
    assert_eq!(report.announced, 1);

    let channels: Vec<String> = h.dispatcher.rich().into_iter().map(|(c, _)| c).collect();
    assert_eq!(channels, ["c2"]);

    let s1 = h.store.get_server_config("s1").await.unwrap().unwrap();
    let s2 = h.store.get_server_config("s2").await.unwrap().unwrap();
    assert_eq!(s1.last_song_id, None);
    assert_eq!(s2.last_song_id, Some(55));
}

#[tokio::test(start_paused = true)]
async fn overlapping_cycle_is_skipped() {
    let h = jesse_in_two_channels().await;
    h.api.slow_down(Duration::from_secs(5));

    h.api
        .add_score(JESSE, score(&key(1), 98.2, 1.0, &song(55, "Sandstorm"), at(1, 12)));

    let tracker = PlayTracker::new(h.bot.clone());
    let (first, second) = tokio::join!(tracker.track_all(), tracker.track_all());

    assert_eq!(first.map(|r| r.announced), Some(1));
    assert_eq!(second, None);
}

#[tokio::test]
async fn failed_save_keeps_the_gain_for_the_next_cycle() {
    let (h, store) = Harness::flaky();
    h.api.add_user(JESSE, "jesse", 20.0);
    h.api.add_song(song(55, "Sandstorm"));
    h.register("s1", Some("c1"), "jesse", "d1").await;

    let tracker = PlayTracker::new(h.bot.clone());

    // Below the accuracy threshold, so only the gain gets it announced.
    h.api
        .add_score(JESSE, score(&key(1), 93.0, 1.0, &song(55, "Sandstorm"), at(1, 12)));
    h.api.set_overall("jesse", 20.15);
    store.fail_once(Fault::SaveTracked);

    let first = tracker.track_all().await.unwrap();
    assert_eq!(first.failed, 1);
    assert!(h.dispatcher.sent().is_empty());

    let cached = h.store.get_cached_user("jesse").await.unwrap().unwrap();
    assert_eq!(cached.msd.overall, 20.0);
    assert_eq!(cached.cursor, None);

    let second = tracker.track_all().await.unwrap();
    assert_eq!(second.announced, 1);

    let (_, message) = h.dispatcher.rich().pop().unwrap();
    assert!(message.description.contains("➤ **Overall:** 20.15 (+0.15)"));

    let cached = h.store.get_cached_user("jesse").await.unwrap().unwrap();
    assert_eq!(cached.msd.overall, 20.15);
    assert_eq!(cached.cursor.map(|c| c.key), Some(key(1)));
}
