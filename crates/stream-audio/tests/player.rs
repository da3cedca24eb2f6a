mod common;

use common::fake_player::{FakePlayer, FakePlayers};
use stream_audio::{MediaStatus, PauseRequest, PlayerStreamer, StreamStatus, StreamingAudio};

const URL_A: &str = "http://a";
const URL_B: &str = "http://b";

type Streamer = PlayerStreamer<Box<dyn FnMut() -> Option<FakePlayer>>>;

fn streamer(players: &FakePlayers) -> Streamer {
    PlayerStreamer::new(Box::new(players.factory()), 1.0)
}

// --- start / stop ---

#[test]
fn player_is_created_lazily_on_first_start() {
    let players = FakePlayers::new();
    let mut s = streamer(&players);
    assert!(!s.has_player());
    assert_eq!(s.is_playing(), StreamStatus::Inactive);

    s.start(URL_A);

    assert_eq!(players.with(|l| l.created), 1);
    assert_eq!(players.calls(), vec!["1:loop false", "1:load http://a", "1:start"]);
    assert_eq!(s.url(), URL_A);
    assert_eq!(s.is_playing(), StreamStatus::Active);
}

#[test]
fn empty_url_is_ignored() {
    let players = FakePlayers::new();
    let mut s = streamer(&players);
    s.start(URL_A);
    players.clear_calls();

    s.start("");

    assert!(players.calls().is_empty());
    assert_eq!(s.url(), URL_A);
    assert_eq!(s.is_playing(), StreamStatus::Active);
}

#[test]
fn new_url_replaces_the_player() {
    let players = FakePlayers::new();
    let mut s = streamer(&players);
    s.start(URL_A);
    players.clear_calls();

    s.start(URL_B);

    assert_eq!(players.with(|l| l.created), 2);
    assert_eq!(players.with(|l| l.dropped.clone()), vec![1]);
    assert_eq!(
        players.calls(),
        vec!["1:stop", "2:loop false", "2:load http://b", "2:start"]
    );
    assert_eq!(s.url(), URL_B);
}

#[test]
fn same_url_reloads_on_the_same_player() {
    let players = FakePlayers::new();
    let mut s = streamer(&players);
    s.start(URL_A);
    players.clear_calls();

    s.start(URL_A);

    assert_eq!(players.with(|l| l.created), 1);
    assert_eq!(players.calls(), vec!["1:load http://a", "1:start"]);
}

#[test]
fn exited_player_is_recreated() {
    let players = FakePlayers::new();
    let mut s = streamer(&players);
    s.start(URL_A);
    players.with(|l| l.exited = true);

    s.start(URL_A);

    assert_eq!(players.with(|l| l.created), 2);
    assert_eq!(players.with(|l| l.dropped.clone()), vec![1]);
    assert_eq!(players.calls().last().unwrap(), "2:start");
}

#[test]
fn no_player_available_keeps_url_only() {
    let players = FakePlayers::new();
    players.with(|l| l.unavailable = true);
    let mut s = streamer(&players);

    s.start(URL_A);

    assert!(!s.has_player());
    assert_eq!(s.url(), URL_A);
    assert_eq!(s.is_playing(), StreamStatus::Inactive);
    assert!(!s.has_new_metadata());
    assert_eq!(s.current_title(), "");
}

#[test]
fn stop_forgets_url_and_keeps_player() {
    let players = FakePlayers::new();
    let mut s = streamer(&players);
    s.start(URL_A);

    s.stop();

    assert_eq!(s.url(), "");
    assert!(s.has_player());
    assert_eq!(s.is_playing(), StreamStatus::Inactive);
    assert_eq!(players.calls().last().unwrap(), "1:stop");
}

// --- pause ---

#[test]
fn pause_and_resume_forward_to_player() {
    let players = FakePlayers::new();
    let mut s = streamer(&players);
    s.start(URL_A);

    s.pause(PauseRequest::Pause);
    assert_eq!(s.is_playing(), StreamStatus::Paused);

    s.pause(PauseRequest::Resume);
    assert_eq!(s.is_playing(), StreamStatus::Active);

    s.pause(PauseRequest::Toggle);
    assert_eq!(s.is_playing(), StreamStatus::Paused);
    s.pause(PauseRequest::Toggle);
    assert_eq!(s.is_playing(), StreamStatus::Active);
    assert_eq!(players.with(|l| l.created), 1);
}

#[test]
fn pause_without_player_does_nothing() {
    let players = FakePlayers::new();
    let mut s = streamer(&players);

    s.pause(PauseRequest::Resume);

    assert!(!s.has_player());
    assert!(players.calls().is_empty());
}

#[test]
fn status_maps_from_player() {
    let players = FakePlayers::new();
    let mut s = streamer(&players);
    s.start(URL_A);

    for (status, expected) in [
        (MediaStatus::Loading, StreamStatus::Active),
        (MediaStatus::Loaded, StreamStatus::Inactive),
        (MediaStatus::Paused, StreamStatus::Paused),
        (MediaStatus::Done, StreamStatus::Inactive),
        (MediaStatus::Error, StreamStatus::Inactive),
    ] {
        players.with(|l| l.status = status);
        assert_eq!(s.is_playing(), expected, "{:?}", status);
    }
}

#[test]
fn update_idles_the_player() {
    let players = FakePlayers::new();
    let mut s = streamer(&players);
    s.update();
    assert!(players.calls().is_empty());

    s.start(URL_A);
    s.update();
    assert_eq!(players.calls().last().unwrap(), "1:idle");
}

// --- gain ---

#[test]
fn gain_is_stored_raw_and_applied_clamped_linear() {
    let players = FakePlayers::new();
    let mut s = streamer(&players);

    s.set_gain(1.5);
    assert_eq!(s.gain(), 1.5);
    assert!(players.with(|l| l.volumes.is_empty()));

    s.start(URL_A);
    s.set_gain(0.5);

    assert_eq!(s.gain(), 0.5);
    // 1.0 on creation, then the new gain unsquared
    assert_eq!(players.with(|l| l.volumes.clone()), vec![1.0, 0.5]);
}

#[test]
fn buffer_sizes_are_ignored() {
    let players = FakePlayers::new();
    let mut s = streamer(&players);
    s.start(URL_A);
    players.clear_calls();

    s.set_buffer_sizes(5_000, 400);

    assert!(players.calls().is_empty());
}

// --- metadata ---

#[test]
fn new_metadata_reported_once_per_change() {
    let players = FakePlayers::new();
    let mut s = streamer(&players);
    s.start(URL_A);
    assert!(!s.has_new_metadata());

    players.with(|l| {
        l.artist = "Pink Floyd".into();
        l.title = "Time".into();
        l.stream_name = "Classic Rock FM".into();
        l.stream_location = "http://classicrock.example".into();
    });

    assert!(s.has_new_metadata());
    assert!(!s.has_new_metadata());
    assert_eq!(s.current_artist(), "Pink Floyd");
    assert_eq!(s.current_title(), "Time");
    assert_eq!(s.current_stream_name(), "Classic Rock FM");
    assert_eq!(s.current_stream_location(), "http://classicrock.example");

    players.with(|l| l.title = "Money".into());
    assert!(s.has_new_metadata());
    assert_eq!(s.current_title(), "Money");
}

#[test]
fn stream_name_alone_is_not_new_metadata() {
    let players = FakePlayers::new();
    let mut s = streamer(&players);
    s.start(URL_A);

    players.with(|l| l.stream_name = "Radio".into());

    assert!(!s.has_new_metadata());
    assert_eq!(s.current_stream_name(), "Radio");
}

#[test]
fn drop_releases_the_player() {
    let players = FakePlayers::new();
    let mut s = streamer(&players);
    s.start(URL_A);

    drop(s);

    assert_eq!(players.with(|l| l.dropped.clone()), vec![1]);
}
