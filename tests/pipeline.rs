#[path = "common/mod.rs"]
mod common;

use common::*;
use redcaps::{
    day_start_utc, normalize_subreddit, AnnotationStore, Blocklist, Credentials, IdHarvester, InfoResolver, RedCaps,
    RetryPolicy, YearMonth,
};
use std::fs;
use std::time::Duration;
use time::macros::date;

/// Feb 2021 posts in r/pics; ids match between the search fake and the info fake.
fn february_fakes() -> (FakeIdSource, FakePosts) {
    let days = [date!(2021 - 02 - 01), date!(2021 - 02 - 14), date!(2021 - 02 - 28)];
    let mut hits = Vec::new();
    let mut infos = Vec::new();
    for (i, day) in days.iter().enumerate() {
        for j in 0..3 {
            let id = format!("d{}p{}", i, j);
            let ts = day_start_utc(*day) + 3600 * (j as i64 + 1);
            hits.push((ts, id.clone(), Some("i.imgur.com".to_string())));
            let mut info = post(&id, &format!("Post {} [OC]", id), &format!("https://imgur.com/{}", id), 5 + j as i64);
            info.created_utc = ts as f64;
            infos.push(info);
        }
    }
    // Low score post: harvested but ignored by the resolver.
    infos[4].score = 1;
    (FakeIdSource::new(hits), FakePosts::new(infos))
}

#[test]
fn month_of_annotations_is_written_under_subreddit_and_month() {
    let tmp = tempfile::tempdir().unwrap();
    let (search, info) = february_fakes();
    let harvester = IdHarvester::new(search)
        .retry(RetryPolicy::bounded(Duration::ZERO, 1))
        .window_pause(Duration::ZERO);
    let resolver = InfoResolver::new(info, FakeAlbums::default())
        .retry(RetryPolicy::bounded(Duration::ZERO, 1))
        .info_pause(Duration::ZERO);

    let caps = RedCaps::new()
        .annotations_dir(tmp.path().join("annotations"))
        .images_dir(tmp.path().join("images"))
        .day_concurrency(3)
        .progress(false);
    let report = caps
        .download_annotations("r/Pics", YearMonth::new(2021, 2), &harvester, &resolver)
        .unwrap();

    assert_eq!(report.path, tmp.path().join("annotations").join("pics_2021-02.json"));
    assert_eq!(report.num_ids, 9);
    assert_eq!(report.num_records, 8);
    assert_eq!(report.ignored(), 1);

    let store = AnnotationStore::load(&report.path).unwrap();
    assert_eq!(store.info.start_date, "2021-02-01");
    assert_eq!(store.info.end_date, "2021-02-28");
    assert_store_invariants(&store);
    assert!(store.annotations.iter().all(|a| a.url.starts_with("https://i.imgur.com/") && a.url.ends_with(".jpg")));
    assert_eq!(store.annotations[0].caption, "post d0p0");

    let validation = caps.validate(&report.path).unwrap();
    assert!(validation.out_of_range_ids.is_empty());
    assert_eq!(validation.pending_filters.len(), 3);

    let removed = caps.filter_words(&report.path, &Blocklist::from_words(["d1p0"], "test-list")).unwrap();
    assert_eq!(removed, 1);
    assert_eq!(caps.validate(&report.path).unwrap().pending_filters.len(), 2);
}

#[test]
fn subreddit_names_are_normalized() {
    assert_eq!(normalize_subreddit(" r/EarthPorn "), "earthporn");
    assert_eq!(normalize_subreddit("pics"), "pics");
}

#[test]
fn builder_clamps_options() {
    let caps = RedCaps::new().time_window_hours(48.0).workers(0).day_concurrency(0);
    let opts = caps.options();
    assert_eq!(opts.time_window_hours, 24.0);
    assert_eq!(opts.workers, 1);
    assert_eq!(opts.day_concurrency, 1);
    assert_eq!(RedCaps::new().options().workers, 4);
}

#[test]
fn credentials_load_from_json() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("credentials.json");
    fs::write(
        &path,
        r#"{
            "reddit": {"client_id": "rid", "client_secret": "rsecret", "user_agent": "redcaps-test"},
            "imgur": {"client_id": "iid", "client_secret": "isecret"}
        }"#,
    )
    .unwrap();

    let creds = Credentials::load(&path).unwrap();
    assert_eq!(creds.reddit.client_id, "rid");
    assert_eq!(creds.reddit.user_agent, "redcaps-test");
    assert_eq!(creds.imgur.client_id, "iid");

    fs::write(&path, r#"{"reddit": {}}"#).unwrap();
    assert!(Credentials::load(&path).is_err());
}
