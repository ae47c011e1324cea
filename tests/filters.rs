#[path = "common/mod.rs"]
mod common;

use common::*;
use redcaps::{
    filter_faces, filter_faces_file, filter_nsfw, filter_nsfw_file, filter_words, filter_words_file, AnnotationStore,
    Blocklist, CurateError, FaceDetection, FilterStage, NsfwScores,
};
use std::fs;
use time::macros::date;

fn captioned_store() -> AnnotationStore {
    let d = date!(2021 - 02 - 01);
    AnnotationStore::new(
        d,
        d,
        vec![
            record_with_caption("a", at(d, 1), "a class act"),
            record_with_caption("b", at(d, 2), "kick ass sunset"),
            record_with_caption("c", at(d, 3), "bass guitar"),
            record_with_caption("d", at(d, 4), "ass"),
        ],
    )
}

fn word_filtered(store: &mut AnnotationStore) {
    let list = Blocklist::from_words(Vec::<String>::new(), "empty");
    filter_words(store, "s", &list, None).unwrap();
}

#[test]
fn blocklist_matches_whole_tokens_only() {
    let list = Blocklist::parse("ass\r\nbadword\n\n", "test-list");
    assert_eq!(list.len(), 2);
    assert_eq!(list.first_match("a class act"), None);
    assert_eq!(list.first_match("kick ass sunset"), Some("ass"));
    assert_eq!(list.first_match("ass"), Some("ass"));
    assert_eq!(list.first_match("Ass"), None);
}

#[test]
fn word_filter_removes_flagged_captions_and_stamps_marker() {
    let tmp = tempfile::tempdir().unwrap();
    let images = tmp.path().join("images");
    let img = touch_image(&images, "b");

    let mut store = captioned_store();
    let list = Blocklist::from_words(["ass"], "test-list");
    let removed = filter_words(&mut store, "s", &list, Some(&images)).unwrap();

    assert_eq!(removed, 2);
    assert_eq!(ids_of(&store), vec!["a", "c"]);
    assert!(!img.exists());
    let marker = store.info.marker(FilterStage::Words).unwrap();
    assert_eq!(marker.num_removed, 2);
    assert_eq!(marker.model, "test-list");
    assert_eq!(marker.confidence_threshold, None);
}

#[test]
fn second_run_of_a_filter_is_refused_and_file_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    let images = tmp.path().join("images");
    let path = write_store(tmp.path(), "pics.json", &captioned_store());
    let list = Blocklist::from_words(["ass"], "test-list");

    assert_eq!(filter_words_file(&path, &images, &list).unwrap(), 2);
    let after_first = fs::read(&path).unwrap();

    let err = filter_words_file(&path, &images, &list).unwrap_err();
    assert!(matches!(err.downcast_ref::<CurateError>(), Some(CurateError::AlreadyFiltered { .. })));
    assert_eq!(fs::read(&path).unwrap(), after_first);
}

#[test]
fn nsfw_filter_only_sees_images_on_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let images = tmp.path().join("images");
    let img_a = touch_image(&images, "a");
    touch_image(&images, "c");

    let mut store = captioned_store();
    word_filtered(&mut store);
    // "b" scores high but has no image, so it is never shown to the detector.
    let detector = FakeNsfw::default().flag("a", 0.6, 0.35).flag("b", 1.0, 0.0).flag("c", 0.5, 0.3);

    let removed = filter_nsfw(&mut store, "s", &detector, &images, 0.9).unwrap();

    assert_eq!(removed, 1);
    assert_eq!(ids_of(&store), vec!["b", "c", "d"]);
    assert!(!img_a.exists());
    let mut seen = detector.seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec!["a", "c"]);
    let marker = store.info.nsfw_filter.as_ref().unwrap();
    assert_eq!(marker.model, "fake-nsfw");
    assert_eq!(marker.confidence_threshold, Some(0.9));
}

#[test]
fn nsfw_threshold_uses_porn_plus_hentai() {
    let s = NsfwScores { porn: 0.5, hentai: 0.45, sexy: 0.05, ..Default::default() };
    assert!(s.is_nsfw(0.9));
    assert!(!s.is_nsfw(0.96));
    let sexy = NsfwScores { sexy: 0.99, ..Default::default() };
    assert!(!sexy.is_nsfw(0.9));
}

#[test]
fn detector_result_count_mismatch_aborts_without_mutation() {
    let tmp = tempfile::tempdir().unwrap();
    let images = tmp.path().join("images");
    touch_image(&images, "a");
    touch_image(&images, "b");

    let mut store = captioned_store();
    word_filtered(&mut store);
    let before = store.clone();
    let detector = FakeNsfw { drop_last: true, ..Default::default() };

    let err = filter_nsfw(&mut store, "s", &detector, &images, 0.9).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CurateError>(),
        Some(CurateError::DetectorMismatch { expected: 2, got: 1 })
    ));
    assert_eq!(store, before);
    assert!(redcaps::image_path(&images, SUB, "a").exists());
}

#[test]
fn face_filter_counts_boxes_above_threshold() {
    let det = FaceDetection { boxes: vec![[0.0; 4], [1.0; 4]], scores: vec![0.5, 0.95] };
    assert_eq!(det.faces_at(0.9), 1);
    assert_eq!(det.faces_at(0.99), 0);
    let unscored = FaceDetection { boxes: vec![[0.0; 4]], scores: vec![] };
    assert_eq!(unscored.faces_at(0.9), 1);

    let tmp = tempfile::tempdir().unwrap();
    let images = tmp.path().join("images");
    for id in ["a", "b", "c"] {
        touch_image(&images, id);
    }
    let mut store = captioned_store();
    word_filtered(&mut store);
    filter_nsfw(&mut store, "s", &FakeNsfw::default(), &images, 0.9).unwrap();

    let faces = FakeFaces::default().faces("a", &[0.3]).faces("b", &[0.2, 0.97]);
    let removed = filter_faces(&mut store, "s", &faces, &images, 0.9).unwrap();
    assert_eq!(removed, 1);
    assert_eq!(ids_of(&store), vec!["a", "c", "d"]);
    assert_eq!(store.info.face_filter.as_ref().unwrap().confidence_threshold, Some(0.9));
}

#[test]
fn face_filter_before_nsfw_is_out_of_order() {
    let tmp = tempfile::tempdir().unwrap();
    let images = tmp.path().join("images");
    let path = write_store(tmp.path(), "pics.json", &captioned_store());
    let before = fs::read(&path).unwrap();

    let err = filter_faces_file(&path, &images, &FakeFaces::default(), 0.9).unwrap_err();
    assert!(matches!(err.downcast_ref::<CurateError>(), Some(CurateError::OutOfOrder { .. })));
    let err = filter_nsfw_file(&path, &images, &FakeNsfw::default(), 0.9).unwrap_err();
    assert!(matches!(err.downcast_ref::<CurateError>(), Some(CurateError::OutOfOrder { .. })));
    assert_eq!(fs::read(&path).unwrap(), before);
}
