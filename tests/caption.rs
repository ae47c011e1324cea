use redcaps::{fix_mojibake, sanitize, uncurl_quotes};

#[test]
fn brackets_resolutions_and_mentions_are_cleaned() {
    assert_eq!(sanitize("My Cat [1920x1080] (reupload) @john_doe"), "my cat <usr>");
    assert_eq!(sanitize("My dog [OC] 4032x3024"), "my dog");
    assert_eq!(sanitize("Thanks @bob.smith for the tip!"), "thanks <usr> for the tip!");
    assert_eq!(sanitize("  Lots   of\tspace  "), "lots of space");
}

#[test]
fn non_ascii_is_dropped_without_leaving_double_spaces() {
    assert_eq!(sanitize("Sunset 🌅 at the beach"), "sunset at the beach");
    assert_eq!(sanitize("Café au lait"), "cafe au lait");
    assert_eq!(sanitize("東京 tower"), "tower");
}

#[test]
fn mis_decoded_utf8_is_repaired() {
    assert_eq!(fix_mojibake("cafÃ©"), "café");
    assert_eq!(fix_mojibake("plain ascii"), "plain ascii");
    assert_eq!(fix_mojibake("naïve"), "naïve");
    assert_eq!(sanitize("Ã‰tÃ© in Paris"), "ete in paris");
}

#[test]
fn curly_quotes_become_ascii_quotes() {
    assert_eq!(sanitize("My dog\u{2019}s \u{201c}first\u{201d} snow"), "my dog's \"first\" snow");
    assert_eq!(uncurl_quotes("\u{2018}a\u{201b} \u{201e}b\u{201f} don\u{02bc}t"), "'a' \"b\" don't");
    // Mis-decoded right quote is repaired first, then straightened.
    assert_eq!(sanitize("My dog\u{e2}\u{20ac}\u{2122}s bed"), "my dog's bed");
}

#[test]
fn sanitize_is_idempotent() {
    let inputs = [
        "My Cat [1920x1080] (reupload) @john_doe",
        "1éx2 pixels",
        "a 🎉 b 🎉 c",
        "[nested (brackets]) left)",
        "@@double",
        "(( ))",
        "Résumé 3 × 4 @x",
        "",
        "   ",
        "ＦＵＬＬＷＩＤＴＨ 1 ２ x ３",
        "cafÃ© [oc]",
        "it\u{2019}s \u{201c}quoted\u{201d}",
    ];
    for raw in inputs {
        let once = sanitize(raw);
        assert_eq!(sanitize(&once), once, "not idempotent for {:?}", raw);
        assert!(once.is_ascii());
        assert_eq!(once.trim(), once);
    }
}
