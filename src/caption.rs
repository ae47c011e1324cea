//! Caption sanitization. The output format is part of the released dataset,
//! so every step here is order-sensitive.

use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

static BRACKETED: OnceLock<Regex> = OnceLock::new();
static RESOLUTION: OnceLock<Regex> = OnceLock::new();
static WHITESPACE: OnceLock<Regex> = OnceLock::new();
static USERNAME: OnceLock<Regex> = OnceLock::new();

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap_or_else(|e| panic!("bad caption regex {}: {}", pattern, e)))
}

/// Sub-strings removed from captions, applied in this order.
fn removal_patterns() -> [&'static Regex; 2] {
    [
        compiled(&BRACKETED, r"(?i)[\[\(].*?[\]\)]"),
        compiled(&RESOLUTION, r"(?i)\s*\d+\s*[x×*,]\s*\d+\s*"),
    ]
}

fn collapse_whitespace(s: &str) -> String {
    compiled(&WHITESPACE, r"\s+").replace_all(s, " ").trim().to_string()
}

/// Windows-1252 code points that sit where C1 controls live in Latin-1.
const CP1252_HIGH: [(char, u8); 27] = [
    ('€', 0x80), ('‚', 0x82), ('ƒ', 0x83), ('„', 0x84), ('…', 0x85), ('†', 0x86),
    ('‡', 0x87), ('ˆ', 0x88), ('‰', 0x89), ('Š', 0x8A), ('‹', 0x8B), ('Œ', 0x8C),
    ('Ž', 0x8E), ('‘', 0x91), ('’', 0x92), ('“', 0x93), ('”', 0x94), ('•', 0x95),
    ('–', 0x96), ('—', 0x97), ('˜', 0x98), ('™', 0x99), ('š', 0x9A), ('›', 0x9B),
    ('œ', 0x9C), ('ž', 0x9E), ('Ÿ', 0x9F),
];

fn cp1252_byte(c: char) -> Option<u8> {
    let cp = c as u32;
    if cp < 0x80 || (0xA0..=0xFF).contains(&cp) {
        return Some(cp as u8);
    }
    CP1252_HIGH.iter().find(|(ch, _)| *ch == c).map(|(_, b)| *b)
}

/// Undo UTF-8 text that was decoded as Windows-1252/Latin-1 ("cafÃ©" -> "café").
/// Text that does not round-trip cleanly is returned unchanged.
pub fn fix_mojibake(s: &str) -> String {
    if s.is_ascii() {
        return s.to_string();
    }
    let mut bytes = Vec::with_capacity(s.len());
    for c in s.chars() {
        match cp1252_byte(c) {
            Some(b) => bytes.push(b),
            None => return s.to_string(),
        }
    }
    match String::from_utf8(bytes) {
        Ok(fixed) if fixed != s => fixed,
        _ => s.to_string(),
    }
}

/// Curly single quotes (and the modifier apostrophe) become `'`, curly double
/// quotes become `"`. NFKD leaves these alone and the ASCII step would drop them.
pub fn uncurl_quotes(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{02BC}' | '\u{2018}'..='\u{201B}' => '\'',
            '\u{201C}'..='\u{201F}' => '"',
            other => other,
        })
        .collect()
}

fn sanitize_pass(raw: &str) -> String {
    let mut caption: String = uncurl_quotes(&fix_mojibake(raw)).nfkd().collect::<String>().to_lowercase();

    for re in removal_patterns() {
        caption = re.replace_all(&caption, "").into_owned();
        // Removals can leave adjacent spaces behind; collapse after every pass.
        caption = collapse_whitespace(&caption);
    }

    caption = compiled(&USERNAME, r"(?i)@[_\d\w.]+")
        .replace_all(&caption, "<usr>")
        .into_owned();

    caption.chars().filter(char::is_ascii).collect()
}

/// Clean a post title into a caption: lowercase, no bracketed asides, no
/// resolutions like `1920x1080`, `@mentions` become `<usr>`, ASCII only.
///
/// Dropping non-ASCII characters in the last step can expose text the earlier
/// steps would have removed (`1éx2` -> `1x2`), so the pass repeats until the
/// output stops changing. Plain titles settle after one pass.
pub fn sanitize(raw: &str) -> String {
    let mut current = sanitize_pass(raw);
    // Each pass either removes characters or consumes an '@', so this settles quickly.
    for _ in 0..16 {
        let next = sanitize_pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}
