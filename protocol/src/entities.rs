//! HTML entity decoding for translation bundle values (spec §4.2).
//! Only the fixed table the spec names is handled — this is not a general
//! HTML decoder.

const ENTITIES: &[(&str, &str)] = &[
    ("&amp;", "&"),
    ("&nbsp;", "\u{a0}"),
    ("&ndash;", "\u{2013}"),
    ("&mdash;", "\u{2014}"),
    ("&hellip;", "\u{2026}"),
    ("&copy;", "\u{a9}"),
    ("&reg;", "\u{ae}"),
    ("&trade;", "\u{2122}"),
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&#39;", "'"),
    ("&lt;", "<"),
    ("&gt;", ">"),
];

/// Decodes the fixed entity table. Idempotent: running this twice on an
/// already-decoded string is a no-op, since none of the replacement text
/// itself contains `&`.
pub fn decode_html_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_owned();
    }
    // &amp; must be decoded last among entities whose replacement could
    // re-introduce an ampersand-looking sequence; since none of our
    // replacements contain '&', order only matters for overlapping
    // prefixes, and none of these entities overlap.
    let mut out = input.to_owned();
    for (entity, replacement) in ENTITIES {
        if out.contains(entity) {
            out = out.replace(entity, replacement);
        }
    }
    out
}
