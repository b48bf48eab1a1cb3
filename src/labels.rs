//! Page label normalization.
//!
//! Structural metadata from the legacy workflow carries raw page labels in a
//! few conventions: `unum` for unnumbered pages, `r0` followed by a three
//! digit number for roman-numbered front matter (`r0004` is page iv), plain
//! digits, and free text. [`normalize`] turns any of them into the label
//! shown to users.

/// Raw label marking a page without a printed number.
pub const UNNUMBERED: &str = "unum";

/// Prefix of roman-numbered page labels.
pub const ROMAN_PREFIX: &str = "r0";

const ROMAN_DIGITS: usize = 3;

/// Render a raw structural label as a display label. Total over all inputs.
pub fn normalize(raw: &str, basename: &str) -> String {
    if raw == UNNUMBERED {
        return format!("[unnumbered page ({})]", basename);
    }
    if let Some(value) = roman_value(raw) {
        if let Some(numeral) = to_roman(value) {
            return format!("Page {}", numeral);
        }
    }
    match raw.parse::<u64>() {
        Ok(n) => format!("Page {}", n),
        Err(_) => format!("[page {}]", raw),
    }
}

fn roman_value(raw: &str) -> Option<u32> {
    let digits = raw.strip_prefix(ROMAN_PREFIX)?;
    if digits.len() != ROMAN_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Standard roman numeral for `n` in `1..=3999`; `None` outside that range.
pub fn to_roman(mut n: u32) -> Option<String> {
    const TABLE: [(u32, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    if !(1..=3999).contains(&n) {
        return None;
    }
    let mut out = String::new();
    for (value, symbol) in TABLE {
        while n >= value {
            out.push_str(symbol);
            n -= value;
        }
    }
    Some(out)
}
