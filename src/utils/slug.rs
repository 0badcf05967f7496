// src/utils/slug.rs

use std::sync::OnceLock;

use rand::Rng;
use regex::Regex;

/// Characters used for collision-breaking slug suffixes.
const SUFFIX_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

fn non_slug_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"))
}

/// Turns a title into a URL-safe slug: lowercased, runs of anything that is
/// not `[a-z0-9]` collapsed into single hyphens, leading/trailing hyphens
/// trimmed.
pub fn slugify(input: &str) -> String {
    let lowered = input.to_lowercase();
    let slug = non_slug_chars().replace_all(&lowered, "-");
    slug.trim_matches('-').to_string()
}

/// A short random lowercase-alphanumeric suffix appended to a slug when the
/// plain form collides with an existing row.
pub fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| SUFFIX_CHARS[rng.gen_range(0..SUFFIX_CHARS.len())] as char)
        .collect()
}

/// `slug` if it is still free per `exists`, otherwise `slug-xxxx` with a
/// fresh 4-character suffix.
pub fn disambiguate(slug: &str, exists: bool) -> String {
    if exists {
        format!("{}-{}", slug, random_suffix(4))
    } else {
        slug.to_string()
    }
}
