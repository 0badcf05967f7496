use ammonia;

/// Clean HTML content using the ammonia library.
///
/// This employs a whitelist-based sanitization strategy: it preserves safe tags
/// (like <b>, <p>) while stripping dangerous tags (like <script>, <iframe>)
/// and malicious attributes (like onclick).
///
/// Question content, explanations and quiz descriptions are lecturer-supplied
/// rich text and pass through here before persistence.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
