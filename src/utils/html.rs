/// Escape user-supplied text for embedding in HTML or SVG.
///
/// Uses ammonia's text escaping rather than tag sanitization: usernames are
/// displayed verbatim, never interpreted as markup.
pub fn escape_text(input: &str) -> String {
    // XML has no `&grave;`; standalone SVG needs the numeric form.
    ammonia::clean_text(input).replace("&grave;", "&#96;")
}
