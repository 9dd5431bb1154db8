use ammonia;

/// Clean HTML content using the ammonia library.
///
/// Whitelist-based sanitization: safe tags (like <b>, <p>) are preserved
/// while dangerous tags (like <script>, <iframe>) and event-handler
/// attributes are stripped. Applied to course descriptions and lesson
/// bodies at authoring time, before they reach the database.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
