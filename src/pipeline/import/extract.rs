use super::format::FileCategory;

/// Plain text from an upload, when its format can be read without a parser.
///
/// Text and Markdown files must be valid UTF-8 (a leading BOM is dropped).
/// Binary formats yield `None` and are stored without indexing.
pub fn extract_text(bytes: &[u8], category: FileCategory) -> Option<String> {
    if !category.is_text() {
        return None;
    }

    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    let text = std::str::from_utf8(bytes).ok()?;
    let text = text.replace("\r\n", "\n");
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
