use super::types::{Chunker, TextChunk};

/// Section-aware chunker for clinical text.
///
/// Splits on Markdown headings and on all-caps section labels common in
/// clinical notes (`ASSESSMENT:`, `PLAN:`), then by paragraphs for large
/// sections, then by sentences for oversized paragraphs.
pub struct ClinicalChunker {
    max_chunk_chars: usize,
    min_chunk_chars: usize,
    overlap_chars: usize,
}

impl ClinicalChunker {
    pub fn new() -> Self {
        Self {
            max_chunk_chars: 1000,
            min_chunk_chars: 20,
            overlap_chars: 100,
        }
    }

    pub fn with_limits(max_chunk_chars: usize, min_chunk_chars: usize, overlap_chars: usize) -> Self {
        Self {
            max_chunk_chars: max_chunk_chars.max(1),
            min_chunk_chars,
            overlap_chars: overlap_chars.min(max_chunk_chars / 2),
        }
    }
}

impl Default for ClinicalChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunker for ClinicalChunker {
    fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let mut chunks = Vec::new();

        for section in split_by_sections(text) {
            if section.content.chars().count() <= self.max_chunk_chars {
                chunks.push(TextChunk {
                    content: section.content,
                    chunk_index: 0,
                    section_title: section.title,
                    char_offset: section.offset,
                });
            } else {
                chunks.extend(split_section(
                    &section,
                    self.max_chunk_chars,
                    self.overlap_chars,
                ));
            }
        }

        merge_tiny_chunks(&mut chunks, self.min_chunk_chars);
        for (i, chunk) in chunks.iter_mut().enumerate() {
            chunk.chunk_index = i;
        }
        chunks
    }
}

struct Section {
    title: Option<String>,
    content: String,
    offset: usize,
}

/// Heading text if the line opens a new section.
fn section_heading(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.starts_with('#') {
        let title = trimmed.trim_start_matches('#').trim();
        return (!title.is_empty()).then(|| title.to_string());
    }

    // "ASSESSMENT:" / "HISTORY OF PRESENT ILLNESS:" with nothing after the colon
    let label = trimmed.strip_suffix(':')?;
    let has_letters = label.chars().any(|c| c.is_alphabetic());
    let all_caps = label
        .chars()
        .all(|c| c.is_uppercase() || c.is_whitespace() || c == '/' || c == '&' || c == '-');
    (has_letters && all_caps && label.len() <= 60).then(|| label.trim().to_string())
}

fn split_by_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut title: Option<String> = None;
    let mut content = String::new();
    let mut offset = 0;
    let mut pos = 0;

    for line in text.lines() {
        if let Some(heading) = section_heading(line) {
            if !content.trim().is_empty() {
                sections.push(Section {
                    title: title.take(),
                    content: content.trim().to_string(),
                    offset,
                });
            }
            title = Some(heading);
            content.clear();
            offset = pos;
        } else {
            content.push_str(line);
            content.push('\n');
        }
        pos += line.chars().count() + 1;
    }

    if !content.trim().is_empty() {
        sections.push(Section {
            title,
            content: content.trim().to_string(),
            offset,
        });
    }

    sections
}

fn split_section(section: &Section, max_chars: usize, overlap: usize) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut offset = section.offset;

    for para in section.content.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let para_len = para.chars().count();

        if current.chars().count() + para_len > max_chars && !current.is_empty() {
            let tail = tail_chars(&current, overlap);
            let consumed = current.chars().count() - tail.chars().count();
            chunks.push(make_chunk(current.trim(), &section.title, offset));
            offset += consumed;
            current = tail;
        }

        if para_len > max_chars {
            if !current.trim().is_empty() {
                chunks.push(make_chunk(current.trim(), &section.title, offset));
                offset += current.chars().count();
                current.clear();
            }
            for (piece, rel) in split_long_paragraph(para, max_chars, overlap) {
                chunks.push(make_chunk(&piece, &section.title, offset + rel));
            }
            offset += para_len;
        } else {
            current.push_str(para);
            current.push_str("\n\n");
        }
    }

    if !current.trim().is_empty() {
        chunks.push(make_chunk(current.trim(), &section.title, offset));
    }

    chunks
}

fn make_chunk(content: &str, title: &Option<String>, char_offset: usize) -> TextChunk {
    TextChunk {
        content: content.to_string(),
        chunk_index: 0,
        section_title: title.clone(),
        char_offset,
    }
}

/// Last `n` characters of `s`.
fn tail_chars(s: &str, n: usize) -> String {
    let count = s.chars().count();
    s.chars().skip(count.saturating_sub(n)).collect()
}

/// Split an oversized paragraph into windows of at most `max_chars`
/// characters, preferring to break after a sentence in the last fifth.
/// Returns each piece with its character offset inside the paragraph.
fn split_long_paragraph(para: &str, max_chars: usize, overlap: usize) -> Vec<(String, usize)> {
    let chars: Vec<char> = para.chars().collect();
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());
        let break_at = if end < chars.len() {
            let search_start = start + max_chars * 4 / 5;
            (search_start..end.saturating_sub(1))
                .rev()
                .find(|&i| chars[i] == '.' && chars[i + 1] == ' ')
                .map(|i| i + 2)
                .unwrap_or(end)
        } else {
            end
        };

        let piece: String = chars[start..break_at].iter().collect();
        let piece = piece.trim().to_string();
        if !piece.is_empty() {
            pieces.push((piece, start));
        }

        if break_at >= chars.len() {
            break;
        }
        // Always advance, even when overlap would rewind past `start`.
        start = break_at.saturating_sub(overlap).max(start + 1);
    }

    pieces
}

fn merge_tiny_chunks(chunks: &mut Vec<TextChunk>, min_chars: usize) {
    let mut i = 0;
    while i < chunks.len() {
        if chunks[i].content.chars().count() < min_chars && i + 1 < chunks.len() {
            let next = chunks.remove(i + 1);
            chunks[i].content.push_str("\n\n");
            chunks[i].content.push_str(&next.content);
            if chunks[i].section_title.is_none() {
                chunks[i].section_title = next.section_title;
            }
        } else {
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_by_markdown_headings() {
        let md = "## Medications\n\nMetformin 500mg twice daily for diabetes management prescribed by GP.\n\n## Lab Results\n\nHbA1c: 7.2% (elevated above target of 7.0%).\n\n## Instructions\n\nFollow up in 3 months for repeat blood work and medication review.";
        let chunks = ClinicalChunker::new().chunk(md);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].section_title.as_deref(), Some("Medications"));
        assert_eq!(chunks[1].section_title.as_deref(), Some("Lab Results"));
        assert_eq!(chunks[2].section_title.as_deref(), Some("Instructions"));
    }

    #[test]
    fn chunks_by_clinical_labels() {
        let note = "CHIEF COMPLAINT:\nChest pain radiating to the left arm for two hours.\n\nASSESSMENT:\nLikely stable angina, rule out acute coronary syndrome.\n\nPLAN:\nSerial troponins, ECG, aspirin 325mg now.";
        let chunks = ClinicalChunker::new().chunk(note);

        let titles: Vec<_> = chunks.iter().map(|c| c.section_title.as_deref()).collect();
        assert_eq!(titles, vec![Some("CHIEF COMPLAINT"), Some("ASSESSMENT"), Some("PLAN")]);
    }

    #[test]
    fn value_lines_are_not_headings() {
        assert!(section_heading("HbA1c: 7.2%").is_none());
        assert!(section_heading("Plan:").is_none());
        assert_eq!(section_heading("PLAN:").as_deref(), Some("PLAN"));
        assert_eq!(section_heading("### Vitals").as_deref(), Some("Vitals"));
    }

    #[test]
    fn splits_large_sections() {
        let large = "## Medications\n\n".to_string() + &"Medication details here. ".repeat(200);
        let chunks = ClinicalChunker::new().chunk(&large);

        assert!(chunks.len() > 1, "Large section should be split into multiple chunks");
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 1000, "Chunk too large: {}", chunk.content.len());
        }
    }

    #[test]
    fn multibyte_text_does_not_panic() {
        let text = "Température élevée à 39°C — patient fébrile. ".repeat(120);
        let chunks = ClinicalChunker::with_limits(200, 20, 30).chunk(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.content.chars().count() <= 200));
    }

    #[test]
    fn merges_tiny_sections() {
        let md = "## A\n\nShort.\n\n## B\n\nAlso ok but slightly longer content here to test merging of tiny sections with enough text.";
        let chunks = ClinicalChunker::new().chunk(md);

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.starts_with("Short."));
    }

    #[test]
    fn indices_are_contiguous() {
        let md = "## A\n\nSection A content is long enough to be a chunk.\n\n## B\n\nSection B also has enough content to be a chunk.";
        let chunks = ClinicalChunker::new().chunk(md);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
        }
    }

    #[test]
    fn empty_text_returns_empty() {
        assert!(ClinicalChunker::new().chunk("").is_empty());
        assert!(ClinicalChunker::new().chunk("   \n\n ").is_empty());
    }

    #[test]
    fn no_headings_single_chunk() {
        let text = "This is a medical document without headings. It has enough text to be meaningful and should be treated as a single chunk.";
        let chunks = ClinicalChunker::new().chunk(text);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].section_title.is_none());
        assert_eq!(chunks[0].char_offset, 0);
    }
}
