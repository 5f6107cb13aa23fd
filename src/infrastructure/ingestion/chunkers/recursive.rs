//! Recursive chunking strategy

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use crate::domain::DomainError;
use crate::domain::ingestion::{
    Chunk, ChunkMetadata, ChunkingConfig, ChunkingStrategy, Document, chunk_id,
};

static HEADING_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^#{1,6}[ \t]").expect("heading pattern is valid"));

static HEADING_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^#{1,6}[ \t]+(.+)$").expect("heading pattern is valid"));

static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n(?:[ \t]*\n)+").expect("paragraph pattern is valid"));

const PAGE_BREAK: char = '\u{c}';

/// Split levels, coarsest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Heading,
    Paragraph,
    Line,
    Sentence,
    Word,
    Char,
}

impl Boundary {
    fn finer(self) -> Self {
        match self {
            Boundary::Heading => Boundary::Paragraph,
            Boundary::Paragraph => Boundary::Line,
            Boundary::Line => Boundary::Sentence,
            Boundary::Sentence => Boundary::Word,
            Boundary::Word | Boundary::Char => Boundary::Char,
        }
    }
}

/// Chunking strategy that recursively splits text hierarchically
///
/// Splitting order: headings -> paragraphs -> lines -> sentences -> words -> characters.
/// The non-overlapping parts of the chunks partition the document exactly, so
/// stripping each chunk's overlap prefix and concatenating gives back the input.
#[derive(Debug, Clone, Default)]
pub struct RecursiveChunker;

impl RecursiveChunker {
    /// Create a new recursive chunker
    pub fn new() -> Self {
        Self
    }

    /// Byte offsets at which a new piece starts
    fn split_points(text: &str, level: Boundary) -> Vec<usize> {
        match level {
            Boundary::Heading => HEADING_START.find_iter(text).map(|m| m.start()).collect(),
            Boundary::Paragraph => PARAGRAPH_BREAK.find_iter(text).map(|m| m.end()).collect(),
            Boundary::Line => text.match_indices('\n').map(|(i, _)| i + 1).collect(),
            Boundary::Sentence => text
                .split_sentence_bound_indices()
                .map(|(i, _)| i)
                .collect(),
            Boundary::Word => text.split_word_bound_indices().map(|(i, _)| i).collect(),
            Boundary::Char => Vec::new(),
        }
    }

    /// Split at `level`, keeping whitespace-only pieces attached to the piece before them
    fn pieces(text: &str, level: Boundary) -> Vec<Range<usize>> {
        let mut pieces: Vec<Range<usize>> = Vec::new();
        let mut start = 0;

        let points = Self::split_points(text, level)
            .into_iter()
            .chain(std::iter::once(text.len()));

        for point in points {
            if point <= start || point > text.len() {
                continue;
            }

            let blank = text[start..point].trim().is_empty();
            match pieces.last_mut() {
                Some(last) if blank => last.end = point,
                _ => pieces.push(start..point),
            }
            start = point;
        }

        pieces
    }

    /// Partition `text` (located at `offset` in the document) into ranges of at
    /// most `budget` characters, appending them to `out`
    fn partition(
        text: &str,
        offset: usize,
        level: Boundary,
        budget: usize,
        out: &mut Vec<Range<usize>>,
    ) {
        if char_len(text) <= budget {
            out.push(offset..offset + text.len());
            return;
        }

        if level == Boundary::Char {
            Self::split_by_size(text, offset, budget, out);
            return;
        }

        let pieces = Self::pieces(text, level);

        if pieces.len() <= 1 {
            Self::partition(text, offset, level.finer(), budget, out);
            return;
        }

        // (start, end, chars) of the pieces merged so far
        let mut current: Option<(usize, usize, usize)> = None;

        for piece in pieces {
            let piece_text = &text[piece.clone()];
            let piece_chars = char_len(piece_text);
            let start = offset + piece.start;
            let end = offset + piece.end;

            if piece_chars > budget {
                if let Some((s, e, _)) = current.take() {
                    out.push(s..e);
                }
                Self::partition(piece_text, start, level.finer(), budget, out);
                continue;
            }

            current = match current {
                Some((s, _, chars)) if chars + piece_chars <= budget => {
                    Some((s, end, chars + piece_chars))
                }
                Some((s, e, _)) => {
                    out.push(s..e);
                    Some((start, end, piece_chars))
                }
                None => Some((start, end, piece_chars)),
            };
        }

        if let Some((s, e, _)) = current {
            out.push(s..e);
        }
    }

    fn split_by_size(text: &str, offset: usize, budget: usize, out: &mut Vec<Range<usize>>) {
        let mut start = 0;
        let mut count = 0;

        for (i, _) in text.char_indices() {
            if count == budget {
                out.push(offset + start..offset + i);
                start = i;
                count = 0;
            }
            count += 1;
        }

        if start < text.len() {
            out.push(offset + start..offset + text.len());
        }
    }

    /// Fold whitespace-only ranges into their neighbours without letting any
    /// range grow past `budget`.
    ///
    /// A blank run fills the previous range first, then leads the next one.
    /// Whatever fits in neither is kept as whitespace-only ranges of at most
    /// `budget` characters, so the partition stays exact.
    fn absorb_blank_ranges(
        text: &str,
        ranges: Vec<Range<usize>>,
        budget: usize,
    ) -> Vec<Range<usize>> {
        // (range, chars)
        let mut merged: Vec<(Range<usize>, usize)> = Vec::with_capacity(ranges.len());
        let mut pending: Option<Range<usize>> = None;

        for range in ranges {
            if text[range.clone()].trim().is_empty() {
                pending = Some(match pending {
                    Some(blank) => blank.start..range.end,
                    None => range,
                });
                continue;
            }

            let chars = char_len(&text[range.clone()]);
            let start = match pending.take() {
                Some(blank) => Self::place_blank(text, blank, chars, budget, &mut merged),
                None => range.start,
            };
            let lead = char_len(&text[start..range.start]);
            merged.push((start..range.end, lead + chars));
        }

        if let Some(blank) = pending {
            // Nothing follows a trailing run
            Self::place_blank(text, blank, budget, budget, &mut merged);
        }

        merged.into_iter().map(|(range, _)| range).collect()
    }

    /// Spread `blank` over the previous range and the next one (of
    /// `next_chars` characters); returns where the next range now starts
    fn place_blank(
        text: &str,
        blank: Range<usize>,
        next_chars: usize,
        budget: usize,
        merged: &mut Vec<(Range<usize>, usize)>,
    ) -> usize {
        let blank_text = &text[blank.clone()];
        let blank_chars = char_len(blank_text);

        let into_previous = match merged.last_mut() {
            Some((last, chars)) => {
                let taken = blank_chars.min(budget.saturating_sub(*chars));
                last.end = blank.start + byte_offset(blank_text, taken);
                *chars += taken;
                taken
            }
            None => 0,
        };

        let into_next = (blank_chars - into_previous).min(budget.saturating_sub(next_chars));
        let middle_start = blank.start + byte_offset(blank_text, into_previous);
        let next_start = blank.start + byte_offset(blank_text, blank_chars - into_next);

        if middle_start < next_start {
            let mut middle = Vec::new();
            Self::split_by_size(&text[middle_start..next_start], middle_start, budget, &mut middle);
            merged.extend(middle.into_iter().map(|range| {
                let chars = char_len(&text[range.clone()]);
                (range, chars)
            }));
        }

        next_start
    }

    fn headings(text: &str) -> Vec<(usize, String)> {
        HEADING_LINE
            .captures_iter(text)
            .filter_map(|caps| {
                let start = caps.get(0)?.start();
                let title = caps.get(1)?.as_str().trim().trim_end_matches('#').trim();
                (!title.is_empty()).then(|| (start, title.to_string()))
            })
            .collect()
    }

    fn section_for(headings: &[(usize, String)], range: &Range<usize>) -> Option<String> {
        headings
            .iter()
            .take_while(|(pos, _)| *pos <= range.start)
            .last()
            .or_else(|| headings.iter().find(|(pos, _)| *pos < range.end))
            .map(|(_, title)| title.clone())
    }
}

impl ChunkingStrategy for RecursiveChunker {
    fn chunk(
        &self,
        document: &Document,
        config: &ChunkingConfig,
    ) -> Result<Vec<Chunk>, DomainError> {
        config.validate()?;

        let text = document.raw_text.as_str();
        if text.trim().is_empty() {
            return Ok(vec![]);
        }

        let mut ranges = Vec::new();
        Self::partition(text, 0, Boundary::Heading, config.core_budget(), &mut ranges);
        let cores = Self::absorb_blank_ranges(text, ranges, config.core_budget());

        let headings = Self::headings(text);
        let paged = text.contains(PAGE_BREAK);
        let source_name = document.source_name().to_string();

        let mut chunks: Vec<Chunk> = Vec::with_capacity(cores.len());
        let mut char_cursor = 0;
        let mut page = 1u32;

        for (position, range) in cores.into_iter().enumerate() {
            let core = &text[range.clone()];
            let core_chars = char_len(core);

            let prefix = match chunks.last() {
                Some(previous) if config.overlap_chars > 0 => {
                    tail_chars(&previous.text, config.overlap_chars).to_string()
                }
                _ => String::new(),
            };

            let overlap_chars = char_len(&prefix);
            let chunk_text = format!("{prefix}{core}");

            let leading = core.len() - core.trim_start().len();
            let chunk_page = page + core[..leading].matches(PAGE_BREAK).count() as u32;

            let metadata = ChunkMetadata {
                source_name: source_name.clone(),
                section: Self::section_for(&headings, &range),
                page: paged.then_some(chunk_page),
                char_start: char_cursor,
                char_end: char_cursor + core_chars,
                overlap_chars,
            };

            char_cursor += core_chars;
            page += core.matches(PAGE_BREAK).count() as u32;

            chunks.push(Chunk {
                id: chunk_id(&document.source_identifier, position, &chunk_text),
                document_id: document.id.clone(),
                text: chunk_text,
                position,
                metadata,
            });
        }

        Ok(chunks)
    }

    fn name(&self) -> &'static str {
        "recursive"
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte offset of the `n`th character of `text`, or its length
fn byte_offset(text: &str, n: usize) -> usize {
    text.char_indices().nth(n).map_or(text.len(), |(offset, _)| offset)
}

/// The last `n` characters of `text`
fn tail_chars(text: &str, n: usize) -> &str {
    let total = char_len(text);
    if total <= n {
        return text;
    }

    match text.char_indices().nth(total - n) {
        Some((offset, _)) => &text[offset..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ingestion::reassemble;

    const WORDS: &[&str] = &[
        "refund", "policy", "customers", "may", "return", "items", "within", "thirty", "days",
        "of", "delivery", "shipping", "costs", "are", "not", "covered", "Rückgabe", "über",
    ];

    fn sample_text() -> String {
        let mut text = String::from("# Refunds\n\n");
        for p in 0..12 {
            if p == 6 {
                text.push_str("## Shipping\n\n");
            }
            for s in 0..(3 + p % 4) {
                let sentence: Vec<&str> = (0..(5 + (p * 7 + s * 3) % 11))
                    .map(|w| WORDS[(p * 13 + s * 5 + w) % WORDS.len()])
                    .collect();
                text.push_str(&sentence.join(" "));
                text.push_str(". ");
            }
            text.push_str("\n\n");
        }
        text
    }

    fn chunk(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<Chunk> {
        let document = Document::new("docs/policy.md", text);
        RecursiveChunker::new()
            .chunk(&document, &ChunkingConfig::new(max_chars, overlap_chars))
            .unwrap()
    }

    #[test]
    fn test_empty_and_blank_documents_produce_no_chunks() {
        assert!(chunk("", 100, 10).is_empty());
        assert!(chunk("  \n\n\t ", 100, 10).is_empty());
    }

    #[test]
    fn test_invalid_config() {
        let document = Document::new("a.txt", "text");
        let result = RecursiveChunker::new().chunk(&document, &ChunkingConfig::new(10, 10));
        assert!(matches!(result, Err(DomainError::InvalidConfig { .. })));
    }

    #[test]
    fn test_short_document_is_one_chunk() {
        let chunks = chunk("Refund period: 30 days.", 100, 20);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Refund period: 30 days.");
        assert_eq!(chunks[0].position, 0);
        assert_eq!(chunks[0].metadata.overlap_chars, 0);
        assert_eq!(chunks[0].metadata.source_name, "policy.md");
    }

    #[test]
    fn test_reassembly_reconstructs_text() {
        let text = sample_text();
        for (max, overlap) in [(80, 0), (80, 20), (200, 50), (333, 100), (1000, 200), (40, 39)] {
            let chunks = chunk(&text, max, overlap);
            assert_eq!(reassemble(&chunks), text, "max={max} overlap={overlap}");
        }
    }

    #[test]
    fn test_chunks_respect_max_chars() {
        let text = sample_text();
        for (max, overlap) in [(80, 20), (150, 0), (300, 120)] {
            for c in chunk(&text, max, overlap) {
                assert!(c.char_len() <= max, "chunk of {} > {max}", c.char_len());
                assert!(!c.text.trim().is_empty());
            }
        }
    }

    #[test]
    fn test_overlap_repeats_previous_tail() {
        let chunks = chunk(&sample_text(), 120, 30);
        assert!(chunks.len() > 2);

        for pair in chunks.windows(2) {
            let expected = pair[0].char_len().min(30);
            let prefix: String = pair[1].text.chars().take(expected).collect();
            assert_eq!(pair[1].metadata.overlap_chars, expected);
            assert!(pair[0].text.ends_with(&prefix));
        }
        assert!(chunks.iter().skip(2).all(|c| c.metadata.overlap_chars == 30));
    }

    #[test]
    fn test_deterministic_ids_and_boundaries() {
        let text = sample_text();
        let first = chunk(&text, 150, 40);
        let second = chunk(&text, 150, 40);
        assert_eq!(first, second);

        let mut ids: Vec<&str> = first.iter().map(|c| c.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), first.len());
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let para_a = "Refunds are accepted within thirty days.";
        let para_b = "Shipping costs are never refunded here.";
        let text = format!("{para_a}\n\n{para_b}");

        let chunks = chunk(&text, 60, 0);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, format!("{para_a}\n\n"));
        assert_eq!(chunks[1].text, para_b);
    }

    #[test]
    fn test_hard_split_without_boundaries() {
        let text = "x".repeat(95);
        let chunks = chunk(&text, 30, 10);

        assert_eq!(reassemble(&chunks), text);
        assert!(chunks.iter().all(|c| c.char_len() <= 30));
        assert_eq!(chunks[0].char_len(), 20);
    }

    #[test]
    fn test_long_blank_runs_stay_within_max_chars() {
        let text = format!("aaaaa{}b", " ".repeat(30));
        let chunks = chunk(&text, 10, 0);

        assert!(chunks.iter().all(|c| c.char_len() <= 10));
        assert_eq!(reassemble(&chunks), text);
        assert_eq!(chunks.first().map(|c| c.text.as_str()), Some("aaaaa     "));
        assert!(chunks.last().is_some_and(|c| c.text.ends_with('b')));

        let padded = format!("{}Refunds take 30 days.{}", "\n".repeat(25), " \t".repeat(20));
        for (max, overlap) in [(10, 0), (12, 4), (30, 10)] {
            let chunks = chunk(&padded, max, overlap);
            assert!(
                chunks.iter().all(|c| c.char_len() <= max),
                "max={max} overlap={overlap}"
            );
            assert_eq!(reassemble(&chunks), padded);
        }
    }

    #[test]
    fn test_short_blank_runs_are_absorbed() {
        let text = "Refunds.\n\n\n\nShipping.";
        let chunks = chunk(text, 12, 0);

        assert_eq!(reassemble(&chunks), text);
        assert!(chunks.iter().all(|c| !c.text.trim().is_empty()));
        assert!(chunks.iter().all(|c| c.char_len() <= 12));
    }

    #[test]
    fn test_char_offsets_are_contiguous() {
        let text = sample_text();
        let chunks = chunk(&text, 100, 25);

        assert_eq!(chunks[0].metadata.char_start, 0);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].metadata.char_end, pair[1].metadata.char_start);
        }
        assert_eq!(
            chunks.last().map(|c| c.metadata.char_end),
            Some(text.chars().count())
        );
    }

    #[test]
    fn test_sections_follow_headings() {
        let chunks = chunk(&sample_text(), 200, 0);

        assert_eq!(chunks[0].metadata.section.as_deref(), Some("Refunds"));
        assert_eq!(
            chunks.last().and_then(|c| c.metadata.section.as_deref()),
            Some("Shipping")
        );
    }

    #[test]
    fn test_pages_from_form_feeds() {
        let text = "First page text.\n\u{c}Second page text.\n\u{c}Third page text.";
        let chunks = chunk(text, 20, 0);

        let pages: Vec<Option<u32>> = chunks.iter().map(|c| c.metadata.page).collect();
        assert_eq!(pages.first(), Some(&Some(1)));
        assert_eq!(pages.last(), Some(&Some(3)));

        let unpaged = chunk("No page breaks here.", 100, 0);
        assert_eq!(unpaged[0].metadata.page, None);
    }

    #[test]
    fn test_unicode_text_counts_chars() {
        let text = "Über die Rückgabe: Ärger vermeiden. ".repeat(10);
        let chunks = chunk(&text, 50, 10);

        assert_eq!(reassemble(&chunks), text);
        assert!(chunks.iter().all(|c| c.char_len() <= 50));
    }
}
