//! Decoding of the line-framed `data: {json}` event stream.
//!
//! Only `choices[0].delta.content` is read from each payload. Lines that are
//! not `data:` lines, carry no content, or fail to decode are skipped; they
//! never abort the stream.

use proto::FrameParseError;
use serde::Deserialize;
use tracing::{trace, warn};

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

// ── Payload types ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

// ── Line classification ────────────────────────────────────────────────────────

/// Result of decoding a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameLine {
    /// A non-empty text fragment.
    Fragment(String),
    /// Not a `data:` line, or a payload without content.
    Skipped,
    /// A `data:` line whose payload could not be decoded.
    Malformed(FrameParseError),
}

/// Classifies one line of the stream.
pub fn parse_line(line: &str) -> FrameLine {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
        return FrameLine::Skipped;
    };
    let payload = rest.strip_prefix(' ').unwrap_or(rest);
    if payload.trim() == DONE_SENTINEL {
        return FrameLine::Skipped;
    }

    match serde_json::from_str::<ChunkPayload>(payload) {
        Ok(parsed) => match first_content(parsed) {
            Some(content) if !content.is_empty() => FrameLine::Fragment(content),
            _ => FrameLine::Skipped,
        },
        Err(e) => FrameLine::Malformed(FrameParseError::InvalidJson(e.to_string())),
    }
}

fn first_content(payload: ChunkPayload) -> Option<String> {
    payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
}

/// Keeps the fragment of a classified line, logging malformed payloads.
fn into_fragment(line: &str, parsed: FrameLine) -> Option<String> {
    match parsed {
        FrameLine::Fragment(content) => {
            trace!(len = content.len(), "Frame fragment decoded");
            Some(content)
        }
        FrameLine::Skipped => None,
        FrameLine::Malformed(e) => {
            let preview: String = line.chars().take(120).collect();
            warn!(error = %e, line = %preview, "Skipping malformed frame line");
            None
        }
    }
}

/// Decodes one chunk on its own, treating every `\n`-separated piece as a
/// complete line. A line split across two chunks is lost; use
/// [`FrameDecoder`] when chunks come from a transport.
pub fn parse_chunk(chunk: &str) -> Vec<String> {
    chunk
        .split('\n')
        .filter_map(|line| into_fragment(line, parse_line(line)))
        .collect()
}

// ── Incremental decoder ────────────────────────────────────────────────────────

/// Incremental decoder that joins lines split across chunk boundaries.
///
/// Bytes are buffered until a `\n` arrives, so a multi-byte UTF-8 character
/// cut by a chunk boundary is decoded whole.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes and returns the fragments of every line completed by them.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut fragments = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            fragments.extend(into_fragment(&line, parse_line(&line)));
        }
        fragments
    }

    /// Flushes a final line that was not terminated by `\n`.
    pub fn finish(&mut self) -> Vec<String> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let raw = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&raw);
        into_fragment(&line, parse_line(&line)).into_iter().collect()
    }

    /// Number of buffered bytes belonging to an incomplete line.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_line(content: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({"choices":[{"delta":{"content":content}}]})
        )
    }

    #[test]
    fn parse_line_extracts_delta_content() {
        let line = r#"data: {"choices":[{"delta":{"content":"He"}}]}"#;
        assert_eq!(parse_line(line), FrameLine::Fragment("He".to_string()));
    }

    #[test]
    fn parse_line_accepts_prefix_without_space() {
        let line = r#"data:{"choices":[{"delta":{"content":"x"}}]}"#;
        assert_eq!(parse_line(line), FrameLine::Fragment("x".to_string()));
    }

    #[test]
    fn parse_line_tolerates_extra_whitespace_before_payload() {
        // One space is stripped as the prefix; the rest is JSON whitespace.
        let line = r#"data:   {"choices":[{"delta":{"content":"y"}}]}"#;
        assert_eq!(parse_line(line), FrameLine::Fragment("y".to_string()));
    }

    #[test]
    fn parse_line_tolerates_crlf() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"z\"}}]}\r";
        assert_eq!(parse_line(line), FrameLine::Fragment("z".to_string()));
    }

    #[test]
    fn parse_line_skips_non_data_lines() {
        assert_eq!(parse_line(""), FrameLine::Skipped);
        assert_eq!(parse_line("event: message"), FrameLine::Skipped);
        assert_eq!(parse_line(": keep-alive"), FrameLine::Skipped);
        assert_eq!(parse_line(" data: {}"), FrameLine::Skipped);
    }

    #[test]
    fn parse_line_skips_empty_or_absent_content() {
        assert_eq!(
            parse_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#),
            FrameLine::Skipped
        );
        assert_eq!(
            parse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            FrameLine::Skipped
        );
        assert_eq!(
            parse_line(r#"data: {"choices":[{"delta":{"content":null}}]}"#),
            FrameLine::Skipped
        );
        assert_eq!(parse_line(r#"data: {"choices":[]}"#), FrameLine::Skipped);
        assert_eq!(parse_line(r#"data: {"id":"x"}"#), FrameLine::Skipped);
    }

    #[test]
    fn parse_line_reads_only_first_choice() {
        let line = r#"data: {"choices":[{"delta":{}},{"delta":{"content":"second"}}]}"#;
        assert_eq!(parse_line(line), FrameLine::Skipped);
    }

    #[test]
    fn parse_line_reports_malformed_payload() {
        assert!(matches!(
            parse_line("data: not-json"),
            FrameLine::Malformed(FrameParseError::InvalidJson(_))
        ));
        assert!(matches!(
            parse_line(r#"data: {"choices":[{"delta":{"content":5}}]}"#),
            FrameLine::Malformed(_)
        ));
    }

    #[test]
    fn parse_line_skips_done_sentinel() {
        assert_eq!(parse_line("data: [DONE]"), FrameLine::Skipped);
    }

    #[test]
    fn parse_chunk_yields_fragments_in_line_order() {
        let chunk = format!("{}{}", data_line("He"), data_line("llo"));
        assert_eq!(parse_chunk(&chunk), vec!["He", "llo"]);
    }

    #[test]
    fn parse_chunk_ignores_malformed_line_between_valid_ones() {
        let chunk = format!("{}data: not-json\n{}", data_line("A"), data_line("B"));
        assert_eq!(parse_chunk(&chunk), vec!["A", "B"]);
    }

    #[test]
    fn parse_chunk_of_noise_is_empty() {
        assert!(parse_chunk("hello\n\nretry: 100\n").is_empty());
    }

    #[test]
    fn decoder_joins_line_split_across_chunks() {
        let line = data_line("joined");
        let (head, tail) = line.split_at(17);

        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(head.as_bytes()).is_empty());
        assert!(decoder.pending_len() > 0);
        assert_eq!(decoder.push(tail.as_bytes()), vec!["joined"]);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn decoder_keeps_multibyte_character_split_across_chunks() {
        let line = data_line("héllo ✓");
        let bytes = line.as_bytes();
        let cut = line.find('✓').expect("check mark") + 1;

        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&bytes[..cut]).is_empty());
        assert_eq!(decoder.push(&bytes[cut..]), vec!["héllo ✓"]);
    }

    #[test]
    fn decoder_finish_flushes_unterminated_line() {
        let line = data_line("tail");
        let unterminated = line.trim_end_matches('\n');

        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(unterminated.as_bytes()).is_empty());
        assert_eq!(decoder.finish(), vec!["tail"]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn decoder_handles_many_lines_in_one_chunk() {
        let chunk = format!(
            "{}\n{}data: not-json\n{}",
            data_line("a"),
            data_line("b"),
            data_line("c")
        );
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.push(chunk.as_bytes()), vec!["a", "b", "c"]);
        assert!(decoder.finish().is_empty());
    }
}
