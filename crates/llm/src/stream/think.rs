//! Streaming splitter of `<think>…</think>` content (C5).
//!
//! A pure state machine: [`ThinkTagParser::feed`] takes arbitrarily chunked
//! text and returns the chunks recognized so far; [`ThinkTagParser::finalize`]
//! flushes anything still buffered at end of stream. The parser owns no I/O
//! and must be driven by an external pump (§4.4, §9 "Streaming combinators").

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Text,
    Think,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub kind: ChunkKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    MaybeOpen(usize),
    Inside,
    MaybeClose(usize),
}

/// Matches `<think>`/`</think>` case-sensitively; a second `<think>` seen
/// while already `Inside` does not nest — it is literal thinking text.
pub struct ThinkTagParser {
    state: State,
    /// Characters matched so far against the tag currently being tried.
    partial: String,
}

impl Default for ThinkTagParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ThinkTagParser {
    pub fn new() -> Self {
        Self { state: State::Normal, partial: String::new() }
    }

    pub fn feed(&mut self, input: &str) -> Vec<Chunk> {
        let mut out = Vec::new();
        let mut pending: std::collections::VecDeque<char> = input.chars().collect();

        while let Some(ch) = pending.pop_front() {
            match self.state {
                State::Normal => {
                    if ch == '<' {
                        self.partial.clear();
                        self.partial.push(ch);
                        self.state = State::MaybeOpen(1);
                    } else {
                        push_chunk(&mut out, ChunkKind::Text, ch);
                    }
                }
                State::Inside => {
                    if ch == '<' {
                        self.partial.clear();
                        self.partial.push(ch);
                        self.state = State::MaybeClose(1);
                    } else {
                        push_chunk(&mut out, ChunkKind::Think, ch);
                    }
                }
                State::MaybeOpen(n) => {
                    if OPEN_TAG[n..].starts_with(ch) {
                        self.partial.push(ch);
                        if n + ch.len_utf8() == OPEN_TAG.len() {
                            self.partial.clear();
                            self.state = State::Inside;
                        } else {
                            self.state = State::MaybeOpen(n + ch.len_utf8());
                        }
                    } else {
                        let flushed = std::mem::take(&mut self.partial);
                        for c in flushed.chars() {
                            push_chunk(&mut out, ChunkKind::Text, c);
                        }
                        self.state = State::Normal;
                        pending.push_front(ch);
                    }
                }
                State::MaybeClose(n) => {
                    if CLOSE_TAG[n..].starts_with(ch) {
                        self.partial.push(ch);
                        if n + ch.len_utf8() == CLOSE_TAG.len() {
                            self.partial.clear();
                            self.state = State::Normal;
                        } else {
                            self.state = State::MaybeClose(n + ch.len_utf8());
                        }
                    } else {
                        let flushed = std::mem::take(&mut self.partial);
                        for c in flushed.chars() {
                            push_chunk(&mut out, ChunkKind::Think, c);
                        }
                        self.state = State::Inside;
                        pending.push_front(ch);
                    }
                }
            }
        }

        out
    }

    /// Flushes any buffered partial tag as plain text. Per contract this is
    /// always `Text`, even if the buffer was a partial `</think>` — an
    /// unterminated thinking section degrades to visible text rather than
    /// swallowing it.
    pub fn finalize(&mut self) -> Vec<Chunk> {
        let mut out = Vec::new();
        let flushed = std::mem::take(&mut self.partial);
        for c in flushed.chars() {
            push_chunk(&mut out, ChunkKind::Text, c);
        }
        self.state = State::Normal;
        out
    }
}

fn push_chunk(out: &mut Vec<Chunk>, kind: ChunkKind, ch: char) {
    if let Some(last) = out.last_mut() {
        if last.kind == kind {
            last.text.push(ch);
            return;
        }
    }
    out.push(Chunk { kind, text: ch.to_string() });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(chunks: &[&str]) -> Vec<Chunk> {
        let mut parser = ThinkTagParser::new();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(parser.feed(chunk));
        }
        out.extend(parser.finalize());
        out
    }

    #[test]
    fn splits_think_tags_across_chunk_boundaries() {
        let chunks = run(&["A<thi", "nk>B</think>C"]);
        assert_eq!(
            chunks,
            vec![
                Chunk { kind: ChunkKind::Text, text: "A".into() },
                Chunk { kind: ChunkKind::Think, text: "B".into() },
                Chunk { kind: ChunkKind::Text, text: "C".into() },
            ]
        );
    }

    #[test]
    fn concatenation_round_trips_with_tags_removed() {
        let input = ["before <think>reasoning ", "more</think> after"];
        let chunks = run(&input);
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, "before reasoning more after");
    }

    #[test]
    fn nested_think_tag_is_literal_inside() {
        let chunks = run(&["<think>a<think>b</think>c"]);
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, "a<think>bc");
        assert_eq!(chunks[0].kind, ChunkKind::Think);
        assert_eq!(chunks[0].text, "a<think>b");
        assert_eq!(chunks.last().unwrap().kind, ChunkKind::Text);
        assert_eq!(chunks.last().unwrap().text, "c");
    }

    #[test]
    fn mismatched_prefix_is_emitted_as_text() {
        let chunks = run(&["<thisisnotatag>"]);
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, "<thisisnotatag>");
    }

    #[test]
    fn unterminated_think_flushes_as_text_on_finalize() {
        let chunks = run(&["ok<thi"]);
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, "ok<thi");
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Text));
    }
}
