use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

const BACKTRACK_WINDOW: usize = 4;

const OBJ_STARTERS: &[&str] = &[
    "v", "vt", "vn", "f", "g", "o", "mtllib", "s", "usemtl", "#",
];

fn is_obj_starter(token: &str) -> bool {
    OBJ_STARTERS.contains(&token.trim())
}

fn is_obj_content(token: &str) -> bool {
    let trimmed = token.trim();
    trimmed.is_empty() || OBJ_STARTERS.contains(&trimmed)
}

/// Indexes (into the token stream) of one detected mesh block: the mesh
/// content itself (`obj_start..obj_end`) and the wider span to exclude from
/// the prose message (`exclude_start..exclude_end`, which additionally
/// swallows the surrounding code fence when present).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputIndexes {
    pub obj_start: usize,
    pub obj_end: usize,
    pub exclude_start: usize,
    pub exclude_end: usize,
}

#[derive(Debug, Clone)]
pub struct ParsedContent {
    pub message_content: String,
    pub obj_contents: Vec<String>,
}

/// Token-at-a-time mesh block detector.
///
/// Implements the backtrack-window-4 / newline-before-non-content-close
/// variant only (the spec's chosen algorithm) — not the alternate
/// two-slot fence-marker variant also present in the original source.
#[derive(Debug, Default)]
pub struct MeshParser {
    history: VecDeque<String>,
    counter: usize,
    obj_start: Option<usize>,
    exclude_start: Option<usize>,
    obj_end: Option<usize>,
    exclude_end: Option<usize>,
    records: Vec<OutputIndexes>,
}

impl MeshParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one token. Call once per token, in order.
    pub fn process_token(&mut self, token: &str) {
        self.history.push_back(token.to_string());
        if self.history.len() > BACKTRACK_WINDOW {
            self.history.pop_front();
        }

        if self.obj_start.is_none() {
            if is_obj_starter(token) {
                self.obj_start = Some(self.counter);
                let fenced = self.history.len() >= BACKTRACK_WINDOW
                    && self.history[self.history.len() - 4] == "```"
                    && self.history[self.history.len() - 3] == "obj"
                    && self.history[self.history.len() - 2] == "\n";
                self.exclude_start = Some(if fenced {
                    self.counter.saturating_sub(3)
                } else {
                    self.counter
                });
            }
        } else if self.obj_end.is_none() && self.history.len() >= 2 {
            let prev = &self.history[self.history.len() - 2];
            if prev.ends_with('\n') && !is_obj_content(token) {
                self.obj_end = Some(self.counter);
                self.exclude_end = Some(if token == "```" {
                    self.counter + 2
                } else {
                    self.counter
                });
                self.finalize();
            }
        }

        self.counter += 1;
    }

    fn finalize(&mut self) {
        if let (Some(obj_start), Some(obj_end), Some(exclude_start), Some(exclude_end)) = (
            self.obj_start,
            self.obj_end,
            self.exclude_start,
            self.exclude_end,
        ) {
            self.records.push(OutputIndexes {
                obj_start,
                obj_end,
                exclude_start,
                exclude_end,
            });
        }
        self.obj_start = None;
        self.obj_end = None;
        self.exclude_start = None;
        self.exclude_end = None;
    }

    /// Call after the last token has been fed. Closes a block left open at
    /// end-of-stream (a mesh block with no trailing prose) and returns the
    /// complete set of detected blocks.
    pub fn finish(mut self) -> Vec<OutputIndexes> {
        if self.obj_start.is_some() && self.obj_end.is_none() {
            self.obj_end = Some(self.counter);
            self.exclude_end = Some(self.counter);
            self.finalize();
        }
        self.records
    }

    /// Splits the raw token stream into prose (`message_content`) and the
    /// mesh bodies it excludes, given the records this parser produced.
    pub fn extract(tokens: &[String], records: &[OutputIndexes]) -> ParsedContent {
        let mut message_content = String::new();
        let mut obj_contents = Vec::with_capacity(records.len());

        let mut cursor = 0usize;
        for record in records {
            for token in &tokens[cursor..record.exclude_start.min(tokens.len())] {
                message_content.push_str(token);
            }
            let obj_end = record.obj_end.min(tokens.len());
            let obj_start = record.obj_start.min(obj_end);
            let mut body = String::new();
            for token in &tokens[obj_start..obj_end] {
                body.push_str(token);
            }
            obj_contents.push(body);
            cursor = record.exclude_end.min(tokens.len());
        }
        for token in &tokens[cursor..] {
            message_content.push_str(token);
        }

        ParsedContent {
            message_content,
            obj_contents,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(tokens: &[&str]) -> (Vec<String>, Vec<OutputIndexes>) {
        let owned: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
        let mut parser = MeshParser::new();
        for t in &owned {
            parser.process_token(t);
        }
        let records = parser.finish();
        (owned, records)
    }

    #[test]
    fn fenced_block_is_detected_and_excluded_with_fence() {
        // "Sure, here is a cube:\n" (8 tokens) then "```" "obj" "\n" "v" ... "f" "\n" "```" "\n"
        let tokens = [
            "Sure", ",", " here", " is", " a", " cube", ":", "\n", "```", "obj", "\n", "v", " 0",
            " 0", " 0", "\n", "v", " 1", " 0", " 0", "\n", "v", " 0", " 1", " 0", "\n", "f", " 1",
            " 2", " 3", "\n", "```", "\n", "Done", "!",
        ];
        let (_owned, records) = run(&tokens);
        assert_eq!(records.len(), 1);
        let r = records[0];
        assert_eq!(r.exclude_start, 8);
        assert_eq!(r.obj_start, 11);
    }

    #[test]
    fn bare_block_with_no_fence_starts_at_zero() {
        let tokens = [
            "v", " 0", " 0", " 0", "\n", "v", " 1", " 0", " 0", "\n", "f", " 1", " 1", " 1",
            "\n", "Done",
        ];
        let (_owned, records) = run(&tokens);
        assert_eq!(records.len(), 1);
        let r = records[0];
        assert_eq!(r.obj_start, 0);
        assert_eq!(r.exclude_start, 0);
        assert_eq!(r.obj_end, r.exclude_end);
        assert_eq!(r.obj_end, 15);
    }

    #[test]
    fn block_left_open_at_end_of_stream_is_still_closed() {
        let tokens = ["v", " 0", " 0", " 0", "\n", "f", " 1", " 1", " 1"];
        let (_owned, records) = run(&tokens);
        assert_eq!(records.len(), 1);
        let r = records[0];
        assert_eq!(r.obj_start, 0);
        assert_eq!(r.obj_end, tokens.len());
        assert_eq!(r.exclude_end, tokens.len());
    }

    #[test]
    fn no_mesh_content_yields_no_records() {
        let tokens = ["Hello", ",", " world", "!"];
        let (_owned, records) = run(&tokens);
        assert!(records.is_empty());
    }

    #[test]
    fn extract_splits_prose_from_mesh_body() {
        let tokens = [
            "Hi", "\n", "```", "obj", "\n", "v", " 0", " 0", " 0", "\n", "```", "\n", "Bye",
        ];
        let owned: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
        let mut parser = MeshParser::new();
        for t in &owned {
            parser.process_token(t);
        }
        let records = parser.finish();
        let parsed = MeshParser::extract(&owned, &records);
        assert_eq!(parsed.message_content, "Hi\nBye");
        assert_eq!(parsed.obj_contents.len(), 1);
        assert!(parsed.obj_contents[0].contains("v"));
    }

    #[test]
    fn non_overlapping_records_never_regress_the_cursor() {
        let tokens = [
            "a", "\n", "v", " 0", " 0", " 0", "\n", "z", "\n", "v", " 1", " 1", " 1", "\n", "w",
        ];
        let (_owned, records) = run(&tokens);
        let mut prev_end = 0usize;
        for r in &records {
            assert!(r.exclude_start >= prev_end);
            assert!(r.exclude_end >= r.exclude_start);
            prev_end = r.exclude_end;
        }
    }
}
