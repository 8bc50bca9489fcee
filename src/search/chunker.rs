//! Heading-based document chunking.
//!
//! A document is scanned line by line. A line recognized by the configured
//! [`HeadingRule`] closes the text gathered so far as one chunk (under the
//! previous heading) and opens a new section. Text before the first heading
//! becomes a chunk with an empty heading. A heading followed directly by
//! another heading produces no chunk; it is dropped, though a numbered one
//! still appears in the `parents` of its numbered subsections.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::iter::FusedIterator;
use std::path::Path;

use crate::config::{ChunkingConfig, HeadingStyle};
use crate::error::{Error, Result};

use super::store::Chunk;

/// Dotted subsection number: `17.2 Sends and Returns`, `4.1.3 Clips`
static NUMBERED_SUBSECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,3}(?:\.\d+)+)\s+(\S.*)$").unwrap());

/// Chapter number with a required dot: `3. Getting Started`, bare `17.`
static NUMBERED_CHAPTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,3})\.\s*(.*)$").unwrap());

/// A recognized heading line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Heading {
    pub title: String,
    /// Dotted section number for numbered headings
    pub section: Option<String>,
}

impl Heading {
    pub fn plain(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            section: None,
        }
    }
}

/// Decides whether a trimmed, non-empty line is a heading.
pub trait HeadingRule: Send + Sync {
    fn detect(&self, line: &str) -> Option<Heading>;
}

/// Numbered outline headings: `17.`, `17. Routing`, `17.2.1 Sends`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberedHeading;

impl HeadingRule for NumberedHeading {
    fn detect(&self, line: &str) -> Option<Heading> {
        if let Some(caps) = NUMBERED_SUBSECTION.captures(line) {
            return Some(Heading {
                title: caps[2].trim().to_string(),
                section: Some(caps[1].to_string()),
            });
        }
        NUMBERED_CHAPTER.captures(line).map(|caps| {
            let title = caps[2].trim();
            Heading {
                title: if title.is_empty() {
                    format!("Chapter {}", &caps[1])
                } else {
                    title.to_string()
                },
                section: Some(caps[1].to_string()),
            }
        })
    }
}

/// Short all-caps titles: `INTRO`, `GETTING STARTED`.
///
/// At least two letters, every letter uppercase, and no sentence
/// punctuation at the end.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapsHeading;

impl HeadingRule for CapsHeading {
    fn detect(&self, line: &str) -> Option<Heading> {
        let mut letters = 0usize;
        for c in line.chars().filter(|c| c.is_alphabetic()) {
            if !c.is_uppercase() {
                return None;
            }
            letters += 1;
        }
        if letters < 2 || line.ends_with(['.', ',', ';', ':', '!', '?']) {
            return None;
        }
        Some(Heading::plain(line))
    }
}

/// Numbered first, then caps.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyHeading;

impl HeadingRule for AnyHeading {
    fn detect(&self, line: &str) -> Option<Heading> {
        NumberedHeading
            .detect(line)
            .or_else(|| CapsHeading.detect(line))
    }
}

/// Any line matching a user-supplied regex; the whole line is the title.
#[derive(Debug, Clone)]
pub struct PatternHeading {
    pattern: Regex,
}

impl PatternHeading {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::Config(format!("heading pattern: {}", e)))?;
        Ok(Self { pattern })
    }
}

impl HeadingRule for PatternHeading {
    fn detect(&self, line: &str) -> Option<Heading> {
        self.pattern.is_match(line).then(|| Heading::plain(line))
    }
}

pub struct Chunker {
    rule: Box<dyn HeadingRule>,
    max_heading_chars: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(Box::new(AnyHeading), 80)
    }
}

impl Chunker {
    pub fn new(rule: Box<dyn HeadingRule>, max_heading_chars: usize) -> Self {
        Self {
            rule,
            max_heading_chars,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        let rule: Box<dyn HeadingRule> = match config.heading_style {
            HeadingStyle::Numbered => Box::new(NumberedHeading),
            HeadingStyle::Caps => Box::new(CapsHeading),
            HeadingStyle::Auto => Box::new(AnyHeading),
            HeadingStyle::Pattern => {
                let pattern = config.pattern.as_deref().ok_or_else(|| {
                    Error::Config("heading_style = \"pattern\" needs chunking.pattern".into())
                })?;
                Box::new(PatternHeading::new(pattern)?)
            }
        };
        Ok(Self::new(rule, config.max_heading_chars))
    }

    /// Lazily split `text` into chunks in document order.
    pub fn chunks<'a>(&'a self, text: &'a str) -> Chunks<'a> {
        Chunks {
            chunker: self,
            lines: text.lines(),
            current: Heading::default(),
            depth: 0,
            parents: Vec::new(),
            body: Vec::new(),
            outline: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn chunk_all(&self, text: &str) -> Vec<Chunk> {
        self.chunks(text).collect()
    }

    fn detect(&self, line: &str) -> Option<Heading> {
        if line.chars().count() > self.max_heading_chars {
            return None;
        }
        self.rule.detect(line)
    }
}

/// Iterator returned by [`Chunker::chunks`].
pub struct Chunks<'a> {
    chunker: &'a Chunker,
    lines: std::str::Lines<'a>,
    current: Heading,
    depth: u8,
    parents: Vec<String>,
    body: Vec<&'a str>,
    /// Section number -> title, for building `parents`
    outline: HashMap<String, String>,
    next_id: u64,
}

impl<'a> Chunks<'a> {
    fn close(&mut self) -> Option<Chunk> {
        if self.body.is_empty() {
            return None;
        }

        let text = normalize_whitespace(&self.body.join(" "));
        self.body.clear();

        let chunk = Chunk {
            id: self.next_id,
            heading: self.current.title.clone(),
            section: self.current.section.clone(),
            depth: self.depth,
            parents: self.parents.clone(),
            text,
        };
        self.next_id += 1;
        Some(chunk)
    }

    fn open(&mut self, heading: Heading) {
        self.parents.clear();
        self.depth = 0;

        if let Some(section) = &heading.section {
            let parts: Vec<&str> = section.split('.').collect();
            for i in 1..parts.len() {
                let prefix = parts[..i].join(".");
                let title = self
                    .outline
                    .get(&prefix)
                    .cloned()
                    .unwrap_or_else(|| format!("Chapter {}", prefix));
                self.parents.push(title);
            }
            self.depth = u8::try_from(parts.len()).unwrap_or(u8::MAX);
            self.outline.insert(section.clone(), heading.title.clone());
        }

        self.current = heading;
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        #[allow(clippy::while_let_on_iterator)]
        while let Some(line) = self.lines.next() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match self.chunker.detect(line) {
                Some(heading) => {
                    let finished = self.close();
                    self.open(heading);
                    if finished.is_some() {
                        return finished;
                    }
                }
                None => self.body.push(line),
            }
        }

        self.close()
    }
}

impl<'a> FusedIterator for Chunks<'a> {}

/// Trim and collapse internal whitespace runs to single spaces.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Write chunks as JSON lines, replacing `path` atomically.
pub fn write_jsonl(chunks: &[Chunk], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("jsonl.tmp");
    {
        let mut out = BufWriter::new(File::create(&temp_path)?);
        for chunk in chunks {
            serde_json::to_writer(&mut out, chunk)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
    }
    fs::rename(temp_path, path)?;

    Ok(())
}

pub fn read_jsonl(path: &Path) -> Result<Vec<Chunk>> {
    let reader = BufReader::new(File::open(path)?);
    let mut chunks = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        chunks.push(serde_json::from_str(&line)?);
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_lines(chunker: &Chunker, text: &str) -> String {
        let body: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && chunker.detect(l).is_none())
            .collect();
        normalize_whitespace(&body.join(" "))
    }

    #[test]
    fn test_caps_headings_scenario() {
        let chunker = Chunker::default();
        let chunks = chunker.chunk_all("INTRO\nWelcome.\n\nUSAGE\nDo this then that.");

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].id, 0);
        assert_eq!(chunks[0].heading, "INTRO");
        assert_eq!(chunks[0].text, "Welcome.");
        assert_eq!(chunks[1].id, 1);
        assert_eq!(chunks[1].heading, "USAGE");
        assert_eq!(chunks[1].text, "Do this then that.");
    }

    #[test]
    fn test_empty_input() {
        let chunker = Chunker::default();
        assert!(chunker.chunk_all("").is_empty());
        assert!(chunker.chunk_all("\n\n   \n").is_empty());
    }

    #[test]
    fn test_preamble_has_empty_heading() {
        let chunker = Chunker::default();
        let chunks = chunker.chunk_all("Some preface text.\nINTRO\nBody.");

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].heading, "");
        assert_eq!(chunks[0].text, "Some preface text.");
        assert_eq!(chunks[1].heading, "INTRO");
    }

    #[test]
    fn test_consecutive_headings_produce_no_empty_chunk() {
        let chunker = Chunker::default();
        let chunks = chunker.chunk_all("PART ONE\nINTRO\nWelcome.\nOUTRO\n");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].heading, "INTRO");
        assert_eq!(chunks[0].id, 0);
    }

    #[test]
    fn test_whitespace_is_normalized() {
        let chunker = Chunker::default();
        let chunks = chunker.chunk_all("INTRO\n   Lots   of\tspace  \n\n  here.  ");
        assert_eq!(chunks[0].text, "Lots of space here.");
    }

    #[test]
    fn test_numbered_outline() {
        let chunker = Chunker::new(Box::new(NumberedHeading), 80);
        let text = "17. Routing\nRouting basics.\n17.2 Sends and Returns\nSends feed returns.\n\
                    17.2.1 Pre and Post\nTap points.\n18.\nChapter body.";
        let chunks = chunker.chunk_all(text);

        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].heading, "Routing");
        assert_eq!(chunks[0].section.as_deref(), Some("17"));
        assert_eq!(chunks[0].depth, 1);
        assert!(chunks[0].parents.is_empty());

        assert_eq!(chunks[1].heading, "Sends and Returns");
        assert_eq!(chunks[1].parents, vec!["Routing".to_string()]);
        assert_eq!(chunks[1].depth, 2);

        assert_eq!(
            chunks[2].parents,
            vec!["Routing".to_string(), "Sends and Returns".to_string()]
        );
        assert_eq!(chunks[2].depth, 3);

        assert_eq!(chunks[3].heading, "Chapter 18");
        assert_eq!(chunks[3].section.as_deref(), Some("18"));
    }

    #[test]
    fn test_numbered_parent_placeholder() {
        let chunker = Chunker::new(Box::new(NumberedHeading), 80);
        let chunks = chunker.chunk_all("4.1 Browser\nFind sounds.");
        assert_eq!(chunks[0].parents, vec!["Chapter 4".to_string()]);
    }

    #[test]
    fn test_dropped_heading_still_names_parent() {
        let chunker = Chunker::new(Box::new(NumberedHeading), 80);
        let chunks = chunker.chunk_all("5. Clips\n5.1 Clip View\nEditing clips.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].parents, vec!["Clips".to_string()]);
    }

    #[test]
    fn test_caps_rule() {
        let rule = CapsHeading;
        assert!(rule.detect("INTRO").is_some());
        assert!(rule.detect("GETTING STARTED").is_some());
        assert!(rule.detect("MIDI 2.0 SUPPORT").is_some());
        assert!(rule.detect("Welcome.").is_none());
        assert!(rule.detect("OK.").is_none());
        assert!(rule.detect("A").is_none());
        assert!(rule.detect("42").is_none());
        assert!(rule.detect("WARNING!").is_none());
    }

    #[test]
    fn test_numbered_rule() {
        let rule = NumberedHeading;
        assert_eq!(
            rule.detect("17.2 Sends and Returns"),
            Some(Heading {
                title: "Sends and Returns".into(),
                section: Some("17.2".into())
            })
        );
        assert!(rule.detect("3. Getting Started").is_some());
        assert!(rule.detect("12.").is_some());
        assert!(rule.detect("12").is_none());
        assert!(rule.detect("Version 12.1 notes").is_none());
        assert!(rule.detect("2024 was a year").is_none());
        assert!(rule.detect("3 tracks at once").is_none());
        assert!(rule.detect("17 Routing").is_none());
        assert_eq!(
            rule.detect("17."),
            Some(Heading {
                title: "Chapter 17".into(),
                section: Some("17".into())
            })
        );
    }

    #[test]
    fn test_number_leading_body_line_stays_in_text() {
        let chunker = Chunker::new(Box::new(NumberedHeading), 80);
        let chunks =
            chunker.chunk_all("17. Routing
You can route audio to
3 tracks at once using sends.
More text.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].heading, "Routing");
        assert_eq!(
            chunks[0].text,
            "You can route audio to 3 tracks at once using sends. More text."
        );
    }

    #[test]
    fn test_max_heading_chars() {
        let chunker = Chunker::new(Box::new(CapsHeading), 10);
        let chunks = chunker.chunk_all("VERY LONG SHOUTED LINE\nINTRO\nBody.");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].heading, "");
        assert_eq!(chunks[0].text, "VERY LONG SHOUTED LINE");
    }

    #[test]
    fn test_pattern_rule() {
        let chunker = Chunker::new(Box::new(PatternHeading::new(r"^Chapter \d+").unwrap()), 80);
        let chunks = chunker.chunk_all("Chapter 1\nIn the beginning.\nChapter 2\nLater on.");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].heading, "Chapter 2");
        assert_eq!(chunks[1].text, "Later on.");
        assert!(PatternHeading::new("(").is_err());
    }

    #[test]
    fn test_concatenation_reproduces_body_text() {
        let styles: Vec<(Chunker, &str)> = vec![
            (
                Chunker::default(),
                "Preface  line.\nINTRO\nWelcome to\n the   manual.\n\nUSAGE\nStep one.\nStep two.\n",
            ),
            (
                Chunker::new(Box::new(NumberedHeading), 80),
                "1. Start\nHello there.\n1.1 More\n\n\tDetails   follow.\n2.\n3. Empty\n4. End\nBye.",
            ),
            (
                Chunker::new(Box::new(CapsHeading), 80),
                "no headings at all\njust   text\n",
            ),
        ];

        for (chunker, text) in styles {
            let chunks = chunker.chunk_all(text);
            for (i, chunk) in chunks.iter().enumerate() {
                assert_eq!(chunk.id, i as u64);
                assert!(!chunk.text.is_empty());
            }
            let joined: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
            assert_eq!(normalize_whitespace(&joined.join(" ")), body_lines(&chunker, text));
        }
    }

    #[test]
    fn test_iterator_is_lazy_and_fused() {
        let chunker = Chunker::default();
        let mut iter = chunker.chunks("INTRO\nOne.\nUSAGE\nTwo.");
        assert_eq!(iter.next().map(|c| c.text), Some("One.".to_string()));
        assert_eq!(iter.next().map(|c| c.text), Some("Two.".to_string()));
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_from_config() {
        let mut config = ChunkingConfig::default();
        config.heading_style = HeadingStyle::Caps;
        let chunker = Chunker::from_config(&config).unwrap();
        assert_eq!(chunker.chunk_all("1. Numbered\nBody.")[0].heading, "");

        config.heading_style = HeadingStyle::Pattern;
        assert!(Chunker::from_config(&config).is_err());
        config.pattern = Some(r"^== .* ==$".to_string());
        let chunker = Chunker::from_config(&config).unwrap();
        assert_eq!(chunker.chunk_all("== Title ==\nBody.")[0].heading, "== Title ==");
    }

    #[test]
    fn test_jsonl_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("chunks.jsonl");
        let chunker = Chunker::default();
        let chunks = chunker.chunk_all("INTRO\nWelcome.\n2.1 Sub\nNested text.");

        write_jsonl(&chunks, &path).unwrap();
        let loaded = read_jsonl(&path).unwrap();
        assert_eq!(loaded, chunks);
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
    }
}
