//! SQL text segmentation.
//!
//! Splits raw SQL into plain code and protected segments: dollar-quoted
//! blocks, quoted literals, block comments and line comments. Placeholder
//! handling only ever looks at code segments, so a `--` or `:name` inside
//! a string literal is left alone.

/// The kind of a SQL segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Plain SQL where placeholders may appear.
    Code,
    /// `'...'` or `"..."`, backslash escapes honored.
    Quoted,
    /// `$$...$$` or `$tag$...$tag$`.
    DollarBlock,
    /// `/* ... */`.
    BlockComment,
    /// `-- ...` up to (not including) the end of the line.
    LineComment,
}

/// A slice of the source with its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    /// What the slice is.
    pub kind: SegmentKind,
    /// The slice, verbatim.
    pub text: &'a str,
}

impl Segment<'_> {
    /// Whether the segment must be copied through untouched.
    #[must_use]
    pub fn is_protected(&self) -> bool {
        self.kind != SegmentKind::Code
    }
}

/// Splits SQL into segments.
///
/// Concatenating the texts of all segments yields the input unchanged.
/// Unterminated literals, blocks and comments extend to the end of input.
#[must_use]
pub fn segments(sql: &str) -> Vec<Segment<'_>> {
    Scanner::new(sql).run()
}

/// A piece of a code segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodePart<'a> {
    /// Literal SQL text.
    Text(&'a str),
    /// `?`
    Positional,
    /// `:name`, without the colon.
    Named(&'a str),
}

/// Splits a code segment into literal text and placeholders.
///
/// A named placeholder is a colon followed by an ASCII letter and then
/// letters, digits or underscores. Double colons (`::text` casts) never
/// start a placeholder.
#[must_use]
pub fn code_parts(code: &str) -> Vec<CodePart<'_>> {
    let bytes = code.as_bytes();
    let mut parts = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'?' => {
                if literal_start < i {
                    parts.push(CodePart::Text(&code[literal_start..i]));
                }
                parts.push(CodePart::Positional);
                i += 1;
                literal_start = i;
            }
            b':' if bytes.get(i + 1) == Some(&b':') => {
                while bytes.get(i) == Some(&b':') {
                    i += 1;
                }
            }
            b':' if bytes.get(i + 1).is_some_and(u8::is_ascii_alphabetic) => {
                let name_start = i + 1;
                let mut end = name_start;
                while bytes
                    .get(end)
                    .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
                {
                    end += 1;
                }
                if literal_start < i {
                    parts.push(CodePart::Text(&code[literal_start..i]));
                }
                parts.push(CodePart::Named(&code[name_start..end]));
                i = end;
                literal_start = i;
            }
            _ => i += 1,
        }
    }

    if literal_start < bytes.len() {
        parts.push(CodePart::Text(&code[literal_start..]));
    }
    parts
}

/// Named placeholders referenced in `sql`, in order of first appearance,
/// without duplicates.
#[must_use]
pub fn named_placeholders(sql: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for segment in segments(sql).iter().filter(|s| !s.is_protected()) {
        for part in code_parts(segment.text) {
            if let CodePart::Named(name) = part {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
    }
    names
}

struct Scanner<'a> {
    input: &'a str,
    pos: usize,
    code_start: usize,
    out: Vec<Segment<'a>>,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            code_start: 0,
            out: Vec::new(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn run(mut self) -> Vec<Segment<'a>> {
        while let Some(c) = self.rest().chars().next() {
            let end = match c {
                '\'' | '"' => Some((SegmentKind::Quoted, self.quoted_end(c))),
                '$' => self
                    .dollar_tag()
                    .map(|tag| (SegmentKind::DollarBlock, self.dollar_end(tag))),
                '/' if self.rest().starts_with("/*") => {
                    Some((SegmentKind::BlockComment, self.block_comment_end()))
                }
                '-' if self.rest().starts_with("--") => {
                    Some((SegmentKind::LineComment, self.line_comment_end()))
                }
                _ => None,
            };

            match end {
                Some((kind, end)) => {
                    self.flush_code();
                    self.out.push(Segment {
                        kind,
                        text: &self.input[self.pos..end],
                    });
                    self.pos = end;
                    self.code_start = end;
                }
                None => self.pos += c.len_utf8(),
            }
        }
        self.flush_code();
        self.out
    }

    fn flush_code(&mut self) {
        if self.code_start < self.pos {
            self.out.push(Segment {
                kind: SegmentKind::Code,
                text: &self.input[self.code_start..self.pos],
            });
        }
    }

    /// End offset of a quoted literal starting at `pos`.
    fn quoted_end(&self, quote: char) -> usize {
        let mut chars = self.rest().char_indices().skip(1);
        while let Some((i, c)) = chars.next() {
            if c == '\\' {
                chars.next();
            } else if c == quote {
                return self.pos + i + c.len_utf8();
            }
        }
        self.input.len()
    }

    /// The opening tag (`$$` or `$name$`) at `pos`, if any.
    fn dollar_tag(&self) -> Option<&'a str> {
        let rest = self.rest();
        let bytes = rest.as_bytes();
        let mut i = 1;
        if bytes.get(i).is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_') {
            while bytes
                .get(i)
                .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
            {
                i += 1;
            }
        }
        (bytes.get(i) == Some(&b'$')).then(|| &rest[..=i])
    }

    fn dollar_end(&self, tag: &str) -> usize {
        let body = self.pos + tag.len();
        self.input[body..]
            .find(tag)
            .map_or(self.input.len(), |i| body + i + tag.len())
    }

    fn block_comment_end(&self) -> usize {
        self.input[self.pos + 2..]
            .find("*/")
            .map_or(self.input.len(), |i| self.pos + 2 + i + 2)
    }

    fn line_comment_end(&self) -> usize {
        self.rest()
            .find('\n')
            .map_or(self.input.len(), |i| self.pos + i)
    }
}
