// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Comment and string aware masking for C-family sources.
//!
//! The parser runs regexes over masked copies of the source so that code
//! inside comments is never mistaken for declarations and braces inside
//! strings never affect block matching. Every masked copy has the exact byte
//! length of the input (blanked characters become as many spaces as their
//! UTF-8 width, newlines are kept), so offsets and line numbers line up
//! across all views. Regex literals are treated like strings: a `/` opens
//! one when the preceding token cannot end an expression.

/// Masked views over one source file.
#[derive(Debug, Clone)]
pub struct MaskedSource {
    /// Comments blanked, string literals intact.
    pub without_comments: String,
    /// Comments and string/template contents blanked.
    pub skeleton: String,
    /// Byte offset of the start of each line.
    line_starts: Vec<usize>,
    /// Block depth (`{` nesting) at the start of each line.
    line_depths: Vec<u32>,
    /// Deepest `{` nesting seen anywhere.
    pub max_depth: u32,
    /// First structural error found, if any.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Code,
    LineComment,
    BlockComment,
    Quote(char),
    Template,
}

impl MaskedSource {
    /// Mask a source file.
    pub fn new(content: &str) -> Self {
        let mut without_comments = String::with_capacity(content.len());
        let mut skeleton = String::with_capacity(content.len());
        let mut error = None;

        let mut mode = Mode::Code;
        // Open `{` count inside each active `${ ... }` template expression.
        let mut template_exprs: Vec<u32> = Vec::new();
        let mut template_line = 0usize;
        let mut comment_line = 0usize;
        let mut line = 1usize;

        let chars: Vec<char> = content.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();

            match mode {
                Mode::Code => {
                    if c == '/' && next == Some('/') {
                        mode = Mode::LineComment;
                        blank(&mut without_comments, c);
                        blank(&mut skeleton, c);
                    } else if c == '/' && next == Some('*') {
                        mode = Mode::BlockComment;
                        comment_line = line;
                        blank(&mut without_comments, c);
                        blank(&mut without_comments, '*');
                        blank(&mut skeleton, c);
                        blank(&mut skeleton, '*');
                        i += 1;
                    } else if let Some(end) = (c == '/' && regex_allowed(&skeleton))
                        .then(|| regex_end(&chars, i))
                        .flatten()
                    {
                        // Regex body: kept as text, blanked in the skeleton.
                        without_comments.push(c);
                        skeleton.push(c);
                        for &body in &chars[i + 1..end] {
                            without_comments.push(body);
                            blank(&mut skeleton, body);
                        }
                        without_comments.push('/');
                        skeleton.push('/');
                        i = end;
                    } else if c == '\'' || c == '"' {
                        mode = Mode::Quote(c);
                        without_comments.push(c);
                        skeleton.push(c);
                    } else if c == '`' {
                        mode = Mode::Template;
                        template_line = line;
                        without_comments.push(c);
                        skeleton.push(c);
                    } else if c == '}' && template_exprs.last() == Some(&0) {
                        template_exprs.pop();
                        mode = Mode::Template;
                        without_comments.push(c);
                        blank(&mut skeleton, c);
                    } else {
                        if let Some(open) = template_exprs.last_mut() {
                            if c == '{' {
                                *open += 1;
                            } else if c == '}' {
                                *open -= 1;
                            }
                        }
                        without_comments.push(c);
                        skeleton.push(c);
                    }
                }
                Mode::LineComment => {
                    if c == '\n' {
                        mode = Mode::Code;
                        without_comments.push(c);
                        skeleton.push(c);
                    } else {
                        blank(&mut without_comments, c);
                        blank(&mut skeleton, c);
                    }
                }
                Mode::BlockComment => {
                    if c == '*' && next == Some('/') {
                        mode = Mode::Code;
                        blank(&mut without_comments, c);
                        blank(&mut without_comments, '/');
                        blank(&mut skeleton, c);
                        blank(&mut skeleton, '/');
                        i += 1;
                    } else {
                        blank(&mut without_comments, c);
                        blank(&mut skeleton, c);
                    }
                }
                Mode::Quote(quote) => {
                    if c == '\\' {
                        without_comments.push(c);
                        blank(&mut skeleton, c);
                        if let Some(escaped) = next {
                            without_comments.push(escaped);
                            blank(&mut skeleton, escaped);
                            if escaped == '\n' {
                                line += 1;
                            }
                            i += 1;
                        }
                    } else if c == quote {
                        mode = Mode::Code;
                        without_comments.push(c);
                        skeleton.push(c);
                    } else if c == '\n' {
                        // Unterminated quote ends at the line (JSX text often
                        // carries stray apostrophes).
                        mode = Mode::Code;
                        without_comments.push(c);
                        skeleton.push(c);
                    } else {
                        without_comments.push(c);
                        blank(&mut skeleton, c);
                    }
                }
                Mode::Template => {
                    if c == '\\' {
                        without_comments.push(c);
                        blank(&mut skeleton, c);
                        if let Some(escaped) = next {
                            without_comments.push(escaped);
                            blank(&mut skeleton, escaped);
                            if escaped == '\n' {
                                line += 1;
                            }
                            i += 1;
                        }
                    } else if c == '`' {
                        mode = Mode::Code;
                        without_comments.push(c);
                        skeleton.push(c);
                    } else if c == '$' && next == Some('{') {
                        mode = Mode::Code;
                        template_exprs.push(0);
                        without_comments.push(c);
                        without_comments.push('{');
                        blank(&mut skeleton, c);
                        blank(&mut skeleton, '{');
                        i += 1;
                    } else {
                        without_comments.push(c);
                        blank(&mut skeleton, c);
                    }
                }
            }

            if c == '\n' {
                line += 1;
            }
            i += 1;
        }

        match mode {
            Mode::BlockComment => {
                error = Some(format!(
                    "Unterminated block comment starting at line {}",
                    comment_line
                ));
            }
            Mode::Template => {
                error = Some(format!(
                    "Unterminated template literal starting at line {}",
                    template_line
                ));
            }
            _ if !template_exprs.is_empty() => {
                error = Some(format!(
                    "Unterminated template expression starting at line {}",
                    template_line
                ));
            }
            _ => {}
        }

        let (line_starts, line_depths, max_depth, delimiter_error) = scan_delimiters(&skeleton);
        if error.is_none() {
            error = delimiter_error;
        }

        Self {
            without_comments,
            skeleton,
            line_starts,
            line_depths,
            max_depth,
            error,
        }
    }

    /// 1-indexed line number for a byte offset.
    pub fn line_of(&self, offset: usize) -> u32 {
        match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx as u32 + 1,
            Err(idx) => idx as u32,
        }
    }

    /// Block depth at the start of a 1-indexed line.
    pub fn depth_at_line(&self, line: u32) -> u32 {
        self.line_depths
            .get(line.saturating_sub(1) as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Byte offset of the start of a 1-indexed line.
    pub fn line_start(&self, line: u32) -> usize {
        self.line_starts
            .get(line.saturating_sub(1) as usize)
            .copied()
            .unwrap_or(self.skeleton.len())
    }

    /// Number of lines.
    pub fn line_count(&self) -> u32 {
        self.line_starts.len() as u32
    }

    /// Find the line where the construct starting at `offset` ends.
    ///
    /// The construct ends at the `}` matching the first `{` seen outside
    /// parentheses/brackets, or at the first `;` seen before any such brace.
    pub fn block_end_line(&self, offset: usize) -> u32 {
        let bytes = self.skeleton.as_bytes();
        let mut paren_depth = 0i32;
        let mut brace_depth = 0i32;
        let mut i = offset;
        while i < bytes.len() {
            match bytes[i] {
                b'(' | b'[' => paren_depth += 1,
                b')' | b']' => paren_depth -= 1,
                b'{' if paren_depth <= 0 => brace_depth += 1,
                b'}' if paren_depth <= 0 && brace_depth > 0 => {
                    brace_depth -= 1;
                    if brace_depth == 0 {
                        return self.line_of(i);
                    }
                }
                b';' if paren_depth <= 0 && brace_depth == 0 => return self.line_of(i),
                _ => {}
            }
            i += 1;
        }
        self.line_of(offset)
    }

    /// Byte range of the parenthesised list starting at or after `offset`.
    pub fn paren_span(&self, offset: usize) -> Option<(usize, usize)> {
        let bytes = self.skeleton.as_bytes();
        let start = offset + self.skeleton.get(offset..)?.find('(')?;
        let mut depth = 0i32;
        for (i, byte) in bytes.iter().enumerate().skip(start) {
            match byte {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some((start + 1, i));
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// Blank a character, preserving its byte width and newlines.
fn blank(out: &mut String, c: char) {
    if c == '\n' {
        out.push('\n');
    } else {
        for _ in 0..c.len_utf8() {
            out.push(' ');
        }
    }
}

/// Keywords after which a `/` starts a regex literal.
const REGEX_PREFIX_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case",
    "do", "else", "yield", "await",
];

/// Whether a `/` following the masked text so far opens a regex literal.
///
/// `<` and `>` are left out so JSX closing tags stay code, and so is `}`
/// (`<A b={c} />`).
fn regex_allowed(masked: &str) -> bool {
    let before = masked.trim_end();
    let Some(last) = before.chars().last() else {
        return true;
    };
    if "(,=:[!&|?{;+-*%~^".contains(last) {
        return true;
    }
    if last.is_alphanumeric() || last == '_' || last == '$' {
        let word_start = before
            .rfind(|ch: char| !(ch.is_alphanumeric() || ch == '_' || ch == '$'))
            .map(|idx| idx + 1)
            .unwrap_or(0);
        return REGEX_PREFIX_KEYWORDS.contains(&&before[word_start..]);
    }
    false
}

/// Index of the `/` closing a regex literal opened at `start`, on the same line.
fn regex_end(chars: &[char], start: usize) -> Option<usize> {
    let mut in_class = false;
    let mut j = start + 1;
    while j < chars.len() {
        match chars[j] {
            '\n' => return None,
            '\\' => {
                if chars.get(j + 1).map_or(true, |&next| next == '\n') {
                    return None;
                }
                j += 1;
            }
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => return Some(j),
            _ => {}
        }
        j += 1;
    }
    None
}

type DelimiterScan = (Vec<usize>, Vec<u32>, u32, Option<String>);

/// Walk the skeleton once, recording line starts, per-line depth and the
/// first delimiter mismatch.
fn scan_delimiters(skeleton: &str) -> DelimiterScan {
    let mut line_starts = vec![0usize];
    let mut line_depths = vec![0u32];
    let mut stack: Vec<(u8, u32)> = Vec::new();
    let mut brace_depth = 0u32;
    let mut max_depth = 0u32;
    let mut error = None;
    let mut line = 1u32;

    for (i, byte) in skeleton.bytes().enumerate() {
        match byte {
            b'\n' => {
                line += 1;
                line_starts.push(i + 1);
                line_depths.push(brace_depth);
            }
            b'(' | b'[' | b'{' => {
                if byte == b'{' {
                    brace_depth += 1;
                    max_depth = max_depth.max(brace_depth);
                }
                stack.push((byte, line));
            }
            b')' | b']' | b'}' => {
                let expected = match byte {
                    b')' => b'(',
                    b']' => b'[',
                    _ => b'{',
                };
                match stack.pop() {
                    Some((open, _)) if open == expected => {
                        if byte == b'}' {
                            brace_depth = brace_depth.saturating_sub(1);
                        }
                    }
                    Some((open, open_line)) => {
                        if error.is_none() {
                            error = Some(format!(
                                "Unexpected '{}' at line {} (expected close for '{}' opened at line {})",
                                byte as char, line, open as char, open_line
                            ));
                        }
                        stack.push((open, open_line));
                    }
                    None => {
                        if error.is_none() {
                            error = Some(format!("Unexpected '{}' at line {}", byte as char, line));
                        }
                    }
                }
            }
            _ => {}
        }
    }

    if error.is_none() {
        if let Some((open, open_line)) = stack.first() {
            error = Some(format!(
                "Unclosed '{}' opened at line {}",
                *open as char, open_line
            ));
        }
    }

    (line_starts, line_depths, max_depth, error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comments_are_blanked_with_same_length() {
        let src = "const a = 1; // trailing {\n/* block { */ const b = 2;";
        let masked = MaskedSource::new(src);
        assert_eq!(masked.without_comments.len(), src.len());
        assert_eq!(masked.skeleton.len(), src.len());
        assert!(!masked.without_comments.contains("trailing"));
        assert!(!masked.without_comments.contains("block"));
        assert!(masked.without_comments.contains("const b = 2;"));
        assert!(masked.error.is_none());
    }

    #[test]
    fn test_string_contents_blanked_in_skeleton_only() {
        let src = "const s = \"{ not a block\";";
        let masked = MaskedSource::new(src);
        assert!(masked.without_comments.contains("{ not a block"));
        assert!(!masked.skeleton.contains("not a block"));
        assert!(masked.error.is_none());
        assert_eq!(masked.max_depth, 0);
    }

    #[test]
    fn test_template_expression_is_code() {
        let src = "const t = `a ${fn({ x: 1 })} b`;";
        let masked = MaskedSource::new(src);
        assert!(masked.error.is_none());
        assert!(masked.skeleton.contains("fn({ x: 1 })"));
    }

    #[test]
    fn test_multibyte_chars_keep_offsets() {
        let src = "// héllo\nconst x = 'ünï';\n";
        let masked = MaskedSource::new(src);
        assert_eq!(masked.skeleton.len(), src.len());
        assert_eq!(masked.line_of(src.find("const").unwrap()), 2);
    }

    #[test]
    fn test_unbalanced_brace_is_error() {
        let masked = MaskedSource::new("function f() {\n  if (x) {\n}\n");
        assert!(masked.error.unwrap().contains("Unclosed '{'"));
    }

    #[test]
    fn test_unexpected_close_is_error() {
        let masked = MaskedSource::new("const a = 1;\n}\n");
        assert!(masked.error.unwrap().contains("Unexpected '}' at line 2"));
    }

    #[test]
    fn test_unterminated_block_comment_is_error() {
        let masked = MaskedSource::new("/* never closed\nconst a = 1;");
        assert!(masked.error.unwrap().contains("block comment"));
    }

    #[test]
    fn test_depths_and_block_end() {
        let src = "function f() {\n  if (a) {\n    b();\n  }\n}\nconst c = 1;\n";
        let masked = MaskedSource::new(src);
        assert_eq!(masked.max_depth, 2);
        assert_eq!(masked.depth_at_line(1), 0);
        assert_eq!(masked.depth_at_line(3), 2);
        assert_eq!(masked.block_end_line(0), 5);
        assert_eq!(masked.block_end_line(src.find("const").unwrap()), 6);
    }

    #[test]
    fn test_block_end_skips_braces_in_params() {
        let src = "function f(opts = { a: 1 }) {\n  return opts;\n}\n";
        let masked = MaskedSource::new(src);
        assert_eq!(masked.block_end_line(0), 3);
    }

    #[test]
    fn test_regex_literal_with_brace_class() {
        let src = "const re = /[{]/;\nexport function f() {\n  return re;\n}\n";
        let masked = MaskedSource::new(src);
        assert!(masked.error.is_none(), "{:?}", masked.error);
        assert_eq!(masked.skeleton.len(), src.len());
        assert!(masked.without_comments.contains("/[{]/"));
        assert_eq!(masked.max_depth, 1);
    }

    #[test]
    fn test_regex_literal_with_quote_and_escape() {
        let src = "if (s.match(/'/) || t.test(/\\/(/)) {\n  x();\n}\n";
        let masked = MaskedSource::new(src);
        assert!(masked.error.is_none(), "{:?}", masked.error);
        assert_eq!(masked.block_end_line(0), 3);
    }

    #[test]
    fn test_regex_after_keyword() {
        let masked = MaskedSource::new("function f() {\n  return /}/g;\n}\n");
        assert!(masked.error.is_none(), "{:?}", masked.error);
    }

    #[test]
    fn test_division_is_not_regex() {
        let src = "const a = (b) / 2 / c;\nconst d = e[0] / f;\nconst g = h / i({});\n";
        let masked = MaskedSource::new(src);
        assert!(masked.error.is_none());
        assert_eq!(masked.max_depth, 1);
        assert!(masked.skeleton.contains("i({})"));
    }

    #[test]
    fn test_jsx_closing_tag_is_not_regex() {
        let src = "const el = <div>{a}</div>;\nconst b = <B c={d} />;\n";
        let masked = MaskedSource::new(src);
        assert!(masked.error.is_none());
        assert!(masked.skeleton.contains("{a}</div>"));
    }

    #[test]
    fn test_paren_span() {
        let src = "function f(a, b = g(1)) {}";
        let masked = MaskedSource::new(src);
        let (start, end) = masked.paren_span(0).unwrap();
        assert_eq!(&src[start..end], "a, b = g(1)");
    }
}
