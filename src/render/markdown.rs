//! Scanner for the supported markdown subset
//!
//! Block structure is decided per line first (bullet runs, numbered runs,
//! plain lines). Inline spans are then scanned left to right within a line,
//! trying bold, then italic, then links at each position.

/// Inline content of a line or list item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Strong(Vec<Inline>),
    Emphasis(Vec<Inline>),
    Link { label: Vec<Inline>, href: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Line(Vec<Inline>),
    Break,
    UnorderedList(Vec<Vec<Inline>>),
    OrderedList(Vec<Vec<Inline>>),
}

impl Block {
    fn is_list(&self) -> bool {
        matches!(self, Block::UnorderedList(_) | Block::OrderedList(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind<'a> {
    Bullet(&'a str),
    Numbered(&'a str),
    Text(&'a str),
}

impl LineKind<'_> {
    fn is_text(&self) -> bool {
        matches!(self, LineKind::Text(_))
    }
}

fn classify(line: &str) -> LineKind<'_> {
    let trimmed = line.trim_start();

    let mut chars = trimmed.chars();
    if let (Some('-' | '*' | '+'), Some(c)) = (chars.next(), chars.next()) {
        if c.is_whitespace() {
            return LineKind::Bullet(trimmed[1..].trim());
        }
    }

    let digits = trimmed.bytes().take_while(u8::is_ascii_digit).count();
    if digits > 0 {
        let rest = &trimmed[digits..];
        if let Some(after_dot) = rest.strip_prefix('.') {
            if after_dot.starts_with(char::is_whitespace) {
                return LineKind::Numbered(after_dot.trim());
            }
        }
    }

    LineKind::Text(line)
}

/// Parse raw text into blocks
pub fn parse(text: &str) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut prev: Option<LineKind<'_>> = None;

    for line in text.split('\n') {
        let kind = classify(line);
        match kind {
            LineKind::Bullet(item) => {
                let continues = matches!(prev, Some(LineKind::Bullet(_)));
                push_list_item(&mut blocks, false, continues, parse_inline(item));
            }
            LineKind::Numbered(item) => {
                let continues = matches!(prev, Some(LineKind::Numbered(_)));
                push_list_item(&mut blocks, true, continues, parse_inline(item));
            }
            LineKind::Text(line) => {
                // The newline before this line, unless a list line absorbed it
                if prev.is_some_and(|p| p.is_text()) && blocks.last() != Some(&Block::Break) {
                    blocks.push(Block::Break);
                }
                if !line.is_empty() {
                    blocks.push(Block::Line(parse_inline(line)));
                }
            }
        }
        prev = Some(kind);
    }

    drop_breaks_next_to_lists(blocks)
}

/// Extend the open list when the previous line was an item of the same kind
fn push_list_item(blocks: &mut Vec<Block>, ordered: bool, continues: bool, item: Vec<Inline>) {
    if continues {
        match blocks.last_mut() {
            Some(Block::OrderedList(items)) if ordered => return items.push(item),
            Some(Block::UnorderedList(items)) if !ordered => return items.push(item),
            _ => {}
        }
    }
    blocks.push(if ordered {
        Block::OrderedList(vec![item])
    } else {
        Block::UnorderedList(vec![item])
    });
}

fn drop_breaks_next_to_lists(blocks: Vec<Block>) -> Vec<Block> {
    let keep: Vec<bool> = blocks
        .iter()
        .enumerate()
        .map(|(i, block)| {
            if *block != Block::Break {
                return true;
            }
            let before = i.checked_sub(1).and_then(|j| blocks.get(j));
            let after = blocks.get(i + 1);
            !(before.is_some_and(Block::is_list) || after.is_some_and(Block::is_list))
        })
        .collect();

    blocks
        .into_iter()
        .zip(keep)
        .filter_map(|(block, keep)| keep.then_some(block))
        .collect()
}

/// Scan one line for bold, italic and link spans
pub fn parse_inline(src: &str) -> Vec<Inline> {
    let mut nodes = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < src.len() {
        // Every span starts with an ASCII marker, so `i` is a char boundary
        // whenever a match is found
        match strong(src, i)
            .or_else(|| emphasis(src, i))
            .or_else(|| link(src, i))
        {
            Some((node, next)) => {
                push_text(&mut nodes, &src[text_start..i]);
                nodes.push(node);
                i = next;
                text_start = next;
            }
            None => i += 1,
        }
    }

    push_text(&mut nodes, &src[text_start..]);
    nodes
}

fn push_text(nodes: &mut Vec<Inline>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Inline::Text(last)) = nodes.last_mut() {
        last.push_str(text);
    } else {
        nodes.push(Inline::Text(text.to_string()));
    }
}

fn is_word_byte(b: Option<&u8>) -> bool {
    b.is_some_and(|b| b.is_ascii_alphanumeric() || *b >= 0x80)
}

/// `_` only delimits at word boundaries, so snake_case stays literal
fn underscore_flanking(src: &str, open: usize, end: usize) -> bool {
    let bytes = src.as_bytes();
    let before = open.checked_sub(1).and_then(|j| bytes.get(j));
    !is_word_byte(before) && !is_word_byte(bytes.get(end))
}

/// `**x**` or `__x__`
fn strong(src: &str, i: usize) -> Option<(Inline, usize)> {
    let bytes = src.as_bytes();
    let marker = *bytes.get(i)?;
    if !matches!(marker, b'*' | b'_') || bytes.get(i + 1) != Some(&marker) {
        return None;
    }

    let delim = if marker == b'*' { "**" } else { "__" };
    let content_start = i + 2;
    let mut close = content_start + src.get(content_start..)?.find(delim)?;
    if close == content_start {
        return None;
    }
    // `***x***`: the inner marker belongs to the content
    while bytes.get(close + 2) == Some(&marker) {
        close += 1;
    }

    let end = close + 2;
    if marker == b'_' && !underscore_flanking(src, i, end) {
        return None;
    }
    Some((Inline::Strong(parse_inline(&src[content_start..close])), end))
}

/// `*x*` or `_x_`
fn emphasis(src: &str, i: usize) -> Option<(Inline, usize)> {
    let bytes = src.as_bytes();
    let marker = *bytes.get(i)?;
    if !matches!(marker, b'*' | b'_') {
        return None;
    }

    let content_start = i + 1;
    let close = content_start + src.get(content_start..)?.find(marker as char)?;
    let content = &src[content_start..close];
    if content.is_empty()
        || content.starts_with(char::is_whitespace)
        || content.ends_with(char::is_whitespace)
    {
        return None;
    }

    let end = close + 1;
    if marker == b'_' && !underscore_flanking(src, i, end) {
        return None;
    }
    Some((Inline::Emphasis(parse_inline(content)), end))
}

/// `[label](url)`
fn link(src: &str, i: usize) -> Option<(Inline, usize)> {
    if src.as_bytes().get(i) != Some(&b'[') {
        return None;
    }

    let label_start = i + 1;
    let label_end = label_start + src.get(label_start..)?.find(']')?;
    if label_end == label_start {
        return None;
    }
    let rest = src.get(label_end + 1..)?.strip_prefix('(')?;
    let url_len = target_len(rest)?;
    let href = rest[..url_len].trim();
    if href.is_empty() {
        return None;
    }

    let end = label_end + 2 + url_len + 1;
    Some((
        Inline::Link {
            label: parse_inline(&src[label_start..label_end]),
            href: href.to_string(),
        },
        end,
    ))
}

/// Length of a link target up to the `)` that balances the opening one
fn target_len(rest: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in rest.bytes().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' if depth == 0 => return Some(i),
            b')' => depth -= 1,
            _ => {}
        }
    }
    None
}
