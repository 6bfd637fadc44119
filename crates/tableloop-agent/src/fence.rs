//! Recover a code payload from a model reply.
//!
//! Replies often wrap code in Markdown fences, sometimes with prose around
//! them and sometimes inside an outer wrapper fence. This is a small
//! line-based fence parser rather than substring splitting, so a fence
//! marker inside the code, or a reply cut off before its closing fence,
//! does not silently truncate the payload.
//!
//! Selection rules:
//! - no fences at all: the whole reply (trimmed) is the code
//! - otherwise the first closed block tagged as Python wins, then the first
//!   closed block of any tag
//! - an unclosed block runs to the end only when what precedes it is prose;
//!   a stray fence line after code (say, inside a string literal) leaves the
//!   whole reply as the code
//! - a chosen block that is untagged or a Markdown/text wrapper and itself
//!   contains fences is unwrapped again, down to the innermost block

const PYTHON_TAGS: &[&str] = &["python", "py", "python3"];
const WRAPPER_TAGS: &[&str] = &["", "markdown", "md", "text", "txt"];
const CODE_PREFIXES: &[&str] = &[
    "import ", "from ", "def ", "class ", "@", "#", "return ", "if ", "for ", "while ", "with ",
    "try:",
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct Block {
    tag: String,
    body: String,
    closed: bool,
    /// Code-like lines sit between the previous block and this one
    preceded_by_code: bool,
}

struct OpenFence {
    marker: char,
    len: usize,
    tag: String,
}

/// Extract the code payload from a raw reply
pub fn extract_code(raw: &str) -> String {
    let blocks = parse_blocks(raw);

    let chosen = blocks
        .iter()
        .find(|b| b.closed && is_python(&b.tag))
        .or_else(|| blocks.iter().find(|b| b.closed))
        .or_else(|| blocks.first().filter(|b| !b.preceded_by_code));

    match chosen {
        None => raw.trim().to_string(),
        Some(block) => {
            let is_wrapper = WRAPPER_TAGS.contains(&block.tag.as_str());
            if is_wrapper && !parse_blocks(&block.body).is_empty() {
                extract_code(&block.body)
            } else {
                block.body.trim().to_string()
            }
        }
    }
}

fn is_python(tag: &str) -> bool {
    PYTHON_TAGS.contains(&tag)
}

fn looks_like_code(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    line.starts_with([' ', '\t'])
        || trimmed.contains(" = ")
        || CODE_PREFIXES.iter().any(|p| trimmed.starts_with(p))
}

fn parse_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut open: Option<(OpenFence, Vec<&str>, bool)> = None;
    let mut code_outside = false;

    for line in text.lines() {
        match open.take() {
            None => {
                if let Some(fence) = opening_fence(line) {
                    open = Some((fence, Vec::new(), code_outside));
                    code_outside = false;
                } else if looks_like_code(line) {
                    code_outside = true;
                }
            }
            Some((fence, mut body, preceded_by_code)) => {
                if closes(line, &fence) {
                    blocks.push(Block {
                        tag: fence.tag,
                        body: body.join("\n"),
                        closed: true,
                        preceded_by_code,
                    });
                } else {
                    body.push(line);
                    open = Some((fence, body, preceded_by_code));
                }
            }
        }
    }

    if let Some((fence, body, preceded_by_code)) = open {
        blocks.push(Block {
            tag: fence.tag,
            body: body.join("\n"),
            closed: false,
            preceded_by_code,
        });
    }

    blocks
}

fn opening_fence(line: &str) -> Option<OpenFence> {
    let trimmed = line.trim_start();
    let marker = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = trimmed.chars().take_while(|c| *c == marker).count();
    if len < 3 {
        return None;
    }
    let info = trimmed[len..].trim();
    // A backtick fence's info string may not contain backticks (inline code)
    if marker == '`' && info.contains('`') {
        return None;
    }
    let tag = info
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_lowercase();
    Some(OpenFence { marker, len, tag })
}

fn closes(line: &str, fence: &OpenFence) -> bool {
    let trimmed = line.trim();
    let len = trimmed.chars().take_while(|c| *c == fence.marker).count();
    len >= fence.len && len == trimmed.chars().count()
}
