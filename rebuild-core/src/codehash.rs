//! Per-function source hashing for request-key computation.
//!
//! A recipe's request key is supposed to change when *its own* function
//! body changes, not whenever anything else in the same build file does.
//! Rather than pull in a full Lua parser just to find one function's
//! extent, this tracks net block depth across identifier tokens: every
//! Lua block-opening keyword (`function`, `if`, `while`, `for`) closes
//! with exactly one `end`, so the matching `end` for a given `function`
//! keyword is the one where that count returns to zero.

struct Token<'a> {
    text: &'a str,
    start: usize,
    end: usize,
}

fn identifier_tokens(source: &str) -> Vec<Token<'_>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_alphabetic() || bytes[i] == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(Token { text: &source[start..i], start, end: i });
        } else {
            i += 1;
        }
    }
    tokens
}

/// The literal `function <name>(...) ... end` span defining `name` in
/// `source`, or `None` if no such block can be found (an unexpected
/// script shape, e.g. a locally-scoped or table-field function).
pub fn function_span<'a>(source: &'a str, name: &str) -> Option<&'a str> {
    let tokens = identifier_tokens(source);
    let start_idx = tokens
        .windows(2)
        .position(|w| w[0].text == "function" && w[1].text == name)?;
    let start_byte = tokens[start_idx].start;

    let mut depth: i32 = 1;
    for tok in &tokens[start_idx + 1..] {
        match tok.text {
            "function" | "if" | "while" | "for" => depth += 1,
            "end" => {
                depth -= 1;
                if depth == 0 {
                    return Some(&source[start_byte..tok.end]);
                }
            }
            _ => {}
        }
    }
    None
}
