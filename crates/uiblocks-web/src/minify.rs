//! Conservative pure-Rust JS/CSS minification for asset bundles.
//!
//! Two passes, both string-literal aware:
//!
//! 1. strip comments (`/* */` always, `//` for JavaScript only, since CSS has
//!    no line comments and `url(http://..)` must survive);
//! 2. collapse whitespace, keeping a single space only where two word
//!    characters would otherwise merge.
//!
//! Anything the scanner is unsure about is emitted unchanged. Output is
//! deterministic.

use uiblocks_core::AssetType;

enum State {
    Normal,
    AfterSlash,
    InString(char),
    InStringEscape(char),
    InBlockComment,
    InBlockCommentEnd,
    InLineComment,
}

/// Removes comments outside string literals.
pub fn strip_comments(input: &str, line_comments: bool) -> Result<String, String> {
    let mut out = String::with_capacity(input.len());
    let mut state = State::Normal;

    for ch in input.chars() {
        state = match state {
            State::Normal => match ch {
                '"' | '\'' | '`' => {
                    out.push(ch);
                    State::InString(ch)
                }
                '/' => State::AfterSlash,
                _ => {
                    out.push(ch);
                    State::Normal
                }
            },
            State::AfterSlash => match ch {
                '*' => State::InBlockComment,
                '/' if line_comments => State::InLineComment,
                '/' => {
                    out.push('/');
                    State::AfterSlash
                }
                '"' | '\'' | '`' => {
                    out.push('/');
                    out.push(ch);
                    State::InString(ch)
                }
                _ => {
                    // Division or a regex literal.
                    out.push('/');
                    out.push(ch);
                    State::Normal
                }
            },
            State::InString(quote) => {
                out.push(ch);
                if ch == '\\' {
                    State::InStringEscape(quote)
                } else if ch == quote {
                    State::Normal
                } else {
                    State::InString(quote)
                }
            }
            State::InStringEscape(quote) => {
                out.push(ch);
                State::InString(quote)
            }
            State::InBlockComment => {
                if ch == '*' {
                    State::InBlockCommentEnd
                } else {
                    State::InBlockComment
                }
            }
            State::InBlockCommentEnd => match ch {
                '/' => {
                    // Keep tokens on both sides apart.
                    out.push(' ');
                    State::Normal
                }
                '*' => State::InBlockCommentEnd,
                _ => State::InBlockComment,
            },
            State::InLineComment => {
                if ch == '\n' || ch == '\r' {
                    out.push(ch);
                    State::Normal
                } else {
                    State::InLineComment
                }
            }
        };
    }

    match state {
        State::AfterSlash => out.push('/'),
        State::InBlockComment | State::InBlockCommentEnd => {
            return Err("unterminated block comment".to_string());
        }
        _ => {}
    }
    Ok(out)
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$' || ch == '#' || ch == '%'
}

/// Collapses whitespace outside string literals. `tight` lists punctuation
/// that needs no surrounding space. With `keep_newlines`, a run containing a
/// line break collapses to `\n` so automatic semicolon insertion still applies.
fn collapse_whitespace(input: &str, tight: &[char], keep_newlines: bool) -> String {
    let mut out = String::with_capacity(input.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut pending_space = false;
    let mut pending_newline = false;

    for ch in input.chars() {
        if let Some(q) = quote {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }

        if ch.is_whitespace() {
            pending_space = true;
            pending_newline |= keep_newlines && (ch == '\n' || ch == '\r');
            continue;
        }

        if pending_space {
            pending_space = false;
            if let Some(prev) = out.chars().last() {
                let merge_risk = (prev == '+' && ch == '+') || (prev == '-' && ch == '-');
                let touching = tight.contains(&prev) || tight.contains(&ch);
                let needed =
                    merge_risk || (!touching && (is_word_char(prev) || is_word_char(ch)));
                if needed {
                    out.push(if pending_newline { '\n' } else { ' ' });
                }
            }
            pending_newline = false;
        }

        if matches!(ch, '"' | '\'' | '`') {
            quote = Some(ch);
        }
        out.push(ch);
    }
    out
}

const JS_TIGHT: &[char] = &[
    '(', ')', '[', ']', '{', '}', ',', ';', ':', '=', '+', '-', '*', '/', '%', '&', '|', '^',
    '!', '~', '<', '>', '?', '.',
];

const CSS_TIGHT: &[char] = &['{', '}', ';', ',', '>', '~', '+'];

pub fn minify_js(input: &str) -> Result<String, String> {
    let stripped = strip_comments(input, true)?;
    Ok(collapse_whitespace(&stripped, JS_TIGHT, true).trim().to_string())
}

pub fn minify_css(input: &str) -> Result<String, String> {
    let stripped = strip_comments(input, false)?;
    let collapsed = collapse_whitespace(&stripped, CSS_TIGHT, false);
    // `color: red` -> `color:red`; a space before `:` stays (`a :hover`).
    let mut out = collapsed.replace(": ", ":").replace(";}", "}");
    out = out.trim().to_string();
    Ok(out)
}

pub fn minify(input: &str, asset_type: AssetType) -> Result<String, String> {
    match asset_type {
        AssetType::Js => minify_js(input),
        AssetType::Css => minify_css(input),
    }
}
