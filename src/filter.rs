//! Free-text input to backend full-text query.
//!
//! Every space-separated word becomes a quoted prefix term and the terms are
//! AND-ed together: `foo bar` compiles to `"foo"* AND "bar"*`.

const TERM_CONNECTIVE: &str = " AND ";

pub fn compile_filter(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    text.split(' ')
        .map(|word| format!("\"{}\"*", escape_word(word)))
        .collect::<Vec<_>>()
        .join(TERM_CONNECTIVE)
}

fn escape_word(word: &str) -> String {
    let mut escaped = String::with_capacity(word.len());
    for ch in word.chars() {
        match ch {
            '"' => escaped.push_str("\"\""),
            '\'' => escaped.push_str("''"),
            other => escaped.push(other),
        }
    }
    escaped
}
