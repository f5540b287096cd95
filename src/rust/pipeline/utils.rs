use tokenizers::pre_tokenizers::whitespace::WhitespaceSplit;
use tokenizers::{OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer};

/// Collapses every run of whitespace or control characters into a single
/// space and trims both ends.
///
/// Zero-width spaces and byte order marks count as whitespace here; they are
/// common in scraped Shona text and invisible in the output otherwise.
pub(crate) fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars() {
        let blank = c.is_whitespace() || c.is_control() || c == '\u{200B}' || c == '\u{FEFF}';
        if blank {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);
    }
    out
}

/// Number of whitespace-delimited tokens, as the training tokenizer sees them.
pub(crate) fn token_count(text: &str) -> usize {
    let mut pretokenized = PreTokenizedString::from(text);
    match WhitespaceSplit.pre_tokenize(&mut pretokenized) {
        Ok(()) => pretokenized
            .get_splits(OffsetReferential::Original, OffsetType::Char)
            .len(),
        Err(e) => {
            log::debug!("Whitespace pre-tokenizer failed ({}), counting by hand", e);
            text.split_whitespace().count()
        }
    }
}
