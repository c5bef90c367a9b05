/// Clean extracted text before it reaches the encoder.
/// Drops control characters and stray glyphs, keeps the punctuation that
/// carries meaning in contracts and invoices, trims lines and removes blank ones.
pub fn sanitize_extracted_text(raw: &str) -> String {
    raw.chars()
        .map(|c| if c == '\t' || c == '\u{a0}' { ' ' } else { c })
        .filter(|&c| c.is_alphanumeric() || c.is_whitespace() || is_kept_symbol(c))
        .collect::<String>()
        .lines()
        .map(collapse_spaces)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_kept_symbol(c: char) -> bool {
    matches!(
        c,
        '.' | ','
            | ';'
            | ':'
            | '-'
            | '/'
            | '('
            | ')'
            | '['
            | ']'
            | '+'
            | '='
            | '%'
            | '#'
            | '@'
            | '&'
            | '\''
            | '"'
            | '!'
            | '?'
            | '*'
            | '_'
            | '°'
            | '§'
            | '€'
            | '$'
            | '£'
            | '«'
            | '»'
            | '\u{2013}'
            | '\u{2014}'
            | '\u{2018}'
            | '\u{2019}'
            | '\u{201C}'
            | '\u{201D}'
    )
}

/// Trim a line and squeeze runs of spaces left behind by layout extraction.
fn collapse_spaces(line: &str) -> String {
    line.split(' ')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
