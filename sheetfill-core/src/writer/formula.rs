//! Moving A1-style formulas between cells

use regex::Regex;
use std::sync::LazyLock;

use crate::reader::cell_ref::{MAX_COL, MAX_ROW, col_to_letter};

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\$?)([A-Za-z]{1,3})(\$?)([0-9]{1,7})$").expect("valid regex")
});

/// Rewrite `formula` as it reads when copied `row_offset` rows down and
/// `col_offset` columns right. Absolute parts (`$A`, `$1`) stay fixed,
/// string literals and quoted sheet names are left alone, and a reference
/// pushed off the grid becomes `#REF!`.
pub fn shift_formula(formula: &str, row_offset: i64, col_offset: i64) -> String {
    let chars: Vec<char> = formula.chars().collect();
    let mut out = String::with_capacity(formula.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                let end = closing_quote(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            }
            '[' => {
                // Structured references name table columns, not cells
                let end = closing_bracket(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            }
            c if is_token_char(c) => {
                let start = i;
                while i < chars.len() && is_token_char(chars[i]) {
                    i += 1;
                }
                let token: String = chars[start..i].iter().collect();

                // Function names and sheet names
                if matches!(chars.get(i), Some('(') | Some('!')) {
                    out.push_str(&token);
                } else {
                    out.push_str(&shift_reference(&token, row_offset, col_offset).unwrap_or(token));
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$')
}

/// Index just past the quote closing the one at `start`; doubled quotes are escapes
fn closing_quote(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

fn closing_bracket(chars: &[char], start: usize) -> usize {
    let mut depth = 0usize;
    for (i, &c) in chars.iter().enumerate().skip(start) {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
    }
    chars.len()
}

/// `None` when the token is not a cell reference
fn shift_reference(token: &str, row_offset: i64, col_offset: i64) -> Option<String> {
    let caps = REFERENCE.captures(token)?;

    let mut col = 0i64;
    for ch in caps[2].chars() {
        col = col * 26 + (ch.to_ascii_uppercase() as i64 - 'A' as i64 + 1);
    }
    let col = col - 1;
    let row = caps[4].parse::<i64>().ok()? - 1;
    if row < 0 || row > i64::from(MAX_ROW) || col > i64::from(MAX_COL) {
        return None;
    }

    let col_fixed = !caps[1].is_empty();
    let row_fixed = !caps[3].is_empty();
    let new_col = if col_fixed { col } else { col + col_offset };
    let new_row = if row_fixed { row } else { row + row_offset };

    if !(0..=i64::from(MAX_COL)).contains(&new_col) || !(0..=i64::from(MAX_ROW)).contains(&new_row) {
        return Some("#REF!".to_string());
    }

    Some(format!(
        "{}{}{}{}",
        &caps[1],
        col_to_letter(new_col as u32),
        &caps[3],
        new_row + 1
    ))
}
