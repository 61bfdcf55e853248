fn pair_at(bytes: &[u8], idx: usize, first: u8, second: u8) -> bool {
    bytes.get(idx) == Some(&first) && bytes.get(idx + 1) == Some(&second)
}

pub(super) fn opens_line_comment(bytes: &[u8], idx: usize) -> bool {
    pair_at(bytes, idx, b'-', b'-')
}

pub(super) fn opens_block_comment(bytes: &[u8], idx: usize) -> bool {
    pair_at(bytes, idx, b'/', b'*')
}

pub(super) fn closes_block_comment(bytes: &[u8], idx: usize) -> bool {
    pair_at(bytes, idx, b'*', b'/')
}

/// Recognise `$tag$` (or `$$`) at `start`; returns the tag and the index of its closing `$`.
pub(super) fn dollar_quote_open(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let body = bytes.get(start + 1..)?;
    let tag_len = body
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
        .count();
    if body.get(tag_len) != Some(&b'$') {
        return None;
    }
    // `$1$` is a placeholder followed by a stray dollar, not a quote tag.
    if body.first().is_some_and(u8::is_ascii_digit) {
        return None;
    }
    let tag = String::from_utf8(body[..tag_len].to_vec()).ok()?;
    Some((tag, start + 1 + tag_len))
}

/// True when `$tag$` closes at `idx`.
pub(super) fn dollar_quote_close(bytes: &[u8], idx: usize, tag: &str) -> bool {
    let tag_start = idx + 1;
    let tag_end = tag_start + tag.len();
    bytes.get(idx) == Some(&b'$')
        && bytes.get(tag_start..tag_end) == Some(tag.as_bytes())
        && bytes.get(tag_end) == Some(&b'$')
}
