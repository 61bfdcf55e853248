use std::borrow::Cow;

mod parsers;
mod scanner;

use parsers::{
    closes_block_comment, dollar_quote_close, dollar_quote_open, opens_block_comment,
    opens_line_comment,
};
use scanner::{Context, digit_run};

/// Target placeholder style for translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// PostgreSQL-style placeholders like `$1`.
    Postgres,
    /// SQLite-style placeholders like `?1`.
    Sqlite,
}

/// Copies `sql` lazily, only once the first placeholder is rewritten.
struct Rewriter<'a> {
    sql: &'a str,
    out: Option<String>,
    copied: usize,
}

impl<'a> Rewriter<'a> {
    fn new(sql: &'a str) -> Self {
        Self {
            sql,
            out: None,
            copied: 0,
        }
    }

    /// Replace `sql[start..end]` with `prefix` followed by `digits`.
    fn replace(&mut self, start: usize, end: usize, prefix: char, digits: &str) {
        let sql = self.sql;
        let buf = self
            .out
            .get_or_insert_with(|| String::with_capacity(sql.len() + 8));
        buf.push_str(&sql[self.copied..start]);
        buf.push(prefix);
        buf.push_str(digits);
        self.copied = end;
    }

    fn finish(self) -> Cow<'a, str> {
        match self.out {
            Some(mut buf) => {
                buf.push_str(&self.sql[self.copied..]);
                Cow::Owned(buf)
            }
            None => Cow::Borrowed(self.sql),
        }
    }
}

/// Rewrite placeholders into the style `target` expects.
///
/// For [`PlaceholderStyle::Postgres`], `?N` becomes `$N` and each bare `?` takes the next
/// sequential `$k`. For [`PlaceholderStyle::Sqlite`], `$N` becomes `?N`. Quoted strings,
/// comments, and dollar-quoted blocks are left alone. Postgres JSON operators spelled `?`,
/// `?|` or `?&` are indistinguishable from bare placeholders; disable translation for such
/// queries.
///
/// ```rust
/// use sql_connector::translation::{PlaceholderStyle, translate_placeholders};
///
/// let sql = translate_placeholders("SELECT * FROM t WHERE a = ? AND b = ?", PlaceholderStyle::Postgres, true);
/// assert_eq!(sql, "SELECT * FROM t WHERE a = $1 AND b = $2");
/// ```
///
/// Returns a borrowed `Cow` when no changes are needed.
#[must_use]
pub fn translate_placeholders(sql: &str, target: PlaceholderStyle, enabled: bool) -> Cow<'_, str> {
    if !enabled {
        return Cow::Borrowed(sql);
    }

    let bytes = sql.as_bytes();
    let mut rewriter = Rewriter::new(sql);
    let mut context = Context::Code;
    let mut next_sequential = 1usize;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match context {
            Context::Code => match b {
                b'\'' => context = Context::SingleQuoted,
                b'"' => context = Context::DoubleQuoted,
                _ if opens_line_comment(bytes, idx) => {
                    context = Context::LineComment;
                    idx += 1;
                }
                _ if opens_block_comment(bytes, idx) => {
                    context = Context::BlockComment(1);
                    idx += 1;
                }
                b'$' => {
                    if let Some((tag, tag_close)) = dollar_quote_open(bytes, idx) {
                        context = Context::DollarQuoted(tag);
                        idx = tag_close;
                    } else if target == PlaceholderStyle::Sqlite
                        && let Some((end, digits)) = digit_run(bytes, idx + 1)
                    {
                        rewriter.replace(idx, end, '?', digits);
                        idx = end - 1;
                    }
                }
                b'?' if target == PlaceholderStyle::Postgres => {
                    if let Some((end, digits)) = digit_run(bytes, idx + 1) {
                        rewriter.replace(idx, end, '$', digits);
                        idx = end - 1;
                    } else {
                        rewriter.replace(idx, idx + 1, '$', &next_sequential.to_string());
                        next_sequential += 1;
                    }
                }
                _ => {}
            },
            Context::SingleQuoted | Context::DoubleQuoted => {
                let quote = if context == Context::SingleQuoted {
                    b'\''
                } else {
                    b'"'
                };
                if b == quote {
                    if bytes.get(idx + 1) == Some(&quote) {
                        idx += 1;
                    } else {
                        context = Context::Code;
                    }
                }
            }
            Context::LineComment => {
                if b == b'\n' {
                    context = Context::Code;
                }
            }
            Context::BlockComment(depth) => {
                if opens_block_comment(bytes, idx) {
                    context = Context::BlockComment(depth + 1);
                    idx += 1;
                } else if closes_block_comment(bytes, idx) {
                    context = if depth == 1 {
                        Context::Code
                    } else {
                        Context::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            Context::DollarQuoted(ref tag) => {
                if dollar_quote_close(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    context = Context::Code;
                }
            }
        }
        idx += 1;
    }

    rewriter.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_question_marks_become_dollars() {
        let sql = "select * from t where a = ?1 and b = ?2";
        let res = translate_placeholders(sql, PlaceholderStyle::Postgres, true);
        assert_eq!(res, "select * from t where a = $1 and b = $2");
    }

    #[test]
    fn bare_question_marks_are_numbered_in_order() {
        let sql = "insert into t (a, b, c) values (?, ?, ?)";
        let res = translate_placeholders(sql, PlaceholderStyle::Postgres, true);
        assert_eq!(res, "insert into t (a, b, c) values ($1, $2, $3)");
    }

    #[test]
    fn dollars_become_numbered_question_marks() {
        let sql = "insert into t values($1, $2)";
        let res = translate_placeholders(sql, PlaceholderStyle::Sqlite, true);
        assert_eq!(res, "insert into t values(?1, ?2)");
    }

    #[test]
    fn literals_and_comments_are_untouched() {
        let sql = "select '?', $1 -- $2\n/* ?3 /* $4 */ */ from t where a = $1";
        let res = translate_placeholders(sql, PlaceholderStyle::Sqlite, true);
        assert_eq!(res, "select '?', ?1 -- $2\n/* ?3 /* $4 */ */ from t where a = ?1");

        let sql = "select 'it''s ?' as q, \"odd?col\" from t where id = ?";
        let res = translate_placeholders(sql, PlaceholderStyle::Postgres, true);
        assert_eq!(res, "select 'it''s ?' as q, \"odd?col\" from t where id = $1");
    }

    #[test]
    fn dollar_quoted_blocks_are_untouched() {
        let sql = "$foo$ select $1 from t $foo$ where a = $1";
        let res = translate_placeholders(sql, PlaceholderStyle::Sqlite, true);
        assert_eq!(res, "$foo$ select $1 from t $foo$ where a = ?1");
    }

    #[test]
    fn non_ascii_text_survives_rewriting() {
        let sql = "select 'żółw' as name, x from t where label = ? and id = ?";
        let res = translate_placeholders(sql, PlaceholderStyle::Postgres, true);
        assert_eq!(res, "select 'żółw' as name, x from t where label = $1 and id = $2");
    }

    #[test]
    fn unchanged_or_disabled_input_is_borrowed() {
        let sql = "select * from t where a = ?1";
        let res = translate_placeholders(sql, PlaceholderStyle::Postgres, false);
        assert!(matches!(res, Cow::Borrowed(_)));
        assert_eq!(res, sql);

        let plain = "select 1";
        let res = translate_placeholders(plain, PlaceholderStyle::Sqlite, true);
        assert!(matches!(res, Cow::Borrowed(_)));
    }
}
