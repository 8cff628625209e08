//! Word-annotation parsing: engine TSV → ordered [`Word`] records.
//!
//! Tesseract's TSV output has one row per layout element, with a header row
//! first:
//!
//! ```text
//! level page_num block_num par_num line_num word_num left top width height conf text
//! 1     1        0         0       0        0        0    0   640   480    -1
//! 2     1        1         0       0        0        36   92  582   56     -1
//! ...
//! 5     1        1         1       1        1        36   92  60    23     96.6 Hello
//! ```
//!
//! Levels 1–4 are page/block/paragraph/line summaries; only level 5 rows are
//! words. Word rows are validated to have exactly [`FIELD_COUNT`] fields; a
//! row that does not is reported as a [`ParseDefect`] and never turned into a
//! `Word`.

use crate::error::ParseDefect;
use crate::record::Word;

/// Value of the `level` column on word rows.
pub const WORD_LEVEL: &str = "5";

/// Number of tab-separated columns in a well-formed row.
pub const FIELD_COUNT: usize = 12;

/// Parsed annotation output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations {
    /// Word rows in their original order.
    pub words: Vec<Word>,
    /// Word rows rejected by validation.
    pub defects: Vec<ParseDefect>,
}

/// Parse TSV annotation output, keeping valid word rows and collecting
/// defects for malformed ones.
pub fn parse_annotations(tsv: &str) -> Annotations {
    let mut out = Annotations::default();
    for (i, line) in tsv.lines().enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields[0] != WORD_LEVEL {
            continue;
        }
        match word_from_fields(&fields) {
            Some(word) => out.words.push(word),
            None => out.defects.push(ParseDefect {
                line: i + 1,
                fields: fields.len(),
                expected: FIELD_COUNT,
            }),
        }
    }
    out
}

/// Parse TSV annotation output, failing on the first malformed word row.
pub fn parse_annotations_strict(tsv: &str) -> Result<Vec<Word>, ParseDefect> {
    let Annotations { words, defects } = parse_annotations(tsv);
    match defects.into_iter().next() {
        Some(defect) => Err(defect),
        None => Ok(words),
    }
}

/// Render words back to TSV rows (no header).
pub fn to_tsv(words: &[Word]) -> String {
    let mut out = String::new();
    for w in words {
        out.push_str(&w.to_tsv_row());
        out.push('\n');
    }
    out
}

fn word_from_fields(fields: &[&str]) -> Option<Word> {
    let [level, page_num, block_num, par_num, line_num, word_num, left, top, width, height, conf, text] =
        fields
    else {
        return None;
    };
    Some(Word {
        level: level.to_string(),
        page_num: page_num.to_string(),
        block_num: block_num.to_string(),
        par_num: par_num.to_string(),
        line_num: line_num.to_string(),
        word_num: word_num.to_string(),
        left: left.to_string(),
        top: top.to_string(),
        width: width.to_string(),
        height: height.to_string(),
        conf: conf.to_string(),
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t
2\t1\t1\t0\t0\t0\t36\t92\t582\t56\t-1\t
3\t1\t1\t1\t0\t0\t36\t92\t582\t56\t-1\t
4\t1\t1\t1\t1\t0\t36\t92\t582\t23\t-1\t
5\t1\t1\t1\t1\t1\t36\t92\t60\t23\t96.6\tHello
5\t1\t1\t1\t1\t2\t104\t92\t80\t23\t95.1\tworld,
4\t1\t1\t1\t2\t0\t36\t125\t300\t23\t-1\t
5\t1\t1\t1\t2\t1\t36\t125\t120\t23\t91.0\tsecond
";

    fn texts(words: &[Word]) -> Vec<&str> {
        words.iter().map(|w| w.text.as_str()).collect()
    }

    #[test]
    fn keeps_only_word_rows_in_order() {
        let a = parse_annotations(SAMPLE);
        assert_eq!(texts(&a.words), ["Hello", "world,", "second"]);
        assert!(a.words.iter().all(|w| w.level == WORD_LEVEL));
        assert!(a.defects.is_empty());
    }

    #[test]
    fn values_pass_through_as_raw_strings() {
        let a = parse_annotations(SAMPLE);
        let w = &a.words[0];
        assert_eq!(w.left, "36");
        assert_eq!(w.conf, "96.6");
        assert_eq!(w.word_num, "1");
    }

    #[test]
    fn filtering_is_idempotent() {
        let once = parse_annotations(SAMPLE).words;
        let twice = parse_annotations(&to_tsv(&once)).words;
        assert_eq!(once, twice);
    }

    #[test]
    fn malformed_word_row_becomes_defect() {
        let tsv = "5\t1\t1\t1\t1\t1\t36\t92\t60\t23\t96.6\tok\n\
                   5\t1\t1\t1\t1\t2\t104\t92\n\
                   5\t1\t1\t1\t1\t3\t200\t92\t60\t23\t90\tfine\n";
        let a = parse_annotations(tsv);
        assert_eq!(texts(&a.words), ["ok", "fine"]);
        assert_eq!(
            a.defects,
            vec![ParseDefect {
                line: 2,
                fields: 8,
                expected: FIELD_COUNT
            }]
        );
    }

    #[test]
    fn extra_fields_are_a_defect_too() {
        let tsv = "5\t1\t1\t1\t1\t1\t36\t92\t60\t23\t96.6\ttab\tsplit\n";
        let a = parse_annotations(tsv);
        assert!(a.words.is_empty());
        assert_eq!(a.defects[0].fields, 13);
    }

    #[test]
    fn malformed_non_word_rows_are_ignored() {
        let a = parse_annotations("4\t1\t1\n3\n\n");
        assert_eq!(a, Annotations::default());
    }

    #[test]
    fn strict_mode_reports_first_defect() {
        let tsv = "5\t1\n5\t1\t1\n";
        let err = parse_annotations_strict(tsv).unwrap_err();
        assert_eq!(err.line, 1);
        assert!(parse_annotations_strict(SAMPLE).is_ok());
    }

    #[test]
    fn handles_crlf_and_empty_input() {
        assert!(parse_annotations("").words.is_empty());
        let a = parse_annotations("5\t1\t1\t1\t1\t1\t0\t0\t1\t1\t50\tx\r\n");
        assert_eq!(texts(&a.words), ["x"]);
    }
}
