//! PDF 原始文本修复：断词连字符、多余换行与空白。
//!
//! 卷首（第一个章节标题之前）保持逐行，标题、作者、机构行互不合并。
//! 正文按段落重排为一行一段；标题、图注与版权声明类行始终单独成行，
//! 留给分节与去噪步骤识别。

use std::collections::HashMap;

use super::noise::{running_headers, NOISE};
use super::segmenter::{front_matter_end, HeadingMatch, HEADINGS};

const SOFT_HYPHEN: char = '\u{00AD}';

/// 图注最多吸收的续行数
const MAX_CAPTION_CONTINUATION: usize = 4;

/// 连字符前的复合词词头（`life-threatening`）
const COMPOUND_HEADS: &[&str] = &[
    "life", "self", "non", "well", "ill", "follow", "long", "short", "high", "low", "full",
    "half", "part", "cross", "multi", "double", "single", "first", "second", "third", "two",
    "three", "age", "dose", "time", "end", "all", "left", "right",
];

/// 以连字符接在前词后的词尾（`drug-induced`）
const COMPOUND_TAILS: &[&str] = &[
    "related", "induced", "dependent", "associated", "mediated", "like", "free", "based",
    "positive", "negative", "specific", "guided", "resistant", "sensitive", "enhanced",
    "weighted", "acquired", "onset", "term", "up",
];

/// 规范化提取出的原始文本，不会失败；空输入得到空输出
pub fn normalize(raw: &str) -> String {
    let cleaned = clean_characters(raw);
    let lines: Vec<String> = cleaned.split('\n').map(collapse_whitespace).collect();
    let lines = rejoin_hyphenation(lines);
    reflow(&lines)
}

fn clean_characters(raw: &str) -> String {
    let text = raw.strip_prefix('\u{FEFF}').unwrap_or(raw);
    let text = text.replace("\r\n", "\n");
    text.chars()
        .filter_map(|c| match c {
            '\n' | '\r' | '\u{000B}' | '\u{000C}' | '\u{2028}' | '\u{2029}' => Some('\n'),
            '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' => None,
            c if c.is_control() => {
                if c == '\t' {
                    Some(' ')
                } else {
                    None
                }
            }
            c if c.is_whitespace() => Some(' '),
            c => Some(c),
        })
        .collect()
}

fn collapse_whitespace(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn rejoin_hyphenation(lines: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(lines.len());
    let mut iter = lines.into_iter().peekable();
    while let Some(mut line) = iter.next() {
        while let Some(joined) = iter.peek().and_then(|next| join_hyphenated(&line, next)) {
            line = joined;
            iter.next();
        }
        if line.contains(SOFT_HYPHEN) {
            line = line.replace(SOFT_HYPHEN, "");
        }
        out.push(line);
    }
    out
}

/// `current` 以连字符结尾且 `next` 以小写续写时合并两行，
/// 不能合并时返回 `None`
fn join_hyphenated(current: &str, next: &str) -> Option<String> {
    let (stem, soft) = if let Some(stem) = current.strip_suffix(SOFT_HYPHEN) {
        (stem, true)
    } else if let Some(stem) = current.strip_suffix('-') {
        if stem.ends_with('-') {
            return None;
        }
        (stem, false)
    } else {
        return None;
    };

    if !stem.chars().last().is_some_and(|c| c.is_alphanumeric()) {
        return None;
    }
    if !next.chars().next().is_some_and(|c| c.is_lowercase()) {
        return None;
    }

    let fragment = stem
        .rsplit(' ')
        .next()
        .unwrap_or(stem)
        .trim_start_matches(|c: char| !c.is_alphanumeric());
    let next_word: String = next.chars().take_while(|c| c.is_alphabetic()).collect();

    let keep_hyphen = !soft
        && (is_numeric_fragment(fragment)
            || is_short_caps(fragment)
            || COMPOUND_HEADS.contains(&fragment.to_lowercase().as_str())
            || COMPOUND_TAILS.contains(&next_word.as_str()));

    Some(if keep_hyphen {
        format!("{stem}-{next}")
    } else {
        format!("{stem}{next}")
    })
}

fn is_numeric_fragment(fragment: &str) -> bool {
    !fragment.is_empty() && fragment.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',')
}

/// `IL`、`COVID`、`HbA1c` 之类缩写，连字符属于词本身
fn is_short_caps(fragment: &str) -> bool {
    let len = fragment.chars().count();
    if len == 0 || len > 5 || !fragment.chars().all(|c| c.is_alphanumeric()) {
        return false;
    }
    let upper = fragment.chars().filter(|c| c.is_uppercase()).count();
    let lower = fragment.chars().filter(|c| c.is_lowercase()).count();
    upper > 0 && (lower == 0 || upper >= 2)
}

/// 续行必须以小写字母或 `(` 开头，大写开头视为正文
fn continues_caption(line: &str) -> bool {
    line.trim_start()
        .chars()
        .next()
        .is_some_and(|c| c.is_lowercase() || c == '(')
}

fn closes_caption(text: &str) -> bool {
    text.trim_end()
        .ends_with(|c: char| matches!(c, '.' | '!' | '?'))
}

#[derive(Default)]
struct Reflowed {
    lines: Vec<String>,
    paragraph: String,
}

impl Reflowed {
    fn line(&mut self, text: &str) {
        self.lines.push(text.to_string());
    }

    fn blank(&mut self) {
        if self.lines.last().is_some_and(|l| !l.is_empty()) {
            self.lines.push(String::new());
        }
    }

    fn extend_paragraph(&mut self, text: &str) {
        if !self.paragraph.is_empty() {
            self.paragraph.push(' ');
        }
        self.paragraph.push_str(text);
    }

    fn end_paragraph(&mut self) {
        if !self.paragraph.is_empty() {
            let paragraph = std::mem::take(&mut self.paragraph);
            self.lines.push(paragraph);
        }
    }

    fn finish(mut self) -> String {
        self.end_paragraph();
        while self.lines.last().is_some_and(|l| l.is_empty()) {
            self.lines.pop();
        }
        self.lines.join("\n")
    }
}

fn reflow(lines: &[String]) -> String {
    let scanned = HEADINGS.scan(lines);
    let front_end = front_matter_end(lines, &scanned);
    let headings: HashMap<usize, HeadingMatch> = scanned.into_iter().collect();
    let running = running_headers(lines);

    let mut out = Reflowed::default();
    for line in &lines[..front_end] {
        if line.is_empty() {
            out.blank();
        } else {
            out.line(line);
        }
    }

    let mut i = front_end;
    while i < lines.len() {
        let line = &lines[i];
        if line.is_empty() {
            out.end_paragraph();
            out.blank();
            i += 1;
            continue;
        }

        if let Some(heading) = headings.get(&i) {
            out.end_paragraph();
            if heading.rest.is_empty() {
                out.line(line);
            } else {
                out.extend_paragraph(line);
            }
            i += 1;
            continue;
        }

        if NOISE.is_caption(line) {
            out.end_paragraph();
            let (block, next) = caption_block(lines, i);
            out.line(&block);
            i = next;
            continue;
        }

        if NOISE.is_noise(line) || running.contains(line.as_str()) {
            out.end_paragraph();
            out.line(line);
            i += 1;
            continue;
        }

        out.extend_paragraph(line);
        i += 1;
    }

    out.finish()
}

/// 图注行加上续行，直到图注句子结束。返回整块文本与下一个未消费行的下标
fn caption_block(lines: &[String], start: usize) -> (String, usize) {
    let mut block = lines[start].clone();
    let mut j = start + 1;
    let mut absorbed = 0;
    while !closes_caption(&block) && j < lines.len() && absorbed < MAX_CAPTION_CONTINUATION {
        let next = &lines[j];
        if next.is_empty()
            || HEADINGS.is_heading(next)
            || NOISE.is_caption(next)
            || NOISE.is_noise(next)
            || !continues_caption(next)
        {
            break;
        }
        block.push(' ');
        block.push_str(next);
        j += 1;
        absorbed += 1;
    }
    (block, j)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hyphen_at_line_end_is_rejoined() {
        let text = normalize("Introduction\nThis was suggest-\ning cholangitis.");
        assert!(text.contains("suggesting cholangitis."));
        assert!(!text.contains("suggest-"));
    }

    #[test]
    fn cleanup_removes_hyphen_linebreaks_and_reflows_lines() {
        let raw = "JOURNAL OF TEST\nShort Case Report\nTest Title\nAuthor Name\nAbstract\nThis was suggest-\ning acute cholangitis, as observed in\nour\npatient.\nBecause\nacute\ncholangitis\ncan\nbe\nlife-\nthreatening,\nwe measured liver function test re-\nsults.\nReferences\n1. Example.\n";
        let cleaned = normalize(raw);
        assert!(cleaned.contains(
            "This was suggesting acute cholangitis, as observed in our patient. Because acute cholangitis can be life-threatening, we measured liver function test results."
        ));
        assert!(!cleaned.contains("suggest-\n"));
        assert!(!cleaned.contains("re-\n"));
    }

    #[test]
    fn front_matter_lines_stay_separate() {
        let raw = "JOURNAL OF TEST\nShort Case Report\nTest Title\nAuthor Name\nAbstract\nBody line one.\n";
        let cleaned = normalize(raw);
        assert!(cleaned.contains("JOURNAL OF TEST\nShort Case Report\nTest Title\nAuthor Name\n"));
        assert!(!cleaned.contains("JOURNAL OF TEST Short Case Report"));
    }

    #[test]
    fn abbreviations_and_numbers_keep_their_hyphen() {
        assert_eq!(join_hyphenated("serum IL-", "six levels"), Some("serum IL-six levels".into()));
        assert_eq!(join_hyphenated("a 70-", "year-old man"), Some("a 70-year-old man".into()));
        assert_eq!(join_hyphenated("drug-", "induced injury"), Some("drug-induced injury".into()));
        assert_eq!(join_hyphenated("test re-", "sults."), Some("test results.".into()));
        assert_eq!(join_hyphenated("Govern-", "Ment"), None);
        assert_eq!(join_hyphenated("well", "known"), None);
    }

    #[test]
    fn soft_hyphen_is_always_dropped() {
        let text = normalize("Introduction\nlife\u{AD}\nthreatening course");
        assert!(text.contains("lifethreatening course"));
    }

    #[test]
    fn blank_lines_become_single_paragraph_breaks() {
        let text = normalize("Discussion\nfirst\nparagraph.\n\n\n\nsecond\tparagraph  here.\r\n");
        assert_eq!(text, "Discussion\nfirst paragraph.\n\nsecond paragraph here.");
    }

    #[test]
    fn caption_and_noise_lines_stay_on_their_own_line() {
        let raw = "Case Report\nAlthough no stone was visible in\nFigure 1. Imaging findings on admission. (A) CT showing\nno bile duct dilation.\n1A\nthe papilla, cannulation was difficult.";
        let text = normalize(raw);
        assert_eq!(
            text,
            "Case Report\nAlthough no stone was visible in\nFigure 1. Imaging findings on admission. (A) CT showing no bile duct dilation.\n1A\nthe papilla, cannulation was difficult."
        );
    }

    #[test]
    fn unterminated_caption_stops_at_capitalised_prose() {
        let raw = "Case Presentation\nA 70-year-old man presented with fever.\nTable 1 Laboratory data on admission\nHe was diagnosed with influenza and recovered.";
        assert_eq!(
            normalize(raw),
            "Case Presentation\nA 70-year-old man presented with fever.\nTable 1 Laboratory data on admission\nHe was diagnosed with influenza and recovered."
        );

        let wrapped = normalize("Discussion\nTable 2 Serial laboratory data\n(reference ranges in brackets)\nValues normalized.");
        assert_eq!(
            wrapped,
            "Discussion\nTable 2 Serial laboratory data (reference ranges in brackets)\nValues normalized."
        );
    }

    #[test]
    fn control_characters_and_bom_removed() {
        assert_eq!(normalize("\u{FEFF}Title\u{0007} line\u{000C}Next"), "Title line\nNext");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" \n\t\n"), "");
    }
}
