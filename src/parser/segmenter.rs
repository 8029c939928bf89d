//! 按章节标题分节。
//!
//! 标题来自各章节的固定短语表。短语占满整行（可带 `1.`、`II.` 编号），
//! 或位于行首且后接冒号、破折号时才算标题。

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::noise::NOISE;
use super::{SectionKind, SectionMap};

/// 超过这么多内容行仍未遇到标题，就不再视为卷首
pub(crate) const FRONT_MATTER_MAX_LINES: usize = 60;

/// 整行标题超过此长度视为正文
const MAX_HEADING_LEN: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingKind {
    Section(SectionKind),
    /// 参考文献、致谢等：结束上一章节，内容归入未分类部分
    Terminal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingMatch {
    pub kind: HeadingKind,
    /// 行内标题后面的文本（"Abstract: Background ..."）
    pub rest: String,
    weak: bool,
}

const HEADING_TABLE: &[(HeadingKind, &[&str])] = &[
    (
        HeadingKind::Section(SectionKind::Abstract),
        &["abstract", "summary"],
    ),
    (
        HeadingKind::Section(SectionKind::Introduction),
        &["introduction", "background"],
    ),
    (
        HeadingKind::Section(SectionKind::CasePresentation),
        &[
            "case presentations?",
            "case reports?",
            "case descriptions?",
            "case history",
            "case summary",
            "case details",
            "clinical presentation",
            "report of (?:the|a) case",
            "presentation of (?:the )?case",
            "patient presentation",
            r"case(?:\s+\d{1,2})?",
        ],
    ),
    (
        HeadingKind::Section(SectionKind::FigureLegends),
        &[
            "figure legends?",
            "legends? (?:to|for) (?:the )?figures",
            "figure captions?",
            "legends",
        ],
    ),
    (
        HeadingKind::Section(SectionKind::Discussion),
        &[
            "discussion and conclusions?",
            "discussion",
            "comments?",
            "conclusions?",
        ],
    ),
    (
        HeadingKind::Terminal,
        &[
            "references",
            "bibliography",
            "acknowledge?ments?",
            "conflicts? of interests?",
            "competing interests?",
            "funding(?: sources?| information)?",
            "financial support",
            "author(?:s'|s)? contributions?",
            "disclosures?",
            "(?:informed )?consent(?: for publication)?",
            "patient consent",
            "ethics statement",
            "ethical approval",
            "abbreviations",
            "supplementary (?:material|data|information)",
            "data availability(?: statement)?",
        ],
    ),
];

/// 也会作为标题上方文章类型横幅出现的短语
static WEAK_PHRASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^case\s+reports?$").expect("valid weak heading regex"));

pub struct HeadingLexicon {
    rules: Vec<(HeadingKind, Regex)>,
}

impl HeadingLexicon {
    fn new() -> Self {
        let rules = HEADING_TABLE
            .iter()
            .map(|(kind, phrases)| {
                let pattern = format!(
                    r"(?i)^(?:(?:\d{{1,2}}(?:\.\d{{1,2}})*|[ivx]{{1,4}})[.)]?\s+)?(?P<phrase>{})\s*(?P<tail>$|:\s*|[-–—]\s+)",
                    phrases.join("|")
                );
                let regex = Regex::new(&pattern).expect("valid heading regex");
                (*kind, regex)
            })
            .collect();
        Self { rules }
    }

    /// 单行匹配，不考虑横幅规则
    pub fn match_line(&self, line: &str) -> Option<HeadingMatch> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        for (kind, regex) in &self.rules {
            let Some(caps) = regex.captures(line) else {
                continue;
            };
            let whole = caps.get(0).map_or(0, |m| m.end());
            let rest = line[whole..].trim().to_string();
            let tail = caps.name("tail").map_or("", |m| m.as_str());
            // "Discussion - ..." 形式只有分隔符后有内容时才算行内标题
            if tail.is_empty() && line.chars().count() > MAX_HEADING_LEN {
                continue;
            }
            let phrase = caps.name("phrase").map_or("", |m| m.as_str());
            return Some(HeadingMatch {
                kind: *kind,
                rest,
                weak: WEAK_PHRASE.is_match(phrase),
            });
        }
        None
    }

    /// 文档中被接受的标题，按顺序返回 `(行号, 匹配)`。
    ///
    /// 第一个 Abstract/Introduction 之前单独的 "Case Report" 是文章类型横幅，丢弃。
    /// 摘要内的行内小标题（"Background: ..."、"Conclusions: ..."）属于结构化摘要，不开新章节。
    pub fn scan<S: AsRef<str>>(&self, lines: &[S]) -> Vec<(usize, HeadingMatch)> {
        let candidates: Vec<(usize, HeadingMatch)> = lines
            .iter()
            .enumerate()
            .filter_map(|(i, line)| self.match_line(line.as_ref()).map(|m| (i, m)))
            .collect();

        let first_opening = candidates.iter().find_map(|(i, m)| match m.kind {
            HeadingKind::Section(SectionKind::Abstract)
            | HeadingKind::Section(SectionKind::Introduction) => Some(*i),
            _ => None,
        });

        let abstract_kind = HeadingKind::Section(SectionKind::Abstract);
        let mut accepted = Vec::with_capacity(candidates.len());
        let mut current: Option<HeadingKind> = None;
        for (i, m) in candidates {
            if m.weak && first_opening.is_some_and(|open| i < open) {
                continue;
            }
            if current == Some(abstract_kind) && m.kind != abstract_kind && !m.rest.is_empty() {
                continue;
            }
            current = Some(m.kind);
            accepted.push((i, m));
        }
        accepted
    }

    pub fn is_heading(&self, line: &str) -> bool {
        self.match_line(line).is_some()
    }
}

pub(crate) static HEADINGS: Lazy<HeadingLexicon> = Lazy::new(HeadingLexicon::new);

/// 卷首之后第一行的下标：第一个标题所在行；若在 `FRONT_MATTER_MAX_LINES`
/// 个内容行内没有标题，则取超出处
pub(crate) fn front_matter_end<S: AsRef<str>>(lines: &[S], headings: &[(usize, HeadingMatch)]) -> usize {
    let first_heading = headings.first().map(|(i, _)| *i);
    let mut content = 0;
    for (i, line) in lines.iter().enumerate() {
        if first_heading == Some(i) {
            return i;
        }
        if !line.as_ref().trim().is_empty() {
            content += 1;
            if content > FRONT_MATTER_MAX_LINES {
                return i;
            }
        }
    }
    lines.len()
}

/// 把规范化文本切分为各章节
pub fn segment(text: &str) -> SectionMap {
    let lines: Vec<&str> = text.split('\n').collect();
    let headings = HEADINGS.scan(&lines);

    let mut map = SectionMap::new();
    let mut captions: Vec<String> = Vec::new();
    let mut current: Option<HeadingKind> = None;
    let mut buffer: Vec<String> = Vec::new();
    let mut next_heading = headings.iter().peekable();

    for (i, line) in lines.iter().enumerate() {
        if let Some((_, heading)) = next_heading.next_if(|(idx, _)| *idx == i) {
            flush(&mut map, current, &mut buffer);
            current = Some(heading.kind);
            if !heading.rest.is_empty() {
                buffer.push(heading.rest.clone());
            }
            continue;
        }

        let in_legends = current == Some(HeadingKind::Section(SectionKind::FigureLegends));
        if !in_legends && NOISE.is_caption(line) {
            captions.push(line.trim().to_string());
            continue;
        }
        buffer.push(line.to_string());
    }
    flush(&mut map, current, &mut buffer);

    route_captions(&mut map, captions);

    debug!(
        "分节完成: {:?}",
        map.kinds().map(|k| k.as_str()).collect::<Vec<_>>()
    );
    map
}

fn flush(map: &mut SectionMap, current: Option<HeadingKind>, buffer: &mut Vec<String>) {
    let body = collapse_blank_lines(buffer);
    buffer.clear();
    match current {
        Some(HeadingKind::Section(kind)) => map.append(kind, &body),
        Some(HeadingKind::Terminal) | None => map.append_unclassified(&body),
    }
}

/// 从正文中取出的图注追加到图注章节之后，每条只保留一次
fn route_captions(map: &mut SectionMap, captions: Vec<String>) {
    let mut added: Vec<String> = Vec::new();
    for caption in captions {
        let already = map.body(SectionKind::FigureLegends).contains(caption.as_str())
            || added.contains(&caption);
        if already {
            continue;
        }
        added.push(caption);
    }
    if !added.is_empty() {
        map.append(SectionKind::FigureLegends, &added.join("\n"));
    }
}

fn collapse_blank_lines(lines: &[String]) -> String {
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    for line in lines {
        let line = line.trim();
        if line.is_empty() && out.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        out.push(line);
    }
    out.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_and_inline_headings() {
        let h = &*HEADINGS;
        assert_eq!(
            h.match_line("1. Introduction").map(|m| m.kind),
            Some(HeadingKind::Section(SectionKind::Introduction))
        );
        assert_eq!(
            h.match_line("III DISCUSSION").map(|m| m.kind),
            Some(HeadingKind::Section(SectionKind::Discussion))
        );
        let inline = h.match_line("Abstract: A 70-year-old man.").unwrap();
        assert_eq!(inline.kind, HeadingKind::Section(SectionKind::Abstract));
        assert_eq!(inline.rest, "A 70-year-old man.");
        assert!(h.match_line("Discussion of this case was held.").is_none());
        assert!(h.match_line("Short Case Report").is_none());
    }

    #[test]
    fn discussion_then_legends_are_disjoint() {
        let text = "Title line\nDiscussion\nFirst paragraph here.\n\nSecond paragraph.\nFigure Legends\nFigure 1. Chest radiograph.\nFigure 2. CT image.";
        let map = segment(text);
        let discussion = map.get(SectionKind::Discussion).unwrap();
        let legends = map.get(SectionKind::FigureLegends).unwrap();
        assert_eq!(discussion, "First paragraph here.\n\nSecond paragraph.");
        assert_eq!(legends, "Figure 1. Chest radiograph.\nFigure 2. CT image.");
        assert!(!discussion.contains("Figure"));
        assert_eq!(map.unclassified(), "Title line");
    }

    #[test]
    fn duplicate_heading_appends() {
        let text = "Discussion\nEarly remarks.\nReferences\n1. Ref.\nDiscussion\nLate remarks.";
        let map = segment(text);
        assert_eq!(
            map.get(SectionKind::Discussion),
            Some("Early remarks.\n\nLate remarks.")
        );
        assert_eq!(map.unclassified(), "1. Ref.");
    }

    #[test]
    fn banner_before_abstract_is_not_a_heading() {
        let text = "Case Report\nA Rare Case\nAbstract\nShort summary.\nCase Report\nA man presented.";
        let map = segment(text);
        assert_eq!(map.get(SectionKind::Abstract), Some("Short summary."));
        assert_eq!(map.get(SectionKind::CasePresentation), Some("A man presented."));
        assert!(map.unclassified().starts_with("Case Report"));
    }

    #[test]
    fn interleaved_captions_move_to_legends() {
        let text = "Case Presentation\nThe patient was seen\nFigure 1. CT image of the abdomen.\nin clinic.\nFigure 1. CT image of the abdomen.";
        let map = segment(text);
        assert_eq!(
            map.get(SectionKind::CasePresentation),
            Some("The patient was seen\nin clinic.")
        );
        assert_eq!(
            map.get(SectionKind::FigureLegends),
            Some("Figure 1. CT image of the abdomen.")
        );
    }

    #[test]
    fn structured_abstract_labels_stay_in_abstract() {
        let text = "Abstract\nBackground: Rare entity.\nConclusions: Consider it.\nIntroduction\nBody text.";
        let map = segment(text);
        assert_eq!(
            map.get(SectionKind::Abstract),
            Some("Background: Rare entity.\nConclusions: Consider it.")
        );
        assert_eq!(map.get(SectionKind::Introduction), Some("Body text."));
        assert!(!map.contains(SectionKind::Discussion));
    }

    #[test]
    fn no_headings_maps_nothing() {
        let map = segment("just some prose\nwithout structure");
        assert!(map.is_empty());
        assert!(!map.contains(SectionKind::Abstract));
        assert_eq!(map.unclassified(), "just some prose\nwithout structure");
    }
}
