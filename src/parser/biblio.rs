//! 从文档开头恢复书目信息：标题、期刊、卷期页、作者、所属机构与 DOI。
//!
//! 全部基于位置与模式匹配，不会失败；未匹配的字段留空。

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use tracing::debug;

use super::noise::NOISE;
use super::LIST_SEPARATOR;

const HEAD_LINES: usize = 250;
const CITATION_LINES: usize = 200;
const MASTHEAD_LINES: usize = 40;
const TITLE_HINT_WINDOW: usize = 12;
const TITLE_FALLBACK_LINES: usize = 80;
const MIN_TITLE_LEN: usize = 10;
const MAX_MASTHEAD_LEN: usize = 120;
const MAX_JOURNAL_LEN: usize = 60;
const AUTHOR_SEARCH_WINDOW: usize = 6;
const MAX_AUTHOR_LINES: usize = 6;
const MAX_AFFILIATION_LINES: usize = 12;
const MAX_NAME_TOKENS: usize = 6;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Bibliographic {
    pub paper_title: String,
    pub journal_name: String,
    pub volume: String,
    pub issue: String,
    pub year: String,
    pub pages: String,
    pub authors: String,
    pub first_author: String,
    pub first_author_affiliations: String,
    pub affiliations: String,
    pub doi: String,
}

const PAGES: &str = r"(?P<pages>[A-Za-z]?\d+(?:\s*[-–]\s*[A-Za-z]?\d+)?)";

/// 引文模板，逐行按顺序尝试
const CITATION_TEMPLATES: &[&str] = &[
    // J Hosp Gen Med 2025:7(6):253-255, Journal. 2021;12(3):45-52
    r"(?P<journal>[A-Z][^:;()]*?)[\s.,]+(?P<year>(?:19|20)\d{2})\s*[:;]\s*(?P<volume>\d{1,4})\s*(?:\((?P<issue>[^)]{1,12})\))?\s*[:;,]\s*PAGES",
    // Journal 12(3):45-52 (2021)
    r"(?P<journal>[A-Z][^:;()]*?)[\s.,]+(?P<volume>\d{1,4})\s*\((?P<issue>[^)]{1,12})\)\s*[:,]\s*PAGES\s*[.,]?\s*\((?P<year>(?:19|20)\d{2})\)",
    // Journal, 2021, Vol. 12, No. 3, pp. 45-52
    r"(?P<journal>[A-Z][^:;()]*?),\s*(?P<year>(?:19|20)\d{2}),\s*(?i:vol(?:ume)?)\.?\s*(?P<volume>\d{1,4}),\s*(?i:no|issue)\.?\s*(?P<issue>[\w-]{1,8}),\s*(?i:pp?)\.?\s*PAGES",
];

static CITATIONS: Lazy<Vec<Regex>> = Lazy::new(|| {
    CITATION_TEMPLATES
        .iter()
        .map(|t| Regex::new(&t.replace("PAGES", PAGES)).expect("valid citation regex"))
        .collect()
});

static LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(Journal|Title|Type|Authors?|Affiliations?)\s*:").expect("valid label regex")
});

static FRONT_STOP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:\d{1,2}\.?\s+)?(?:abstract|introduction|background|summary)\b")
        .expect("valid front stop regex")
});

static REFERENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:\d{1,2}\.?\s+)?references?\s*$").expect("valid references regex")
});

static ARTICLE_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^[\W_]*(?:(?:short|brief|clinical|rare)\s+)?case\s+(?:reports?|study|series)(?:\s+and\s+(?:a\s+)?(?:literature\s+)?review(?:\s+of\s+(?:the\s+)?literature)?)?[\W_]*$",
    )
    .expect("valid article type regex")
});

static JOURNAL_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bjournal\b").expect("valid journal regex"));

static URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)https?://\S+|\bwww\.\S+|\bdoi:\s*\S+|\b10\.\d{4,9}/\S+")
        .expect("valid url regex")
});

static DOI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)10\.\d{4,9}/[-._;()/:A-Z0-9]+[A-Z0-9/]").expect("valid doi regex")
});

static NON_TITLE_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:key\s*words?|abstract|received|accepted|published|revised|available|copyright|©|citation|cite\b|correspond|\*|e-?mail|article\s+info)",
    )
    .expect("valid non-title regex")
});

static AUTHOR_STOP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:key\s*words?|abstract|introduction|background|summary|received|accepted|published|revised|available\s+online|correspond|e-?mail|copyright|©)",
    )
    .expect("valid author stop regex")
});

static AFFILIATION_STOP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:key\s*words?|abstract|introduction|background|summary|received|accepted|published|revised|correspond|\*|e-?mail|copyright|©|doi\b|https?://)",
    )
    .expect("valid affiliation stop regex")
});

static INSTITUTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:department|dept\.?|division|unit|cent(?:er|re)|hospital|universit(?:y|ies|à|ät|é)|college|school|institute|faculty|clinic|laborator(?:y|ies)|foundation|academy|ministry)\b",
    )
    .expect("valid institution regex")
});

/// 出现这些词的行是正文而不是地址
static PROSE_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:was|were|is|are|we|our|patient|presented)\b").expect("valid prose regex")
});

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\S+@\S+").expect("valid email regex"));

/// `Okumura 1)2)` 形式的标记
static PAREN_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})\)").expect("valid marker regex"));

static SUPERSCRIPT_RUN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[⁰¹²³⁴⁵⁶⁷⁸⁹]+(?:\s*[,‚]\s*[⁰¹²³⁴⁵⁶⁷⁸⁹]+)*").expect("valid superscript regex")
});

/// 紧贴姓名的 `Smith1,2` 形式标记
static GLUED_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\p{L})(\d{1,2}(?:\s*[,–-]\s*\d{1,2})*)\b").expect("valid glued marker regex")
});

static BRACKET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([\d,\s–-]*)\]").expect("valid bracket regex"));

static AND_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:^|\s+)and\s+").expect("valid and regex"));

static DEGREE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:m\.?d|ph\.?d|m\.?sc|b\.?sc|mph|mbbs|mbchb|rn|d\.?o|facp|frcp\w*|m\.?s|m\.?a|dds|pharmd|jr|sr)\.?$")
        .expect("valid degree regex")
});

static ET_AL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^et\.?\s+al\.?$").expect("valid et al regex"));

static NUMBERED_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)(\d{1,2})\)\s+").expect("valid numbered entry regex"));

static MARKED_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<marker>[⁰¹²³⁴⁵⁶⁷⁸⁹]+|\d{1,2})[\s.]*(?P<rest>\p{Lu}.*)$")
        .expect("valid marked line regex")
});

/// 不会出现在人名中的标题用词
const NON_NAME_WORDS: &[&str] = &[
    "of", "with", "in", "the", "a", "an", "for", "to", "on", "after", "from", "by", "as", "at",
    "case", "report", "syndrome", "disease", "patient", "acute", "chronic", "rare", "information",
];

const NAME_PARTICLES: &[&str] = &[
    "van", "von", "de", "da", "del", "della", "der", "den", "di", "du", "dos", "das", "la", "le",
    "bin", "binti", "al", "el", "ter", "y",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Citation {
    journal: String,
    year: String,
    volume: String,
    issue: String,
    pages: String,
}

#[derive(Debug, Default)]
struct Labels {
    journal: Option<String>,
    title: Option<String>,
    authors: Option<String>,
    affiliations: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Author {
    name: String,
    markers: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Affiliation {
    marker: Option<u32>,
    /// 原文，含标记
    raw: String,
    text: String,
}

/// 从规范化文本提取书目信息
pub fn extract_biblio(text: &str) -> Bibliographic {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(HEAD_LINES)
        .collect();
    if lines.is_empty() {
        return Bibliographic::default();
    }

    let front_len = match lines.iter().position(|l| FRONT_STOP.is_match(l)) {
        Some(stop) if stop > 0 => stop,
        _ => lines.len().min(TITLE_FALLBACK_LINES),
    };
    let front = &lines[..front_len];
    let labels = parse_labels(front);

    // 引文行：标注的期刊字段优先，其次是最靠前的匹配行
    let labelled_citation = labels.journal.as_deref().and_then(parse_citation);
    let citation = labelled_citation.clone().or_else(|| find_citation(&lines));
    if let Some(c) = &citation {
        debug!("引文匹配: {} {} {}({}):{}", c.journal, c.year, c.volume, c.issue, c.pages);
    }

    let journal_name = match (&labels.journal, &labelled_citation) {
        (Some(_), Some(c)) => c.journal.clone(),
        (Some(value), None) => clean_journal(value),
        (None, _) => find_masthead(&lines)
            .or_else(|| citation.as_ref().map(|c| c.journal.clone()))
            .unwrap_or_default(),
    };

    let title = match &labels.title {
        Some(title) => Some((None, title.clone())),
        None => find_title(front).map(|(i, t)| (Some(i), t)),
    };
    let title_index = title.as_ref().and_then(|(i, _)| *i);

    let (authors, author_end) = match &labels.authors {
        Some(value) => (parse_authors(value), None),
        None => match find_author_block(front, title_index) {
            Some((block, end)) => (parse_authors(&block), Some(end)),
            None => (Vec::new(), None),
        },
    };

    let affiliations = match &labels.affiliations {
        Some(value) => dedupe(split_numbered(value)),
        None => find_affiliations(&lines, front_len, author_end.or(title_index.map(|i| i + 1))),
    };

    let citation = citation.unwrap_or_default();

    Bibliographic {
        paper_title: title.map(|(_, t)| t).unwrap_or_default(),
        journal_name,
        volume: citation.volume,
        issue: citation.issue,
        year: citation.year,
        pages: citation.pages,
        first_author: authors.first().map(|a| a.name.clone()).unwrap_or_default(),
        first_author_affiliations: first_author_affiliations(authors.first(), &affiliations),
        authors: authors
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR),
        affiliations: affiliations
            .iter()
            .map(|a| a.raw.as_str())
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR),
        doi: DOI.find(text).map(|m| m.as_str().to_string()).unwrap_or_default(),
    }
}

fn parse_labels(front: &[&str]) -> Labels {
    let mut labels = Labels::default();
    for line in front {
        let found: Vec<Captures> = LABEL.captures_iter(line).collect();
        for (i, caps) in found.iter().enumerate() {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let end = found
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map_or(line.len(), |m| m.start());
            let value = line[whole.end()..end].trim();
            if value.is_empty() {
                continue;
            }
            let slot = match name.as_str() {
                "Journal" => &mut labels.journal,
                "Title" => &mut labels.title,
                "Author" | "Authors" => &mut labels.authors,
                "Affiliation" | "Affiliations" => &mut labels.affiliations,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.to_string());
            }
        }
    }
    labels
}

fn parse_citation(line: &str) -> Option<Citation> {
    CITATIONS.iter().find_map(|re| {
        let caps = re.captures(line)?;
        let group = |name: &str| caps.name(name).map_or("", |m| m.as_str()).trim().to_string();
        Some(Citation {
            journal: clean_journal(&group("journal")),
            year: group("year"),
            volume: group("volume"),
            issue: group("issue"),
            pages: group("pages").chars().filter(|c| !c.is_whitespace()).collect(),
        })
    })
}

/// 取最靠前的引文行，不搜索参考文献列表
fn find_citation(lines: &[&str]) -> Option<Citation> {
    lines
        .iter()
        .take(CITATION_LINES)
        .take_while(|l| !REFERENCES.is_match(l))
        .filter(|l| !LABEL.is_match(l))
        .find_map(|l| parse_citation(l))
}

fn clean_journal(raw: &str) -> String {
    let trimmed = raw
        .trim()
        .trim_end_matches(|c: char| matches!(c, '.' | ',') || c.is_whitespace());
    let trimmed = if trimmed.chars().count() > MAX_JOURNAL_LEN {
        trimmed.rsplit(". ").next().unwrap_or(trimmed)
    } else {
        trimmed
    };
    trimmed.trim().to_string()
}

fn find_masthead(lines: &[&str]) -> Option<String> {
    lines.iter().take(MASTHEAD_LINES).find_map(|line| {
        if !JOURNAL_WORD.is_match(line) || LABEL.is_match(line) {
            return None;
        }
        let stripped = URL.replace_all(line, " ");
        let candidate = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
        if candidate.is_empty()
            || !JOURNAL_WORD.is_match(&candidate)
            || candidate.chars().count() > MAX_MASTHEAD_LEN
            || looks_like_sentence(&candidate)
            || parse_citation(&candidate).is_some()
        {
            return None;
        }
        Some(candidate)
    })
}

fn looks_like_sentence(line: &str) -> bool {
    line.ends_with('.') && line.split_whitespace().count() > 6
}

fn is_affiliation_line(line: &str) -> bool {
    INSTITUTION.is_match(line) && !PROSE_WORD.is_match(line)
}

fn is_title_candidate(line: &str) -> bool {
    line.chars().count() >= MIN_TITLE_LEN
        && !URL.is_match(line)
        && !NOISE.is_noise(line)
        && !LABEL.is_match(line)
        && !NON_TITLE_START.is_match(line)
        && !ARTICLE_TYPE.is_match(line)
        && !JOURNAL_WORD.is_match(line)
        && !(is_affiliation_line(line) && line.contains(','))
        && parse_citation(line).is_none()
        && line.chars().filter(|c| c.is_alphabetic()).count() * 2 > line.chars().count()
}

fn find_title(front: &[&str]) -> Option<(usize, String)> {
    // 1. 文章类型行（Case Report 等）之后的第一行
    if let Some(hint) = front.iter().position(|l| ARTICLE_TYPE.is_match(l)) {
        let found = front
            .iter()
            .enumerate()
            .skip(hint + 1)
            .take(TITLE_HINT_WINDOW)
            .find(|(_, l)| is_title_candidate(l));
        if let Some((i, line)) = found {
            debug!("标题来自文章类型行之后: 第 {} 行", i);
            return Some((i, line.to_string()));
        }
    }

    // 2. 作者行之前的一行
    if let Some(author) = front.iter().position(|l| is_author_line(l)) {
        if let Some(i) = author.checked_sub(1) {
            if is_title_candidate(front[i]) {
                return Some((i, front[i].to_string()));
            }
        }
    }

    // 3. 最长的候选行（等长时取靠前者）
    let mut best: Option<(usize, &str)> = None;
    for (i, &line) in front.iter().enumerate().take(TITLE_FALLBACK_LINES) {
        if !is_title_candidate(line) || is_author_line(line) {
            continue;
        }
        if best.map_or(true, |(_, b)| line.chars().count() > b.chars().count()) {
            best = Some((i, line));
        }
    }
    best.map(|(i, line)| (i, line.to_string()))
}

/// 人名行，可能带机构标记
fn is_author_line(line: &str) -> bool {
    if AUTHOR_STOP.is_match(line)
        || ARTICLE_TYPE.is_match(line)
        || JOURNAL_WORD.is_match(line)
        || INSTITUTION.is_match(line)
        || URL.is_match(line)
        || looks_like_sentence(line)
    {
        return false;
    }
    let (names, rejected) = author_candidates(line);
    !names.is_empty() && rejected == 0 && names.iter().all(|a| is_name_like(&a.name))
}

/// 只有标记的行（`3)`、`²`、`*`）
fn is_marker_line(line: &str) -> bool {
    let converted = convert_markers(line);
    !converted.is_empty()
        && BRACKET
            .replace_all(&converted, "")
            .chars()
            .all(|c| c.is_whitespace() || c == ',')
}

/// 标题之后从第一行作者行到下一个非作者行，返回拼接后的文本与其后的下标
fn find_author_block(front: &[&str], title_index: Option<usize>) -> Option<(String, usize)> {
    let from = title_index.map_or(0, |i| i + 1);
    let start = (from..front.len().min(from + AUTHOR_SEARCH_WINDOW))
        .find(|&i| is_author_line(front[i]))?;

    let mut end = start + 1;
    while end < front.len() && end - start < MAX_AUTHOR_LINES {
        let line = front[end];
        if AUTHOR_STOP.is_match(line) || INSTITUTION.is_match(line) || LABEL.is_match(line) {
            break;
        }
        if !(is_author_line(line) || is_marker_line(line)) {
            break;
        }
        end += 1;
    }
    let block = front[start..end].join(" ");
    debug!("作者块: 第 {}..{} 行", start, end);
    Some((block, end))
}

fn superscript_digit(c: char) -> Option<char> {
    match c {
        '⁰' => Some('0'),
        '¹' => Some('1'),
        '²' => Some('2'),
        '³' => Some('3'),
        '⁴'..='⁹' => char::from_u32(c as u32 - '⁴' as u32 + '4' as u32),
        _ => None,
    }
}

/// 把各种标记写法统一成 `[n,m]`
fn convert_markers(text: &str) -> String {
    let text = EMAIL.replace_all(text, " ");
    let text = PAREN_MARKER.replace_all(&text, "[$1]");
    let text = SUPERSCRIPT_RUN.replace_all(&text, |caps: &Captures| {
        // `¹²` 这样连写的上标是多个一位数标记
        let digits: Vec<String> = caps[0]
            .chars()
            .filter_map(superscript_digit)
            .map(String::from)
            .collect();
        format!("[{}]", digits.join(","))
    });
    let text = GLUED_MARKER.replace_all(&text, "$1[$2]");
    text.chars()
        .filter(|c| !matches!(c, '*' | '†' | '‡' | '§' | '¶'))
        .collect::<String>()
        .trim()
        .to_string()
}

fn parse_marker_list(list: &str) -> Vec<u32> {
    let mut markers = Vec::new();
    for piece in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match piece.split_once(|c: char| c == '-' || c == '–') {
            Some((from, to)) => {
                if let (Ok(from), Ok(to)) = (from.trim().parse::<u32>(), to.trim().parse::<u32>()) {
                    if from <= to && to - from < 20 {
                        markers.extend(from..=to);
                    }
                }
            }
            None => {
                if let Ok(n) = piece.parse() {
                    markers.push(n);
                }
            }
        }
    }
    markers
}

/// 在标记括号外按 `,` `;` `&` 切分
fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '[' | '(' => {
                depth += 1;
                current.push(c);
            }
            ']' | ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' | ';' | '&' if depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// 返回接受的人名与被拒绝片段数；学位与 `et al.` 直接丢弃，不计入拒绝
fn author_candidates(text: &str) -> (Vec<Author>, usize) {
    let converted = convert_markers(text);
    let mut names: Vec<Author> = Vec::new();
    let mut rejected = 0;
    for part in split_top_level(&converted) {
        for piece in AND_SPLIT.split(&part) {
            let mut markers = Vec::new();
            for caps in BRACKET.captures_iter(piece) {
                markers.extend(parse_marker_list(&caps[1]));
            }
            let stripped = BRACKET.replace_all(piece, " ");
            let name = stripped
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .trim_matches(|c: char| matches!(c, ',' | ';' | ')' | '(' | ':'))
                .trim()
                .to_string();

            if name.is_empty() {
                // 落到下一片段的标记属于前一个人名
                if let Some(prev) = names.last_mut() {
                    prev.markers.extend(markers);
                }
                continue;
            }
            if DEGREE.is_match(&name) || ET_AL.is_match(&name) {
                continue;
            }
            if name.chars().any(|c| c.is_ascii_digit())
                || INSTITUTION.is_match(&name)
                || name.split_whitespace().count() > MAX_NAME_TOKENS
                || !name.chars().any(|c| c.is_uppercase())
            {
                rejected += 1;
                continue;
            }
            names.push(Author { name, markers });
        }
    }
    (names, rejected)
}

fn parse_authors(text: &str) -> Vec<Author> {
    author_candidates(text).0
}

fn is_name_like(name: &str) -> bool {
    let tokens: Vec<&str> = name.split_whitespace().collect();
    (2..=MAX_NAME_TOKENS).contains(&tokens.len())
        && !tokens
            .iter()
            .any(|t| NON_NAME_WORDS.contains(&t.to_lowercase().as_str()))
        && tokens.iter().all(|t| {
            t.chars().next().is_some_and(|c| c.is_uppercase())
                || NAME_PARTICLES.contains(&t.to_lowercase().as_str())
        })
}

fn is_affiliation_text(text: &str) -> bool {
    !text.to_lowercase().starts_with("and ")
        && (INSTITUTION.is_match(text) || (text.contains(',') && text.chars().count() >= 20))
}

/// 把 `1) Dept A 2) Dept B` 拆成编号条目
fn split_numbered(text: &str) -> Vec<Affiliation> {
    let found: Vec<Captures> = NUMBERED_ENTRY.captures_iter(text).collect();
    let mut entries = Vec::new();
    for (i, caps) in found.iter().enumerate() {
        let (Some(whole), Some(marker)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = found
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(text.len(), |m| m.start());
        let body = text[whole.end()..end]
            .trim()
            .trim_end_matches(|c: char| matches!(c, ',' | ';'))
            .trim();
        if !is_affiliation_text(body) {
            continue;
        }
        entries.push(Affiliation {
            marker: marker.as_str().parse().ok(),
            raw: format!("{}) {}", marker.as_str(), body),
            text: body.to_string(),
        });
    }
    entries
}

fn numbered_block(lines: &[&str]) -> Vec<Affiliation> {
    let Some(start) = lines.iter().position(|l| {
        NUMBERED_ENTRY.find(l).is_some_and(|m| m.start() == 0) && !split_numbered(l).is_empty()
    }) else {
        return Vec::new();
    };
    let mut end = start + 1;
    while end < lines.len() && end - start < MAX_AFFILIATION_LINES {
        let line = lines[end];
        if AFFILIATION_STOP.is_match(line) || LABEL.is_match(line) || parse_citation(line).is_some() {
            break;
        }
        end += 1;
    }
    split_numbered(&lines[start..end].join(" "))
}

/// `¹Department of ...` 或 `2 Division of ...` 形式的行
fn marked_lines(lines: &[&str]) -> Vec<Affiliation> {
    lines
        .iter()
        .filter_map(|line| {
            let caps = MARKED_LINE.captures(line)?;
            let rest = caps.name("rest")?.as_str().trim();
            if !INSTITUTION.is_match(rest) {
                return None;
            }
            let marker_text = caps.name("marker")?.as_str();
            let digits: String = marker_text
                .chars()
                .map(|c| superscript_digit(c).unwrap_or(c))
                .collect();
            Some(Affiliation {
                marker: digits.parse().ok(),
                raw: line.to_string(),
                text: rest.to_string(),
            })
        })
        .collect()
}

fn plain_lines(lines: &[&str]) -> Vec<Affiliation> {
    lines
        .iter()
        .filter(|l| is_affiliation_line(l) && is_affiliation_text(l) && !looks_like_sentence(l))
        .map(|l| Affiliation {
            marker: None,
            raw: l.to_string(),
            text: l.to_string(),
        })
        .collect()
}

fn find_affiliations(lines: &[&str], front_len: usize, from: Option<usize>) -> Vec<Affiliation> {
    let from = from.unwrap_or(0).min(front_len);
    let front = &lines[from..front_len];

    let mut entries = numbered_block(front);
    if entries.is_empty() {
        entries = marked_lines(front);
    }
    if entries.is_empty() {
        entries = plain_lines(front);
    }
    if entries.is_empty() {
        // 部分版式把机构印在摘要之后
        let rest = &lines[front_len..];
        entries = numbered_block(rest);
        if entries.is_empty() {
            entries = marked_lines(rest);
        }
    }
    dedupe(entries)
}

fn dedupe(entries: Vec<Affiliation>) -> Vec<Affiliation> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert(e.text.to_lowercase()))
        .collect()
}

/// 按标记对应，找不到时取第一个机构
fn first_author_affiliations(first: Option<&Author>, entries: &[Affiliation]) -> String {
    let Some(fallback) = entries.first() else {
        return String::new();
    };
    if let Some(author) = first {
        let hits: Vec<&str> = entries
            .iter()
            .filter(|e| e.marker.is_some_and(|m| author.markers.contains(&m)))
            .map(|e| e.text.as_str())
            .collect();
        if !hits.is_empty() {
            return hits.join(LIST_SEPARATOR);
        }
    }
    fallback.text.clone()
}
