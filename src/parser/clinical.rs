//! 从病例介绍与讨论中提取诊断短语，从第一作者机构推断科室。

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use super::{SectionKind, SectionMap, LIST_SEPARATOR};
use crate::config::LexiconConfig;

const MIN_PHRASE_CHARS: usize = 3;
const MAX_PHRASE_CHARS: usize = 160;
const MAX_PHRASE_WORDS: usize = 15;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClinicalFindings {
    pub tentative_diagnoses: String,
    pub final_diagnoses: String,
    pub first_author_specialties: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Certainty {
    Tentative,
    Final,
}

/// 诊断短语相对标志词的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// `diagnosed with X`
    Follows,
    /// `X was suspected`
    Precedes,
}

/// 有序：靠前的条目屏蔽与之重叠的后续条目
const MARKER_TABLE: &[(Certainty, Direction, &str)] = &[
    (
        Certainty::Tentative,
        Direction::Follows,
        r"\b(?:possible|probable|presumptive|presumed|provisional|differential|working|tentative|suspected|initial)\s+diagnos(?:is|es)\s+(?:of|was|were|included|includes)\b",
    ),
    (
        Certainty::Final,
        Direction::Follows,
        r"\b(?:final|definitive|definite|confirmed|established)\s+diagnos(?:is|es)\s+(?:of|was|were|is)\b",
    ),
    (Certainty::Final, Direction::Follows, r"\bdiagnosed\s+(?:with|as)\b"),
    (
        Certainty::Final,
        Direction::Follows,
        r"\bconfirm(?:ed|ing|s)?\s+(?:the\s+)?(?:presence|diagnosis)\s+of\b",
    ),
    (Certainty::Final, Direction::Follows, r"\bdiagnosis\s+of\b"),
    (
        Certainty::Tentative,
        Direction::Follows,
        r"\b(?:thought|considered|presumed|suspected|believed)\s+to\s+(?:be|have)\b",
    ),
    (
        Certainty::Final,
        Direction::Precedes,
        r"\b(?:was|were|is|are)\s+(?:\w+ly\s+)?(?:diagnosed|confirmed)\b",
    ),
    (
        Certainty::Tentative,
        Direction::Precedes,
        r"\b(?:was|were|is|are)\s+(?:\w+ly\s+)?(?:suspected|considered|presumed)\b",
    ),
    (Certainty::Tentative, Direction::Follows, r"\bsuspicion\s+of\b"),
    (Certainty::Tentative, Direction::Follows, r"\bsuspected\s+(?:of\s+)?(?:having\s+)?"),
    (
        Certainty::Tentative,
        Direction::Follows,
        r"\b(?:suggestive\s+of|consistent\s+with|compatible\s+with)\b",
    ),
];

struct DiagnosisMarker {
    certainty: Certainty,
    direction: Direction,
    pattern: Regex,
}

static MARKERS: Lazy<Vec<DiagnosisMarker>> = Lazy::new(|| {
    MARKER_TABLE
        .iter()
        .map(|(certainty, direction, pattern)| DiagnosisMarker {
            certainty: *certainty,
            direction: *direction,
            pattern: Regex::new(&format!("(?i){}", pattern)).expect("valid diagnosis marker regex"),
        })
        .collect()
});

/// 后置短语遇到这些连接词即截断
static PHRASE_STOP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:based\s+on|on\s+the\s+basis|using|by|after|following|which|who|that|because|since|was|were|is|are|although|but|while|when|and\s+(?:was|were|treated|underwent|started|received|admitted))\b",
    )
    .expect("valid phrase stop regex")
});

/// 出现在前置短语内部时，短语从其后开始
static CLAUSE_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:and|but|which|while|whereas|although|though|because|since|after|before|then|so|when)\b",
    )
    .expect("valid clause break regex")
});

static LEADING_CONNECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:(?:although|though|while|whereas|because|since|as|and|but|then|thus|therefore|however|finally|initially|subsequently|eventually|so|that|when|if|clinically|hence|having)\s+)+",
    )
    .expect("valid leading connective regex")
});

static LEADING_ARTICLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:a|an|the)\s+").expect("valid article regex"));

static NEGATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:not|never|ruled\s+out|excluded|unlikely)\b").expect("valid negation regex")
});

const PRONOUNS: &[&str] = &[
    "he", "she", "it", "they", "this", "that", "these", "those", "which", "who", "we", "i", "him",
    "her", "them",
];

const GENERIC_PHRASES: &[&str] = &[
    "diagnosis", "diagnoses", "cause", "disease", "condition", "this condition", "findings",
    "case", "this case", "patient", "patients", "our patient", "the patient",
];

/// 后跟句点也不结束句子的词
const ABBREVIATIONS: &[&str] = &[
    "fig", "figs", "e.g", "i.e", "al", "vs", "dr", "mr", "mrs", "ms", "no", "nos", "approx", "eq",
    "ca", "cf", "st", "prof", "ref", "resp", "incl", "tab",
];

/// 科室推断规则与固定的诊断标志表
pub struct ClinicalExtractor {
    specialties: Vec<(Regex, String)>,
}

impl Default for ClinicalExtractor {
    fn default() -> Self {
        Self::new(&LexiconConfig::default())
    }
}

impl ClinicalExtractor {
    pub fn new(lexicon: &LexiconConfig) -> Self {
        let mut specialties = Vec::new();
        for rule in lexicon.active_specialties() {
            for keyword in &rule.keywords {
                let pattern = format!(r"(?i)\b{}\b", regex::escape(keyword.trim()));
                match Regex::new(&pattern) {
                    Ok(re) => specialties.push((re, rule.label.clone())),
                    Err(e) => warn!("跳过无效的科室关键词 {:?}: {}", keyword, e),
                }
            }
        }
        Self { specialties }
    }

    pub fn extract(&self, sections: &SectionMap, first_author_affiliations: &str) -> ClinicalFindings {
        let (tentative, confirmed) = diagnoses(sections);
        debug!("诊断: {} 个疑似, {} 个确诊", tentative.len(), confirmed.len());
        ClinicalFindings {
            tentative_diagnoses: tentative.join(LIST_SEPARATOR),
            final_diagnoses: confirmed.join(LIST_SEPARATOR),
            first_author_specialties: self.infer_specialties(first_author_affiliations),
        }
    }

    /// 每个机构条目按出现位置给出匹配的科室标签，关键词重叠时取最长者
    pub fn infer_specialties(&self, affiliation_text: &str) -> String {
        let mut labels: Vec<&str> = Vec::new();
        for entry in affiliation_text.split(LIST_SEPARATOR) {
            let mut hits: Vec<(usize, usize, &str)> = self
                .specialties
                .iter()
                .flat_map(|(re, label)| {
                    re.find_iter(entry)
                        .map(move |m| (m.start(), m.end(), label.as_str()))
                })
                .collect();
            hits.sort_by(|a, b| a.0.cmp(&b.0).then((b.1 - b.0).cmp(&(a.1 - a.0))));

            let mut covered_to = 0;
            let mut entry_labels: Vec<&str> = Vec::new();
            for (start, end, label) in hits {
                if start < covered_to {
                    continue;
                }
                covered_to = end;
                if !entry_labels.contains(&label) {
                    entry_labels.push(label);
                }
            }
            labels.extend(entry_labels);
        }
        labels.join(LIST_SEPARATOR)
    }
}

static DEFAULT_EXTRACTOR: Lazy<ClinicalExtractor> = Lazy::new(ClinicalExtractor::default);

/// 使用内置科室词表提取临床字段
pub fn extract_clinical(sections: &SectionMap, first_author_affiliations: &str) -> ClinicalFindings {
    DEFAULT_EXTRACTOR.extract(sections, first_author_affiliations)
}

pub fn infer_specialties(affiliation_text: &str) -> String {
    DEFAULT_EXTRACTOR.infer_specialties(affiliation_text)
}

/// 初步与最终诊断，先病例介绍后讨论，按出现顺序
fn diagnoses(sections: &SectionMap) -> (Vec<String>, Vec<String>) {
    let mut tentative = Vec::new();
    let mut confirmed = Vec::new();
    for kind in [SectionKind::CasePresentation, SectionKind::Discussion] {
        for sentence in split_sentences(sections.body(kind)) {
            let found = sentence_diagnoses(&sentence);
            let has_final = found.iter().any(|(c, _)| *c == Certainty::Final);
            for (certainty, phrase) in found {
                match certainty {
                    Certainty::Final => confirmed.push(phrase),
                    Certainty::Tentative if !has_final => tentative.push(phrase),
                    Certainty::Tentative => {}
                }
            }
        }
    }
    (tentative, confirmed)
}

fn sentence_diagnoses(sentence: &str) -> Vec<(Certainty, String)> {
    let mut found = Vec::new();
    for clause in sentence.split(|c: char| c == ',' || c == ';') {
        if NEGATION.is_match(clause) {
            continue;
        }
        let mut spans: Vec<(usize, usize, &DiagnosisMarker)> = Vec::new();
        for marker in MARKERS.iter() {
            for m in marker.pattern.find_iter(clause) {
                if spans.iter().any(|&(s, e, _)| m.start() < e && s < m.end()) {
                    continue;
                }
                spans.push((m.start(), m.end(), marker));
            }
        }
        spans.sort_by_key(|&(start, _, _)| start);

        let mut hits: Vec<(usize, Certainty, String)> = Vec::new();
        for (idx, &(start, end, marker)) in spans.iter().enumerate() {
            let raw = match marker.direction {
                Direction::Follows => {
                    let limit = spans.get(idx + 1).map_or(clause.len(), |next| next.0);
                    let after = &clause[end..limit];
                    let cut = PHRASE_STOP.find(after).map_or(after.len(), |s| s.start());
                    &after[..cut]
                }
                Direction::Precedes => {
                    let floor = if idx > 0 { spans[idx - 1].1 } else { 0 };
                    let before = &clause[floor..start];
                    let from = CLAUSE_BREAK.find_iter(before).last().map_or(0, |c| c.end());
                    &before[from..]
                }
            };
            if let Some(phrase) = clean_phrase(raw) {
                debug!("诊断短语 {:?}: {}", marker.certainty, phrase);
                hits.push((start, marker.certainty, phrase));
            }
        }
        hits.sort_by_key(|(pos, _, _)| *pos);
        found.extend(hits.into_iter().map(|(_, certainty, phrase)| (certainty, phrase)));
    }
    found
}

fn clean_phrase(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches(|c: char| {
        matches!(c, '.' | ',' | ';' | ':' | '"' | '\'' | '“' | '”') || c.is_whitespace()
    });
    let trimmed = LEADING_CONNECTIVE.replace(trimmed, "");
    let trimmed = LEADING_ARTICLE.replace(&trimmed, "");
    let phrase = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");

    let lower = phrase.to_lowercase();
    let first_word = lower.split_whitespace().next().unwrap_or("");
    if phrase.chars().count() < MIN_PHRASE_CHARS
        || phrase.chars().count() > MAX_PHRASE_CHARS
        || phrase.split_whitespace().count() > MAX_PHRASE_WORDS
        || PRONOUNS.contains(&lower.as_str())
        || GENERIC_PHRASES.contains(&lower.as_str())
        || matches!(first_word, "patient" | "patients" | "he" | "she" | "they" | "we")
        || !phrase.chars().any(|c| c.is_alphabetic())
    {
        return None;
    }
    Some(phrase)
}

/// 分句。缩写、姓名首字母、小数以及后接小写词的句点都不断句
pub(crate) fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    for paragraph in text.split("\n\n") {
        let chars: Vec<(usize, char)> = paragraph.char_indices().collect();
        let mut start = 0;
        for (k, &(i, c)) in chars.iter().enumerate() {
            if !matches!(c, '.' | '!' | '?') {
                continue;
            }
            if chars.get(k + 1).is_some_and(|&(_, n)| !n.is_whitespace()) {
                continue;
            }
            let following = chars[k + 1..].iter().map(|&(_, n)| n).find(|n| !n.is_whitespace());
            if following.is_some_and(|n| n.is_lowercase()) {
                continue;
            }
            if c == '.' && is_abbreviation(&paragraph[start..i]) {
                continue;
            }
            let end = i + c.len_utf8();
            push_sentence(&mut sentences, &paragraph[start..end]);
            start = end;
        }
        push_sentence(&mut sentences, &paragraph[start..]);
    }
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, text: &str) {
    let sentence = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if !sentence.is_empty() {
        sentences.push(sentence);
    }
}

fn is_abbreviation(before: &str) -> bool {
    let word = before
        .rsplit(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("");
    let lower = word.to_lowercase();
    ABBREVIATIONS.contains(&lower.as_str())
        || (word.chars().count() == 1 && word.chars().all(|c| c.is_uppercase()))
}
