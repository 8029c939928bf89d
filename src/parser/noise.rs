//! 去除页眉页脚与插在正文中的图注。
//!
//! 在规范化文本上逐行处理。拿不准的行一律保留。

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::segmenter::{front_matter_end, HEADINGS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseKind {
    Boilerplate,
    PageNumber,
    PanelLabel,
}

const NOISE_TABLE: &[(NoiseKind, &str)] = &[
    (NoiseKind::Boilerplate, r"(?i)^[*†]?\s*corresponding\s+authors?\b"),
    (NoiseKind::Boilerplate, r"(?i)^[*†]?\s*(?:address\s+)?correspondence\b(?:\s+to)?\s*:"),
    (NoiseKind::Boilerplate, r"(?i)^e-?mails?(?:\s+address(?:es)?)?\s*:"),
    (
        NoiseKind::Boilerplate,
        r"(?i)^(?:received|accepted|revised|published(?:\s+online)?|available\s+online)\s*:?\s*(?:\d{1,2}\s+\p{L}+|\p{L}+\s+\d{1,2}|\d{4}[./-]\d{1,2})",
    ),
    (NoiseKind::Boilerplate, r"(?i)^(?:©|\(c\)\s|copyright\b)"),
    (
        NoiseKind::Boilerplate,
        r"(?i)^this\s+(?:is\s+an?\s+)?(?:open[- ]access\s+)?article\s+(?:is\s+)?(?:distributed|licensed|published)\b",
    ),
    (NoiseKind::Boilerplate, r"(?i)^(?:https?://)?(?:www\.)?creativecommons\.org\S*$"),
    (NoiseKind::Boilerplate, r"(?i)^downloaded\s+from\b"),
    (NoiseKind::PageNumber, r"^(?:[-–—]\s*)?\d{1,4}(?:\s*[-–—])?$"),
    (NoiseKind::PageNumber, r"(?i)^page\s+\d{1,4}(?:\s+of\s+\d{1,4})?$"),
    (NoiseKind::PanelLabel, r"^\(?\d{0,2}[A-Ha-h]\)?$"),
];

/// `Figure 1.`、`Fig. 2 CT ...`、`Table 3: ...`，不含 `Figure 1 shows ...`
const CAPTION_PATTERN: &str = r"(?i)^(?:supplementary\s+)?(?:fig(?:ure)?s?\.?|table)\s*\d{1,3}[a-z]?(?:$|\s*[.:|]|(?-i:\s+[A-Z(\[]))";

const RUNNING_HEADER_MAX_LEN: usize = 90;

static RUNNING_HEADER_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bjournal\b|\bet\s+al\b|\bvol\.?\s*\d|\d{4}\s*[;:]\s*\d|\bdoi\b|\bcase\s+rep")
        .expect("valid running header regex")
});

pub struct NoiseLexicon {
    patterns: Vec<(NoiseKind, Regex)>,
    caption: Regex,
}

impl NoiseLexicon {
    fn new() -> Self {
        let patterns = NOISE_TABLE
            .iter()
            .map(|(kind, pattern)| (*kind, Regex::new(pattern).expect("valid noise regex")))
            .collect();
        Self {
            patterns,
            caption: Regex::new(CAPTION_PATTERN).expect("valid caption regex"),
        }
    }

    pub fn classify(&self, line: &str) -> Option<NoiseKind> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        self.patterns
            .iter()
            .find(|(_, regex)| regex.is_match(line))
            .map(|(kind, _)| *kind)
    }

    pub fn is_noise(&self, line: &str) -> bool {
        self.classify(line).is_some()
    }

    pub fn is_caption(&self, line: &str) -> bool {
        self.caption.is_match(line.trim())
    }
}

pub(crate) static NOISE: Lazy<NoiseLexicon> = Lazy::new(NoiseLexicon::new);

/// 跨页原样重复、形似刊名或引文页脚的短行
pub(crate) fn running_headers<S: AsRef<str>>(lines: &[S]) -> HashSet<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for line in lines {
        let line = line.as_ref().trim();
        if line.is_empty() || line.chars().count() > RUNNING_HEADER_MAX_LEN {
            continue;
        }
        *counts.entry(line).or_default() += 1;
    }

    counts
        .into_iter()
        .filter(|(line, count)| {
            *count >= 2
                && !line.ends_with('.')
                && !HEADINGS.is_heading(line)
                && !NOISE.is_caption(line)
                && (mostly_uppercase(line) || RUNNING_HEADER_HINT.is_match(line))
        })
        .map(|(line, _)| line.to_string())
        .collect()
}

fn mostly_uppercase(line: &str) -> bool {
    let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() < 4 {
        return false;
    }
    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    upper * 10 >= letters.len() * 7
}

pub(crate) fn ends_sentence(line: &str) -> bool {
    line.trim_end()
        .trim_end_matches(|c: char| matches!(c, '"' | '\'' | ')' | ']' | '”' | '’'))
        .ends_with(|c: char| matches!(c, '.' | '!' | '?' | ':'))
}

fn starts_lowercase(line: &str) -> bool {
    line.trim_start()
        .chars()
        .next()
        .is_some_and(|c| c.is_lowercase())
}

#[derive(Debug)]
enum Kept {
    Blank,
    Line { text: String, prose: bool },
}

/// 文档级去噪上下文：页眉集合与卷首边界只计算一次，用于全文或单个章节
pub struct NoiseStripper {
    running: HashSet<String>,
    front_end: usize,
    document: Vec<String>,
}

impl NoiseStripper {
    pub fn for_document(text: &str) -> Self {
        let document: Vec<String> = text.split('\n').map(|l| l.trim().to_string()).collect();
        let headings = HEADINGS.scan(&document);
        let front_end = front_matter_end(&document, &headings);
        let running = running_headers(&document);
        debug!("检测到 {} 个页眉/页脚行", running.len());
        Self {
            running,
            front_end,
            document,
        }
    }

    /// 全文去噪。卷首保持原有分行，重复刊头保留第一份
    pub fn strip_document(&self) -> String {
        self.strip_lines(&self.document, Some(self.front_end))
    }

    /// 章节正文去噪，每行都按正文处理
    pub fn strip_section(&self, body: &str) -> String {
        let lines: Vec<String> = body.split('\n').map(|l| l.trim().to_string()).collect();
        self.strip_lines(&lines, None)
    }

    fn strip_lines(&self, lines: &[String], front_end: Option<usize>) -> String {
        let body_start = front_end.unwrap_or(0);
        let mut kept: Vec<Kept> = Vec::with_capacity(lines.len());
        let mut seen_running: HashSet<&str> = HashSet::new();

        for (i, line) in lines.iter().enumerate() {
            if line.is_empty() {
                if !matches!(kept.last(), Some(Kept::Blank) | None) {
                    kept.push(Kept::Blank);
                }
                continue;
            }
            if NOISE.is_noise(line) {
                continue;
            }
            if self.running.contains(line.as_str()) {
                let first = seen_running.insert(line.as_str());
                if !(first && i < body_start) {
                    continue;
                }
                kept.push(Kept::Line {
                    text: line.clone(),
                    prose: false,
                });
                continue;
            }
            if i >= body_start && NOISE.is_caption(line) {
                if self.interleaved(&kept, lines, i) {
                    continue;
                }
                kept.push(Kept::Line {
                    text: line.clone(),
                    prose: false,
                });
                continue;
            }
            let prose = i >= body_start && !HEADINGS.is_heading(line);
            kept.push(Kept::Line {
                text: line.clone(),
                prose,
            });
        }

        rejoin(kept)
    }

    /// 图注截断了句子即视为插入：前一行未结句，或后一行以小写续写
    fn interleaved(&self, kept: &[Kept], lines: &[String], at: usize) -> bool {
        let before_open = match kept.last() {
            Some(Kept::Line { text, prose: true }) => !ends_sentence(text),
            _ => false,
        };
        if before_open {
            return true;
        }

        for next in &lines[at + 1..] {
            if next.is_empty() {
                return false;
            }
            if NOISE.is_noise(next) || self.running.contains(next.as_str()) || NOISE.is_caption(next) {
                continue;
            }
            return !HEADINGS.is_heading(next) && starts_lowercase(next);
        }
        false
    }
}

/// 删除噪声行后，把被隔开的正文行重新接成一段
fn rejoin(kept: Vec<Kept>) -> String {
    let mut out: Vec<(String, bool)> = Vec::with_capacity(kept.len());
    for item in kept {
        match item {
            Kept::Blank => out.push((String::new(), false)),
            Kept::Line { text, prose } => {
                if let Some((prev, true)) = out.last_mut() {
                    if prose && !prev.is_empty() {
                        prev.push(' ');
                        prev.push_str(&text);
                        continue;
                    }
                }
                out.push((text, prose));
            }
        }
    }
    while matches!(out.last(), Some((text, _)) if text.is_empty()) {
        out.pop();
    }
    out.into_iter()
        .map(|(text, _)| text)
        .collect::<Vec<_>>()
        .join("\n")
}

/// 从规范化文本中去除噪声行
pub fn strip_noise(text: &str) -> String {
    NoiseStripper::for_document(text).strip_document()
}
