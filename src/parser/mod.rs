pub mod biblio;
pub mod clinical;
pub mod noise;
pub mod normalizer;
pub mod pdf_parser;
pub mod record;
pub mod segmenter;

pub use biblio::{extract_biblio, Bibliographic};
pub use clinical::{extract_clinical, ClinicalExtractor, ClinicalFindings};
pub use noise::{strip_noise, NoiseStripper};
pub use normalizer::normalize;
pub use pdf_parser::PdfParser;
pub use record::{assemble, CaseRecord};
pub use segmenter::segment;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::LexiconConfig;

/// 多值字段（作者、诊断、所属机构等）的统一分隔符
pub const LIST_SEPARATOR: &str = " | ";

/// 病例报告的固定章节
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Abstract,
    Introduction,
    CasePresentation,
    Discussion,
    FigureLegends,
}

impl SectionKind {
    pub const ALL: [SectionKind; 5] = [
        SectionKind::Abstract,
        SectionKind::Introduction,
        SectionKind::CasePresentation,
        SectionKind::Discussion,
        SectionKind::FigureLegends,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Abstract => "abstract",
            SectionKind::Introduction => "introduction",
            SectionKind::CasePresentation => "case_presentation",
            SectionKind::Discussion => "discussion",
            SectionKind::FigureLegends => "figure_legends",
        }
    }
}

/// 章节名 -> 章节正文。未识别的部分（卷首信息、参考文献等）放在 `unclassified`。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SectionMap {
    sections: BTreeMap<SectionKind, String>,
    unclassified: String,
}

impl SectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: SectionKind) -> Option<&str> {
        self.sections.get(&kind).map(String::as_str)
    }

    /// 章节正文，文档没有该标题时为 ""
    pub fn body(&self, kind: SectionKind) -> &str {
        self.get(kind).unwrap_or("")
    }

    pub fn contains(&self, kind: SectionKind) -> bool {
        self.sections.contains_key(&kind)
    }

    /// 重复出现的章节追加在后，不覆盖
    pub fn append(&mut self, kind: SectionKind, body: &str) {
        let body = body.trim();
        match self.sections.get_mut(&kind) {
            Some(existing) => {
                if !body.is_empty() {
                    if !existing.is_empty() {
                        existing.push_str("\n\n");
                    }
                    existing.push_str(body);
                }
            }
            None => {
                self.sections.insert(kind, body.to_string());
            }
        }
    }

    pub fn append_unclassified(&mut self, body: &str) {
        let body = body.trim();
        if body.is_empty() {
            return;
        }
        if !self.unclassified.is_empty() {
            self.unclassified.push_str("\n\n");
        }
        self.unclassified.push_str(body);
    }

    pub fn unclassified(&self) -> &str {
        &self.unclassified
    }

    pub fn kinds(&self) -> impl Iterator<Item = SectionKind> + '_ {
        self.sections.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// 每个具名章节正文经 `f` 处理后重建
    pub fn map_bodies<F>(&self, mut f: F) -> SectionMap
    where
        F: FnMut(SectionKind, &str) -> String,
    {
        SectionMap {
            sections: self
                .sections
                .iter()
                .map(|(kind, body)| (*kind, f(*kind, body)))
                .collect(),
            unclassified: self.unclassified.clone(),
        }
    }
}

/// 外部后端提取出的单篇原始文本
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub id: String,
    pub text: String,
    pub extractor: String,
}

impl RawDocument {
    pub fn new(id: impl Into<String>, text: impl Into<String>, extractor: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            extractor: extractor.into(),
        }
    }
}

/// 一篇文献经过管道后的全部结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessedDocument {
    pub text: String,
    pub doi: String,
    pub record: CaseRecord,
}

/// 统一提取管道：规范化 -> 分节 -> 去噪 -> 书目/临床信息 -> 记录
pub struct ExtractionPipeline {
    clinical: ClinicalExtractor,
}

impl Default for ExtractionPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionPipeline {
    pub fn new() -> Self {
        Self::with_lexicon(&LexiconConfig::default())
    }

    pub fn with_lexicon(lexicon: &LexiconConfig) -> Self {
        Self {
            clinical: ClinicalExtractor::new(lexicon),
        }
    }

    /// 处理一篇文献的原始文本，返回规范化全文与结构化记录
    pub fn process(&self, doc: &RawDocument) -> ProcessedDocument {
        info!("开始提取管道: {} ({})", doc.id, doc.extractor);

        // 1. 规范化
        let normalized = normalize(&doc.text);
        debug!("规范化后文本长度: {} 字符", normalized.len());

        // 2. 分节（图注在这里被归入 figure_legends）
        let segmented = segment(&normalized);
        info!("识别到 {} 个章节", segmented.len());

        // 3. 去噪：全文与除图注外的每个章节
        let stripper = NoiseStripper::for_document(&normalized);
        let full_text = stripper.strip_document();
        let sections = segmented.map_bodies(|kind, body| match kind {
            SectionKind::FigureLegends => body.to_string(),
            _ => stripper.strip_section(body),
        });

        // 4. 书目信息与临床信息
        let biblio = extract_biblio(&normalized);
        let clinical = self
            .clinical
            .extract(&sections, &biblio.first_author_affiliations);

        // 5. 组装记录
        let record = assemble(&biblio, &clinical, &sections, &full_text);

        ProcessedDocument {
            doi: biblio.doi,
            text: full_text,
            record,
        }
    }
}
