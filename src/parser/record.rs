use serde::{Deserialize, Serialize};

use super::biblio::Bibliographic;
use super::clinical::ClinicalFindings;
use super::{SectionKind, SectionMap};

/// 一篇病例报告的结构化记录。所有字段都是字符串，缺失值为空串。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub paper_title: String,
    pub journal_name: String,
    pub volume: String,
    pub issue: String,
    pub year: String,
    pub pages: String,
    pub authors: String,
    pub first_author: String,
    pub first_author_affiliations: String,
    pub first_author_specialties: String,
    pub tentative_diagnoses: String,
    pub final_diagnoses: String,
    pub affiliations: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub introduction: String,
    pub case_presentation: String,
    pub discussion: String,
    pub figure_legends: String,
    pub full_text: String,
}

impl CaseRecord {
    /// 表格输出的列顺序
    pub const COLUMNS: [&'static str; 19] = [
        "paper_title",
        "journal_name",
        "volume",
        "issue",
        "year",
        "pages",
        "authors",
        "first_author",
        "first_author_affiliations",
        "first_author_specialties",
        "tentative_diagnoses",
        "final_diagnoses",
        "affiliations",
        "abstract",
        "introduction",
        "case_presentation",
        "discussion",
        "figure_legends",
        "full_text",
    ];

    /// 与 `COLUMNS` 同序的字段值
    pub fn values(&self) -> [&str; 19] {
        [
            self.paper_title.as_str(),
            self.journal_name.as_str(),
            self.volume.as_str(),
            self.issue.as_str(),
            self.year.as_str(),
            self.pages.as_str(),
            self.authors.as_str(),
            self.first_author.as_str(),
            self.first_author_affiliations.as_str(),
            self.first_author_specialties.as_str(),
            self.tentative_diagnoses.as_str(),
            self.final_diagnoses.as_str(),
            self.affiliations.as_str(),
            self.abstract_text.as_str(),
            self.introduction.as_str(),
            self.case_presentation.as_str(),
            self.discussion.as_str(),
            self.figure_legends.as_str(),
            self.full_text.as_str(),
        ]
    }
}

/// 合并书目、临床信息与章节正文，生成记录
pub fn assemble(
    biblio: &Bibliographic,
    clinical: &ClinicalFindings,
    sections: &SectionMap,
    full_text: &str,
) -> CaseRecord {
    let section = |kind: SectionKind| sections.body(kind).to_string();
    CaseRecord {
        paper_title: biblio.paper_title.clone(),
        journal_name: biblio.journal_name.clone(),
        volume: biblio.volume.clone(),
        issue: biblio.issue.clone(),
        year: biblio.year.clone(),
        pages: biblio.pages.clone(),
        authors: biblio.authors.clone(),
        first_author: biblio.first_author.clone(),
        first_author_affiliations: biblio.first_author_affiliations.clone(),
        first_author_specialties: clinical.first_author_specialties.clone(),
        tentative_diagnoses: clinical.tentative_diagnoses.clone(),
        final_diagnoses: clinical.final_diagnoses.clone(),
        affiliations: biblio.affiliations.clone(),
        abstract_text: section(SectionKind::Abstract),
        introduction: section(SectionKind::Introduction),
        case_presentation: section(SectionKind::CasePresentation),
        discussion: section(SectionKind::Discussion),
        figure_legends: section(SectionKind::FigureLegends),
        full_text: full_text.to_string(),
    }
}
