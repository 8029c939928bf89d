use caserep::parser::{CaseRecord, ExtractionPipeline, RawDocument};

const CASE_REPORT: &str = "JOURNAL OF HOSPITAL GENERAL MEDICINE https://doi.org/10.60227/jhgmeibun.2025-0015

Short Case Report

Acute Cholangitis with Normal Liver Function Tests

Koichiro Okumura and Takashi Ikeya

1) Department of General Internal Medicine, Tokyo Metropolitan Ohkubo Hospital, Tokyo, Japan 2) Nephrology Department, Tokyo Metropolitan Ohkubo Hospital, Tokyo, Japan

J Hosp Gen Med 2025:7(6):253-255

Abstract
Acute cholangitis can present without abnormal liver tests.
Introduction
Liver function tests are usually abnormal in cholangitis.
Case Presentation
A 70-year-old man was admitted with
Corresponding author: Koichiro Okumura
fever and jaundice. The test re-
sults were normal.

Although no stone was visible in
Figure 1. Imaging findings on admission.
1A
the papilla, cannulation was difficult.

The patient was diagnosed with acute cholangitis due to choledocholithiasis.
Discussion
Normal liver tests do not exclude cholangitis.
Figure Legends
Figure 1. Imaging findings on admission.
";

fn process(text: &str) -> caserep::parser::ProcessedDocument {
    ExtractionPipeline::new().process(&RawDocument::new("case.pdf", text, "test"))
}

#[test]
fn record_always_has_nineteen_string_fields() {
    let processed = process(CASE_REPORT);
    let value = serde_json::to_value(&processed.record).unwrap();
    let object = value.as_object().unwrap();
    assert_eq!(object.len(), 19);
    assert!(object.values().all(|v| v.is_string()));
    assert_eq!(processed.record.values().len(), CaseRecord::COLUMNS.len());
}

#[test]
fn processing_is_deterministic() {
    assert_eq!(process(CASE_REPORT), process(CASE_REPORT));
}

#[test]
fn front_matter_fields() {
    let processed = process(CASE_REPORT);
    let record = &processed.record;
    assert_eq!(record.paper_title, "Acute Cholangitis with Normal Liver Function Tests");
    assert_eq!(record.authors, "Koichiro Okumura | Takashi Ikeya");
    assert_eq!(record.first_author, "Koichiro Okumura");
    assert_eq!(record.year, "2025");
    assert_eq!(record.volume, "7");
    assert_eq!(record.issue, "6");
    assert_eq!(record.pages, "253-255");
    assert_eq!(record.first_author_specialties, "General Internal Medicine");
    assert_eq!(processed.doi, "10.60227/jhgmeibun.2025-0015");
}

#[test]
fn case_presentation_is_clean_contiguous_prose() {
    let record = process(CASE_REPORT).record;
    let case = &record.case_presentation;
    assert!(case.contains("admitted with fever and jaundice."));
    assert!(case.contains("The test results were normal."));
    assert!(case.contains("visible in the papilla, cannulation was difficult."));
    assert!(!case.contains("Corresponding author"));
    assert!(!case.contains("Figure 1"));
    assert!(!case.lines().any(|line| line.trim() == "1A"));
}

#[test]
fn figure_legends_are_separate_and_deduplicated() {
    let record = process(CASE_REPORT).record;
    assert_eq!(record.discussion, "Normal liver tests do not exclude cholangitis.");
    assert_eq!(
        record.figure_legends.matches("Figure 1. Imaging findings on admission.").count(),
        1
    );
    assert!(!record.discussion.contains("Figure"));
}

#[test]
fn final_diagnosis_from_case_presentation() {
    let record = process(CASE_REPORT).record;
    assert_eq!(record.final_diagnoses, "acute cholangitis due to choledocholithiasis");
}

#[test]
fn missing_citation_leaves_citation_fields_empty() {
    let text = "A Rare Presentation of Sarcoidosis\n\nAbstract\nA short abstract.\nDiscussion\nSarcoidosis was suspected.";
    let processed = process(text);
    let record = &processed.record;
    assert_eq!(record.volume, "");
    assert_eq!(record.issue, "");
    assert_eq!(record.year, "");
    assert_eq!(record.pages, "");
    assert_eq!(record.abstract_text, "A short abstract.");
    assert!(!record.full_text.is_empty());
}

#[test]
fn unstructured_text_still_has_full_text() {
    let record = process("some prose without any headings\nat all").record;
    assert_eq!(record.abstract_text, "");
    assert_eq!(record.discussion, "");
    assert!(record.full_text.contains("some prose without any headings"));
}

#[test]
fn empty_input_gives_empty_record() {
    let processed = process("");
    assert_eq!(processed.record, CaseRecord::default());
    assert_eq!(processed.text, "");
    assert_eq!(processed.doi, "");
}

#[test]
fn prose_after_unterminated_table_caption_stays_in_case_presentation() {
    let text = "Case Presentation\nA 70-year-old man presented with fever.\nTable 1 Laboratory data on admission\nHe was diagnosed with influenza.\nDiscussion\nInfluenza is common.";
    let record = process(text).record;
    assert!(record.case_presentation.contains("He was diagnosed with influenza."));
    assert_eq!(record.figure_legends, "Table 1 Laboratory data on admission");
    assert_eq!(record.final_diagnoses, "influenza");
}
