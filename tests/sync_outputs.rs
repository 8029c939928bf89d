use std::collections::HashSet;
use std::path::{Path, PathBuf};

use caserep::parser::pdf_parser::TextBackend;
use caserep::parser::{ExtractionPipeline, PdfParser};
use caserep::storage::{read_text, Database};
use caserep::sync::{output_paths, scan_pdfs, sync_txt_outputs, Processor, SyncOptions};
use caserep::utils::{CaseError, CaseResult};

struct FixedText(&'static str);

impl TextBackend for FixedText {
    fn name(&self) -> &str {
        "fixed"
    }

    fn extract(&self, _pdf_path: &Path) -> CaseResult<String> {
        Ok(self.0.to_string())
    }
}

struct Broken;

impl TextBackend for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn extract(&self, _pdf_path: &Path) -> CaseResult<String> {
        Err(CaseError::PdfError("broken xref table".into()))
    }
}

const REPORT_TEXT: &str = "A Case of Fever\n\nAbstract\nA short abstract.\nCase Presentation\nThe patient was diagnosed with influenza.\n";

fn touch(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, b"%PDF-1.4").unwrap();
}

async fn processor(backend: Box<dyn TextBackend>) -> Processor {
    let db = Database::in_memory().await.unwrap();
    Processor::new(
        PdfParser::with_backends(vec![backend]),
        ExtractionPipeline::new(),
        db,
        2,
        true,
    )
}

#[test]
fn scan_is_recursive_sorted_and_case_insensitive() {
    let dir = tempfile::tempdir().unwrap();
    touch(&dir.path().join("b.pdf"));
    touch(&dir.path().join("nested/deeper/A.PDF"));
    touch(&dir.path().join("nested/c.Pdf"));
    std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

    let found = scan_pdfs(dir.path()).unwrap();
    let relative: Vec<PathBuf> = found
        .iter()
        .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
        .collect();
    assert_eq!(
        relative,
        vec![
            PathBuf::from("b.pdf"),
            PathBuf::from("nested/c.Pdf"),
            PathBuf::from("nested/deeper/A.PDF"),
        ]
    );
}

#[test]
fn output_paths_mirror_input_tree() {
    let txt = output_paths(
        Path::new("/in/2024/march/report.pdf"),
        Path::new("/in"),
        Path::new("/out"),
    );
    assert_eq!(txt, PathBuf::from("/out/2024/march/report.txt"));
}

#[test]
fn orphan_outputs_are_removed_and_other_files_kept() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path();
    let kept = out.join("a/keep.txt");
    let orphan = out.join("a/orphan.txt");
    let legacy = out.join("old.meta.json");
    let unrelated = out.join("notes.md");
    for path in [&kept, &orphan, &legacy, &unrelated] {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "x").unwrap();
    }

    let keep: HashSet<PathBuf> = [kept.clone()].into_iter().collect();
    assert_eq!(sync_txt_outputs(out, &keep).unwrap(), 2);
    assert!(kept.exists());
    assert!(unrelated.exists());
    assert!(!orphan.exists());
    assert!(!legacy.exists());
}

#[tokio::test]
async fn incremental_passes_skip_unchanged_and_prune_removed() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    touch(&input.path().join("one.pdf"));
    touch(&input.path().join("sub/two.pdf"));

    let options = SyncOptions {
        input: input.path().to_path_buf(),
        txt_out: output.path().join("txt"),
        csv_out: Some(output.path().join("reports.csv")),
        force: false,
    };
    let processor = processor(Box::new(FixedText(REPORT_TEXT))).await;

    let first = processor.process_pdfs(&options).await.unwrap();
    assert_eq!((first.processed, first.skipped), (2, 0));
    let txt = options.txt_out.join("sub/two.txt");
    assert!(read_text(&txt).unwrap().contains("A short abstract."));

    let mut reader = csv::Reader::from_path(options.csv_out.as_ref().unwrap()).unwrap();
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[0][0].ends_with("one.pdf"));
    assert_eq!(&rows[0][2], "fixed");

    let second = processor.process_pdfs(&options).await.unwrap();
    assert_eq!((second.processed, second.skipped), (0, 2));

    std::fs::remove_file(input.path().join("sub/two.pdf")).unwrap();
    let third = processor.process_pdfs(&options).await.unwrap();
    assert_eq!(third.removed, 1);
    assert!(!txt.exists());
    assert_eq!(processor.database().all_documents().await.unwrap().len(), 1);

    let forced = SyncOptions { force: true, ..options.clone() };
    let fourth = processor.process_pdfs(&forced).await.unwrap();
    assert_eq!((fourth.processed, fourth.skipped), (1, 0));
}

#[tokio::test]
async fn failed_extraction_yields_empty_record() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    touch(&input.path().join("bad.pdf"));

    let options = SyncOptions {
        input: input.path().to_path_buf(),
        txt_out: output.path().to_path_buf(),
        csv_out: None,
        force: false,
    };
    let processor = processor(Box::new(Broken)).await;
    let summary = processor.process_pdfs(&options).await.unwrap();
    assert_eq!(summary.failed, 1);

    assert_eq!(read_text(&output.path().join("bad.txt")).unwrap(), "");
    let stored = processor.database().all_documents().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].record(), Some(Default::default()));
}
