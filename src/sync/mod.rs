//! 批处理与监视：扫描 PDF，增量提取，写出文本、CSV 并同步处理状态。

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, LexiconConfig};
use crate::parser::{CaseRecord, ExtractionPipeline, PdfParser, RawDocument};
use crate::storage::{write_csv, write_text, CsvRow, Database, DocumentState};
use crate::utils::{CaseError, CaseResult};

/// 旧版本写出的元数据旁路文件，同步时一并清理
const LEGACY_META_SUFFIX: &str = ".meta.json";

pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

fn collect_files(dir: &Path, accept: &dyn Fn(&Path) -> bool, out: &mut Vec<PathBuf>) -> CaseResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, accept, out)?;
        } else if accept(&path) {
            out.push(path);
        }
    }
    Ok(())
}

/// 单个 PDF 文件或目录（递归），结果按路径排序
pub fn scan_pdfs(input: &Path) -> CaseResult<Vec<PathBuf>> {
    if input.is_file() {
        if is_pdf(input) {
            return Ok(vec![input.to_path_buf()]);
        }
        return Err(CaseError::InputError(format!("不是PDF文件: {}", input.display())));
    }
    if !input.is_dir() {
        return Err(CaseError::InputError(format!("输入路径不存在: {}", input.display())));
    }

    let mut pdfs = Vec::new();
    collect_files(input, &is_pdf, &mut pdfs)?;
    pdfs.sort();
    Ok(pdfs)
}

/// 输入为单个文件时以其所在目录为根
pub fn input_root(input: &Path) -> PathBuf {
    if input.is_file() {
        input.parent().map(Path::to_path_buf).unwrap_or_default()
    } else {
        input.to_path_buf()
    }
}

/// `<txt_out>/<相对目录>/<文件名>.txt`
pub fn output_paths(pdf: &Path, input_root: &Path, txt_out: &Path) -> PathBuf {
    let relative = match pdf.strip_prefix(input_root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
        _ => pdf.file_name().map(PathBuf::from).unwrap_or_default(),
    };
    txt_out.join(relative).with_extension("txt")
}

/// 删除 `txt_out` 下不在 `keep` 中的 .txt 与旧 .meta.json 文件，返回删除数量
pub fn sync_txt_outputs(txt_out: &Path, keep: &HashSet<PathBuf>) -> CaseResult<usize> {
    if !txt_out.is_dir() {
        return Ok(0);
    }

    let is_output = |path: &Path| {
        let name = path.to_string_lossy();
        name.ends_with(".txt") || name.ends_with(LEGACY_META_SUFFIX)
    };
    let mut outputs = Vec::new();
    collect_files(txt_out, &is_output, &mut outputs)?;

    let mut removed = 0;
    for path in outputs {
        if keep.contains(&path) {
            continue;
        }
        std::fs::remove_file(&path)?;
        debug!("删除孤立输出: {}", path.display());
        removed += 1;
    }
    if removed > 0 {
        info!("已删除 {} 个孤立输出文件", removed);
    }
    Ok(removed)
}

/// (大小, 修改时间纳秒)
pub fn file_state(path: &Path) -> CaseResult<(i64, i64)> {
    let metadata = std::fs::metadata(path)?;
    let mtime_ns = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    Ok((metadata.len() as i64, mtime_ns))
}

pub fn pdf_states(input: &Path) -> CaseResult<BTreeMap<PathBuf, (i64, i64)>> {
    let mut states = BTreeMap::new();
    for pdf in scan_pdfs(input)? {
        let state = file_state(&pdf)?;
        states.insert(pdf, state);
    }
    Ok(states)
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub input: PathBuf,
    pub txt_out: PathBuf,
    pub csv_out: Option<PathBuf>,
    pub force: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub removed: usize,
}

/// 单个 PDF 的提取结果
#[derive(Debug, Clone)]
pub struct Extraction {
    pub text: String,
    pub extractor: String,
    pub doi: String,
    pub record: CaseRecord,
}

impl Extraction {
    pub fn failed(&self) -> bool {
        self.extractor.is_empty()
    }
}

/// 提取文本并运行管道；所有后端失败时返回空记录
pub fn extract_document(parser: &PdfParser, pipeline: &ExtractionPipeline, pdf: &Path) -> Extraction {
    match parser.extract(pdf) {
        Ok((raw, extractor)) => {
            let doc = RawDocument::new(pdf.display().to_string(), raw, extractor.clone());
            let processed = pipeline.process(&doc);
            Extraction {
                text: processed.text,
                extractor,
                doi: processed.doi,
                record: processed.record,
            }
        }
        Err(e) => {
            warn!("PDF提取失败，输出空记录: {}: {}", pdf.display(), e);
            Extraction {
                text: String::new(),
                extractor: String::new(),
                doi: String::new(),
                record: CaseRecord::default(),
            }
        }
    }
}

struct Job {
    pdf: PathBuf,
    txt: PathBuf,
    size: i64,
    mtime_ns: i64,
}

pub struct Processor {
    parser: Arc<PdfParser>,
    pipeline: Arc<ExtractionPipeline>,
    db: Database,
    workers: usize,
    write_bom: bool,
}

impl Processor {
    pub fn new(
        parser: PdfParser,
        pipeline: ExtractionPipeline,
        db: Database,
        workers: usize,
        write_bom: bool,
    ) -> Self {
        Self {
            parser: Arc::new(parser),
            pipeline: Arc::new(pipeline),
            db,
            workers: workers.max(1),
            write_bom,
        }
    }

    pub fn from_config(config: &AppConfig, lexicon: &LexiconConfig, db: Database) -> CaseResult<Self> {
        Ok(Self::new(
            PdfParser::from_config(&config.extraction)?,
            ExtractionPipeline::with_lexicon(lexicon),
            db,
            config.processing.workers,
            config.output.write_bom,
        ))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// 执行一轮处理
    pub async fn process_pdfs(&self, options: &SyncOptions) -> CaseResult<SyncSummary> {
        let pdfs = scan_pdfs(&options.input)?;
        let root = input_root(&options.input);
        info!("发现 {} 个PDF文件: {}", pdfs.len(), options.input.display());

        let mut summary = SyncSummary::default();
        let mut rows: Vec<CsvRow> = Vec::with_capacity(pdfs.len());
        let mut jobs = Vec::new();

        for pdf in &pdfs {
            let txt = output_paths(pdf, &root, &options.txt_out);
            let (size, mtime_ns) = file_state(pdf)?;
            let key = pdf.to_string_lossy().to_string();

            if !options.force && txt.exists() {
                let stored = self.db.get_document(&key).await?;
                if let Some(state) = stored.filter(|s| s.matches(size, mtime_ns)) {
                    if let Some(record) = state.record() {
                        debug!("未变化，跳过: {}", pdf.display());
                        summary.skipped += 1;
                        rows.push(CsvRow {
                            pdf_path: state.pdf_path,
                            txt_path: state.txt_path,
                            extractor: state.extractor,
                            extracted_at: state.extracted_at,
                            doi: state.doi,
                            record,
                        });
                        continue;
                    }
                }
            }

            jobs.push(Job {
                pdf: pdf.clone(),
                txt,
                size,
                mtime_ns,
            });
        }

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        for job in jobs {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| CaseError::TaskError(e.to_string()))?;
            let parser = Arc::clone(&self.parser);
            let pipeline = Arc::clone(&self.pipeline);
            tasks.spawn_blocking(move || {
                let _permit = permit;
                let extraction = extract_document(&parser, &pipeline, &job.pdf);
                (job, extraction)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (job, extraction) = joined.map_err(|e| CaseError::TaskError(e.to_string()))?;
            write_text(&job.txt, &extraction.text, self.write_bom)?;

            let state = DocumentState {
                pdf_path: job.pdf.to_string_lossy().to_string(),
                txt_path: job.txt.to_string_lossy().to_string(),
                size: job.size,
                mtime_ns: job.mtime_ns,
                extractor: extraction.extractor.clone(),
                extracted_at: chrono::Utc::now().to_rfc3339(),
                doi: extraction.doi.clone(),
                record_json: Some(serde_json::to_string(&extraction.record)?),
            };
            self.db.upsert_document(&state).await?;

            if extraction.failed() {
                summary.failed += 1;
            } else {
                summary.processed += 1;
                info!("已处理: {} -> {}", job.pdf.display(), job.txt.display());
            }
            rows.push(CsvRow {
                pdf_path: state.pdf_path,
                txt_path: state.txt_path,
                extractor: state.extractor,
                extracted_at: state.extracted_at,
                doi: state.doi,
                record: extraction.record,
            });
        }

        rows.sort_by(|a, b| a.pdf_path.cmp(&b.pdf_path));

        let keep_pdfs: HashSet<String> = rows.iter().map(|r| r.pdf_path.clone()).collect();
        let keep_txts: HashSet<PathBuf> = rows.iter().map(|r| PathBuf::from(&r.txt_path)).collect();
        self.db.delete_missing(&keep_pdfs).await?;
        summary.removed = sync_txt_outputs(&options.txt_out, &keep_txts)?;

        if let Some(csv_out) = &options.csv_out {
            write_csv(csv_out, &rows, self.write_bom)?;
        }

        info!(
            "本轮完成: 处理 {} 个, 跳过 {} 个, 失败 {} 个, 清理 {} 个",
            summary.processed, summary.skipped, summary.failed, summary.removed
        );
        Ok(summary)
    }

    /// 轮询输入目录，文件状态变化时重新处理，Ctrl+C 退出
    pub async fn watch(&self, options: &SyncOptions, interval: Duration) -> CaseResult<()> {
        if !options.input.exists() {
            std::fs::create_dir_all(&options.input)?;
            info!("已创建输入目录: {}", options.input.display());
        }
        info!("开始监视 {} (间隔 {:?})，按 Ctrl+C 停止", options.input.display(), interval);

        let mut last_states = None;
        loop {
            match pdf_states(&options.input) {
                Ok(states) if last_states.as_ref() != Some(&states) => {
                    if let Err(e) = self.process_pdfs(options).await {
                        warn!("处理失败，等待下一轮: {}", e);
                    }
                    last_states = Some(states);
                }
                Ok(_) => {}
                Err(e) => warn!("扫描输入目录失败: {}", e),
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("收到停止信号");
                    break;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_for_single_file_input() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("Report.PDF");
        std::fs::write(&pdf, b"%PDF").unwrap();

        let root = input_root(&pdf);
        assert_eq!(root, dir.path());
        assert_eq!(
            output_paths(&pdf, &root, Path::new("/out")),
            PathBuf::from("/out/Report.txt")
        );
        assert_eq!(scan_pdfs(&pdf).unwrap(), vec![pdf]);
    }

    #[test]
    fn non_pdf_and_missing_inputs_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let note = dir.path().join("notes.txt");
        std::fs::write(&note, "x").unwrap();

        assert!(matches!(scan_pdfs(&note), Err(CaseError::InputError(_))));
        assert!(matches!(
            scan_pdfs(&dir.path().join("missing")),
            Err(CaseError::InputError(_))
        ));
    }

    #[test]
    fn states_change_when_a_file_is_added() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"%PDF-1").unwrap();
        let before = pdf_states(dir.path()).unwrap();

        std::fs::write(dir.path().join("b.pdf"), b"%PDF-1").unwrap();
        let after = pdf_states(dir.path()).unwrap();
        assert_ne!(before, after);
        assert_eq!(after.len(), 2);
    }
}
