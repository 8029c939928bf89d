use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::{QuoteStyle, Terminator, WriterBuilder};
use tracing::info;

use crate::parser::CaseRecord;
use crate::utils::CaseResult;

/// UTF-8 BOM，表格软件据此识别编码
pub const BOM: &str = "\u{feff}";

/// CSV 中位于记录字段之前的处理信息列
pub const PREFIX_COLUMNS: [&str; 5] = ["pdf_path", "txt_path", "extractor", "extracted_at", "doi"];

/// CSV 的一行
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvRow {
    pub pdf_path: String,
    pub txt_path: String,
    pub extractor: String,
    pub extracted_at: String,
    pub doi: String,
    pub record: CaseRecord,
}

impl CsvRow {
    fn fields(&self) -> Vec<&str> {
        let mut fields = vec![
            self.pdf_path.as_str(),
            self.txt_path.as_str(),
            self.extractor.as_str(),
            self.extracted_at.as_str(),
            self.doi.as_str(),
        ];
        fields.extend(self.record.values());
        fields
    }
}

pub fn csv_header() -> Vec<&'static str> {
    PREFIX_COLUMNS
        .iter()
        .chain(CaseRecord::COLUMNS.iter())
        .copied()
        .collect()
}

fn ensure_parent(path: &Path) -> CaseResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// 写出规范化文本（LF 换行），可选 BOM
pub fn write_text(path: &Path, text: &str, bom: bool) -> CaseResult<()> {
    ensure_parent(path)?;
    let mut file = File::create(path)?;
    if bom {
        file.write_all(BOM.as_bytes())?;
    }
    file.write_all(text.as_bytes())?;
    Ok(())
}

/// 读取文本文件并去掉开头的 BOM
pub fn read_text(path: &Path) -> CaseResult<String> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .strip_prefix(BOM)
        .map(str::to_string)
        .unwrap_or(content))
}

/// 写出 CSV：全部字段加引号，CRLF 换行
pub fn write_csv(path: &Path, rows: &[CsvRow], bom: bool) -> CaseResult<()> {
    ensure_parent(path)?;
    let mut file = File::create(path)?;
    if bom {
        file.write_all(BOM.as_bytes())?;
    }

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::CRLF)
        .from_writer(file);
    writer.write_record(csv_header())?;
    for row in rows {
        writer.write_record(row.fields())?;
    }
    writer.flush()?;

    info!("CSV 已写出: {} ({} 行)", path.display(), rows.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_round_trips_without_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("case.txt");
        write_text(&path, "Case Report\nline two", true).unwrap();

        let raw = std::fs::read(&path).unwrap();
        assert!(raw.starts_with(BOM.as_bytes()));
        assert_eq!(read_text(&path).unwrap(), "Case Report\nline two");
    }

    #[test]
    fn csv_quotes_every_field_and_uses_crlf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let row = CsvRow {
            pdf_path: "in/a.pdf".into(),
            txt_path: "out/a.txt".into(),
            extractor: "pdftotext".into(),
            record: CaseRecord {
                paper_title: "Fever, \"rash\"\nand pain".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        write_csv(&path, &[row], true).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let body = content.strip_prefix(BOM).unwrap();
        assert!(body.starts_with("\"pdf_path\",\"txt_path\",\"extractor\",\"extracted_at\",\"doi\",\"paper_title\""));
        assert!(body.contains("\"Fever, \"\"rash\"\"\nand pain\""));
        assert!(body.ends_with("\r\n"));

        let mut reader = csv::Reader::from_reader(body.as_bytes());
        assert_eq!(reader.headers().unwrap().len(), 24);
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(&records[0][5], "Fever, \"rash\"\nand pain");
    }
}
