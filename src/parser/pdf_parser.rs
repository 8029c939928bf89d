use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};

use crate::config::ExtractionConfig;
use crate::utils::{CaseError, CaseResult};

/// 一种 PDF 文本提取方式
pub trait TextBackend: Send + Sync {
    fn name(&self) -> &str;

    fn extract(&self, pdf_path: &Path) -> CaseResult<String>;
}

/// 调用外部 pdftotext（poppler）
pub struct PdftotextBackend {
    binary: PathBuf,
}

impl PdftotextBackend {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl TextBackend for PdftotextBackend {
    fn name(&self) -> &str {
        "pdftotext"
    }

    fn extract(&self, pdf_path: &Path) -> CaseResult<String> {
        let output = Command::new(&self.binary)
            .args(["-enc", "UTF-8", "-nopgbrk"])
            .arg(pdf_path)
            .arg("-")
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    CaseError::BackendUnavailable(format!("找不到 {}", self.binary.display()))
                }
                _ => CaseError::IoError(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaseError::PdfError(format!(
                "pdftotext 退出码 {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// pdf-extract 库
pub struct PdfExtractBackend;

impl TextBackend for PdfExtractBackend {
    fn name(&self) -> &str {
        "pdf-extract"
    }

    fn extract(&self, pdf_path: &Path) -> CaseResult<String> {
        // 遇到部分损坏字体时 pdf-extract 会 panic
        match std::panic::catch_unwind(|| pdf_extract::extract_text(pdf_path)) {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(CaseError::PdfError(e.to_string())),
            Err(_) => Err(CaseError::PdfError("pdf-extract 解析时崩溃".to_string())),
        }
    }
}

/// lopdf 逐页提取，最后的兜底方案
pub struct LopdfBackend;

impl TextBackend for LopdfBackend {
    fn name(&self) -> &str {
        "lopdf"
    }

    fn extract(&self, pdf_path: &Path) -> CaseResult<String> {
        let document =
            lopdf::Document::load(pdf_path).map_err(|e| CaseError::PdfError(e.to_string()))?;

        let mut text = String::new();
        for page_number in document.get_pages().keys() {
            match document.extract_text(&[*page_number]) {
                Ok(page_text) => {
                    text.push_str(&page_text);
                    text.push('\n');
                }
                Err(e) => debug!("lopdf 跳过第 {} 页: {}", page_number, e),
            }
        }
        Ok(text)
    }
}

/// 按配置顺序尝试各提取后端，返回第一个非空结果
pub struct PdfParser {
    backends: Vec<Box<dyn TextBackend>>,
}

impl Default for PdfParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfParser {
    pub fn new() -> Self {
        Self::with_backends(vec![
            Box::new(PdftotextBackend::new("pdftotext")),
            Box::new(PdfExtractBackend),
            Box::new(LopdfBackend),
        ])
    }

    pub fn with_backends(backends: Vec<Box<dyn TextBackend>>) -> Self {
        Self { backends }
    }

    pub fn from_config(config: &ExtractionConfig) -> CaseResult<Self> {
        let mut backends: Vec<Box<dyn TextBackend>> = Vec::new();
        for name in &config.backends {
            let backend: Box<dyn TextBackend> = match name.as_str() {
                "pdftotext" => Box::new(PdftotextBackend::new(&config.pdftotext_path)),
                "pdf-extract" => Box::new(PdfExtractBackend),
                "lopdf" => Box::new(LopdfBackend),
                other => {
                    return Err(CaseError::ConfigError(format!("未知的提取后端: {}", other)));
                }
            };
            backends.push(backend);
        }
        if backends.is_empty() {
            return Err(CaseError::ConfigError("未配置任何提取后端".to_string()));
        }
        Ok(Self::with_backends(backends))
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// 提取完整文本，返回 (文本, 后端名)
    pub fn extract(&self, pdf_path: &Path) -> CaseResult<(String, String)> {
        if !pdf_path.is_file() {
            return Err(CaseError::InputError(format!(
                "PDF文件不存在: {}",
                pdf_path.display()
            )));
        }

        let mut last_error = None;
        for backend in &self.backends {
            match backend.extract(pdf_path) {
                Ok(text) if !text.trim().is_empty() => {
                    info!(
                        "{} 提取成功: {} ({} 字符)",
                        backend.name(),
                        pdf_path.display(),
                        text.len()
                    );
                    return Ok((text, backend.name().to_string()));
                }
                Ok(_) => {
                    warn!("{} 未提取到文本: {}", backend.name(), pdf_path.display());
                    last_error = Some(CaseError::PdfError(format!(
                        "{} 返回空文本",
                        backend.name()
                    )));
                }
                Err(e) => {
                    warn!("{} 提取失败, 尝试下一个后端: {}", backend.name(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CaseError::PdfError("没有可用的提取后端".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        result: fn() -> CaseResult<String>,
    }

    impl TextBackend for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn extract(&self, _pdf_path: &Path) -> CaseResult<String> {
            (self.result)()
        }
    }

    fn pdf_file() -> tempfile::NamedTempFile {
        tempfile::Builder::new().suffix(".pdf").tempfile().unwrap()
    }

    #[test]
    fn falls_back_past_missing_and_empty_backends() {
        let parser = PdfParser::with_backends(vec![
            Box::new(Fixed {
                name: "missing",
                result: || Err(CaseError::BackendUnavailable("missing".into())),
            }),
            Box::new(Fixed {
                name: "blank",
                result: || Ok("  \n".into()),
            }),
            Box::new(Fixed {
                name: "good",
                result: || Ok("Case Report\ntext".into()),
            }),
        ]);
        let file = pdf_file();
        let (text, backend) = parser.extract(file.path()).unwrap();
        assert_eq!(backend, "good");
        assert_eq!(text, "Case Report\ntext");
    }

    #[test]
    fn all_backends_failing_returns_last_error() {
        let parser = PdfParser::with_backends(vec![
            Box::new(Fixed {
                name: "a",
                result: || Err(CaseError::BackendUnavailable("a".into())),
            }),
            Box::new(Fixed {
                name: "b",
                result: || Err(CaseError::PdfError("broken xref".into())),
            }),
        ]);
        let file = pdf_file();
        match parser.extract(file.path()) {
            Err(CaseError::PdfError(message)) => assert_eq!(message, "broken xref"),
            other => panic!("unexpected result: {:?}", other.map(|(_, b)| b)),
        }
    }

    #[test]
    fn missing_file_is_an_input_error() {
        let parser = PdfParser::new();
        assert!(matches!(
            parser.extract(Path::new("/nonexistent/report.pdf")),
            Err(CaseError::InputError(_))
        ));
    }

    #[test]
    fn missing_pdftotext_binary_is_unavailable() {
        let backend = PdftotextBackend::new("/nonexistent/bin/pdftotext");
        let file = pdf_file();
        assert!(matches!(
            backend.extract(file.path()),
            Err(CaseError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn backends_follow_configured_order() {
        let mut config = crate::config::AppConfig::default().extraction;
        config.backends = vec!["lopdf".into(), "pdftotext".into()];
        let parser = PdfParser::from_config(&config).unwrap();
        assert_eq!(parser.backend_names(), vec!["lopdf", "pdftotext"]);

        config.backends = vec!["ocr".into()];
        assert!(matches!(PdfParser::from_config(&config), Err(CaseError::ConfigError(_))));
    }
}
