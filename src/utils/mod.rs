pub mod logger;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaseError {
    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("数据库错误: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("CSV写入错误: {0}")]
    CsvError(#[from] csv::Error),

    #[error("输入路径错误: {0}")]
    InputError(String),

    #[error("PDF处理错误: {0}")]
    PdfError(String),

    #[error("提取后端不可用: {0}")]
    BackendUnavailable(String),

    #[error("后台任务失败: {0}")]
    TaskError(String),
}

pub type CaseResult<T> = Result<T, CaseError>;
