use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::parser::CaseRecord;

/// 一个 PDF 的处理状态，对应 documents 表的一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DocumentState {
    pub pdf_path: String,
    pub txt_path: String,
    pub size: i64,
    pub mtime_ns: i64,
    pub extractor: String,
    pub extracted_at: String,
    pub doi: String,
    pub record_json: Option<String>,
}

impl DocumentState {
    /// 文件大小与修改时间都一致时视为未变化
    pub fn matches(&self, size: i64, mtime_ns: i64) -> bool {
        self.size == size && self.mtime_ns == mtime_ns
    }

    /// 反序列化保存的记录；旧行或损坏的 JSON 返回 None
    pub fn record(&self) -> Option<CaseRecord> {
        self.record_json
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok())
    }
}
