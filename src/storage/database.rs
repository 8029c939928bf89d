use std::collections::HashSet;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::storage::models::DocumentState;
use crate::utils::CaseResult;

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> CaseResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(
                database_url
                    .parse::<SqliteConnectOptions>()?
                    .create_if_missing(true),
            )
            .await?;

        info!("数据库连接成功: {}", database_url);
        Ok(Self { pool })
    }

    /// 内存数据库，只用一个连接，否则每个连接各自一份库
    pub async fn in_memory() -> CaseResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    pub async fn init_schema(&self) -> CaseResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                pdf_path TEXT PRIMARY KEY,
                txt_path TEXT NOT NULL,
                size INTEGER NOT NULL,
                mtime_ns INTEGER NOT NULL,
                extractor TEXT NOT NULL DEFAULT '',
                extracted_at TEXT NOT NULL DEFAULT '',
                doi TEXT NOT NULL DEFAULT '',
                record_json TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("数据库表结构初始化完成");
        Ok(())
    }

    /// 保存处理状态，同一 PDF 覆盖旧行
    pub async fn upsert_document(&self, doc: &DocumentState) -> CaseResult<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (pdf_path, txt_path, size, mtime_ns, extractor, extracted_at, doi, record_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(pdf_path) DO UPDATE SET
                txt_path = excluded.txt_path,
                size = excluded.size,
                mtime_ns = excluded.mtime_ns,
                extractor = excluded.extractor,
                extracted_at = excluded.extracted_at,
                doi = excluded.doi,
                record_json = excluded.record_json
            "#,
        )
        .bind(&doc.pdf_path)
        .bind(&doc.txt_path)
        .bind(doc.size)
        .bind(doc.mtime_ns)
        .bind(&doc.extractor)
        .bind(&doc.extracted_at)
        .bind(&doc.doi)
        .bind(&doc.record_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_document(&self, pdf_path: &str) -> CaseResult<Option<DocumentState>> {
        let doc = sqlx::query_as::<_, DocumentState>("SELECT * FROM documents WHERE pdf_path = ?")
            .bind(pdf_path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doc)
    }

    pub async fn all_documents(&self) -> CaseResult<Vec<DocumentState>> {
        let docs =
            sqlx::query_as::<_, DocumentState>("SELECT * FROM documents ORDER BY pdf_path")
                .fetch_all(&self.pool)
                .await?;
        Ok(docs)
    }

    /// 删除不在 `keep` 中的行，返回删除数量
    pub async fn delete_missing(&self, keep: &HashSet<String>) -> CaseResult<u64> {
        let mut removed = 0;
        for doc in self.all_documents().await? {
            if keep.contains(&doc.pdf_path) {
                continue;
            }
            removed += sqlx::query("DELETE FROM documents WHERE pdf_path = ?")
                .bind(&doc.pdf_path)
                .execute(&self.pool)
                .await?
                .rows_affected();
        }
        if removed > 0 {
            info!("已删除 {} 条过期处理记录", removed);
        }
        Ok(removed)
    }

    /// 清空所有数据表（保留表结构）
    pub async fn clear_all_tables(&self) -> CaseResult<()> {
        sqlx::query("DELETE FROM documents")
            .execute(&self.pool)
            .await?;
        info!("已清空数据表: documents");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(path: &str, size: i64) -> DocumentState {
        DocumentState {
            pdf_path: path.to_string(),
            txt_path: format!("{}.txt", path),
            size,
            mtime_ns: 1_700_000_000_000_000_000,
            extractor: "pdftotext".to_string(),
            extracted_at: "2024-01-01T00:00:00+00:00".to_string(),
            doi: String::new(),
            record_json: None,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_existing_row() {
        let db = Database::in_memory().await.unwrap();
        db.upsert_document(&state("a.pdf", 10)).await.unwrap();

        let mut updated = state("a.pdf", 20);
        updated.doi = "10.2169/internalmedicine.1234-22".to_string();
        db.upsert_document(&updated).await.unwrap();

        let stored = db.get_document("a.pdf").await.unwrap().unwrap();
        assert_eq!(stored, updated);
        assert_eq!(db.all_documents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_missing_keeps_listed_paths() {
        let db = Database::in_memory().await.unwrap();
        for path in ["a.pdf", "b.pdf", "c.pdf"] {
            db.upsert_document(&state(path, 1)).await.unwrap();
        }

        let keep: HashSet<String> = ["b.pdf".to_string()].into_iter().collect();
        assert_eq!(db.delete_missing(&keep).await.unwrap(), 2);

        let remaining: Vec<String> = db
            .all_documents()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.pdf_path)
            .collect();
        assert_eq!(remaining, vec!["b.pdf"]);
    }

    #[tokio::test]
    async fn stored_record_round_trips() {
        let db = Database::in_memory().await.unwrap();
        let mut doc = state("a.pdf", 1);
        let record = crate::parser::CaseRecord {
            paper_title: "Title".into(),
            ..Default::default()
        };
        doc.record_json = Some(serde_json::to_string(&record).unwrap());
        db.upsert_document(&doc).await.unwrap();

        let stored = db.get_document("a.pdf").await.unwrap().unwrap();
        assert!(stored.matches(1, doc.mtime_ns));
        assert!(!stored.matches(2, doc.mtime_ns));
        assert_eq!(stored.record(), Some(record));

        db.clear_all_tables().await.unwrap();
        assert!(db.get_document("a.pdf").await.unwrap().is_none());
    }
}
