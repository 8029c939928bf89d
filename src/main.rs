use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use caserep::config::{AppConfig, LexiconConfig, KEYWORDS_PATH, SETTINGS_PATH};
use caserep::parser::{ExtractionPipeline, PdfParser, RawDocument};
use caserep::storage::Database;
use caserep::sync::{Processor, SyncOptions};
use caserep::utils::logger;

#[derive(Parser)]
#[command(name = "caserep")]
#[command(about = "病例报告PDF结构化提取工具", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct OutputArgs {
    /// 输入PDF文件或目录
    #[arg(short, long)]
    input: PathBuf,
    /// 文本输出目录（默认取配置）
    #[arg(long)]
    txt_out: Option<PathBuf>,
    /// CSV输出文件（默认取配置）
    #[arg(long)]
    csv_out: Option<PathBuf>,
    /// 忽略已保存的处理状态，全部重新提取
    #[arg(long)]
    force: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// 初始化配置和数据库
    Init,
    /// 批量提取一次
    Extract(OutputArgs),
    /// 监视目录，文件变化时自动提取
    Watch {
        #[command(flatten)]
        output: OutputArgs,
        /// 轮询间隔（秒）
        #[arg(long)]
        interval: Option<u64>,
    },
    /// 提取单个PDF并打印记录
    Show {
        pdf: PathBuf,
    },
    /// 清理生成的文本和处理状态
    Clean,
}

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_logger();
    info!("caserep 启动");

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init_command().await?;
        }
        Commands::Extract(output) => {
            extract_command(output).await?;
        }
        Commands::Watch { output, interval } => {
            watch_command(output, interval).await?;
        }
        Commands::Show { pdf } => {
            show_command(&pdf)?;
        }
        Commands::Clean => {
            clean_command().await?;
        }
    }

    Ok(())
}

async fn init_command() -> Result<()> {
    info!("初始化系统...");

    let app_config = AppConfig::default();
    tokio::fs::create_dir_all(&app_config.output.txt_dir).await?;
    tokio::fs::create_dir_all("config").await?;

    app_config.save(SETTINGS_PATH)?;
    info!("已生成配置文件: {}", SETTINGS_PATH);

    LexiconConfig::default().save(KEYWORDS_PATH)?;
    info!("已生成科室关键词配置: {}", KEYWORDS_PATH);

    let db = open_database(&app_config).await?;
    db.init_schema().await?;
    info!("数据库初始化完成");

    info!("✅ 系统初始化完成！");
    info!("下一步:");
    info!("  1. 编辑 {} 配置提取后端和输出路径", SETTINGS_PATH);
    info!("  2. 运行 'caserep extract --input <PDF目录>' 开始提取");

    Ok(())
}

async fn open_database(config: &AppConfig) -> Result<Database> {
    if let Some(parent) = Path::new(&config.storage.database_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let db = Database::new(&config.database_url())
        .await
        .with_context(|| format!("无法打开数据库 {}", config.storage.database_path))?;
    db.init_schema().await?;
    Ok(db)
}

async fn build_processor(config: &AppConfig) -> Result<Processor> {
    let lexicon = LexiconConfig::load().context("读取科室关键词配置失败")?;
    let db = open_database(config).await?;
    Ok(Processor::from_config(config, &lexicon, db)?)
}

fn sync_options(config: &AppConfig, args: OutputArgs) -> SyncOptions {
    SyncOptions {
        input: args.input,
        txt_out: args
            .txt_out
            .unwrap_or_else(|| PathBuf::from(&config.output.txt_dir)),
        csv_out: Some(
            args.csv_out
                .unwrap_or_else(|| PathBuf::from(&config.output.csv_path)),
        ),
        force: args.force,
    }
}

async fn extract_command(args: OutputArgs) -> Result<()> {
    let app_config = AppConfig::load().context("读取配置失败")?;
    let processor = build_processor(&app_config).await?;
    let options = sync_options(&app_config, args);

    info!("开始提取: {}", options.input.display());
    let summary = processor
        .process_pdfs(&options)
        .await
        .with_context(|| format!("处理 {} 失败", options.input.display()))?;

    info!(
        "✅ 提取完成: 新处理 {} 个, 未变化 {} 个, 失败 {} 个",
        summary.processed, summary.skipped, summary.failed
    );
    if let Some(csv) = &options.csv_out {
        info!("CSV: {}", csv.display());
    }
    Ok(())
}

async fn watch_command(args: OutputArgs, interval: Option<u64>) -> Result<()> {
    let app_config = AppConfig::load().context("读取配置失败")?;
    let processor = build_processor(&app_config).await?;
    let options = sync_options(&app_config, args);
    let interval = Duration::from_secs(interval.unwrap_or(app_config.watch.interval_secs).max(1));

    processor.watch(&options, interval).await?;
    info!("监视已停止");
    Ok(())
}

fn show_command(pdf: &Path) -> Result<()> {
    let app_config = AppConfig::load().context("读取配置失败")?;
    let lexicon = LexiconConfig::load().context("读取科室关键词配置失败")?;
    let parser = PdfParser::from_config(&app_config.extraction)?;
    let pipeline = ExtractionPipeline::with_lexicon(&lexicon);

    let (text, extractor) = parser
        .extract(pdf)
        .with_context(|| format!("无法提取 {}", pdf.display()))?;
    let processed = pipeline.process(&RawDocument::new(pdf.display().to_string(), text, extractor));

    println!("{}", serde_json::to_string_pretty(&processed.record)?);
    Ok(())
}

async fn clean_command() -> Result<()> {
    info!("开始清理生成数据...");

    let app_config = AppConfig::load().context("读取配置失败")?;

    let txt_dir = Path::new(&app_config.output.txt_dir);
    if txt_dir.is_dir() {
        let removed = caserep::sync::sync_txt_outputs(txt_dir, &Default::default())?;
        info!("已清理 {}: {} 个文件", txt_dir.display(), removed);
    } else {
        info!("目录不存在，跳过: {}", txt_dir.display());
    }

    match Database::new(&app_config.database_url()).await {
        Ok(db) => {
            db.init_schema().await?;
            db.clear_all_tables().await?;
        }
        Err(e) => {
            info!("数据库连接失败，跳过清空: {}", e);
        }
    }

    info!("✅ 清理完成");
    Ok(())
}
