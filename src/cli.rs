use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::model::{FindingStatus, Severity};

#[derive(Parser, Debug)]
#[command(
    name = "seocann",
    version,
    about = "Local SEO keyword cannibalization detection tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Import(ImportArgs),
    Analyze(AnalyzeArgs),
    List(ListArgs),
    Status(StatusArgs),
    Resolve(ResolveArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    #[arg(long, default_value = ".cache/seocann")]
    pub cache_root: PathBuf,

    /// JSON export of daily per-(keyword, page) search performance rows.
    #[arg(long)]
    pub export_path: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub import_manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[arg(long, default_value = ".cache/seocann")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Trailing window of daily rows to aggregate over.
    #[arg(long, default_value_t = 28)]
    pub days: u32,

    #[arg(long, default_value_t = 2)]
    pub min_pages: usize,

    #[arg(long, default_value_t = 10)]
    pub min_impressions: u64,

    #[arg(long)]
    pub analyze_manifest_path: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum StatusFilter {
    Pending,
    Resolved,
    Ignored,
    All,
}

impl StatusFilter {
    pub fn as_model(self) -> Option<FindingStatus> {
        match self {
            Self::Pending => Some(FindingStatus::Pending),
            Self::Resolved => Some(FindingStatus::Resolved),
            Self::Ignored => Some(FindingStatus::Ignored),
            Self::All => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum SeverityFilter {
    Critical,
    High,
    Medium,
    Low,
}

impl SeverityFilter {
    pub fn as_model(self) -> Severity {
        match self {
            Self::Critical => Severity::Critical,
            Self::High => Severity::High,
            Self::Medium => Severity::Medium,
            Self::Low => Severity::Low,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[arg(long, default_value = ".cache/seocann")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = StatusFilter::Pending)]
    pub status: StatusFilter,

    #[arg(long, value_enum)]
    pub severity: Option<SeverityFilter>,

    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/seocann")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum Resolution {
    Resolved,
    Ignored,
}

impl Resolution {
    pub fn as_model(self) -> FindingStatus {
        match self {
            Self::Resolved => FindingStatus::Resolved,
            Self::Ignored => FindingStatus::Ignored,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ResolveArgs {
    #[arg(long, default_value = ".cache/seocann")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long)]
    pub finding_id: i64,

    #[arg(long, value_enum)]
    pub resolution: Resolution,
}
