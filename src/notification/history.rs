//! 通知历史 - 本地 JSON 数组文件
//!
//! 每次写入：加锁 → 读取整个数组 → 修改 → 截断到最近 N 条 → 写临时文件并原子替换。
//! 文件损坏时读取返回空列表，写入返回错误，不会覆盖损坏的文件。

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Days, Local, NaiveDate, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::priority::Priority;
use crate::clock::{Clock, SystemClock};

/// 单条消息最多保存的字符数
pub const MAX_MESSAGE_CHARS: usize = 1000;
/// 默认保留条数
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// 历史记录条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl NotificationLogEntry {
    /// 新条目，消息截断到 1000 字符
    pub fn new(
        title: impl Into<String>,
        message: &str,
        priority: Priority,
        tags: Vec<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_id(),
            timestamp,
            title: title.into(),
            message: message.chars().take(MAX_MESSAGE_CHARS).collect(),
            priority,
            tags,
            success: false,
            error: None,
            attempts: 0,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_outcome(mut self, success: bool, error: Option<String>, attempts: u32) -> Self {
        self.success = success;
        self.error = error;
        self.attempts = attempts;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// 本地日期（用于按天过滤和统计）
    pub fn local_date(&self) -> NaiveDate {
        self.timestamp.with_timezone(&Local).date_naive()
    }

    pub fn local_time(&self) -> String {
        self.timestamp.with_timezone(&Local).format("%H:%M:%S").to_string()
    }
}

/// 8 位 ID
fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// 查询过滤条件
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// 包含当天
    pub since: Option<NaiveDate>,
    /// 包含当天
    pub until: Option<NaiveDate>,
    pub priority: Option<Priority>,
    /// `Some(true)` 只要成功的，`Some(false)` 只要失败的
    pub success: Option<bool>,
    /// 标题或消息中包含（大小写不敏感）
    pub search: Option<String>,
    pub limit: Option<usize>,
}

impl HistoryFilter {
    pub fn matches(&self, entry: &NotificationLogEntry) -> bool {
        let date = entry.local_date();
        if self.since.is_some_and(|since| date < since) {
            return false;
        }
        if self.until.is_some_and(|until| date > until) {
            return false;
        }
        if self.priority.is_some_and(|p| entry.priority != p) {
            return false;
        }
        if self.success.is_some_and(|s| entry.success != s) {
            return false;
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !entry.title.to_lowercase().contains(&needle)
                && !entry.message.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

/// 统计结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub period_days: u32,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// 百分比，保留一位小数
    pub success_rate: f64,
    pub by_priority: BTreeMap<String, usize>,
    pub by_day: BTreeMap<String, usize>,
    pub by_hour: BTreeMap<String, usize>,
    /// 最常见的 10 个标签
    pub common_tags: Vec<(String, usize)>,
}

/// 存储概况
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageInfo {
    pub count: usize,
    pub file_size_kb: f64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    /// 文件无法解析：读取为空，写入会失败，需要手动修复或 clear
    pub corrupt: bool,
}

/// 导出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Markdown,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Markdown => "md",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            other => Err(format!("unknown export format: {}", other)),
        }
    }
}

/// 通知历史
pub struct HistoryLog {
    path: PathBuf,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_entries: DEFAULT_MAX_ENTRIES,
            clock: Arc::new(SystemClock),
        }
    }

    /// 设置保留条数（至少 1）
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一条记录
    pub fn log(&self, entry: NotificationLogEntry) -> Result<()> {
        let max_entries = self.max_entries;
        self.modify(|entries| {
            entries.push(entry);
            truncate_to_recent(entries, max_entries);
        })
    }

    /// 更新已有记录的结果，返回是否找到
    pub fn complete(&self, id: &str, success: bool, error: Option<String>, attempts: u32) -> Result<bool> {
        let mut found = false;
        self.modify(|entries| {
            if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
                entry.success = success;
                entry.error = error;
                entry.attempts = attempts;
                found = true;
            }
        })?;
        Ok(found)
    }

    /// 全部记录（按写入顺序）；文件缺失或损坏时返回空
    pub fn entries(&self) -> Vec<NotificationLogEntry> {
        match self.read_entries() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read notification history");
                Vec::new()
            }
        }
    }

    /// 按条件查询，最新的在前
    pub fn query(&self, filter: &HistoryFilter) -> Vec<NotificationLogEntry> {
        let mut results: Vec<NotificationLogEntry> = self
            .entries()
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect();
        // 稳定排序，同一时间戳的后写入者在前
        results.reverse();
        results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = filter.limit {
            results.truncate(limit);
        }
        results
    }

    pub fn recent(&self, count: usize) -> Vec<NotificationLogEntry> {
        self.query(&HistoryFilter {
            limit: Some(count),
            ..Default::default()
        })
    }

    pub fn failed(&self) -> Vec<NotificationLogEntry> {
        self.query(&HistoryFilter {
            success: Some(false),
            ..Default::default()
        })
    }

    pub fn search(&self, text: &str, limit: usize) -> Vec<NotificationLogEntry> {
        self.query(&HistoryFilter {
            search: Some(text.to_string()),
            limit: Some(limit),
            ..Default::default()
        })
    }

    /// 最近 N 天的统计
    pub fn statistics(&self, days: u32) -> Statistics {
        let since = self.days_ago(days);
        let entries = self.query(&HistoryFilter {
            since: Some(since),
            ..Default::default()
        });

        let total = entries.len();
        let successful = entries.iter().filter(|e| e.success).count();

        let mut by_priority = BTreeMap::new();
        let mut by_day = BTreeMap::new();
        let mut by_hour = BTreeMap::new();
        let mut tag_counts: HashMap<&str, usize> = HashMap::new();

        for entry in &entries {
            *by_priority.entry(entry.priority.to_string()).or_insert(0) += 1;
            *by_day.entry(entry.local_date().to_string()).or_insert(0) += 1;
            let hour = entry.timestamp.with_timezone(&Local).format("%H").to_string();
            *by_hour.entry(hour).or_insert(0) += 1;
            for tag in &entry.tags {
                *tag_counts.entry(tag.as_str()).or_insert(0) += 1;
            }
        }

        let mut common_tags: Vec<(String, usize)> = tag_counts
            .into_iter()
            .map(|(tag, count)| (tag.to_string(), count))
            .collect();
        common_tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        common_tags.truncate(10);

        let success_rate = if total > 0 {
            (successful as f64 / total as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };

        Statistics {
            period_days: days,
            total,
            successful,
            failed: total - successful,
            success_rate,
            by_priority,
            by_day,
            by_hour,
            common_tags,
        }
    }

    /// 导出为字符串；行数与 `query(filter)` 一致
    pub fn export(&self, format: ExportFormat, filter: &HistoryFilter) -> String {
        let entries = self.query(filter);
        match format {
            ExportFormat::Csv => render_csv(&entries),
            ExportFormat::Markdown => render_markdown(&entries, self.clock.now()),
        }
    }

    /// 导出到文件；`output` 为空时写到 `dir/notifications_<时间>.<ext>`
    ///
    /// 没有匹配记录时返回 `None`，不创建文件。
    pub fn export_to_file(
        &self,
        format: ExportFormat,
        filter: &HistoryFilter,
        output: Option<&Path>,
        dir: &Path,
    ) -> Result<Option<PathBuf>> {
        if self.query(filter).is_empty() {
            return Ok(None);
        }

        let path = match output {
            Some(path) => path.to_path_buf(),
            None => {
                fs::create_dir_all(dir)?;
                let stamp = self.clock.now().with_timezone(&Local).format("%Y%m%d_%H%M%S");
                dir.join(format!("notifications_{}.{}", stamp, format.extension()))
            }
        };

        fs::write(&path, self.export(format, filter))
            .with_context(|| format!("Failed to write export to {}", path.display()))?;
        Ok(Some(path))
    }

    /// 删除 N 天之前的记录，返回删除条数
    pub fn prune_older_than(&self, days: u32) -> Result<usize> {
        let cutoff = self.days_ago(days);
        let mut removed = 0;
        self.modify(|entries| {
            let before = entries.len();
            entries.retain(|e| e.local_date() >= cutoff);
            removed = before - entries.len();
        })?;
        debug!(removed, days, "Pruned notification history");
        Ok(removed)
    }

    /// 删除历史文件
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    pub fn storage_info(&self) -> StorageInfo {
        let (entries, corrupt) = match self.read_entries() {
            Ok(entries) => (entries, false),
            Err(e) => {
                warn!(error = %e, "Failed to read notification history");
                (Vec::new(), true)
            }
        };
        let file_size = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        StorageInfo {
            count: entries.len(),
            file_size_kb: (file_size as f64 / 1024.0 * 100.0).round() / 100.0,
            oldest: entries.iter().map(|e| e.timestamp).min(),
            newest: entries.iter().map(|e| e.timestamp).max(),
            corrupt,
        }
    }

    /// 历史文件存在但无法解析
    pub fn is_corrupt(&self) -> bool {
        self.read_entries().is_err()
    }

    /// 本地日期往前 N 天；超出日期范围时取 `NaiveDate::MIN`
    fn days_ago(&self, days: u32) -> NaiveDate {
        self.clock
            .now()
            .with_timezone(&Local)
            .date_naive()
            .checked_sub_days(Days::new(days.into()))
            .unwrap_or(NaiveDate::MIN)
    }

    fn read_entries(&self) -> Result<Vec<NotificationLogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content)
            .map_err(|e| anyhow!("notification history is corrupt ({}): {}", self.path.display(), e))
    }

    /// 加锁执行读-改-写
    fn modify<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<NotificationLogEntry>),
    {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())?;
        lock.lock_exclusive()?;

        let result = (|| {
            let mut entries = self.read_entries()?;
            f(&mut entries);
            self.write_entries(&entries)
        })();

        lock.unlock()?;
        result
    }

    fn write_entries(&self, entries: &[NotificationLogEntry]) -> Result<()> {
        let temp_path = self.path.with_extension("tmp");
        {
            let file = File::create(&temp_path)?;
            serde_json::to_writer_pretty(file, entries)?;
        }
        // 原子替换
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn lock_path(&self) -> PathBuf {
        let mut name: OsString = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }
}

fn truncate_to_recent(entries: &mut Vec<NotificationLogEntry>, max_entries: usize) {
    if entries.len() > max_entries {
        let excess = entries.len() - max_entries;
        entries.drain(..excess);
    }
}

const CSV_FIELDS: [&str; 8] = ["date", "time", "title", "message", "priority", "tags", "success", "error"];

fn render_csv(entries: &[NotificationLogEntry]) -> String {
    let mut out = CSV_FIELDS.join(",");
    out.push('\n');
    for entry in entries {
        let row = [
            entry.local_date().to_string(),
            entry.local_time(),
            entry.title.clone(),
            entry.message.replace(['\r', '\n'], " "),
            entry.priority.to_string(),
            entry.tags.join(","),
            if entry.success { "True" } else { "False" }.to_string(),
            entry.error.clone().unwrap_or_default(),
        ];
        let fields: Vec<String> = row.iter().map(|f| csv_field(f)).collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn render_markdown(entries: &[NotificationLogEntry], now: DateTime<Utc>) -> String {
    let mut lines = vec![
        "# Notification History".to_string(),
        String::new(),
        format!("**Exported:** {}", now.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")),
        format!("**Total:** {} notifications", entries.len()),
        String::new(),
        "---".to_string(),
        String::new(),
    ];

    for entry in entries {
        let status = if entry.success { "SUCCESS" } else { "FAILED" };
        let tags = if entry.tags.is_empty() {
            "None".to_string()
        } else {
            entry.tags.join(", ")
        };
        let title = if entry.title.is_empty() { "Untitled" } else { &entry.title };

        lines.push(format!("## {}", title));
        lines.push(String::new());
        lines.push(format!("- **Date:** {} {}", entry.local_date(), entry.local_time()));
        lines.push(format!("- **Priority:** {}", entry.priority));
        lines.push(format!("- **Status:** {}", status));
        lines.push(format!("- **Tags:** {}", tags));
        if let Some(error) = &entry.error {
            lines.push(format!("- **Error:** {}", error));
        }
        lines.push(String::new());
        lines.push(entry.message.clone());
        lines.push(String::new());
        lines.push("---".to_string());
        lines.push(String::new());
    }

    lines.join("\n")
}
