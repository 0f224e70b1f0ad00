//! 兜底日志 - 重试全部失败的通知追加到纯文本文件

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const RULE: &str = "================================================================================";

/// 失败通知的兜底日志（只追加）
#[derive(Debug, Clone)]
pub struct FallbackLog {
    path: PathBuf,
}

impl FallbackLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一条失败记录
    pub fn record(&self, title: &str, message: &str, error: &str, at: DateTime<Utc>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let timestamp = at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S");
        write!(
            file,
            "\n{rule}\nFAILED NOTIFICATION - {timestamp}\n{rule}\nTitle: {title}\nMessage:\n{message}\nError: {error}\n{rule}\n",
            rule = RULE,
        )?;

        debug!(path = %self.path.display(), "Failed notification written to fallback log");
        Ok(())
    }

    /// 写入失败时只记日志，不向上传播
    pub fn record_or_warn(&self, title: &str, message: &str, error: &str, at: DateTime<Utc>) -> bool {
        match self.record(title, message, error, at) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Could not write to fallback log");
                false
            }
        }
    }
}
