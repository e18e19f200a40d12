//! 工具函数模块

/// 路径工具函数
pub mod path_utils {
    use std::env;
    use std::path::PathBuf;

    /// 展开开头的 `~`
    ///
    /// # Examples
    ///
    /// ```
    /// use clash_manager::utils::path_utils::expand_tilde;
    ///
    /// assert_eq!(expand_tilde("/etc/clash"), std::path::PathBuf::from("/etc/clash"));
    /// ```
    pub fn expand_tilde(path: &str) -> PathBuf {
        let home = match env::var("HOME") {
            Ok(home) if !home.is_empty() => home,
            _ => return PathBuf::from(path),
        };

        if path == "~" {
            PathBuf::from(home)
        } else if let Some(rest) = path.strip_prefix("~/") {
            PathBuf::from(home).join(rest)
        } else {
            PathBuf::from(path)
        }
    }
}

/// 时间工具函数
pub mod time_utils {
    use chrono::{DateTime, Local};
    use std::time::SystemTime;

    /// 获取当前时间戳（毫秒）
    pub fn current_timestamp_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// 备份文件名使用的秒级时间戳
    pub fn backup_stamp() -> String {
        Local::now().format("%Y%m%d_%H%M%S").to_string()
    }

    /// 格式化文件修改时间
    pub fn format_system_time(time: SystemTime) -> String {
        let datetime: DateTime<Local> = time.into();
        datetime.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// 格式化工具函数
pub mod format_utils {
    /// 格式化字节数
    ///
    /// # Examples
    ///
    /// ```
    /// use clash_manager::utils::format_utils::format_bytes;
    ///
    /// assert_eq!(format_bytes(512), "512 B");
    /// assert_eq!(format_bytes(2048), "2.0 KB");
    /// ```
    pub fn format_bytes(bytes: u64) -> String {
        if bytes < 1024 {
            format!("{} B", bytes)
        } else if bytes < 1024 * 1024 {
            format!("{:.1} KB", bytes as f64 / 1024.0)
        } else {
            format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
        }
    }

    /// 按字符截断字符串，超出部分以 `...` 表示
    pub fn truncate_chars(s: &str, max_chars: usize) -> String {
        if s.chars().count() <= max_chars {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_chars).collect();
            format!("{}...", head)
        }
    }
}
