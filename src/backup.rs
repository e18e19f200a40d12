//! 配置备份模块
//!
//! 覆盖订阅配置前先保存带时间戳的副本，并按数量清理旧备份。

use crate::config::BackupSettings;
use crate::error::Result;
use crate::utils::time_utils::backup_stamp;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// 备份文件扩展名
const BACKUP_EXT: &str = "yaml";

/// 一个备份文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

impl BackupEntry {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// 备份管理器
#[derive(Debug, Clone)]
pub struct BackupManager {
    /// 订阅配置所在目录
    work_dir: PathBuf,
    /// 备份目录
    backup_dir: PathBuf,
    settings: BackupSettings,
}

impl BackupManager {
    /// 备份目录固定为 `{work_dir}/backups`
    pub fn new<P: AsRef<Path>>(work_dir: P, settings: BackupSettings) -> Self {
        let work_dir = work_dir.as_ref().to_path_buf();
        let backup_dir = work_dir.join("backups");
        Self {
            work_dir,
            backup_dir,
            settings,
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// 备份指定订阅的当前配置
    ///
    /// 备份被禁用或配置文件尚不存在时返回 `None`。
    pub fn backup(&self, name: &str) -> Result<Option<PathBuf>> {
        if !self.settings.enabled {
            return Ok(None);
        }

        let source = self.work_dir.join(format!("{}.{}", name, BACKUP_EXT));
        if !source.exists() {
            log::debug!("No existing config for '{}', skipping backup", name);
            return Ok(None);
        }

        fs::create_dir_all(&self.backup_dir)?;

        let target = self.next_backup_path(name, &backup_stamp())?;
        fs::copy(&source, &target)?;
        log::info!("Backed up '{}' to {}", name, target.display());

        self.cleanup(name)?;
        Ok(Some(target))
    }

    /// 同一秒内多次备份时追加递增序号，序号总是大于该秒内已有的任何备份
    fn next_backup_path(&self, name: &str, stamp: &str) -> Result<PathBuf> {
        let base = format!("{}.{}", name, stamp);
        let mut highest: Option<u32> = None;

        for entry in fs::read_dir(&self.backup_dir)? {
            let file_name = entry?.file_name();
            let Some(rest) = file_name
                .to_str()
                .and_then(|n| n.strip_prefix(base.as_str()))
                .and_then(|n| n.strip_suffix(BACKUP_EXT))
                .and_then(|n| n.strip_suffix('.'))
            else {
                continue;
            };

            let counter = if rest.is_empty() {
                Some(0)
            } else {
                rest.strip_prefix('_').and_then(|n| n.parse::<u32>().ok())
            };
            if let Some(counter) = counter {
                highest = Some(highest.map_or(counter, |h| h.max(counter)));
            }
        }

        let file_name = match highest {
            None => format!("{}.{}", base, BACKUP_EXT),
            Some(n) => format!("{}_{}.{}", base, n + 1, BACKUP_EXT),
        };
        Ok(self.backup_dir.join(file_name))
    }

    /// 列出指定订阅的备份，最新的在前
    pub fn list(&self, name: &str) -> Result<Vec<BackupEntry>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries: Vec<BackupEntry> = fs::read_dir(&self.backup_dir)?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let path = entry.path();
                let file_name = path.file_name()?.to_str()?;
                if !path.is_file() || !is_backup_of(file_name, name) {
                    return None;
                }
                let metadata = entry.metadata().ok()?;
                Some(BackupEntry {
                    modified: metadata.modified().ok()?,
                    size: metadata.len(),
                    path,
                })
            })
            .collect();

        // 按修改时间排序，最新的在前；时间相同时按时间戳和同秒序号
        entries.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| backup_order(&b.path).cmp(&backup_order(&a.path)))
        });

        Ok(entries)
    }

    /// 删除超出保留数量的旧备份，返回被删除的文件
    pub fn cleanup(&self, name: &str) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();

        for entry in self
            .list(name)?
            .into_iter()
            .skip(self.settings.max_backups)
        {
            match fs::remove_file(&entry.path) {
                Ok(()) => {
                    log::info!("Removed old backup {}", entry.path.display());
                    removed.push(entry.path);
                }
                Err(e) => log::warn!("删除备份文件失败: {:?}, 错误: {}", entry.path, e),
            }
        }

        Ok(removed)
    }
}

/// 判断文件名是否属于 `{name}.{stamp}.yaml` 备份命名空间
///
/// `stamp` 只允许数字、`_` 和 `-`，因此 `s1` 的清理不会匹配到 `s1.hk` 的备份。
fn is_backup_of(file_name: &str, name: &str) -> bool {
    let Some(rest) = file_name
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('.'))
    else {
        return false;
    };
    let Some(stamp) = rest
        .strip_suffix(BACKUP_EXT)
        .and_then(|rest| rest.strip_suffix('.'))
    else {
        return false;
    };

    !stamp.is_empty()
        && stamp
            .chars()
            .all(|c| c.is_ascii_digit() || c == '_' || c == '-')
}

/// 备份文件名中的时间戳和同秒序号，没有序号的视为 0
fn backup_order(path: &Path) -> (String, u32) {
    let stamp = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.rsplit_once('.'))
        .map(|(_, stamp)| stamp)
        .unwrap_or_default();

    let mut parts = stamp.splitn(3, '_');
    let day = parts.next().unwrap_or_default();
    let time = parts.next().unwrap_or_default();
    let counter = parts.next().and_then(|n| n.parse().ok()).unwrap_or(0);
    (format!("{}_{}", day, time), counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(dir: &TempDir, max_backups: usize) -> BackupManager {
        BackupManager::new(
            dir.path(),
            BackupSettings {
                enabled: true,
                max_backups,
            },
        )
    }

    #[test]
    fn test_backup_namespace() {
        assert!(is_backup_of("s1.20240101_120000.yaml", "s1"));
        assert!(is_backup_of("s1.20240101_120000_2.yaml", "s1"));
        assert!(!is_backup_of("s1.hk.20240101_120000.yaml", "s1"));
        assert!(!is_backup_of("s1.yaml", "s1"));
        assert!(!is_backup_of("s10.20240101_120000.yaml", "s1"));
        assert!(!is_backup_of("s1.20240101_120000.yml", "s1"));
    }

    #[test]
    fn test_backup_without_source_is_noop() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, 5);
        assert!(manager.backup("s1").unwrap().is_none());
        assert!(!manager.backup_dir().exists());
    }

    #[test]
    fn test_backup_disabled_is_noop() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("s1.yaml"), "proxies: []").unwrap();
        let manager = BackupManager::new(
            dir.path(),
            BackupSettings {
                enabled: false,
                max_backups: 5,
            },
        );
        assert!(manager.backup("s1").unwrap().is_none());
    }

    #[test]
    fn test_backup_copies_content() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("s1.yaml"), "proxies: []").unwrap();
        let manager = manager(&dir, 5);

        let path = manager.backup("s1").unwrap().unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "proxies: []");
    }

    #[test]
    fn test_retention_keeps_most_recent() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, 3);

        let mut created = Vec::new();
        for i in 0..6 {
            fs::write(dir.path().join("s1.yaml"), format!("version: {}", i)).unwrap();
            created.push(manager.backup("s1").unwrap().unwrap());
        }

        let remaining: Vec<PathBuf> = manager
            .list("s1")
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert_eq!(remaining.len(), 3);
        for path in &created[3..] {
            assert!(remaining.contains(path));
        }
        for path in &created[..3] {
            assert!(!path.exists());
        }
    }

    #[test]
    fn test_backup_order_parses_counter() {
        let dir = Path::new("backups");
        assert_eq!(
            backup_order(&dir.join("s1.hk.20240101_120000_10.yaml")),
            ("20240101_120000".to_string(), 10)
        );
        assert!(
            backup_order(&dir.join("s1.20240101_120000_10.yaml"))
                > backup_order(&dir.join("s1.20240101_120000_9.yaml"))
        );
    }

    #[test]
    fn test_same_second_backups_sorted_by_counter() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, 2);
        fs::create_dir_all(manager.backup_dir()).unwrap();

        let modified = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
        let names = [
            "s1.20240101_120000.yaml",
            "s1.20240101_120000_9.yaml",
            "s1.20240101_120000_10.yaml",
        ];
        for name in names {
            let path = manager.backup_dir().join(name);
            fs::write(&path, name).unwrap();
            fs::File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(modified)
                .unwrap();
        }

        let listed: Vec<String> = manager
            .list("s1")
            .unwrap()
            .iter()
            .map(BackupEntry::file_name)
            .collect();
        assert_eq!(
            listed,
            vec![
                "s1.20240101_120000_10.yaml",
                "s1.20240101_120000_9.yaml",
                "s1.20240101_120000.yaml",
            ]
        );

        let removed = manager.cleanup("s1").unwrap();
        assert_eq!(removed, vec![manager.backup_dir().join(names[0])]);
    }

    #[test]
    fn test_cleanup_ignores_other_namespaces() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, 0);
        fs::create_dir_all(manager.backup_dir()).unwrap();
        let own = manager.backup_dir().join("s1.20240101_000000.yaml");
        let other = manager.backup_dir().join("s1.hk.20240101_000000.yaml");
        let unrelated = manager.backup_dir().join("notes.txt");
        for p in [&own, &other, &unrelated] {
            fs::write(p, "x").unwrap();
        }

        let removed = manager.cleanup("s1").unwrap();
        assert_eq!(removed, vec![own.clone()]);
        assert!(other.exists());
        assert!(unrelated.exists());
    }
}
