//! 外部配置同步模块
//!
//! 将刚更新的订阅配置复制到 GUI 客户端（Clash Party / Clash Verge）的配置目录，
//! 并在该配置处于激活状态时通知内核重新加载。

use crate::client::{ControlApiClient, ReloadOutcome};
use crate::error::{ClashError, Result};
use crate::report::Reporter;
use crate::utils::time_utils::current_timestamp_millis;
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// 清单文件名，按顺序查找
pub const MANIFEST_FILES: &[&str] = &["profile.yaml", "profiles.yaml"];
/// 配置文件所在的子目录
pub const PROFILES_DIR: &str = "profiles";

/// 同步结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// 配置目录中没有清单文件
    ManifestMissing,
    /// 清单中没有 url 相同的条目
    NoMatch,
    /// 匹配到当前激活的配置，已请求重载
    Activated { id: String, reload: ReloadOutcome },
    /// 匹配到未激活的配置，需要用户手动切换
    Staged { id: String },
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Activated { .. } | SyncOutcome::Staged { .. })
    }

    /// 向用户报告同步结果
    pub fn report(&self, reporter: &dyn Reporter) {
        match self {
            SyncOutcome::ManifestMissing => {
                reporter.warn("未找到 GUI 客户端的配置清单，跳过同步");
            }
            SyncOutcome::NoMatch => {
                reporter.warn("GUI 客户端中没有找到该订阅，请先在客户端中添加此订阅链接");
            }
            SyncOutcome::Activated { id, reload } => {
                reporter.success(&format!("已同步到 GUI 配置 {}", id));
                match reload {
                    ReloadOutcome::Reloaded | ReloadOutcome::ReloadedViaPatch => {
                        reporter.success("Clash 已重新加载配置");
                    }
                    ReloadOutcome::Failed(reason) => {
                        reporter.warn(&format!(
                            "重新加载失败（{}），请在客户端中手动刷新配置",
                            reason
                        ));
                    }
                }
            }
            SyncOutcome::Staged { id } => {
                reporter.success(&format!("已同步到 GUI 配置 {}", id));
                reporter.info("该配置当前未激活，请在客户端中手动切换后生效");
            }
        }
    }
}

/// 外部配置同步器
#[derive(Debug, Clone)]
pub struct ProfileSynchronizer {
    profile_dir: PathBuf,
    client: ControlApiClient,
}

impl ProfileSynchronizer {
    pub fn new<P: AsRef<Path>>(profile_dir: P, client: ControlApiClient) -> Self {
        Self {
            profile_dir: profile_dir.as_ref().to_path_buf(),
            client,
        }
    }

    pub fn profile_dir(&self) -> &Path {
        &self.profile_dir
    }

    /// 第一个存在的清单文件
    pub fn manifest_path(&self) -> Option<PathBuf> {
        MANIFEST_FILES
            .iter()
            .map(|name| self.profile_dir.join(name))
            .find(|path| path.is_file())
    }

    /// 同步一个订阅配置
    ///
    /// 只修改匹配条目的 `updated` 字段，其余字段保持原样；没有匹配条目时不写入任何文件。
    pub async fn sync(&self, config_file: &Path, subscription_url: &str) -> Result<SyncOutcome> {
        let Some(manifest_path) = self.manifest_path() else {
            log::debug!("No manifest in {}", self.profile_dir.display());
            return Ok(SyncOutcome::ManifestMissing);
        };

        let content = fs::read_to_string(&manifest_path)?;
        let mut manifest: Value = serde_yaml::from_str(&content)?;

        let Some((index, id)) = find_entry(&manifest, subscription_url) else {
            log::debug!("No manifest entry for {}", subscription_url);
            return Ok(SyncOutcome::NoMatch);
        };

        let profiles_dir = self.profile_dir.join(PROFILES_DIR);
        fs::create_dir_all(&profiles_dir)?;
        let target = profiles_dir.join(format!("{}.yaml", id));
        fs::copy(config_file, &target)?;
        log::info!("Copied {} to {}", config_file.display(), target.display());

        let entry = manifest
            .get_mut("items")
            .and_then(Value::as_sequence_mut)
            .and_then(|items| items.get_mut(index))
            .and_then(Value::as_mapping_mut)
            .ok_or_else(|| ClashError::internal("清单条目在更新时消失"))?;
        entry.insert(
            Value::String("updated".to_string()),
            Value::Number(current_timestamp_millis().into()),
        );
        fs::write(&manifest_path, serde_yaml::to_string(&manifest)?)?;

        let is_current = manifest
            .get("current")
            .and_then(scalar_to_string)
            .is_some_and(|current| current == id);

        if is_current {
            let reload = self.client.reload().await;
            Ok(SyncOutcome::Activated { id, reload })
        } else {
            Ok(SyncOutcome::Staged { id })
        }
    }
}

/// 查找 url 完全相同的条目，返回其下标和 id
///
/// Clash Party 使用 `id`，Clash Verge 使用 `uid`。
fn find_entry(manifest: &Value, url: &str) -> Option<(usize, String)> {
    manifest
        .get("items")?
        .as_sequence()?
        .iter()
        .enumerate()
        .find_map(|(index, item)| {
            if item.get("url").and_then(Value::as_str) != Some(url) {
                return None;
            }
            let id = item
                .get("id")
                .or_else(|| item.get("uid"))
                .and_then(scalar_to_string)?;
            Some((index, id))
        })
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
