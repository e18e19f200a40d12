//! 订阅更新模块
//!
//! 下载订阅、校验内容、原子替换本地配置，并可选地同步到 GUI 客户端。

use crate::backup::BackupManager;
use crate::config::ConfigStore;
use crate::error::{ClashError, Result};
use crate::profile::{ProfileSynchronizer, SyncOutcome};
use crate::report::Reporter;
use crate::utils::format_utils::format_bytes;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 让订阅服务返回 Clash YAML 格式
pub const SUBSCRIPTION_USER_AGENT: &str = "clash-verge/v1.7.7";
/// 下载超时
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
/// 小于该字节数的响应视为错误页面
pub const MIN_CONFIG_SIZE: usize = 100;

/// 单个订阅的更新结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub name: String,
    /// 下载的字节数
    pub bytes: usize,
    /// `proxies` 中的节点数，无法读取时为 0
    pub node_count: usize,
    /// 本次更新前创建的备份
    pub backup: Option<PathBuf>,
    /// GUI 客户端同步结果，未配置或同步出错时为 `None`
    pub sync: Option<SyncOutcome>,
}

/// 批量更新结果
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: usize,
    pub total: usize,
    pub failures: Vec<(String, ClashError)>,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total
    }
}

/// 写入中的临时文件，未提交时在析构时删除
struct PendingFile {
    path: PathBuf,
    armed: bool,
}

impl PendingFile {
    fn create(path: PathBuf, content: &[u8]) -> Result<Self> {
        let pending = Self { path, armed: true };
        fs::write(&pending.path, content)?;
        Ok(pending)
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// 重命名到目标路径
    fn persist(mut self, target: &Path) -> Result<()> {
        fs::rename(&self.path, target)?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("删除临时文件失败: {:?}, 错误: {}", self.path, e);
                }
            } else {
                log::debug!("Removed pending file {}", self.path.display());
            }
        }
    }
}

/// 订阅更新器
pub struct SubscriptionFetcher<'a> {
    store: &'a ConfigStore,
    backups: BackupManager,
    client: Client,
    synchronizer: Option<ProfileSynchronizer>,
    reporter: &'a dyn Reporter,
}

impl<'a> SubscriptionFetcher<'a> {
    pub fn new(store: &'a ConfigStore, reporter: &'a dyn Reporter) -> Result<Self> {
        let client = Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| ClashError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            store,
            backups: BackupManager::new(store.work_dir(), store.backup_settings()),
            client,
            synchronizer: None,
            reporter,
        })
    }

    /// 更新成功后同步到 GUI 客户端
    pub fn with_synchronizer(mut self, synchronizer: ProfileSynchronizer) -> Self {
        self.synchronizer = Some(synchronizer);
        self
    }

    /// 更新单个订阅
    ///
    /// 任何失败都不会修改当前的配置文件。
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use clash_manager::{config::ConfigStore, report::ConsoleReporter, subscription::SubscriptionFetcher};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let store = ConfigStore::load("config.json")?;
    /// let reporter = ConsoleReporter::from_env();
    /// let fetcher = SubscriptionFetcher::new(&store, &reporter)?;
    /// let report = fetcher.update("main").await?;
    /// println!("{} nodes", report.node_count);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn update(&self, name: &str) -> Result<UpdateReport> {
        let record = self
            .store
            .get(name)
            .ok_or_else(|| ClashError::not_found(name))?;
        if !record.enabled {
            return Err(ClashError::disabled(name));
        }

        self.reporter.info(&format!("正在更新订阅: {}", name));

        let backup = match self.backups.backup(name) {
            Ok(backup) => backup,
            Err(e) => {
                self.reporter.warn(&format!("备份失败: {}", e));
                None
            }
        };
        if let Some(path) = &backup {
            self.reporter.info(&format!("已备份到: {}", path.display()));
        }

        let body = self.download(&record.url).await?;

        let live = self.store.local_config_path(name);
        fs::create_dir_all(self.store.work_dir())?;
        let pending = PendingFile::create(
            self.store.work_dir().join(format!("{}.yaml.tmp", name)),
            &body,
        )?;
        verify_config(pending.path(), self.reporter)?;
        pending.persist(&live)?;

        let node_count = count_nodes(&live);
        self.reporter.success(&format!(
            "订阅 {} 更新成功 ({}，{} 个节点)",
            name,
            format_bytes(body.len() as u64),
            node_count
        ));

        let sync = match &self.synchronizer {
            Some(synchronizer) => match synchronizer.sync(&live, &record.url).await {
                Ok(outcome) => {
                    outcome.report(self.reporter);
                    Some(outcome)
                }
                Err(e) => {
                    self.reporter.warn(&format!("同步到 GUI 客户端失败: {}", e));
                    None
                }
            },
            None => None,
        };

        Ok(UpdateReport {
            name: name.to_string(),
            bytes: body.len(),
            node_count,
            backup,
            sync,
        })
    }

    /// 按注册表顺序更新所有已启用的订阅，单个失败不影响其余订阅
    pub async fn update_all(&self) -> BatchReport {
        let names = self.store.enabled_names();
        let mut report = BatchReport {
            total: names.len(),
            ..Default::default()
        };

        if names.is_empty() {
            self.reporter.warn("没有启用的订阅");
            return report;
        }

        for name in names {
            match self.update(&name).await {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    self.reporter.error(&format!("订阅 {} 更新失败: {}", name, e));
                    report.failures.push((name, e));
                }
            }
        }

        self.reporter.info(&format!(
            "更新完成: {}/{} 成功",
            report.succeeded, report.total
        ));
        report
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        log::debug!("Downloading {}", url);

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, SUBSCRIPTION_USER_AGENT)
            .send()
            .await
            .map_err(|e| ClashError::download(format!("下载失败: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClashError::download(format!("HTTP {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ClashError::download(format!("读取响应失败: {}", e)))?;

        if body.is_empty() {
            return Err(ClashError::download("订阅返回内容为空"));
        }
        if body.len() < MIN_CONFIG_SIZE {
            return Err(ClashError::download(format!(
                "订阅返回内容过短（{} 字节），可能是错误页面",
                body.len()
            )));
        }

        Ok(body.to_vec())
    }
}

/// 检查下载的配置结构
///
/// YAML 语法错误、非映射文档以及缺少 `proxies` / `proxy-providers` 时拒绝；
/// 文件本身读不出来时只给出警告，更新继续。
pub fn verify_config(path: &Path, reporter: &dyn Reporter) -> Result<()> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) => {
            reporter.warn(&format!("无法验证配置文件结构: {}，继续更新", e));
            return Ok(());
        }
    };

    let document: Value = serde_yaml::from_slice(&content)
        .map_err(|e| ClashError::validation(format!("YAML 解析失败: {}", e)))?;

    if !document.is_mapping() {
        return Err(ClashError::validation("配置文件不是 YAML 映射"));
    }
    if document.get("proxies").is_none() && document.get("proxy-providers").is_none() {
        return Err(ClashError::validation(
            "配置文件缺少 proxies 或 proxy-providers",
        ));
    }

    Ok(())
}

/// 统计配置文件中 `proxies` 的数量
pub fn count_nodes(path: &Path) -> usize {
    fs::read(path)
        .ok()
        .and_then(|content| serde_yaml::from_slice::<Value>(&content).ok())
        .and_then(|doc| doc.get("proxies").and_then(Value::as_sequence).map(Vec::len))
        .unwrap_or(0)
}
