//! 配置管理模块
//!
//! 订阅注册表（`config.json`）的加载、规范化与持久化，以及控制 API 地址文件的读取。

use crate::error::{ClashError, Result};
use crate::utils::path_utils::expand_tilde;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 默认注册表文件名
pub const DEFAULT_REGISTRY_FILE: &str = "config.json";

/// 订阅记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// 订阅名称（注册表中的键）
    #[serde(skip)]
    pub name: String,
    /// 订阅链接
    pub url: String,
    /// 是否启用
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 描述
    #[serde(default)]
    pub description: String,
}

/// 备份设置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSettings {
    /// 是否启用备份
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 每个订阅最多保留的备份数量
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_backups: default_max_backups(),
        }
    }
}

/// 注册表文件的原始结构
///
/// 旧版本使用 `clash_dir`，新版本使用 `work_dir` / `clash_party_dir`。保存时按读取到的键写回，
/// 未识别的字段原样保留。
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    subscriptions: IndexMap<String, SubscriptionRecord>,
    #[serde(default)]
    backup: BackupSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    work_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    clash_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    clash_party_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auto_restart: Option<bool>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// 订阅注册表
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    raw: RegistryFile,
    work_dir: PathBuf,
    profile_dir: Option<PathBuf>,
}

impl ConfigStore {
    /// 从文件加载注册表
    ///
    /// 文件不存在或格式错误时返回 [`ClashError::Config`]，调用方应当终止进程。
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use clash_manager::config::ConfigStore;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let store = ConfigStore::load("config.json")?;
    /// for record in store.subscriptions() {
    ///     println!("{} -> {}", record.name, record.url);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ClashError::config(format!(
                "配置文件不存在: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            ClashError::config(format!("无法读取配置文件 {}: {}", path.display(), e))
        })?;

        Self::from_json(path, &content)
    }

    /// 从 JSON 文本构建注册表，`path` 为之后 `save()` 的目标
    pub fn from_json<P: AsRef<Path>>(path: P, content: &str) -> Result<Self> {
        let mut raw: RegistryFile = serde_json::from_str(content)
            .map_err(|e| ClashError::config(format!("配置文件格式错误: {}", e)))?;

        for (name, record) in raw.subscriptions.iter_mut() {
            if record.url.trim().is_empty() {
                return Err(ClashError::config(format!("订阅 {} 的 url 为空", name)));
            }
            record.name = name.clone();
        }

        let work_dir = raw
            .work_dir
            .as_deref()
            .or(raw.clash_dir.as_deref())
            .map(expand_tilde)
            .ok_or_else(|| ClashError::config("配置文件缺少 work_dir（或旧版 clash_dir）字段"))?;

        let profile_dir = raw.clash_party_dir.as_deref().map(expand_tilde);

        log::debug!(
            "Loaded registry with {} subscriptions, work dir {}",
            raw.subscriptions.len(),
            work_dir.display()
        );

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            raw,
            work_dir,
            profile_dir,
        })
    }

    /// 将整个注册表写回原文件
    pub fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.raw)?;
        fs::write(&self.path, format!("{}\n", content))?;
        log::debug!("Registry saved to {}", self.path.display());
        Ok(())
    }

    /// 添加订阅并保存
    pub fn add(&mut self, name: &str, url: &str, description: &str) -> Result<()> {
        if self.raw.subscriptions.contains_key(name) {
            return Err(ClashError::already_exists(name));
        }
        if url.trim().is_empty() {
            return Err(ClashError::invalid_parameter("订阅 URL 不能为空"));
        }

        self.raw.subscriptions.insert(
            name.to_string(),
            SubscriptionRecord {
                name: name.to_string(),
                url: url.to_string(),
                enabled: true,
                description: description.to_string(),
            },
        );
        if let Err(e) = self.save() {
            self.raw.subscriptions.shift_remove(name);
            return Err(e);
        }
        Ok(())
    }

    /// 删除订阅并保存
    pub fn remove(&mut self, name: &str) -> Result<SubscriptionRecord> {
        let (index, key, record) = self
            .raw
            .subscriptions
            .shift_remove_full(name)
            .ok_or_else(|| ClashError::not_found(name))?;
        if let Err(e) = self.save() {
            self.raw.subscriptions.shift_insert(index, key, record);
            return Err(e);
        }
        Ok(record)
    }

    /// 切换启用状态并保存，返回新的状态
    pub fn toggle(&mut self, name: &str) -> Result<bool> {
        let record = self
            .raw
            .subscriptions
            .get_mut(name)
            .ok_or_else(|| ClashError::not_found(name))?;
        record.enabled = !record.enabled;
        let enabled = record.enabled;
        if let Err(e) = self.save() {
            if let Some(record) = self.raw.subscriptions.get_mut(name) {
                record.enabled = !enabled;
            }
            return Err(e);
        }
        Ok(enabled)
    }

    /// 按名称查找订阅
    pub fn get(&self, name: &str) -> Option<&SubscriptionRecord> {
        self.raw.subscriptions.get(name)
    }

    /// 按注册表顺序遍历所有订阅
    pub fn subscriptions(&self) -> impl Iterator<Item = &SubscriptionRecord> {
        self.raw.subscriptions.values()
    }

    /// 已启用订阅的名称
    pub fn enabled_names(&self) -> Vec<String> {
        self.subscriptions()
            .filter(|r| r.enabled)
            .map(|r| r.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.raw.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.subscriptions.is_empty()
    }

    /// 订阅配置文件所在的工作目录
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// 外部 GUI 配置目录
    pub fn profile_dir(&self) -> Option<&Path> {
        self.profile_dir.as_deref()
    }

    pub fn backup_settings(&self) -> BackupSettings {
        self.raw.backup
    }

    /// 更新后是否自动重启 Clash
    pub fn auto_restart(&self) -> bool {
        self.raw.auto_restart.unwrap_or(true)
    }

    /// 指定订阅在工作目录中的配置文件路径
    pub fn local_config_path(&self, name: &str) -> PathBuf {
        self.work_dir.join(format!("{}.yaml", name))
    }

    /// 注册表文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// 控制 API 地址与密钥
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    pub url: String,
    pub secret: Option<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            url: Self::DEFAULT_URL.to_string(),
            secret: None,
        }
    }
}

impl ApiSettings {
    pub const DEFAULT_URL: &'static str = "http://127.0.0.1:9090";
    pub const FILE_NAME: &'static str = ".clash-api-config";

    /// 解析 `KEY=VALUE` 格式的内容
    pub fn parse(content: &str) -> Self {
        let mut settings = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();

            match key.trim() {
                "CLASH_API_URL" => settings.url = value.to_string(),
                "CLASH_API_SECRET" => {
                    settings.secret = (!value.is_empty()).then(|| value.to_string())
                }
                _ => {}
            }
        }

        settings
    }

    /// 读取指定文件，不存在时使用默认值
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                log::warn!("无法读取配置文件 {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// 命令行参数覆盖文件中的设置
    pub fn with_overrides(mut self, url: Option<String>, secret: Option<String>) -> Self {
        if let Some(url) = url {
            self.url = url;
        }
        if let Some(secret) = secret {
            self.secret = (!secret.is_empty()).then_some(secret);
        }
        self
    }

    /// 依次在可执行文件目录和当前目录中查找配置文件
    pub fn discover() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));

        let candidates = exe_dir
            .into_iter()
            .chain(std::env::current_dir().ok())
            .map(|dir| dir.join(Self::FILE_NAME));

        for candidate in candidates {
            if candidate.exists() {
                log::debug!("Using API config {}", candidate.display());
                return Self::load_from(&candidate);
            }
        }

        Self::default()
    }
}

fn default_true() -> bool {
    true
}

fn default_max_backups() -> usize {
    5
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const REGISTRY: &str = r#"{
  "subscriptions": {
    "s1": { "url": "http://good/x.yaml", "enabled": true, "description": "主订阅" },
    "s2": { "url": "http://good/y.yaml", "enabled": false }
  },
  "backup": { "enabled": true, "max_backups": 3 },
  "clash_dir": "/tmp/clash",
  "theme": "dark"
}"#;

    fn store_in(dir: &TempDir, content: &str) -> ConfigStore {
        let path = dir.path().join("config.json");
        fs::write(&path, content).unwrap();
        ConfigStore::load(&path).unwrap()
    }

    #[test]
    fn test_load_normalizes_legacy_dir() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, REGISTRY);

        assert_eq!(store.work_dir(), Path::new("/tmp/clash"));
        assert!(store.profile_dir().is_none());
        assert_eq!(store.backup_settings().max_backups, 3);
        assert_eq!(store.enabled_names(), vec!["s1".to_string()]);
        assert_eq!(store.get("s2").unwrap().description, "");
        assert!(store.auto_restart());
    }

    #[test]
    fn test_work_dir_takes_precedence() {
        let dir = TempDir::new().unwrap();
        let store = store_in(
            &dir,
            r#"{"subscriptions": {}, "work_dir": "/a", "clash_dir": "/b", "clash_party_dir": "/c"}"#,
        );
        assert_eq!(store.work_dir(), Path::new("/a"));
        assert_eq!(store.profile_dir(), Some(Path::new("/c")));
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = ConfigStore::load(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ClashError::Config(_)));
    }

    #[test]
    fn test_load_malformed_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            ConfigStore::load(&path).unwrap_err(),
            ClashError::Config(_)
        ));
    }

    #[test]
    fn test_load_without_dir_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"subscriptions": {}}"#).unwrap();
        assert!(ConfigStore::load(&path).is_err());
    }

    #[test]
    fn test_add_then_remove_restores_size() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir, REGISTRY);
        let before = store.len();

        store.add("s3", "http://good/z.yaml", "").unwrap();
        assert_eq!(store.len(), before + 1);
        store.remove("s3").unwrap();
        assert_eq!(store.len(), before);

        let reloaded = ConfigStore::load(store.path()).unwrap();
        assert_eq!(reloaded.len(), before);
    }

    #[test]
    fn test_add_duplicate_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir, REGISTRY);

        let err = store.add("s1", "http://other", "").unwrap_err();
        assert!(matches!(err, ClashError::AlreadyExists(_)));
        assert_eq!(store.get("s1").unwrap().url, "http://good/x.yaml");
    }

    #[test]
    fn test_add_empty_url_rejected() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir, REGISTRY);
        assert!(store.add("s3", "  ", "").is_err());
        assert!(store.get("s3").is_none());
    }

    #[test]
    fn test_toggle_twice_restores_and_persists() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir, REGISTRY);

        assert!(!store.toggle("s1").unwrap());
        assert!(!ConfigStore::load(store.path()).unwrap().get("s1").unwrap().enabled);
        assert!(store.toggle("s1").unwrap());
        assert!(store.get("s1").unwrap().enabled);
    }

    #[test]
    fn test_remove_and_toggle_missing() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir, REGISTRY);
        assert!(matches!(
            store.remove("ghost").unwrap_err(),
            ClashError::NotFound(_)
        ));
        assert!(matches!(
            store.toggle("ghost").unwrap_err(),
            ClashError::NotFound(_)
        ));
    }

    #[test]
    fn test_failed_save_keeps_memory_unchanged() {
        let dir = TempDir::new().unwrap();
        // 父目录不存在，保存必然失败
        let unwritable = dir.path().join("missing").join("config.json");
        let mut store = ConfigStore::from_json(&unwritable, REGISTRY).unwrap();

        assert!(matches!(
            store.add("s3", "http://good/z.yaml", ""),
            Err(ClashError::Io(_))
        ));
        assert!(store.get("s3").is_none());

        assert!(store.toggle("s1").is_err());
        assert!(store.get("s1").unwrap().enabled);

        assert!(store.remove("s1").is_err());
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.subscriptions().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            vec!["s1", "s2"]
        );
    }

    #[test]
    fn test_save_keeps_legacy_key_and_extra_fields() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, REGISTRY);
        store.save().unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(written["clash_dir"], "/tmp/clash");
        assert!(written.get("work_dir").is_none());
        assert_eq!(written["theme"], "dark");
        assert_eq!(written["subscriptions"]["s1"]["description"], "主订阅");
    }

    #[test]
    fn test_registry_order_preserved() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir, REGISTRY);
        store.add("a0", "http://a", "").unwrap();
        let names: Vec<_> = store.subscriptions().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["s1", "s2", "a0"]);
    }

    #[test]
    fn test_api_settings_parse() {
        let settings = ApiSettings::parse(
            "# comment\n\nCLASH_API_URL = http://10.0.0.1:9097\nCLASH_API_SECRET=abc=def\nOTHER=1\n",
        );
        assert_eq!(settings.url, "http://10.0.0.1:9097");
        assert_eq!(settings.secret.as_deref(), Some("abc=def"));
    }

    #[test]
    fn test_api_settings_overrides() {
        let settings = ApiSettings::parse("CLASH_API_SECRET=abc")
            .with_overrides(Some("http://10.0.0.2:9090".to_string()), None);
        assert_eq!(settings.url, "http://10.0.0.2:9090");
        assert_eq!(settings.secret.as_deref(), Some("abc"));

        let cleared = settings.with_overrides(None, Some(String::new()));
        assert!(cleared.secret.is_none());
    }

    #[test]
    fn test_api_settings_missing_file_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = ApiSettings::load_from(&dir.path().join(ApiSettings::FILE_NAME));
        assert_eq!(settings, ApiSettings::default());
        assert_eq!(settings.url, "http://127.0.0.1:9090");
        assert!(settings.secret.is_none());
    }
}
