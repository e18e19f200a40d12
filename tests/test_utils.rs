//! 测试工具模块
//! 提供模拟订阅服务、模拟控制 API 和临时工作目录

#![allow(dead_code)]

use clash_manager::{ConfigStore, ControlApiClient, RetryPolicy};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// 订阅服务上的配置路径
pub const SUBSCRIPTION_PATH: &str = "/sub";

/// 生成包含 `proxies` 个节点的配置，并用注释填充到至少 `min_size` 字节
pub fn clash_config(proxies: usize, min_size: usize) -> String {
    let mut content = String::from("port: 7890\nmode: rule\nproxies:\n");
    for i in 0..proxies {
        content.push_str(&format!(
            "  - name: node-{i}\n    type: ss\n    server: 10.0.0.{i}\n    port: 8388\n    cipher: aes-128-gcm\n    password: secret\n"
        ));
    }
    content.push_str("rules:\n  - MATCH,DIRECT\n");
    while content.len() < min_size {
        content.push_str("# padding line for subscription body size\n");
    }
    content
}

/// 测试用工作环境：注册表、工作目录和可选的 GUI 配置目录
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn work_dir(&self) -> PathBuf {
        self.dir.path().join("clash")
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.dir.path().join("party")
    }

    pub fn registry_path(&self) -> PathBuf {
        self.dir.path().join("config.json")
    }

    /// 写入注册表，`subscriptions` 为 `(名称, url, 是否启用)`
    pub fn write_registry(&self, subscriptions: &[(&str, &str, bool)], max_backups: usize) {
        let mut subs = serde_json::Map::new();
        for (name, url, enabled) in subscriptions {
            subs.insert(
                name.to_string(),
                serde_json::json!({ "url": url, "enabled": enabled, "description": "" }),
            );
        }
        let registry = serde_json::json!({
            "subscriptions": subs,
            "backup": { "enabled": true, "max_backups": max_backups },
            "work_dir": self.work_dir().to_string_lossy(),
            "clash_party_dir": self.profile_dir().to_string_lossy(),
        });
        fs::write(
            self.registry_path(),
            serde_json::to_string_pretty(&registry).unwrap(),
        )
        .unwrap();
    }

    pub fn store(&self) -> ConfigStore {
        ConfigStore::load(self.registry_path()).unwrap()
    }

    pub fn live_config(&self, name: &str) -> PathBuf {
        self.work_dir().join(format!("{}.yaml", name))
    }

    /// 写入当前配置文件
    pub fn seed_live_config(&self, name: &str, content: &str) {
        fs::create_dir_all(self.work_dir()).unwrap();
        fs::write(self.live_config(name), content).unwrap();
    }

    /// 写入 GUI 清单，`items` 为 `(id, url)`
    pub fn write_manifest(&self, current: &str, items: &[(&str, &str)]) -> PathBuf {
        fs::create_dir_all(self.profile_dir()).unwrap();
        let mut content = format!("current: {}\nitems:\n", current);
        for (id, url) in items {
            content.push_str(&format!(
                "  - id: {}\n    type: remote\n    name: {}\n    url: {}\n    updated: 1\n",
                id, id, url
            ));
        }
        let path = self.profile_dir().join("profile.yaml");
        fs::write(&path, content).unwrap();
        path
    }

    /// 工作目录中残留的 `.tmp` 文件
    pub fn temp_files(&self) -> Vec<PathBuf> {
        list_files(&self.work_dir())
            .into_iter()
            .filter(|p| p.extension().is_some_and(|e| e == "tmp"))
            .collect()
    }
}

pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}

/// 启动返回固定内容的订阅服务
pub async fn subscription_server(status: u16, body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SUBSCRIPTION_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(&server)
        .await;
    server
}

pub fn subscription_url(server: &MockServer) -> String {
    format!("{}{}", server.uri(), SUBSCRIPTION_PATH)
}

/// 指向模拟控制 API 的客户端，不重试
pub fn control_client(server: &MockServer) -> ControlApiClient {
    ControlApiClient::new(&server.uri(), None)
        .unwrap()
        .with_retry_policy(RetryPolicy::new(1).with_initial_delay(Duration::from_millis(1)))
}

/// 模拟控制 API 的 `/proxies` 响应
pub fn proxies_fixture() -> serde_json::Value {
    serde_json::json!({
        "proxies": {
            "GLOBAL": {
                "type": "Selector",
                "now": "Proxy",
                "all": ["DIRECT", "REJECT", "Proxy", "Auto"],
                "history": []
            },
            "DIRECT": { "type": "Direct", "history": [] },
            "REJECT": { "type": "Reject", "history": [] },
            "Proxy": {
                "type": "Selector",
                "now": "HK-01",
                "all": ["HK-01", "JP-01", "SG-01", "US-01", "TW-01", "KR-01"],
                "history": []
            },
            "Auto": {
                "type": "URLTest",
                "now": "JP-01",
                "all": ["HK-01", "JP-01", "SG-01", "US-01", "TW-01"],
                "history": []
            },
            "HK-01": { "type": "Shadowsocks", "history": [{ "time": "2024-01-01T00:00:00Z", "delay": 85 }] },
            "JP-01": { "type": "Vmess", "history": [{ "delay": 0 }] },
            "SG-01": { "type": "Trojan", "history": [] },
            "US-01": { "type": "Vless", "history": [] },
            "TW-01": { "type": "Hysteria2", "history": [] },
            "KR-01": { "type": "Tuic", "history": [] }
        }
    })
}

/// 启动返回 `proxies_fixture()` 的控制 API
pub async fn control_api_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/proxies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(proxies_fixture()))
        .mount(&server)
        .await;
    server
}
