//! 类型定义模块
//!
//! 控制 API 返回的数据结构，以及由其派生的代理组 / 节点视图。

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// `GET /proxies` 响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxiesResponse {
    /// 按 API 返回顺序保存的代理表
    #[serde(default)]
    pub proxies: IndexMap<String, ProxyItem>,
}

/// 代理表中的单个条目（代理组或节点）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyItem {
    /// 类型，例如 `Selector`、`URLTest`、`Shadowsocks`
    #[serde(rename = "type", default)]
    pub proxy_type: String,
    /// 代理组当前选中的成员
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now: Option<String>,
    /// 代理组成员列表，节点没有该字段
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all: Option<Vec<String>>,
    /// 延迟历史记录
    #[serde(default)]
    pub history: Vec<DelayHistory>,
}

impl ProxyItem {
    /// 最近一次延迟采样，`Some(0)` 表示超时
    pub fn last_delay(&self) -> Option<u32> {
        self.history.last().map(|h| h.delay.unwrap_or(0))
    }
}

/// 延迟历史记录
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DelayHistory {
    /// 延迟时间（毫秒）
    #[serde(default)]
    pub delay: Option<u32>,
    /// 测试时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

/// `GET /proxies/{name}/delay` 响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelayResponse {
    #[serde(default)]
    pub delay: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// 代理组
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyGroup {
    /// 组名称
    pub name: String,
    /// 组类型
    pub group_type: String,
    /// 当前选中的代理
    pub now: String,
    /// 组内代理列表
    pub all: Vec<String>,
}

/// 叶子节点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyNode {
    /// 节点名称
    pub name: String,
    /// 节点类型
    pub node_type: String,
    /// 最近一次延迟采样（毫秒），`Some(0)` 表示超时
    pub last_delay: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxies_response_preserves_order() {
        let json = r#"{"proxies": {
            "Zeta": {"type": "Shadowsocks", "history": []},
            "Alpha": {"type": "Selector", "now": "Zeta", "all": ["Zeta"], "history": []},
            "Mid": {"type": "Vmess", "history": [{"delay": 120}, {"delay": 0}]}
        }}"#;
        let response: ProxiesResponse = serde_json::from_str(json).unwrap();
        let names: Vec<_> = response.proxies.keys().cloned().collect();
        assert_eq!(names, vec!["Zeta", "Alpha", "Mid"]);
        assert_eq!(response.proxies["Mid"].last_delay(), Some(0));
        assert_eq!(response.proxies["Zeta"].last_delay(), None);
        assert_eq!(response.proxies["Alpha"].all.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_null_delay_in_history() {
        let item: ProxyItem =
            serde_json::from_str(r#"{"type": "Trojan", "history": [{"delay": null}]}"#).unwrap();
        assert_eq!(item.last_delay(), Some(0));
    }

    #[test]
    fn test_delay_response_error_body() {
        let response: DelayResponse =
            serde_json::from_str(r#"{"message": "Timeout"}"#).unwrap();
        assert!(response.delay.is_none());
    }
}
