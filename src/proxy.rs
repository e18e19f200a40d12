//! 代理核心功能模块
//!
//! 代理组 / 节点的分类与展示，以及节点延迟测试和排序。

use crate::client::ControlApiClient;
use crate::error::Result;
use crate::types::{ProxyGroup, ProxyItem, ProxyNode};
use indexmap::IndexMap;

/// 延迟测试地址
pub const DEFAULT_TEST_URL: &str = "http://www.gstatic.com/generate_204";
/// 单个节点的测试超时（毫秒）
pub const DEFAULT_TIMEOUT_MS: u32 = 5000;
/// 测试失败节点的排序值
pub const UNREACHABLE_DELAY: u32 = 9999;
/// 排序结果最多显示的节点数
pub const MAX_VISIBLE_RESULTS: usize = 20;
/// 代理组摘要中展示的成员数
pub const GROUP_SAMPLE_SIZE: usize = 5;

/// 不作为代理组显示的名称
const HIDDEN_GROUPS: &[&str] = &["GLOBAL"];
/// 不作为节点显示的名称
const BUILTIN_NODES: &[&str] = &["DIRECT", "REJECT", "GLOBAL"];

/// 一次 `GET /proxies` 的分类结果，保持内核返回的顺序
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxySnapshot {
    groups: Vec<ProxyGroup>,
    nodes: Vec<ProxyNode>,
}

impl ProxySnapshot {
    /// 有 `all` 字段的条目是代理组，其余是节点
    pub fn classify(table: &IndexMap<String, ProxyItem>) -> Self {
        let mut snapshot = Self::default();

        for (name, item) in table {
            match &item.all {
                Some(all) => {
                    if HIDDEN_GROUPS.contains(&name.as_str()) {
                        continue;
                    }
                    snapshot.groups.push(ProxyGroup {
                        name: name.clone(),
                        group_type: item.proxy_type.clone(),
                        now: item.now.clone().unwrap_or_default(),
                        all: all.clone(),
                    });
                }
                None => {
                    if BUILTIN_NODES.contains(&name.as_str()) {
                        continue;
                    }
                    snapshot.nodes.push(ProxyNode {
                        name: name.clone(),
                        node_type: item.proxy_type.clone(),
                        last_delay: item.last_delay(),
                    });
                }
            }
        }

        snapshot
    }

    pub fn groups(&self) -> &[ProxyGroup] {
        &self.groups
    }

    pub fn nodes(&self) -> &[ProxyNode] {
        &self.nodes
    }

    pub fn group(&self, name: &str) -> Option<&ProxyGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn node(&self, name: &str) -> Option<&ProxyNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// 代理组当前选择的节点；当前选择是另一个代理组时为 `None`
    pub fn current_node(&self, group: &ProxyGroup) -> Option<&ProxyNode> {
        self.node(&group.now)
    }

    /// 代理组当前选择的延迟
    pub fn current_delay(&self, group: &ProxyGroup) -> Option<u32> {
        self.current_node(group).and_then(|n| n.last_delay)
    }

    /// 节点名称，按内核返回顺序
    pub fn node_names(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.name.clone()).collect()
    }
}

/// 代理组的展示摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSummary {
    pub name: String,
    pub group_type: String,
    pub now: String,
    pub member_count: usize,
    /// 前 [`GROUP_SAMPLE_SIZE`] 个成员
    pub sample: Vec<String>,
    /// 未展示的成员数
    pub hidden: usize,
}

impl GroupSummary {
    pub fn new(group: &ProxyGroup) -> Self {
        let sample: Vec<String> = group.all.iter().take(GROUP_SAMPLE_SIZE).cloned().collect();
        Self {
            name: group.name.clone(),
            group_type: group.group_type.clone(),
            now: group.now.clone(),
            member_count: group.all.len(),
            hidden: group.all.len() - sample.len(),
            sample,
        }
    }

    /// 渲染为多行文本（不含颜色）
    pub fn render(&self) -> Vec<String> {
        let mut lines = vec![
            format!("📦 {} ({})", self.name, self.group_type),
            format!("   当前选择: {}", self.now),
            format!("   可用节点: {} 个", self.member_count),
        ];
        if !self.sample.is_empty() {
            lines.push(format!("   - {}", self.sample.join(", ")));
        }
        if self.hidden > 0 {
            lines.push(format!("   ... 还有 {} 个节点", self.hidden));
        }
        lines
    }
}

/// 延迟分级
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyBucket {
    /// 小于 200ms
    Good,
    /// 小于 500ms
    Fair,
    Poor,
    TimedOut,
}

impl LatencyBucket {
    /// `0`（历史记录中的超时）和 [`UNREACHABLE_DELAY`] 都视为超时，
    /// 其余较大的实测值仍然是慢速节点
    pub fn of(delay: u32) -> Self {
        match delay {
            0 | UNREACHABLE_DELAY => LatencyBucket::TimedOut,
            d if d < 200 => LatencyBucket::Good,
            d if d < 500 => LatencyBucket::Fair,
            _ => LatencyBucket::Poor,
        }
    }
}

/// 延迟文本：`None` 为未测试，超时显示为"超时"
pub fn format_delay(delay: Option<u32>) -> String {
    match delay {
        None => "未测试".to_string(),
        Some(d) if LatencyBucket::of(d) == LatencyBucket::TimedOut => "超时".to_string(),
        Some(d) => format!("{}ms", d),
    }
}

/// 一个节点的测试结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyResult {
    pub name: String,
    /// 毫秒，测试失败为 [`UNREACHABLE_DELAY`]
    pub delay: u32,
}

impl LatencyResult {
    pub fn bucket(&self) -> LatencyBucket {
        LatencyBucket::of(self.delay)
    }
}

/// 批量测试结果，按延迟升序，测试失败的排在最后，延迟相同时保持测试顺序
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatencyRanking {
    results: Vec<LatencyResult>,
}

impl LatencyRanking {
    /// 对测试结果做稳定排序
    pub fn from_results(mut results: Vec<LatencyResult>) -> Self {
        results.sort_by_key(|r| (r.delay == UNREACHABLE_DELAY, r.delay));
        Self { results }
    }

    pub fn results(&self) -> &[LatencyResult] {
        &self.results
    }

    /// 需要展示的前 [`MAX_VISIBLE_RESULTS`] 个结果
    pub fn visible(&self) -> &[LatencyResult] {
        &self.results[..self.results.len().min(MAX_VISIBLE_RESULTS)]
    }

    /// 未展示的结果数
    pub fn hidden(&self) -> usize {
        self.results.len().saturating_sub(MAX_VISIBLE_RESULTS)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// 延迟最低且可用的节点
    pub fn fastest(&self) -> Option<&LatencyResult> {
        self.results
            .first()
            .filter(|r| r.bucket() != LatencyBucket::TimedOut)
    }
}

/// 代理状态查询
#[derive(Debug, Clone)]
pub struct ProxyState {
    client: ControlApiClient,
}

impl ProxyState {
    pub fn new(client: ControlApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ControlApiClient {
        &self.client
    }

    /// 查询并分类当前代理表
    pub async fn snapshot(&self) -> Result<ProxySnapshot> {
        let table = self.client.query_proxies().await?;
        let snapshot = ProxySnapshot::classify(&table);
        log::debug!(
            "Classified {} groups and {} nodes",
            snapshot.groups().len(),
            snapshot.nodes().len()
        );
        Ok(snapshot)
    }

    /// 代理组摘要
    pub async fn list_groups(&self) -> Result<Vec<GroupSummary>> {
        Ok(self
            .snapshot()
            .await?
            .groups()
            .iter()
            .map(GroupSummary::new)
            .collect())
    }

    /// 切换代理组选择
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use clash_manager::{client::ControlApiClient, proxy::ProxyState};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = ControlApiClient::new("http://127.0.0.1:9090", None)?;
    /// let state = ProxyState::new(client);
    /// state.switch("Proxy", "HK-01").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn switch(&self, group: &str, node: &str) -> Result<()> {
        self.client.set_node(group, node).await
    }
}

/// 节点延迟测试
#[derive(Debug, Clone)]
pub struct LatencyProbe {
    client: ControlApiClient,
    test_url: String,
    timeout_ms: u32,
}

impl LatencyProbe {
    pub fn new(client: ControlApiClient) -> Self {
        Self {
            client,
            test_url: DEFAULT_TEST_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_test_url<S: Into<String>>(mut self, test_url: S) -> Self {
        self.test_url = test_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// 测试单个节点，任何失败都返回 `None`
    pub async fn latency(&self, node: &str) -> Option<u32> {
        match self.client.delay(node, self.timeout_ms, &self.test_url).await {
            Ok(0) => None,
            Ok(delay) => Some(delay),
            Err(e) => {
                log::debug!("Delay test for '{}' failed: {}", node, e);
                None
            }
        }
    }

    /// 依次测试所有节点并排序
    ///
    /// `progress` 在每个节点开始测试前调用，参数为 `(序号, 总数, 节点名)`，序号从 1 开始。
    pub async fn test_all<F>(&self, nodes: &[String], mut progress: F) -> LatencyRanking
    where
        F: FnMut(usize, usize, &str),
    {
        let total = nodes.len();
        let mut results = Vec::with_capacity(total);

        for (i, name) in nodes.iter().enumerate() {
            progress(i + 1, total, name);
            let delay = self.latency(name).await.unwrap_or(UNREACHABLE_DELAY);
            results.push(LatencyResult {
                name: name.clone(),
                delay,
            });
        }

        LatencyRanking::from_results(results)
    }
}
