//! 用户可见输出
//!
//! 组件通过注入的 [`Reporter`] 输出提示信息，不直接操作终端。

use owo_colors::OwoColorize;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy)]
enum Tone {
    Red,
    Green,
    Yellow,
    Cyan,
}

/// 输出级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Title,
    Info,
    Success,
    Warn,
    Error,
}

/// 面向用户的报告接口
pub trait Reporter: Send + Sync {
    /// 输出一条消息
    fn emit(&self, level: Level, message: &str);

    fn title(&self, message: &str) {
        self.emit(Level::Title, message);
    }

    fn info(&self, message: &str) {
        self.emit(Level::Info, message);
    }

    fn success(&self, message: &str) {
        self.emit(Level::Success, message);
    }

    fn warn(&self, message: &str) {
        self.emit(Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.emit(Level::Error, message);
    }

    /// 空行
    fn line(&self) {
        self.emit(Level::Info, "");
    }
}

/// 终端输出，可选 ANSI 颜色
#[derive(Debug, Clone)]
pub struct ConsoleReporter {
    color: bool,
}

impl ConsoleReporter {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// 根据 `NO_COLOR` 环境变量决定是否着色
    pub fn from_env() -> Self {
        Self::new(std::env::var_os("NO_COLOR").is_none())
    }

    fn paint(&self, tone: Tone, text: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        match tone {
            Tone::Red => text.red().to_string(),
            Tone::Green => text.green().to_string(),
            Tone::Yellow => text.yellow().bold().to_string(),
            Tone::Cyan => text.cyan().to_string(),
        }
    }

    /// 为延迟等片段着色，供渲染函数使用
    pub fn green(&self, text: &str) -> String {
        self.paint(Tone::Green, text)
    }

    pub fn yellow(&self, text: &str) -> String {
        self.paint(Tone::Yellow, text)
    }

    pub fn red(&self, text: &str) -> String {
        self.paint(Tone::Red, text)
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::from_env()
    }
}

impl Reporter for ConsoleReporter {
    fn emit(&self, level: Level, message: &str) {
        match level {
            Level::Title => {
                let rule = "=".repeat(60);
                println!("\n{}", self.paint(Tone::Cyan, &rule));
                println!("{}", self.paint(Tone::Cyan, message));
                println!("{}\n", self.paint(Tone::Cyan, &rule));
            }
            Level::Info => println!("{}", message),
            Level::Success => println!("{}", self.paint(Tone::Green, &format!("✓ {}", message))),
            Level::Warn => println!("{}", self.paint(Tone::Yellow, &format!("⚠ {}", message))),
            Level::Error => eprintln!("{}", self.paint(Tone::Red, &format!("✗ {}", message))),
        }
    }
}

/// 记录所有消息，测试中用于断言输出
#[derive(Debug, Default)]
pub struct MemoryReporter {
    messages: Mutex<Vec<(Level, String)>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已记录的消息
    pub fn messages(&self) -> Vec<(Level, String)> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// 指定级别的消息
    pub fn at(&self, level: Level) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }

    /// 是否有包含 `needle` 的消息
    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|(_, m)| m.contains(needle))
    }
}

impl Reporter for MemoryReporter {
    fn emit(&self, level: Level, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((level, message.to_string()));
        }
    }
}
