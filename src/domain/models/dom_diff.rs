// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 差异类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::Added => "added",
            ChangeKind::Removed => "removed",
            ChangeKind::Modified => "modified",
        };
        f.write_str(name)
    }
}

/// 单条差异
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomChange {
    pub change: ChangeKind,
    /// 索引路径，例如 `/html[0]/body[1]/div[2]`
    pub path: String,
    /// 节点标识：标签名或 `#text`
    pub node: String,
    pub description: String,
}

/// 原始 HTML 与渲染后 DOM 的差异摘要
///
/// `compared` 为 true 且 `changes` 为空表示两者语义上相同。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomDiff {
    pub compared: bool,
    pub changes: Vec<DomChange>,
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    /// 差异条目超过上限被截断
    pub truncated: bool,
}

impl DomDiff {
    /// 没有可比较的渲染结果
    pub fn not_compared() -> Self {
        Self {
            compared: false,
            changes: Vec::new(),
            added: 0,
            removed: 0,
            modified: 0,
            truncated: false,
        }
    }

    pub fn is_identical(&self) -> bool {
        self.compared && self.total() == 0
    }

    /// 差异总数（包括被截断的部分）
    pub fn total(&self) -> usize {
        self.added + self.removed + self.modified
    }
}

impl Default for DomDiff {
    fn default() -> Self {
        Self::not_compared()
    }
}
