//! 路由表：模式解析、匹配与优先级选择。
//!
//! # 教案式注释
//!
//! ## 意图（Why）
//! - 注册发生在装配线程，匹配发生在各请求任务中；路由表以 [`ArcSwap`] 持有不可变快照，
//!   读路径零锁，写路径整表替换；
//!
//! ## 模式语法（What）
//! - 字面段：`/users`；
//! - 参数段：`/:id`，匹配恰好一个非空段，按出现顺序编号；
//! - 尾部通配：`/static/*`，匹配剩余的零个或多个段，剩余路径作为最后一个参数；
//!   非尾部的 `*` 按字面段处理。
//!
//! ## 优先级（How）
//! 1. 动词层级：同名动词 > （仅 `HEAD` 请求）`GET` 路由 > `*`（any）；
//! 2. 不含通配的模式优先；
//! 3. 自左向右逐段比较：字面段 > 参数段 > 通配；
//! 4. 以上皆同则先注册者胜出。

use std::cmp::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwap;
use spark_h3::Method;

use crate::message::{Http3Request, Http3Response};

/// 路由表中共享的处理器。
pub type SharedHandler = Arc<dyn Fn(&mut Http3Response, &mut Http3Request) + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
    Wildcard,
}

impl Segment {
    fn weight(&self) -> u8 {
        match self {
            Segment::Literal(_) => 2,
            Segment::Param => 1,
            Segment::Wildcard => 0,
        }
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// 解析后的路由模式。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    pub fn parse(raw: &str) -> Self {
        let parts: Vec<&str> = split(raw).collect();
        let last = parts.len().saturating_sub(1);
        let segments = parts
            .iter()
            .enumerate()
            .map(|(index, part)| match *part {
                "*" if index == last => Segment::Wildcard,
                part if part.len() > 1 && part.starts_with(':') => Segment::Param,
                part => Segment::Literal(part.to_owned()),
            })
            .collect();
        Self {
            raw: raw.to_owned(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn has_wildcard(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Wildcard))
    }

    /// 匹配成功时返回按位置排列的参数。
    pub fn matches(&self, path: &str) -> Option<Vec<String>> {
        let parts: Vec<&str> = split(path).collect();
        let mut params = Vec::new();
        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Wildcard => {
                    params.push(parts[index.min(parts.len())..].join("/"));
                    return Some(params);
                }
                Segment::Param => params.push((*parts.get(index)?).to_owned()),
                Segment::Literal(literal) => {
                    if parts.get(index) != Some(&literal.as_str()) {
                        return None;
                    }
                }
            }
        }
        (parts.len() == self.segments.len()).then_some(params)
    }

    fn specificity(&self, other: &Self) -> Ordering {
        (!self.has_wildcard())
            .cmp(&!other.has_wildcard())
            .then_with(|| {
                let left = self.segments.iter().map(Segment::weight);
                let right = other.segments.iter().map(Segment::weight);
                left.cmp(right)
            })
    }
}

#[derive(Clone)]
struct RouteEntry {
    method: Method,
    pattern: RoutePattern,
    handler: SharedHandler,
}

/// 已注册动词对请求动词的受理层级，`None` 表示不受理。
///
/// 非标准动词（`request` 为 `None`）只能由 any 路由受理。
fn verb_rank(registered: Method, request: Option<Method>) -> Option<u8> {
    match (registered, request) {
        (Method::Any, _) => Some(0),
        (registered, Some(request)) if registered == request => Some(2),
        (Method::Get, Some(Method::Head)) => Some(1),
        _ => None,
    }
}

struct Candidate<'a> {
    entry: &'a RouteEntry,
    rank: u8,
    params: Vec<String>,
}

impl Candidate<'_> {
    fn outranks(&self, other: &Candidate<'_>) -> bool {
        self.rank
            .cmp(&other.rank)
            .then_with(|| self.entry.pattern.specificity(&other.entry.pattern))
            == Ordering::Greater
    }
}

/// 匹配结果。
pub struct Resolved {
    pub handler: SharedHandler,
    pub params: Vec<String>,
    pub pattern: String,
}

impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolved")
            .field("pattern", &self.pattern)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// 可并发读取的路由表。
#[derive(Default)]
pub struct RouteTable {
    entries: ArcSwap<Vec<RouteEntry>>,
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.routes())
            .finish()
    }
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条路由；写者需自行串行化（引擎只在 `&mut self` 上调用）。
    pub fn insert(&self, method: Method, pattern: &str, handler: SharedHandler) {
        let mut next = Vec::clone(&self.entries.load());
        next.push(RouteEntry {
            method,
            pattern: RoutePattern::parse(pattern),
            handler,
        });
        self.entries.store(Arc::new(next));
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 已注册路由的 `(动词, 模式)` 快照，按注册顺序。
    pub fn routes(&self) -> Vec<(Method, String)> {
        self.entries
            .load()
            .iter()
            .map(|entry| (entry.method, entry.pattern.as_str().to_owned()))
            .collect()
    }

    /// 为请求选择处理器。
    ///
    /// `method` 为 `None` 表示非标准动词，只有 any 路由可以受理；`HEAD` 请求在没有
    /// 同名路由时由 `GET` 路由受理，且 `GET` 路由优先于 any 路由。
    pub fn resolve(&self, method: Option<Method>, path: &str) -> Option<Resolved> {
        let entries = self.entries.load();
        let mut best: Option<Candidate<'_>> = None;
        for entry in entries.iter() {
            let Some(rank) = verb_rank(entry.method, method) else {
                continue;
            };
            let Some(params) = entry.pattern.matches(path) else {
                continue;
            };
            let candidate = Candidate {
                entry,
                rank,
                params,
            };
            if best
                .as_ref()
                .is_none_or(|current| candidate.outranks(current))
            {
                best = Some(candidate);
            }
        }
        best.map(|Candidate { entry, params, .. }| Resolved {
            handler: Arc::clone(&entry.handler),
            params,
            pattern: entry.pattern.as_str().to_owned(),
        })
    }
}
