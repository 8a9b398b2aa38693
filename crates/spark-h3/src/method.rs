use core::fmt;

/// 路由注册使用的 HTTP 动词。
///
/// # 教案级注释
/// - **意图 (Why)**：九个命名动词与一个通配动词共享同一条注册路径，使用枚举避免在装配器中复制九份几乎相同的函数体；
/// - **契约 (What)**：[`Method::token`] 返回交给引擎的动词记号，`Any` 对应 `"*"`，由引擎解释为“任意动词”；
/// - **风险提示**：通配与具名动词在同一模式上的优先级属于引擎契约，本枚举不做任何假设。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Connect,
    Trace,
    /// 匹配任意动词。
    Any,
}

impl Method {
    /// 全部具名动词，不含 [`Method::Any`]。
    pub const NAMED: [Method; 9] = [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Patch,
        Method::Delete,
        Method::Head,
        Method::Options,
        Method::Connect,
        Method::Trace,
    ];

    /// 交给引擎的动词记号。
    pub const fn token(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Connect => "CONNECT",
            Method::Trace => "TRACE",
            Method::Any => "*",
        }
    }

    /// 由线上请求的动词记号反查枚举；大小写敏感，与 HTTP 语义一致。
    ///
    /// `"*"` 不是合法的请求动词，因此不会映射为 [`Method::Any`]。
    pub fn from_request_token(token: &str) -> Option<Self> {
        Self::NAMED
            .into_iter()
            .find(|method| method.token() == token)
    }

    /// 当前条目是否能够受理给定请求动词。
    pub fn accepts(self, request: Method) -> bool {
        self == Method::Any || self == request
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
