//! 交给路由处理器的请求与响应对象。
//!
//! 处理器是同步闭包：请求体在调用前已完整读入，响应在闭包返回后一次性写回流上。

use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode, request};
use tracing::warn;

/// 一次 HTTP/3 请求的只读视图。
#[derive(Debug)]
pub struct Http3Request {
    parts: request::Parts,
    params: Vec<String>,
    body: Bytes,
}

impl Http3Request {
    pub(crate) fn new(parts: request::Parts, params: Vec<String>, body: Bytes) -> Self {
        Self {
            parts,
            params,
            body,
        }
    }

    pub fn method(&self) -> &http::Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &http::Uri {
        &self.parts.uri
    }

    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    /// 原始查询串（不含 `?`）。
    pub fn query(&self) -> Option<&str> {
        self.parts.uri.query()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// 按名称读取首个头部值；非 UTF-8 可见字符的值视为缺失。
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name)?.to_str().ok()
    }

    /// 按位置读取路由参数：`:name` 段依次编号，尾部 `*` 捕获的剩余路径排在最后。
    pub fn parameter(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    pub fn parameters(&self) -> &[String] {
        &self.params
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// 处理器写入的响应。
///
/// 未调用 [`Http3Response::write_status`] 时状态为 200。`end` 之后的写入被忽略。
#[derive(Debug)]
pub struct Http3Response {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
    ended: bool,
}

impl Default for Http3Response {
    fn default() -> Self {
        Self::with_status(StatusCode::OK)
    }
}

impl Http3Response {
    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            ended: false,
        }
    }

    pub fn write_status(&mut self, status: StatusCode) -> &mut Self {
        if !self.ended {
            self.status = status;
        }
        self
    }

    /// 追加一个响应头；名称或取值不合法时记录告警并跳过。
    pub fn write_header(&mut self, name: &str, value: &str) -> &mut Self {
        if self.ended {
            return self;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => warn!(header = name, "invalid response header skipped"),
        }
        self
    }

    pub fn write(&mut self, chunk: impl AsRef<[u8]>) -> &mut Self {
        if !self.ended {
            self.body.extend_from_slice(chunk.as_ref());
        }
        self
    }

    /// 写入最后一段数据并结束响应。
    pub fn end(&mut self, chunk: impl AsRef<[u8]>) {
        self.write(chunk);
        self.ended = true;
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }

    /// 拆成响应头与响应体；缺省时补齐 `content-length`。
    pub(crate) fn into_parts(self) -> (http::Response<()>, Bytes) {
        let body = self.body.freeze();
        let mut head = http::Response::new(());
        *head.status_mut() = self.status;
        *head.headers_mut() = self.headers;
        if !head.headers().contains_key(CONTENT_LENGTH) {
            head.headers_mut()
                .insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        }
        (head, body)
    }
}
