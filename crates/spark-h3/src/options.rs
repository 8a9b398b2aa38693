use core::fmt;

use serde::Deserialize;

/// 构造引擎所需的传输安全参数。
///
/// # 教案级注释
/// - **意图 (Why)**：集中承载私钥路径、证书路径与口令三项不透明字符串；
/// - **契约 (What)**：[`crate::H3App::new`] 以引用接收本结构并在内部复制一份交给引擎，
///   调用方的原值在构造返回后即可释放；本结构不做任何格式校验；
/// - **风险提示**：`Debug` 输出会隐去口令，避免在日志中泄露。
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportOptions {
    /// PEM 私钥文件路径。
    pub key_file: Option<String>,
    /// PEM 证书链文件路径。
    pub cert_file: Option<String>,
    /// 私钥口令。
    pub passphrase: Option<String>,
}

impl TransportOptions {
    pub fn new(key_file: impl Into<String>, cert_file: impl Into<String>) -> Self {
        Self {
            key_file: Some(key_file.into()),
            cert_file: Some(cert_file.into()),
            passphrase: None,
        }
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// 口令是否实际给出（空串视为未给出）。
    pub fn has_passphrase(&self) -> bool {
        self.passphrase
            .as_deref()
            .is_some_and(|passphrase| !passphrase.is_empty())
    }
}

impl fmt::Debug for TransportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportOptions")
            .field("key_file", &self.key_file)
            .field("cert_file", &self.cert_file)
            .field(
                "passphrase",
                &self.passphrase.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// 监听选项位掩码。
///
/// # 教案级注释
/// - **意图 (Why)**：保留“带选项”的两种监听形态，让传入位掩码的既有调用方无需修改；
/// - **契约 (What)**：取值与底层套接字层一致，`DEFAULT = 0`、`EXCLUSIVE_PORT = 1`；
///   装配器接受该值但**不会**转交给引擎，引擎的 `listen` 契约只有主机与端口两个参数；
/// - **风险提示 (Trade-offs)**：若未来引擎契约增加选项参数，需要在装配器的绑定路径补上转发，
///   否则 `EXCLUSIVE_PORT` 将继续静默失效。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct ListenOptions(u32);

impl ListenOptions {
    pub const DEFAULT: ListenOptions = ListenOptions(0);
    pub const EXCLUSIVE_PORT: ListenOptions = ListenOptions(1);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: ListenOptions) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_default(self) -> bool {
        self.0 == 0
    }
}

impl core::ops::BitOr for ListenOptions {
    type Output = ListenOptions;

    fn bitor(self, rhs: Self) -> Self::Output {
        ListenOptions(self.0 | rhs.0)
    }
}

/// 一次监听请求：主机（可缺省）、端口、选项（可缺省）。
///
/// 四种 `listen` 形态都会先归一成本结构，再进入唯一的绑定路径。
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenRequest {
    #[serde(default)]
    pub host: Option<String>,
    pub port: u16,
    #[serde(default)]
    pub options: Option<ListenOptions>,
}

impl ListenRequest {
    pub fn new(port: u16) -> Self {
        Self {
            host: None,
            port,
            options: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_options(mut self, options: ListenOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// 真正交给引擎的主机：空串与缺省一样，表示绑定全部网卡。
    pub fn bind_host(&self) -> Option<&str> {
        self.host.as_deref().filter(|host| !host.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_host_binds_every_interface() {
        assert_eq!(ListenRequest::new(80).with_host("").bind_host(), None);
        assert_eq!(ListenRequest::new(80).bind_host(), None);
        assert_eq!(
            ListenRequest::new(80).with_host("::1").bind_host(),
            Some("::1")
        );
    }

    #[test]
    fn passphrase_is_redacted_in_debug_output() {
        let options = TransportOptions::new("key.pem", "cert.pem").with_passphrase("hunter2");
        let rendered = format!("{options:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("hunter2"));
        assert!(options.has_passphrase());
        assert!(!TransportOptions::default().with_passphrase("").has_passphrase());
    }

    #[test]
    fn listen_options_compose_as_bitmask() {
        let combined = ListenOptions::DEFAULT | ListenOptions::EXCLUSIVE_PORT;
        assert!(combined.contains(ListenOptions::EXCLUSIVE_PORT));
        assert_eq!(combined.bits(), 1);
        assert!(ListenOptions::default().is_default());
        assert_eq!(ListenOptions::from_bits(5).bits(), 5);
    }
}
