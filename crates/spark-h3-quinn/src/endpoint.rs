//! UDP 套接字绑定与 quinn Endpoint 构建。
//!
//! # 教案式注释
//!
//! ## 意图（Why）
//! - 装配器把“未指定主机”归一为 `None`，这里负责把它落实为“全部网卡”：
//!   优先绑定双栈 `[::]`，内核不支持 IPv6 时退回 `0.0.0.0`；
//! - 显式主机先经 DNS/字面量解析，再逐个地址尝试绑定，首个成功者胜出。
//!
//! ## 契约（What）
//! - 绑定是同步完成的，返回时端口已被占用，`local_addr` 可立即读取；
//! - 失败映射为 [`EngineError::AddrResolve`] 或 [`EngineError::Bind`]；
//! - 构建 [`Endpoint`] 需要处于 Tokio 运行时上下文中，由调用方通过
//!   [`TokioLoop::enter`] 保证。

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;

use quinn::{Endpoint, EndpointConfig, ServerConfig};
use socket2::{Domain, Protocol, Socket, Type};
use spark_h3::EngineError;
use tracing::debug;

use crate::event_loop::TokioLoop;

/// 解析监听地址；`None` 主机在此不处理，由 [`bind_udp`] 负责。
pub fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, EngineError> {
    let literal = host
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(host);
    if let Ok(ip) = literal.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }
    let resolve_error = || EngineError::AddrResolve {
        host: host.to_owned(),
        port,
    };
    let addrs: Vec<SocketAddr> = (literal, port)
        .to_socket_addrs()
        .map_err(|_| resolve_error())?
        .collect();
    if addrs.is_empty() {
        return Err(resolve_error());
    }
    Ok(addrs)
}

fn bind_socket(addr: SocketAddr, dual_stack: bool) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    if dual_stack {
        socket.set_only_v6(false)?;
    }
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// 同步绑定 UDP 套接字。
pub fn bind_udp(host: Option<&str>, port: u16) -> Result<UdpSocket, EngineError> {
    let Some(host) = host else {
        let any_v6 = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port);
        return bind_socket(any_v6, true).or_else(|error| {
            debug!(%error, port, "dual-stack bind unavailable, falling back to IPv4");
            let any_v4 = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
            bind_socket(any_v4, false).map_err(|source| EngineError::Bind {
                addr: any_v4.to_string(),
                source,
            })
        });
    };

    let mut last = None;
    for addr in resolve(host, port)? {
        match bind_socket(addr, false) {
            Ok(socket) => return Ok(socket),
            Err(source) => {
                debug!(%addr, error = %source, "bind attempt failed");
                last = Some(EngineError::Bind {
                    addr: addr.to_string(),
                    source,
                });
            }
        }
    }
    Err(last.unwrap_or_else(|| EngineError::AddrResolve {
        host: host.to_owned(),
        port,
    }))
}

/// 在已绑定的套接字上构建服务端 Endpoint。
pub fn server_endpoint(
    event_loop: &TokioLoop,
    socket: UdpSocket,
    config: ServerConfig,
) -> Result<Endpoint, EngineError> {
    let _guard = event_loop.enter()?;
    Endpoint::new(
        EndpointConfig::default(),
        Some(config),
        socket,
        Arc::new(quinn::TokioRuntime),
    )
    .map_err(|source| EngineError::io("create quic endpoint", source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_addresses_skip_dns() {
        assert_eq!(
            resolve("127.0.0.1", 443).unwrap(),
            vec!["127.0.0.1:443".parse().unwrap()]
        );
        assert_eq!(
            resolve("[::1]", 8443).unwrap(),
            vec!["[::1]:8443".parse().unwrap()]
        );
    }

    #[test]
    fn unresolvable_host_is_reported() {
        let err = resolve("no-such-host.invalid", 443).unwrap_err();
        assert!(matches!(err, EngineError::AddrResolve { port: 443, .. }));
    }

    #[test]
    fn ephemeral_loopback_bind_reports_real_port() {
        let socket = bind_udp(Some("127.0.0.1"), 0).unwrap();
        let addr = socket.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn occupied_port_is_a_bind_error() {
        let first = bind_udp(Some("127.0.0.1"), 0).unwrap();
        let port = first.local_addr().unwrap().port();
        let err = bind_udp(Some("127.0.0.1"), port).unwrap_err();
        assert!(matches!(err, EngineError::Bind { .. }));
    }

    #[test]
    fn wildcard_bind_succeeds() {
        let socket = bind_udp(None, 0).unwrap();
        assert!(socket.local_addr().unwrap().ip().is_unspecified());
    }
}
