//! Outbound TCP to the destination, directly or through an upstream proxy.

use std::io;
use std::net::{IpAddr, SocketAddr};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use padrelay_config::{AddressFamily, HostPort, ProxyConfig, ProxyKind};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};
use tokio_socks::tcp::{Socks4Stream, Socks5Stream};
use tracing::debug;

use crate::error::EstablishFailure;

const MAX_RESPONSE_LINE: usize = 8 * 1024;

/// Resolve `addr` to a socket address of the family its literal selects.
pub async fn resolve(addr: &HostPort) -> io::Result<SocketAddr> {
    let family = addr.family();
    let wanted = |ip: &IpAddr| match family {
        AddressFamily::V4 => ip.is_ipv4(),
        AddressFamily::V6 => ip.is_ipv6(),
    };

    if let Ok(ip) = addr.bare_host().parse::<IpAddr>() {
        if !wanted(&ip) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{addr}: address family does not match literal"),
            ));
        }
        return Ok(SocketAddr::new(ip, addr.port()));
    }

    tokio::net::lookup_host((addr.bare_host(), addr.port()))
        .await?
        .find(|sa| wanted(&sa.ip()))
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{addr}: no {family:?} address"),
            )
        })
}

/// Open a TCP connection towards `target`, through `proxy` when configured.
pub async fn connect(
    target: &HostPort,
    proxy: Option<&ProxyConfig>,
) -> Result<TcpStream, EstablishFailure> {
    let Some(proxy) = proxy else {
        let addr = resolve(target)
            .await
            .map_err(|e| EstablishFailure::Resolve(e.to_string()))?;
        debug!(target = %target, addr = %addr, "connecting");
        return Ok(connect_direct(addr).await?);
    };

    let proxy_addr = resolve(&proxy.address())
        .await
        .map_err(|e| EstablishFailure::Resolve(e.to_string()))?;
    debug!(target = %target, proxy = %proxy_addr, kind = ?proxy.kind, "connecting through proxy");

    let stream = match proxy.kind {
        ProxyKind::Socks4 => socks4(proxy_addr, proxy, target).await?,
        ProxyKind::Socks5 => socks5(proxy_addr, proxy, target).await?,
        ProxyKind::Http => http_connect(proxy_addr, proxy, target).await?,
    };
    stream.set_nodelay(true)?;
    Ok(stream)
}

async fn connect_direct(addr: SocketAddr) -> io::Result<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    let stream = socket.connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

async fn socks4(
    proxy_addr: SocketAddr,
    proxy: &ProxyConfig,
    target: &HostPort,
) -> Result<TcpStream, EstablishFailure> {
    let dest = (target.bare_host(), target.port());
    let stream = match proxy.username.as_deref() {
        Some(user_id) => Socks4Stream::connect_with_userid(proxy_addr, dest, user_id).await,
        None => Socks4Stream::connect(proxy_addr, dest).await,
    }
    .map_err(|e| EstablishFailure::Proxy(format!("socks4 {proxy_addr}: {e}")))?;
    Ok(stream.into_inner())
}

async fn socks5(
    proxy_addr: SocketAddr,
    proxy: &ProxyConfig,
    target: &HostPort,
) -> Result<TcpStream, EstablishFailure> {
    let dest = (target.bare_host(), target.port());
    let stream = match (proxy.username.as_deref(), proxy.password.as_deref()) {
        (Some(user), Some(pass)) => {
            Socks5Stream::connect_with_password(proxy_addr, dest, user, pass).await
        }
        _ => Socks5Stream::connect(proxy_addr, dest).await,
    }
    .map_err(|e| EstablishFailure::Proxy(format!("socks5 {proxy_addr}: {e}")))?;
    Ok(stream.into_inner())
}

async fn http_connect(
    proxy_addr: SocketAddr,
    proxy: &ProxyConfig,
    target: &HostPort,
) -> Result<TcpStream, EstablishFailure> {
    let mut stream = connect_direct(proxy_addr).await?;

    let mut request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");
    if let (Some(user), Some(pass)) = (proxy.username.as_deref(), proxy.password.as_deref()) {
        let token = BASE64.encode(format!("{user}:{pass}"));
        request.push_str(&format!("Proxy-Authorization: Basic {token}\r\n"));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    let status_line = read_line(&mut stream).await?;
    match parse_status(&status_line) {
        Some(code) if (200..300).contains(&code) => {}
        _ => {
            return Err(EstablishFailure::Proxy(format!(
                "http {proxy_addr}: CONNECT refused: {status_line}"
            )));
        }
    }
    // Headers end at the first empty line; nothing past it is read.
    while !read_line(&mut stream).await?.is_empty() {}
    Ok(stream)
}

async fn read_line(stream: &mut TcpStream) -> Result<String, EstablishFailure> {
    let mut line = Vec::new();
    loop {
        let byte = stream.read_u8().await?;
        if byte == b'\n' {
            break;
        }
        line.push(byte);
        if line.len() > MAX_RESPONSE_LINE {
            return Err(EstablishFailure::Proxy("response line too long".into()));
        }
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8(line).map_err(|_| EstablishFailure::Proxy("malformed response".into()))
}

fn parse_status(line: &str) -> Option<u16> {
    let mut parts = line.split_whitespace();
    if !parts.next()?.starts_with("HTTP/1.") {
        return None;
    }
    parts.next()?.parse().ok()
}
