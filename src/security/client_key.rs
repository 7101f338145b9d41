//! Client identification for rate limiting.

use std::net::{IpAddr, SocketAddr};

use axum::{body::Body, extract::ConnectInfo, http::Request};

use crate::error::{PipelineError, PipelineResult};

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Derive the rate-limit key for `request`.
///
/// Forwarding headers are honoured only when `trust_forwarded` is set, i.e.
/// when the service sits behind a proxy that overwrites them. Otherwise the
/// peer address is used. Failing to find any address is an internal error,
/// never a rate-limit decision.
pub fn client_key(request: &Request<Body>, trust_forwarded: bool) -> PipelineResult<String> {
    if trust_forwarded {
        if let Some(ip) = forwarded_ip(request) {
            return Ok(ip.to_string());
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .ok_or_else(|| PipelineError::internal("unable to determine client address"))
}

fn forwarded_ip(request: &Request<Body>) -> Option<IpAddr> {
    let headers = request.headers();

    let first_hop = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|hop| hop.trim().parse().ok());

    first_hop.or_else(|| {
        headers
            .get(X_REAL_IP)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: &[(&str, &str)], peer: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        if let Some(peer) = peer {
            let addr: SocketAddr = peer.parse().unwrap();
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        request
    }

    #[test]
    fn test_peer_address_by_default() {
        let req = request(&[(X_FORWARDED_FOR, "1.2.3.4")], Some("10.0.0.9:5555"));
        assert_eq!(client_key(&req, false).unwrap(), "10.0.0.9");
    }

    #[test]
    fn test_forwarded_first_hop_when_trusted() {
        let req = request(
            &[(X_FORWARDED_FOR, "1.2.3.4, 10.0.0.1"), (X_REAL_IP, "5.6.7.8")],
            Some("10.0.0.9:5555"),
        );
        assert_eq!(client_key(&req, true).unwrap(), "1.2.3.4");

        let req = request(&[(X_REAL_IP, "5.6.7.8")], Some("10.0.0.9:5555"));
        assert_eq!(client_key(&req, true).unwrap(), "5.6.7.8");
    }

    #[test]
    fn test_garbage_forwarded_header_falls_back_to_peer() {
        let req = request(&[(X_FORWARDED_FOR, "not-an-ip")], Some("10.0.0.9:5555"));
        assert_eq!(client_key(&req, true).unwrap(), "10.0.0.9");
    }

    #[test]
    fn test_missing_address_is_internal() {
        let req = request(&[], None);
        assert!(matches!(client_key(&req, true), Err(PipelineError::Internal(_))));
    }
}
