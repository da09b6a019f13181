//! The client's remote address, threaded through request extensions by the
//! listener so filters downstream (rate limiting) can key on it without the
//! dispatch engine depending on a particular server framework.

use std::net::IpAddr;

#[derive(Debug, Clone, Copy)]
pub struct ClientAddr(pub IpAddr);
