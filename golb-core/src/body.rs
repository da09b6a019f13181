//! The boxed body type used everywhere a request or response crosses a
//! module boundary in this crate, mirroring the teacher's
//! `BoxBody<Bytes, std::io::Error>` convention (see
//! `ferron-modules-builtin/src/optional/fauth.rs`).

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};

pub type ProxyBody = BoxBody<Bytes, std::io::Error>;

pub fn empty_body() -> ProxyBody {
  Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

pub fn full_body(data: impl Into<Bytes>) -> ProxyBody {
  Full::new(data.into()).map_err(|never| match never {}).boxed()
}
