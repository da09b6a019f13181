//! Loads a certificate/key pair into a rustls `ServerConfig` for the
//! front-end listener. Only used when both `cert_file` and `key_file` are
//! configured.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;

pub fn build_tls_config(cert_file: &str, key_file: &str) -> anyhow::Result<Arc<ServerConfig>> {
  let certs = load_certs(cert_file)?;
  let key = load_key(key_file)?;

  let config = ServerConfig::builder()
    .with_no_client_auth()
    .with_single_cert(certs, key)
    .context("failed to build TLS server configuration")?;

  Ok(Arc::new(config))
}

fn load_certs(path: &str) -> anyhow::Result<Vec<CertificateDer<'static>>> {
  let file = File::open(path).with_context(|| format!("failed to open cert_file \"{path}\""))?;
  let mut reader = BufReader::new(file);
  rustls_pemfile::certs(&mut reader)
    .collect::<Result<Vec<_>, _>>()
    .with_context(|| format!("failed to parse certificates in \"{path}\""))
}

fn load_key(path: &str) -> anyhow::Result<PrivateKeyDer<'static>> {
  let file = File::open(path).with_context(|| format!("failed to open key_file \"{path}\""))?;
  let mut reader = BufReader::new(file);
  rustls_pemfile::private_key(&mut reader)
    .with_context(|| format!("failed to parse private key in \"{path}\""))?
    .ok_or_else(|| anyhow!("no private key found in \"{path}\""))
}
