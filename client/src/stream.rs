// Copyright (c) 2024 MQTT broker contributors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Client-side counterpart of `broker::stream`: a uniform byte stream over
//! the two transports a client dials out on. WebSocket is a broker-only
//! listener feature in this workspace (see `connect_options::ConnectType`),
//! so only plain and TLS TCP are represented here.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::connect_options::ConnectType;
use crate::error::{Error, ErrorKind};

pub enum Stream {
    Mqtt(TcpStream),
    Mqtts(Box<TlsStream<TcpStream>>),
}

impl Stream {
    pub async fn connect(address: &str, connect_type: &ConnectType) -> Result<Self, Error> {
        let tcp = TcpStream::connect(address).await?;
        match connect_type {
            ConnectType::Mqtt => Ok(Self::Mqtt(tcp)),
            ConnectType::Mqtts { server_name } => {
                let mut roots = RootCertStore::empty();
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                let tls_config = ClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_no_client_auth();
                let connector = TlsConnector::from(Arc::new(tls_config));
                let name = ServerName::try_from(server_name.clone())
                    .map_err(|_| Error::new(ErrorKind::IoError, "invalid TLS server name"))?;
                let tls = connector.connect(name, tcp).await?;
                Ok(Self::Mqtts(Box::new(tls)))
            }
        }
    }

    pub async fn read_buf(&mut self, buf: &mut Vec<u8>) -> Result<usize, Error> {
        match self {
            Self::Mqtt(tcp) => Ok(tcp.read_buf(buf).await?),
            Self::Mqtts(tls) => Ok(tls.read_buf(buf).await?),
        }
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> Result<(), Error> {
        match self {
            Self::Mqtt(tcp) => tcp.write_all(buf).await?,
            Self::Mqtts(tls) => tls.write_all(buf).await?,
        }
        Ok(())
    }

    pub async fn close(&mut self) {
        let _ = match self {
            Self::Mqtt(tcp) => tcp.shutdown().await,
            Self::Mqtts(tls) => tls.shutdown().await,
        };
    }
}
