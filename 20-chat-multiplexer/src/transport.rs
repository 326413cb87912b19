//! Dialing the server and splitting the stream into its two directions.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::{
    io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    rustls::{ClientConfig, RootCertStore, pki_types::ServerName},
};
use tracing::{debug, info};

use crate::error::ConnectionError;

/// Any bidirectional byte stream the client can run over.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

type BoxedStream = Box<dyn Stream>;

/// Trust settings for a TLS session.
#[derive(Clone)]
pub struct TlsOptions {
    roots: Arc<RootCertStore>,
    server_name: ServerName<'static>,
}

impl TlsOptions {
    /// Loads every certificate from a PEM file as a trust root.
    pub fn from_pem_file(
        path: impl AsRef<Path>,
        server_name: &str,
    ) -> Result<Self, ConnectionError> {
        let path = path.as_ref();
        let read_error = |source| ConnectionError::ReadRootCertificates {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(read_error)?;
        let certs = rustls_pemfile::certs(&mut BufReader::new(file))
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_error)?;

        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(certs);
        debug!(added, ignored, path = %path.display(), "loaded root certificates");
        if added == 0 {
            return Err(ConnectionError::NoRootCertificates(PathBuf::from(path)));
        }

        Self::new(roots, server_name)
    }

    pub fn new(roots: RootCertStore, server_name: &str) -> Result<Self, ConnectionError> {
        let server_name = ServerName::try_from(server_name.to_string())
            .map_err(|_| ConnectionError::InvalidServerName(server_name.to_string()))?;
        Ok(Self {
            roots: Arc::new(roots),
            server_name,
        })
    }

    fn connector(&self) -> TlsConnector {
        let config = ClientConfig::builder()
            .with_root_certificates(Arc::clone(&self.roots))
            .with_no_client_auth();
        TlsConnector::from(Arc::new(config))
    }
}

/// The single owned connection, already split for one reader and one writer.
pub struct Connection {
    pub(crate) reader: ReadHalf<BoxedStream>,
    pub(crate) writer: WriteHalf<BoxedStream>,
    peer: String,
}

impl Connection {
    /// Wraps an already established stream. Used for in-memory transports.
    pub fn from_stream<S: Stream>(stream: S, peer: impl Into<String>) -> Self {
        let boxed: BoxedStream = Box::new(stream);
        let (reader, writer) = tokio::io::split(boxed);
        Self {
            reader,
            writer,
            peer: peer.into(),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }
}

/// Opens a TCP connection to `address`, negotiating TLS when `tls` is given.
///
/// Certificate validation failures are fatal here; there is no retry.
pub async fn dial(address: &str, tls: Option<&TlsOptions>) -> Result<Connection, ConnectionError> {
    let tcp = TcpStream::connect(address)
        .await
        .map_err(|source| ConnectionError::Io {
            address: address.to_string(),
            source,
        })?;
    if let Err(error) = tcp.set_nodelay(true) {
        debug!(?error, "failed to disable nagle");
    }

    let connection = match tls {
        None => Connection::from_stream(tcp, address),
        Some(tls) => {
            let name = tls.server_name.to_str().into_owned();
            let stream = tls
                .connector()
                .connect(tls.server_name.clone(), tcp)
                .await
                .map_err(|source| ConnectionError::Tls {
                    server_name: name.clone(),
                    source,
                })?;
            debug!(server_name = %name, "tls session established");
            Connection::from_stream(stream, address)
        }
    };

    info!(peer = %address, tls = tls.is_some(), "connected");
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };
    use tokio_rustls::{TlsAcceptor, rustls::ServerConfig};

    use super::*;
    use crate::frame::{Frame, read_frame, write_frame};

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/data")
            .join(name)
    }

    /// Server side of the handshake, using a `localhost` certificate issued by
    /// the test CA in `tests/data/ca.pem`.
    fn acceptor() -> TlsAcceptor {
        let cert_file = File::open(fixture("server.pem")).expect("open cert");
        let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
            .collect::<Result<Vec<_>, _>>()
            .expect("parse cert");
        let key_file = File::open(fixture("server.key")).expect("open key");
        let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
            .expect("parse key")
            .expect("private key present");
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .expect("server config");
        TlsAcceptor::from(Arc::new(config))
    }

    #[test]
    fn rejects_invalid_server_name() {
        let result = TlsOptions::new(RootCertStore::empty(), "not a hostname!");
        assert!(matches!(result, Err(ConnectionError::InvalidServerName(_))));
    }

    #[test]
    fn pem_without_certificates_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "not a certificate").expect("write pem");

        let result = TlsOptions::from_pem_file(file.path(), "localhost");
        assert!(matches!(result, Err(ConnectionError::NoRootCertificates(_))));
    }

    #[test]
    fn missing_pem_file_is_a_read_error() {
        let result = TlsOptions::from_pem_file("/definitely/not/here.crt", "localhost");
        assert!(matches!(
            result,
            Err(ConnectionError::ReadRootCertificates { .. })
        ));
    }

    #[tokio::test]
    async fn dial_refused_is_a_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let result = dial(&addr.to_string(), None).await;
        assert!(matches!(result, Err(ConnectionError::Io { .. })));
    }

    #[tokio::test]
    async fn dial_plain_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let accept = tokio::spawn(async move { listener.accept().await });

        let connection = dial(&addr, None).await.expect("dial");
        assert_eq!(connection.peer(), addr);
        accept.await.expect("join").expect("accept");
    }

    #[tokio::test]
    async fn dial_tls_with_trusted_root() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let acceptor = acceptor();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            let mut stream = acceptor.accept(socket).await.expect("server handshake");
            let frame = read_frame(&mut stream).await.expect("read").expect("frame");
            write_frame(&mut stream, &frame).await.expect("echo");
        });

        let tls = TlsOptions::from_pem_file(fixture("ca.pem"), "localhost").expect("roots");
        let mut connection = dial(&addr, Some(&tls)).await.expect("tls dial");
        write_frame(&mut connection.writer, &Frame::empty("getGroups"))
            .await
            .expect("write");
        let echoed = read_frame(&mut connection.reader)
            .await
            .expect("read")
            .expect("frame");
        assert_eq!(echoed.tag, "getGroups");
        server.await.expect("server");
    }

    #[tokio::test]
    async fn certificate_for_another_name_is_fatal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let acceptor = acceptor();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            // The client aborts the handshake.
            let _ = acceptor.accept(socket).await;
        });

        let tls = TlsOptions::from_pem_file(fixture("ca.pem"), "chat.internal").expect("roots");
        let result = dial(&addr, Some(&tls)).await;
        assert!(matches!(
            result,
            Err(ConnectionError::Tls { ref server_name, .. }) if server_name == "chat.internal"
        ));
        server.await.expect("server");
    }

    #[tokio::test]
    async fn plaintext_peer_fails_the_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut hello = [0u8; 512];
            let _ = socket.read(&mut hello).await;
            let _ = socket.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
        });

        let tls = TlsOptions::new(RootCertStore::empty(), "localhost").expect("options");
        let result = dial(&addr, Some(&tls)).await;
        assert!(matches!(
            result,
            Err(ConnectionError::Tls { ref server_name, .. }) if server_name == "localhost"
        ));
        server.await.expect("server");
    }
}
