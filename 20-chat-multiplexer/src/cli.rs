use std::{path::PathBuf, time::Duration};

use clap::{Parser, ValueHint};

use crate::{client::ClientOptions, error::ConnectionError, transport::TlsOptions};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Terminal client for the group chat server", long_about = None)]
pub struct Cli {
    /// Address of the chat server.
    #[arg(long, default_value = "127.0.0.1:2750", value_hint = ValueHint::Hostname)]
    pub server: String,

    /// PEM file with the root certificates to trust. Enables TLS.
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub ca: Option<PathBuf>,

    /// Name the server certificate must be issued for (TLS only).
    #[arg(long, default_value = "localhost")]
    pub server_name: String,

    /// Directory downloaded files are written to.
    #[arg(long, default_value = "./downloads", value_hint = ValueHint::DirPath)]
    pub downloads: PathBuf,

    /// Seconds to wait for a response before giving up. 0 waits forever.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

impl Cli {
    pub fn tls(&self) -> Result<Option<TlsOptions>, ConnectionError> {
        self.ca
            .as_ref()
            .map(|path| TlsOptions::from_pem_file(path, &self.server_name))
            .transpose()
    }

    pub fn options(&self) -> ClientOptions {
        ClientOptions {
            call_timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
            downloads_dir: self.downloads.clone(),
            ..ClientOptions::default()
        }
    }
}
