//! Session operations exposed to the rest of the application.
//!
//! [`ChatClient`] owns the background tasks of one connection. Every
//! request-style operation is a correlated exchange; `leave_group`,
//! `send_text`, `invite_user` and `upload_file` are fire-and-forget.

use std::{
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use prost::Message;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    correlator::{Correlator, Exchange},
    error::{ClientError, ConnectionError},
    frame::{Frame, MAX_BODY_LEN},
    messages::{
        AcceptInviteReq, CreateGroupReq, DeleteInviteReq, DownloadReq, DownloadResp,
        FileMessageReq, GroupResp, GroupsResp, Invite, InviteReq, InvitesResp, JoinGroupReq,
        LoginReq, SignUpReq, TextMessage, TextMessageReq, UserSearchReq, UserSearchResp, tags,
    },
    router::Router,
    subscription::Subscription,
    tasks::{DisconnectMonitor, run_reader, run_writer},
    transport::{Connection, TlsOptions, dial},
};

/// Uploads above this size are sent but logged: the whole file sits in memory
/// and goes out as a single frame.
pub const LARGE_UPLOAD_WARNING: u64 = 8 * 1024 * 1024;

// Room left in a frame body for the name and field headers of an upload.
const UPLOAD_OVERHEAD: usize = 64 * 1024;

const SIGN_UP: Exchange = Exchange {
    operation: "sign up",
    request: tags::SIGN_UP,
    success: tags::AUTH,
    errors: &[tags::AUTH_ERR],
};

const LOGIN: Exchange = Exchange {
    operation: "login",
    request: tags::LOGIN,
    success: tags::AUTH,
    errors: &[tags::AUTH_ERR],
};

const CREATE_GROUP: Exchange = Exchange {
    operation: "create group",
    request: tags::CREATE_GROUP,
    success: tags::GROUP,
    errors: &[tags::CREATE_GROUP_ERR],
};

const JOIN_GROUP: Exchange = Exchange {
    operation: "join group",
    request: tags::JOIN_GROUP,
    success: tags::GROUP,
    errors: &[tags::JOIN_GROUP_ERR],
};

const REFRESH_GROUP: Exchange = Exchange {
    operation: "refresh group",
    request: tags::REFRESH_GROUP,
    success: tags::GROUP,
    errors: &[],
};

const SEARCH_USERS: Exchange = Exchange {
    operation: "search users",
    request: tags::SEARCH_USERS,
    success: tags::USER_SEARCH_RESP,
    errors: &[tags::USER_SEARCH_ERR],
};

const LIST_GROUPS: Exchange = Exchange {
    operation: "list groups",
    request: tags::GET_GROUPS,
    success: tags::GET_GROUPS,
    errors: &[tags::GET_GROUPS_ERR],
};

const LIST_INVITES: Exchange = Exchange {
    operation: "list invites",
    request: tags::GET_INVITES,
    success: tags::GET_INVITES,
    errors: &[tags::GET_INVITES_ERR],
};

const ACCEPT_INVITE: Exchange = Exchange {
    operation: "accept invite",
    request: tags::ACCEPT_INVITE,
    success: tags::GET_INVITES,
    errors: &[tags::ACCEPT_INVITE_ERR, tags::GET_INVITES_ERR],
};

const DECLINE_INVITE: Exchange = Exchange {
    operation: "decline invite",
    request: tags::DELETE_INVITE,
    success: tags::GET_INVITES,
    errors: &[tags::DELETE_INVITE_ERR, tags::GET_INVITES_ERR],
};

const DOWNLOAD: Exchange = Exchange {
    operation: "download file",
    request: tags::DOWNLOAD,
    success: tags::DOWNLOAD_RESP,
    errors: &[tags::DOWNLOAD_ERR],
};

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Upper bound on every request/response wait. `None` waits until a
    /// response or a disconnect.
    pub call_timeout: Option<Duration>,
    pub downloads_dir: PathBuf,
    /// Inbound frames buffered between the reader and the router.
    pub routing_capacity: usize,
    /// Outbound frames buffered ahead of the writer.
    pub outbound_capacity: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            call_timeout: Some(Duration::from_secs(30)),
            downloads_dir: PathBuf::from("./downloads"),
            routing_capacity: 64,
            outbound_capacity: 64,
        }
    }
}

pub struct ChatClient {
    correlator: Correlator,
    monitor: DisconnectMonitor,
    downloads_dir: PathBuf,
    stream: tokio::sync::Mutex<Option<Subscription>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ChatClient {
    /// Dials the server and starts the session.
    pub async fn connect(
        address: &str,
        tls: Option<&TlsOptions>,
        options: ClientOptions,
    ) -> Result<Self, ConnectionError> {
        let connection = dial(address, tls).await?;
        Ok(Self::start(connection, options))
    }

    /// Starts the writer, reader and router tasks over an open connection.
    pub fn start(connection: Connection, options: ClientOptions) -> Self {
        let monitor = DisconnectMonitor::new();
        let (router, router_task) = Router::spawn(options.routing_capacity, monitor.token());
        let (outbound_tx, outbound_rx) = mpsc::channel(options.outbound_capacity.max(1));

        info!(peer = connection.peer(), "session started");
        let Connection { reader, writer, .. } = connection;
        let writer_task = tokio::spawn(run_writer(writer, outbound_rx, monitor.clone()));
        let reader_task = tokio::spawn(run_reader(reader, router.clone(), monitor.clone()));

        Self {
            correlator: Correlator::new(router, outbound_tx, monitor.clone(), options.call_timeout),
            monitor,
            downloads_dir: options.downloads_dir,
            stream: tokio::sync::Mutex::new(None),
            tasks: Mutex::new(vec![writer_task, reader_task, router_task]),
        }
    }

    pub async fn sign_up(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let req = SignUpReq {
            username: username.to_string(),
            password: password.to_string(),
        };
        self.call(SIGN_UP, &req).await.map(drop)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let req = LoginReq {
            username: username.to_string(),
            password: password.to_string(),
        };
        self.call(LOGIN, &req).await.map(drop)
    }

    pub async fn create_group(&self, group_name: &str) -> Result<GroupResp, ClientError> {
        let req = CreateGroupReq {
            group_name: group_name.to_string(),
        };
        self.request(CREATE_GROUP, &req).await
    }

    pub async fn join_group(&self, group_name: &str) -> Result<GroupResp, ClientError> {
        let req = JoinGroupReq {
            group_name: group_name.to_string(),
        };
        self.request(JOIN_GROUP, &req).await
    }

    pub async fn refresh_group(&self) -> Result<GroupResp, ClientError> {
        self.request_empty(REFRESH_GROUP).await
    }

    pub async fn leave_group(&self) -> Result<(), ClientError> {
        self.correlator.send(Frame::empty(tags::LEAVE_GROUP)).await
    }

    pub async fn send_text(&self, message: &str) -> Result<(), ClientError> {
        let req = TextMessageReq {
            message: message.to_string(),
        };
        self.notify(tags::TEXT_MSG, &req).await
    }

    pub async fn search_users(&self, username_prefix: &str) -> Result<Vec<String>, ClientError> {
        let req = UserSearchReq {
            username_prefix: username_prefix.to_string(),
        };
        let resp: UserSearchResp = self.request(SEARCH_USERS, &req).await?;
        Ok(resp.usernames)
    }

    /// Invites a user into the group the session is currently in.
    pub async fn invite_user(&self, username: &str) -> Result<(), ClientError> {
        let req = InviteReq {
            username: username.to_string(),
        };
        self.notify(tags::INVITE, &req).await
    }

    pub async fn list_groups(&self) -> Result<Vec<String>, ClientError> {
        let resp: GroupsResp = self.request_empty(LIST_GROUPS).await?;
        Ok(resp.group_names)
    }

    pub async fn list_invites(&self) -> Result<Vec<Invite>, ClientError> {
        let resp: InvitesResp = self.request_empty(LIST_INVITES).await?;
        Ok(resp.invites)
    }

    /// Accepts an invite and returns the invites still pending.
    pub async fn accept_invite(&self, invite_id: &str) -> Result<Vec<Invite>, ClientError> {
        let req = AcceptInviteReq {
            invite_id: invite_id.to_string(),
        };
        let resp: InvitesResp = self.request(ACCEPT_INVITE, &req).await?;
        Ok(resp.invites)
    }

    /// Declines an invite and returns the invites still pending.
    pub async fn decline_invite(&self, invite_id: &str) -> Result<Vec<Invite>, ClientError> {
        let req = DeleteInviteReq {
            invite_id: invite_id.to_string(),
        };
        let resp: InvitesResp = self.request(DECLINE_INVITE, &req).await?;
        Ok(resp.invites)
    }

    /// Sends a whole file as one frame, named after its last path component.
    ///
    /// There is no chunking: the file is read fully into memory first.
    pub async fn upload_file(&self, path: impl AsRef<Path>) -> Result<(), ClientError> {
        let path = path.as_ref();
        let file_error = |source| ClientError::File {
            path: path.to_path_buf(),
            source,
        };
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                file_error(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "path has no usable file name",
                ))
            })?
            .to_string();

        let size = tokio::fs::metadata(path).await.map_err(file_error)?.len();
        let limit = MAX_BODY_LEN - UPLOAD_OVERHEAD;
        if size > limit as u64 {
            return Err(ClientError::FileTooLarge {
                path: path.to_path_buf(),
                size,
                limit,
            });
        }
        if size > LARGE_UPLOAD_WARNING {
            warn!(path = %path.display(), size, "uploading a large file in a single frame");
        }

        let contents = tokio::fs::read(path).await.map_err(file_error)?;
        let req = FileMessageReq { name, contents };
        self.notify(tags::UPLOAD, &req).await
    }

    /// Downloads a file into the downloads directory, replacing any file of
    /// the same name, and returns where it was written.
    pub async fn download_file(&self, file_id: &str) -> Result<PathBuf, ClientError> {
        let req = DownloadReq {
            file_id: file_id.to_string(),
        };
        let resp: DownloadResp = self.request(DOWNLOAD, &req).await?;
        if !is_plain_file_name(&resp.file_id) {
            return Err(ClientError::InvalidFileId(resp.file_id));
        }

        let dir = &self.downloads_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| ClientError::File {
                path: dir.clone(),
                source,
            })?;
        let target = dir.join(&resp.file_id);
        tokio::fs::write(&target, &resp.contents)
            .await
            .map_err(|source| ClientError::File {
                path: target.clone(),
                source,
            })?;
        info!(path = %target.display(), bytes = resp.contents.len(), "file downloaded");
        Ok(target)
    }

    /// Starts delivering chat pushes for the current group to `handler`,
    /// stopping any stream that was already running first.
    pub async fn open_message_stream<F>(&self, handler: F)
    where
        F: FnMut(TextMessage) + Send + 'static,
    {
        let mut current = self.stream.lock().await;
        if let Some(previous) = current.take() {
            previous.close().await;
        }
        *current = Some(Subscription::spawn(
            self.correlator.router(),
            tags::MESSAGE,
            handler,
        ));
    }

    /// Stops the chat stream, if any. No item is handled after this returns.
    pub async fn close_message_stream(&self) {
        if let Some(stream) = self.stream.lock().await.take() {
            stream.close().await;
        }
    }

    pub fn is_connected(&self) -> bool {
        !self.monitor.is_disconnected()
    }

    /// Resolves once the connection is lost or the client shut down.
    pub async fn disconnected(&self) {
        self.monitor.wait().await;
    }

    /// Stops every background task and waits for them to exit.
    pub async fn shutdown(&self) {
        self.close_message_stream().await;
        self.monitor.stop();
        let tasks = std::mem::take(
            &mut *self
                .tasks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for task in tasks {
            if let Err(error) = task.await {
                warn!(?error, "background task failed");
            }
        }
    }

    async fn call<Req: Message>(
        &self,
        exchange: Exchange,
        req: &Req,
    ) -> Result<Vec<u8>, ClientError> {
        let mut body = Vec::with_capacity(req.encoded_len());
        req.encode(&mut body)?;
        self.correlator.call(exchange, body).await
    }

    async fn request<Req, Resp>(&self, exchange: Exchange, req: &Req) -> Result<Resp, ClientError>
    where
        Req: Message,
        Resp: Message + Default,
    {
        let body = self.call(exchange, req).await?;
        Ok(Resp::decode(body.as_slice())?)
    }

    async fn request_empty<Resp>(&self, exchange: Exchange) -> Result<Resp, ClientError>
    where
        Resp: Message + Default,
    {
        let body = self.correlator.call(exchange, Vec::new()).await?;
        Ok(Resp::decode(body.as_slice())?)
    }

    async fn notify<Req: Message>(&self, tag: &str, req: &Req) -> Result<(), ClientError> {
        let mut body = Vec::with_capacity(req.encoded_len());
        req.encode(&mut body)?;
        self.correlator.send(Frame::new(tag, body)).await
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.monitor.stop();
    }
}

/// True for a single, ordinary path component.
fn is_plain_file_name(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty() && path.file_name().is_some_and(|file| file == path.as_os_str())
}
