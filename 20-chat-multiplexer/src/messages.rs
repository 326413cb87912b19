//! Payload schema for frame bodies.
//!
//! Bodies are Protocol Buffers messages. The structs are declared with
//! `prost` derives directly, so there is no `.proto` build step; field numbers
//! follow the order fields are listed in the protocol's tag catalog.

/// Tags naming every message kind on the wire.
pub mod tags {
    pub const SIGN_UP: &str = "signUp";
    pub const LOGIN: &str = "login";
    pub const AUTH: &str = "auth";
    pub const AUTH_ERR: &str = "authErr";

    pub const CREATE_GROUP: &str = "createGroup";
    pub const CREATE_GROUP_ERR: &str = "createGroupErr";
    pub const JOIN_GROUP: &str = "joinGroup";
    pub const JOIN_GROUP_ERR: &str = "joinGroupErr";
    pub const REFRESH_GROUP: &str = "refreshGroup";
    pub const GROUP: &str = "group";
    pub const LEAVE_GROUP: &str = "leaveGroup";

    pub const TEXT_MSG: &str = "textMsg";
    pub const MESSAGE: &str = "message";

    pub const SEARCH_USERS: &str = "searchUsers";
    pub const USER_SEARCH_RESP: &str = "userSearchResp";
    pub const USER_SEARCH_ERR: &str = "userSearchErr";
    pub const INVITE: &str = "invite";

    pub const GET_GROUPS: &str = "getGroups";
    pub const GET_GROUPS_ERR: &str = "getGroupsErr";

    pub const GET_INVITES: &str = "getInvites";
    pub const GET_INVITES_ERR: &str = "getInvitesErr";
    pub const ACCEPT_INVITE: &str = "acceptInvite";
    pub const ACCEPT_INVITE_ERR: &str = "acceptInviteErr";
    pub const DELETE_INVITE: &str = "deleteInvite";
    pub const DELETE_INVITE_ERR: &str = "deleteInviteErr";

    pub const UPLOAD: &str = "upload";
    pub const DOWNLOAD: &str = "download";
    pub const DOWNLOAD_RESP: &str = "downloadResp";
    pub const DOWNLOAD_ERR: &str = "downloadErr";
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SignUpReq {
    #[prost(string, tag = "1")]
    pub username: String,
    #[prost(string, tag = "2")]
    pub password: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct LoginReq {
    #[prost(string, tag = "1")]
    pub username: String,
    #[prost(string, tag = "2")]
    pub password: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CreateGroupReq {
    #[prost(string, tag = "1")]
    pub group_name: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct JoinGroupReq {
    #[prost(string, tag = "1")]
    pub group_name: String,
}

/// A chat line, both as history inside [`GroupResp`] and as a `message` push.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TextMessage {
    #[prost(string, tag = "1")]
    pub username: String,
    #[prost(string, tag = "2")]
    pub message: String,
    /// Unix seconds.
    #[prost(uint64, tag = "3")]
    pub time: u64,
}

/// State of the group the session just entered.
#[derive(Clone, PartialEq, prost::Message)]
pub struct GroupResp {
    #[prost(message, repeated, tag = "1")]
    pub messages: Vec<TextMessage>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TextMessageReq {
    #[prost(string, tag = "1")]
    pub message: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UserSearchReq {
    #[prost(string, tag = "1")]
    pub username_prefix: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UserSearchResp {
    #[prost(string, repeated, tag = "1")]
    pub usernames: Vec<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct InviteReq {
    #[prost(string, tag = "1")]
    pub username: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GroupsResp {
    #[prost(string, repeated, tag = "1")]
    pub group_names: Vec<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Invite {
    #[prost(string, tag = "1")]
    pub invite_id: String,
    #[prost(string, tag = "2")]
    pub group_name: String,
    #[prost(string, tag = "3")]
    pub from_username: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct InvitesResp {
    #[prost(message, repeated, tag = "1")]
    pub invites: Vec<Invite>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AcceptInviteReq {
    #[prost(string, tag = "1")]
    pub invite_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DeleteInviteReq {
    #[prost(string, tag = "1")]
    pub invite_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FileMessageReq {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(bytes = "vec", tag = "2")]
    pub contents: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DownloadReq {
    #[prost(string, tag = "1")]
    pub file_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DownloadResp {
    #[prost(string, tag = "1")]
    pub file_id: String,
    #[prost(bytes = "vec", tag = "2")]
    pub contents: Vec<u8>,
}
