//! Interactive terminal shell driving a [`ChatClient`].
//!
//! One loop reads lines and applies them to an explicit screen state, so a
//! long session never grows the call stack.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Local};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    select,
};

use crate::{
    client::ChatClient,
    command::{HELP, ShellCommand},
    messages::{GroupResp, Invite, TextMessage},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Auth,
    Home,
    Group,
    InviteSearch,
    Invites,
}

impl Screen {
    fn describe(self) -> &'static str {
        match self {
            Screen::Auth => "before logging in",
            Screen::Home => "on the home screen",
            Screen::Group => "inside a group",
            Screen::InviteSearch => "while searching for users",
            Screen::Invites => "while managing invites",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct Shell<'a> {
    client: &'a ChatClient,
    screen: Screen,
    group: Option<String>,
    invites: Vec<Invite>,
    found_users: Vec<String>,
}

impl<'a> Shell<'a> {
    pub fn new(client: &'a ChatClient) -> Self {
        Self {
            client,
            screen: Screen::Auth,
            group: None,
            invites: Vec::new(),
            found_users: Vec::new(),
        }
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    /// Reads commands from stdin until `/quit`, end of input, or disconnect.
    pub async fn run(mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("*** /signup or /login to begin, /help for commands");

        loop {
            let line = select! {
                _ = self.client.disconnected() => {
                    eprintln!("*** connection to the server was lost");
                    break;
                }
                line = lines.next_line() => line.context("failed to read stdin")?,
            };
            let Some(line) = line else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            let command = match ShellCommand::parse(&line) {
                Ok(command) => command,
                Err(err) => {
                    eprintln!("!!! {err}");
                    continue;
                }
            };
            match self.handle(command).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => break,
                Err(err) => eprintln!("!!! {err:#}"),
            }
        }

        self.client.close_message_stream().await;
        Ok(())
    }

    pub async fn handle(&mut self, command: ShellCommand) -> Result<Flow> {
        use ShellCommand as C;

        match (self.screen, command) {
            (_, C::Help) => println!("{HELP}"),
            (screen, C::Quit) => {
                // The invite search happens from inside the group.
                if matches!(screen, Screen::Group | Screen::InviteSearch) {
                    self.leave_group().await?;
                }
                println!("*** bye");
                return Ok(Flow::Exit);
            }

            (Screen::Auth, C::SignUp { username, password }) => {
                self.client
                    .sign_up(&username, &password)
                    .await
                    .context("sign up failed")?;
                println!("*** signed up as {username}");
                self.screen = Screen::Home;
            }
            (Screen::Auth, C::Login { username, password }) => {
                self.client
                    .login(&username, &password)
                    .await
                    .context("login failed")?;
                println!("*** logged in as {username}");
                self.screen = Screen::Home;
            }

            (Screen::Home, C::Create { group }) => {
                let state = self
                    .client
                    .create_group(&group)
                    .await
                    .context("create group failed")?;
                self.enter_group(group, state).await;
            }
            (Screen::Home, C::Join { group }) => {
                let state = self
                    .client
                    .join_group(&group)
                    .await
                    .context("join group failed")?;
                self.enter_group(group, state).await;
            }
            (Screen::Home, C::Groups) => {
                let groups = self
                    .client
                    .list_groups()
                    .await
                    .context("failed to list groups")?;
                if groups.is_empty() {
                    println!("*** you are not in any groups");
                }
                for line in numbered(&groups) {
                    println!("{line}");
                }
            }
            (Screen::Home, C::Invites) | (Screen::Invites, C::Refresh) => {
                self.invites = self
                    .client
                    .list_invites()
                    .await
                    .context("failed to list invites")?;
                self.screen = Screen::Invites;
                self.print_invites();
            }

            (Screen::Invites, C::Accept { index }) => {
                let invite_id = self.invite_id(index)?;
                self.invites = self
                    .client
                    .accept_invite(&invite_id)
                    .await
                    .context("could not accept invite")?;
                self.print_invites();
            }
            (Screen::Invites, C::Decline { index }) => {
                let invite_id = self.invite_id(index)?;
                self.invites = self
                    .client
                    .decline_invite(&invite_id)
                    .await
                    .context("could not decline invite")?;
                self.print_invites();
            }
            (Screen::Invites, C::Cancel) => self.screen = Screen::Home,

            (Screen::Group, C::Text(text)) => self.client.send_text(&text).await?,
            (Screen::Group, C::Refresh) => {
                let state = self
                    .client
                    .refresh_group()
                    .await
                    .context("refresh failed")?;
                print_history(&state);
            }
            (Screen::Group, C::Leave) => self.leave_group().await?,
            (Screen::Group, C::Upload { path }) => {
                self.client.upload_file(&path).await?;
                println!("*** sent {}", path.display());
            }
            (Screen::Group, C::Download { file_id }) => {
                let saved = self
                    .client
                    .download_file(&file_id)
                    .await
                    .context("failed to download file")?;
                println!("*** saved {}", saved.display());
            }
            (Screen::Group, C::Invite { target }) => self.invite(&target).await?,
            (Screen::Group, C::Search { prefix }) => {
                // The invite flow takes over the terminal; pushes resume on return.
                self.client.close_message_stream().await;
                self.screen = Screen::InviteSearch;
                match prefix {
                    Some(prefix) => self.search(&prefix).await?,
                    None => println!("*** type a name prefix, /invite <#> or /cancel"),
                }
            }

            (Screen::InviteSearch, C::Text(prefix))
            | (Screen::InviteSearch, C::Search {
                prefix: Some(prefix),
            }) => self.search(&prefix).await?,
            (Screen::InviteSearch, C::Invite { target }) => {
                self.invite(&target).await?;
                self.return_to_group().await?;
            }
            (Screen::InviteSearch, C::Cancel) => self.return_to_group().await?,

            (screen, command) => {
                println!("*** {command:?} is not available {}", screen.describe());
            }
        }

        Ok(Flow::Continue)
    }

    async fn enter_group(&mut self, name: String, state: GroupResp) {
        println!("*** now in {name}");
        print_history(&state);
        self.client
            .open_message_stream(|message| println!("{}", render_message(&message)))
            .await;
        self.group = Some(name);
        self.screen = Screen::Group;
    }

    async fn return_to_group(&mut self) -> Result<()> {
        let state = self
            .client
            .refresh_group()
            .await
            .context("failed to reload the group")?;
        let name = self.group.clone().unwrap_or_default();
        self.enter_group(name, state).await;
        Ok(())
    }

    async fn leave_group(&mut self) -> Result<()> {
        self.client.close_message_stream().await;
        self.client.leave_group().await?;
        if let Some(name) = self.group.take() {
            println!("*** left {name}");
        }
        self.screen = Screen::Home;
        Ok(())
    }

    async fn search(&mut self, prefix: &str) -> Result<()> {
        self.found_users = self
            .client
            .search_users(prefix)
            .await
            .context("user search failed")?;
        if self.found_users.is_empty() {
            println!("*** no matching users");
        }
        for line in numbered(&self.found_users) {
            println!("{line}");
        }
        Ok(())
    }

    /// Invites by list number from the last search, or by literal username.
    async fn invite(&mut self, target: &str) -> Result<()> {
        let username = match target.parse::<usize>() {
            Ok(index) => self
                .found_users
                .get(index)
                .cloned()
                .ok_or_else(|| anyhow!("user #{index} is not in the last search"))?,
            Err(_) => target.to_string(),
        };
        self.client.invite_user(&username).await?;
        println!("*** invited {username}");
        Ok(())
    }

    fn invite_id(&self, index: usize) -> Result<String> {
        self.invites
            .get(index)
            .map(|invite| invite.invite_id.clone())
            .ok_or_else(|| anyhow!("invite #{index} is out of range"))
    }

    fn print_invites(&self) {
        if self.invites.is_empty() {
            println!("*** no invites");
        }
        for line in render_invites(&self.invites) {
            println!("{line}");
        }
    }
}

/// `[3:04PM] alice >> hello`, in local time.
pub fn render_message(message: &TextMessage) -> String {
    let time = i64::try_from(message.time)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|utc| utc.with_timezone(&Local).format("%-I:%M%p").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    format!("[{time}] {} >> {}", message.username, message.message)
}

pub fn render_invites(invites: &[Invite]) -> Vec<String> {
    invites
        .iter()
        .enumerate()
        .map(|(i, invite)| format!("{i}: {} from {}", invite.group_name, invite.from_username))
        .collect()
}

fn numbered(items: &[String]) -> Vec<String> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{i}: {item}"))
        .collect()
}

fn print_history(state: &GroupResp) {
    for message in &state.messages {
        println!("{}", render_message(message));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::{
        client::ClientOptions,
        frame::read_frame,
        messages::tags,
        transport::Connection,
    };

    #[tokio::test]
    async fn quitting_from_invite_search_leaves_the_group() {
        let (client_io, mut server) = tokio::io::duplex(4096);
        let client = ChatClient::start(
            Connection::from_stream(client_io, "in-memory"),
            ClientOptions::default(),
        );
        let mut shell = Shell::new(&client);
        shell.screen = Screen::InviteSearch;
        shell.group = Some("teamA".into());

        let flow = shell.handle(ShellCommand::Quit).await.expect("quit");
        assert_eq!(flow, Flow::Exit);
        assert_eq!(shell.screen(), Screen::Home);

        let frame = timeout(Duration::from_secs(1), read_frame(&mut server))
            .await
            .expect("leave sent")
            .expect("read")
            .expect("frame");
        assert_eq!(frame.tag, tags::LEAVE_GROUP);
        client.shutdown().await;
    }

    #[test]
    fn renders_chat_lines() {
        let line = render_message(&TextMessage {
            username: "alice".into(),
            message: "hi all".into(),
            time: 1_700_000_000,
        });
        assert!(line.starts_with('['));
        assert!(line.ends_with("] alice >> hi all"));
        assert!(line.contains("AM") || line.contains("PM"));
    }

    #[test]
    fn out_of_range_time_still_renders() {
        let line = render_message(&TextMessage {
            username: "bob".into(),
            message: "x".into(),
            time: u64::MAX,
        });
        assert_eq!(line, "[--:--] bob >> x");
    }

    #[test]
    fn invites_are_numbered_from_zero() {
        let invites = vec![
            Invite {
                invite_id: "i1".into(),
                group_name: "teamA".into(),
                from_username: "carol".into(),
            },
            Invite {
                invite_id: "i2".into(),
                group_name: "teamB".into(),
                from_username: "dave".into(),
            },
        ];
        assert_eq!(
            render_invites(&invites),
            vec!["0: teamA from carol", "1: teamB from dave"]
        );
    }
}
