//! Parsing of shell input lines.
//!
//! Lines starting with `/` are commands; anything else is free text whose
//! meaning depends on the current screen (a chat message inside a group, a
//! search prefix while looking for users to invite).

use std::path::PathBuf;

use anyhow::{Result, anyhow, bail};

#[derive(Debug, PartialEq, Eq)]
pub enum ShellCommand {
    SignUp { username: String, password: String },
    Login { username: String, password: String },
    Create { group: String },
    Join { group: String },
    Groups,
    Refresh,
    Leave,
    Search { prefix: Option<String> },
    Invite { target: String },
    Invites,
    Accept { index: usize },
    Decline { index: usize },
    Upload { path: PathBuf },
    Download { file_id: String },
    Cancel,
    Help,
    Quit,
    Text(String),
}

pub const HELP: &str = "\
commands:
  /signup <user> <password>   create an account
  /login <user> <password>    log in
  /create <group>             create a group and open it
  /join <group>               open a group you belong to
  /groups                     list your groups
  /invites                    list and manage pending invites
  /accept <#> | /decline <#>  answer an invite from the last listing
  /refresh                    reload the open group or the invite list
  /search [prefix]            look for users to invite to the open group
  /invite <#|user>            invite a user from the last search
  /upload <path>              send a file to the open group
  /download <file id>         save a shared file to the downloads directory
  /leave                      leave the open group
  /cancel                     go back
  /help                       show this help
  /quit                       exit";

impl ShellCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            bail!("empty input");
        }

        let Some(command) = trimmed.strip_prefix('/') else {
            return Ok(ShellCommand::Text(trimmed.to_string()));
        };

        let (name, rest) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };
        let args: Vec<&str> = rest.split_whitespace().collect();

        match (name.to_lowercase().as_str(), args.as_slice()) {
            ("signup", [username, password]) => Ok(ShellCommand::SignUp {
                username: username.to_string(),
                password: password.to_string(),
            }),
            ("login", [username, password]) => Ok(ShellCommand::Login {
                username: username.to_string(),
                password: password.to_string(),
            }),
            ("signup" | "login", _) => Err(anyhow!("usage: /{name} <user> <password>")),
            // Group names and paths may contain spaces.
            ("create", [_, ..]) => Ok(ShellCommand::Create {
                group: rest.to_string(),
            }),
            ("join", [_, ..]) => Ok(ShellCommand::Join {
                group: rest.to_string(),
            }),
            ("upload", [_, ..]) => Ok(ShellCommand::Upload {
                path: PathBuf::from(rest),
            }),
            ("create" | "join", []) => Err(anyhow!("usage: /{name} <group>")),
            ("upload", []) => Err(anyhow!("usage: /upload <path>")),
            ("download", [file_id]) => Ok(ShellCommand::Download {
                file_id: file_id.to_string(),
            }),
            ("download", _) => Err(anyhow!("usage: /download <file id>")),
            ("search", []) => Ok(ShellCommand::Search { prefix: None }),
            ("search", [prefix]) => Ok(ShellCommand::Search {
                prefix: Some(prefix.to_string()),
            }),
            ("invite", [target]) => Ok(ShellCommand::Invite {
                target: target.to_string(),
            }),
            ("invite", _) => Err(anyhow!("usage: /invite <#|user>")),
            ("accept", [index]) => Ok(ShellCommand::Accept {
                index: parse_index(index)?,
            }),
            ("decline", [index]) => Ok(ShellCommand::Decline {
                index: parse_index(index)?,
            }),
            ("accept" | "decline", _) => Err(anyhow!("usage: /{name} <invite #>")),
            ("groups", []) => Ok(ShellCommand::Groups),
            ("refresh", []) => Ok(ShellCommand::Refresh),
            ("leave", []) => Ok(ShellCommand::Leave),
            ("invites", []) => Ok(ShellCommand::Invites),
            ("cancel", []) => Ok(ShellCommand::Cancel),
            ("help" | "h", []) => Ok(ShellCommand::Help),
            ("quit" | "exit" | "q", []) => Ok(ShellCommand::Quit),
            _ => Err(anyhow!("unknown command '/{name}'; try /help")),
        }
    }
}

fn parse_index(raw: &str) -> Result<usize> {
    raw.parse().map_err(|_| anyhow!("'{raw}' is not a list number"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(
            ShellCommand::parse("  hello there ").ok(),
            Some(ShellCommand::Text("hello there".into()))
        );
    }

    #[test]
    fn auth_commands_need_two_arguments() {
        assert!(matches!(
            ShellCommand::parse("/signup alice pw1"),
            Ok(ShellCommand::SignUp { username, password }) if username == "alice" && password == "pw1"
        ));
        assert!(matches!(
            ShellCommand::parse("/LOGIN bob pw"),
            Ok(ShellCommand::Login { username, .. }) if username == "bob"
        ));
        assert!(ShellCommand::parse("/login bob").is_err());
        assert!(ShellCommand::parse("/signup").is_err());
    }

    #[test]
    fn group_names_and_paths_keep_spaces() {
        assert_eq!(
            ShellCommand::parse("/create team a").ok(),
            Some(ShellCommand::Create {
                group: "team a".into()
            })
        );
        assert_eq!(
            ShellCommand::parse("/upload  my notes.txt").ok(),
            Some(ShellCommand::Upload {
                path: PathBuf::from("my notes.txt")
            })
        );
        assert!(ShellCommand::parse("/join").is_err());
    }

    #[test]
    fn list_numbers_must_be_numeric() {
        assert_eq!(
            ShellCommand::parse("/accept 2").ok(),
            Some(ShellCommand::Accept { index: 2 })
        );
        assert!(ShellCommand::parse("/decline two").is_err());
        assert!(ShellCommand::parse("/accept").is_err());
    }

    #[test]
    fn search_prefix_is_optional() {
        assert_eq!(
            ShellCommand::parse("/search").ok(),
            Some(ShellCommand::Search { prefix: None })
        );
        assert_eq!(
            ShellCommand::parse("/search al").ok(),
            Some(ShellCommand::Search {
                prefix: Some("al".into())
            })
        );
    }

    #[test]
    fn aliases_and_unknown_commands() {
        assert_eq!(ShellCommand::parse("/q").ok(), Some(ShellCommand::Quit));
        assert_eq!(ShellCommand::parse("/h").ok(), Some(ShellCommand::Help));
        assert!(ShellCommand::parse("/dance").is_err());
        assert!(ShellCommand::parse("   ").is_err());
    }
}
