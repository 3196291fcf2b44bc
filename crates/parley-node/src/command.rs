//! The textual command surface and its structured result.

use serde::Serialize;
use serde_json::Value;

use parley_shared::PresenceStatus;

use crate::error::NodeError;

pub const HELP: &str = "\
login:<name>            log in as <name>
logout                  back to visitor mode
list                    peers known to the tracker
list_all                channel directory on the tracker
channels                joined, hosted and known channels
join <channel>          join (or create) a channel
leave <channel>         leave a channel
create <channel>        create a channel you host
send <channel> <text>   send a message
history <channel>       show a channel's messages
status <online|offline|invisible>
status check <user>     ask the tracker whether <user> is reachable
sync                    reconcile every joined channel now
debug                   the tracker's view of every channel
exit                    announce shutdown and stop
help                    this text";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login(String),
    Logout,
    List,
    ListAll,
    Channels,
    Join(String),
    Leave(String),
    Create(String),
    Send { channel: String, text: String },
    History(String),
    SetStatus(PresenceStatus),
    CheckStatus(String),
    Sync,
    Debug,
    Exit,
    Help,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, NodeError> {
        let line = line.trim();
        if let Some(name) = line.strip_prefix("login:") {
            return Ok(Self::Login(name.trim().to_string()));
        }

        let (keyword, rest) = match line.split_once(char::is_whitespace) {
            Some((k, r)) => (k, r.trim()),
            None => (line, ""),
        };
        let arg = |what: &str| -> Result<String, NodeError> {
            let first = rest.split_whitespace().next().unwrap_or_default();
            if first.is_empty() {
                Err(NodeError::InvalidCommand(format!("usage: {keyword} <{what}>")))
            } else {
                Ok(first.to_string())
            }
        };

        match keyword {
            "logout" => Ok(Self::Logout),
            "list" => Ok(Self::List),
            "list_all" => Ok(Self::ListAll),
            "channels" => Ok(Self::Channels),
            "join" => Ok(Self::Join(arg("channel")?)),
            "leave" => Ok(Self::Leave(arg("channel")?)),
            "create" => Ok(Self::Create(arg("channel")?)),
            "history" => Ok(Self::History(arg("channel")?)),
            "send" => {
                let (channel, text) = rest.split_once(char::is_whitespace).ok_or_else(|| {
                    NodeError::InvalidCommand("usage: send <channel> <text>".into())
                })?;
                let text = text.trim();
                if text.is_empty() {
                    return Err(NodeError::InvalidCommand("message is empty".into()));
                }
                Ok(Self::Send {
                    channel: channel.to_string(),
                    text: text.to_string(),
                })
            }
            "status" => match rest.split_once(char::is_whitespace) {
                Some(("check", user)) if !user.trim().is_empty() => {
                    Ok(Self::CheckStatus(user.trim().to_string()))
                }
                _ if rest == "check" => Err(NodeError::InvalidCommand(
                    "usage: status check <user>".into(),
                )),
                _ => rest
                    .parse()
                    .map(Self::SetStatus)
                    .map_err(|_| {
                        NodeError::InvalidCommand("usage: status <online|offline|invisible>".into())
                    }),
            },
            "sync" => Ok(Self::Sync),
            "debug" => Ok(Self::Debug),
            "exit" => Ok(Self::Exit),
            "help" => Ok(Self::Help),
            "" => Err(NodeError::InvalidCommand("empty command".into())),
            other => Err(NodeError::InvalidCommand(format!(
                "unknown command '{other}', try 'help'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Ok,
    Error,
}

/// One result per submitted command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResult {
    pub status: CommandStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: message.into(),
            data: None,
        }
    }

    pub fn ok_with<T: Serialize>(message: impl Into<String>, data: &T) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: message.into(),
            data: serde_json::to_value(data).ok(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Error,
            message: message.into(),
            data: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == CommandStatus::Ok
    }
}

impl From<NodeError> for CommandResult {
    fn from(e: NodeError) -> Self {
        Self::error(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("login: alice").unwrap(), Command::Login("alice".into()));
        assert_eq!(Command::parse("login:").unwrap(), Command::Login(String::new()));
        assert_eq!(Command::parse("join general").unwrap(), Command::Join("general".into()));
        assert_eq!(
            Command::parse("send general hello there").unwrap(),
            Command::Send {
                channel: "general".into(),
                text: "hello there".into()
            }
        );
        assert_eq!(
            Command::parse("status invisible").unwrap(),
            Command::SetStatus(PresenceStatus::Invisible)
        );
        assert_eq!(
            Command::parse("status check bob").unwrap(),
            Command::CheckStatus("bob".into())
        );
        assert_eq!(Command::parse("  sync ").unwrap(), Command::Sync);
        assert_eq!(Command::parse("debug").unwrap(), Command::Debug);
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse("join").is_err());
        assert!(Command::parse("send general").is_err());
        assert!(Command::parse("status away").is_err());
        assert!(Command::parse("status check").is_err());
        assert!(Command::parse("dance").is_err());
        assert!(Command::parse("").is_err());
    }

    #[test]
    fn test_result_json_shape() {
        let json = serde_json::to_value(CommandResult::error("nope")).unwrap();
        assert_eq!(json["status"], "error");
        assert!(json.get("data").is_none());

        let json = serde_json::to_value(CommandResult::ok_with("done", &vec![1, 2])).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["data"][1], 2);
    }
}
