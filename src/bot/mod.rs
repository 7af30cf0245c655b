// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Chat command handler
//!
//! Transport-agnostic: a gateway turns platform events into [`IncomingMessage`]s and
//! implements [`Conversation`] so the handler can answer and fetch attachments.

pub mod discord;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::pipeline::{Pipeline, StageError};
use crate::session::SessionStore;
use crate::Result;

/// Alias accepted for `describe`
pub const DESCRIBE_ALIAS: &str = "描述圖片";

/// A file attached to a chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub url: String,
    pub content_type: Option<String>,
}

/// A chat message after the gateway has decoded it
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub author_id: u64,
    pub author_is_bot: bool,
    pub content: String,
    pub attachments: Vec<Attachment>,
}

/// One titled block of a rich reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
}

/// What the handler wants to say
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Embed {
        title: String,
        description: String,
        fields: Vec<EmbedField>,
    },
}

impl Reply {
    fn text(s: impl Into<String>) -> Self {
        Reply::Text(s.into())
    }

    /// Plain text rendering, used by gateways without rich messages
    pub fn to_plain_text(&self) -> String {
        match self {
            Reply::Text(t) => t.clone(),
            Reply::Embed { title, description, fields } => {
                let mut out = format!("**{}**\n{}", title, description);
                for field in fields {
                    out.push_str(&format!("\n\n**{}**\n{}", field.name, field.value));
                }
                out
            }
        }
    }
}

/// The channel a message arrived on
#[async_trait]
pub trait Conversation: Send + Sync {
    async fn reply(&self, reply: Reply) -> Result<()>;
    async fn download(&self, attachment: &Attachment) -> Result<Vec<u8>>;
}

/// Parsed chat command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Workspaces,
    Use(Option<String>),
    WhereAmI,
    Describe,
}

impl Command {
    /// Parse a message; `None` for anything that is not a known command
    pub fn parse(content: &str, prefix: &str) -> Option<Self> {
        let body = content.trim().strip_prefix(prefix)?;
        let (name, rest) = match body.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (body, ""),
        };

        match name {
            "help" => Some(Command::Help),
            "workspaces" => Some(Command::Workspaces),
            "use" => Some(Command::Use(Some(rest.to_string()).filter(|r| !r.is_empty()))),
            "whereami" => Some(Command::WhereAmI),
            "describe" | DESCRIBE_ALIAS => Some(Command::Describe),
            _ => None,
        }
    }
}

/// Executes commands for every user of one bot
pub struct CommandHandler {
    pipeline: Pipeline,
    sessions: Mutex<SessionStore<u64>>,
    prefix: String,
}

impl CommandHandler {
    pub fn new(pipeline: Pipeline, sessions: SessionStore<u64>, prefix: impl Into<String>) -> Self {
        Self {
            pipeline,
            sessions: Mutex::new(sessions),
            prefix: prefix.into(),
        }
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Selected workspace for a user
    pub async fn workspace_of(&self, user: u64) -> Option<String> {
        self.sessions.lock().await.workspace(&user)
    }

    /// Handle one message; ignored messages produce no reply
    pub async fn handle(&self, message: &IncomingMessage, conversation: &dyn Conversation) -> Result<()> {
        if message.author_is_bot {
            return Ok(());
        }
        let Some(command) = Command::parse(&message.content, &self.prefix) else {
            return Ok(());
        };
        debug!("Command {:?} from {}", command, message.author_id);

        match command {
            Command::Help => conversation.reply(self.help()).await,
            Command::Workspaces => conversation.reply(self.workspaces().await).await,
            Command::Use(workspace) => conversation.reply(self.select(message.author_id, workspace).await).await,
            Command::WhereAmI => conversation.reply(self.where_am_i(message.author_id).await).await,
            Command::Describe => self.describe(message, conversation).await,
        }
    }

    fn help(&self) -> Reply {
        let p = &self.prefix;
        Reply::Embed {
            title: "trashlens bot commands".to_string(),
            description: "Commands you can use:".to_string(),
            fields: vec![
                EmbedField {
                    name: "Workspace".to_string(),
                    value: format!(
                        "`{p}workspaces` → list available workspaces\n\
                         `{p}use <workspace>` → switch to a workspace\n\
                         `{p}whereami` → show your current workspace"
                    ),
                },
                EmbedField {
                    name: "Images".to_string(),
                    value: format!(
                        "`{p}describe` or `{p}{alias}` → describe and classify an attached image\n\
                         Attach the image to the same message as the command",
                        alias = DESCRIBE_ALIAS
                    ),
                },
                EmbedField {
                    name: "Help".to_string(),
                    value: format!("`{p}help` → show this message"),
                },
            ],
        }
    }

    async fn workspaces(&self) -> Reply {
        match self.pipeline.list_workspaces().await {
            Ok(slugs) if slugs.is_empty() => Reply::text("No workspaces available"),
            Ok(slugs) => Reply::text(format!("Available workspaces:\n{}", slugs.join("\n"))),
            Err(e) => Reply::text(format!("Failed to list workspaces: {}", e)),
        }
    }

    async fn select(&self, user: u64, workspace: Option<String>) -> Reply {
        match workspace {
            Some(ws) => {
                self.sessions.lock().await.select(user, ws.clone());
                info!("User {} switched to workspace {}", user, ws);
                Reply::text(format!("Switched to workspace: **{}**", ws))
            }
            None => Reply::text(format!("Usage: `{}use <workspace>`", self.prefix)),
        }
    }

    async fn where_am_i(&self, user: u64) -> Reply {
        match self.workspace_of(user).await {
            Some(ws) => Reply::text(format!("Your current workspace: **{}**", ws)),
            None => Reply::text(format!(
                "No workspace selected yet, use `{}use <workspace>`",
                self.prefix
            )),
        }
    }

    async fn describe(&self, message: &IncomingMessage, conversation: &dyn Conversation) -> Result<()> {
        let Some(workspace) = self.workspace_of(message.author_id).await else {
            return conversation
                .reply(Reply::text(format!(
                    "Select a workspace first with `{}use <workspace>`",
                    self.prefix
                )))
                .await;
        };

        let Some(attachment) = message.attachments.first() else {
            return conversation
                .reply(Reply::text("Please attach the image to analyse"))
                .await;
        };

        let image = match conversation.download(attachment).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return conversation
                    .reply(Reply::text(format!("[ERROR] Could not download {}: {}", attachment.filename, e)))
                    .await
            }
        };

        conversation
            .reply(Reply::text(format!(
                "[Workspace: {}] analysing {} ...",
                workspace, attachment.filename
            )))
            .await?;

        let reply = match self.pipeline.analyze(Some(&workspace), &image).await {
            Ok(analysis) => Reply::text(format!(
                "📷 **Description**:\n{}\n\n🗑️ **Classification**: **{}**",
                analysis.description, analysis.label
            )),
            Err(e) => Reply::text(format_failure(&e)),
        };
        conversation.reply(reply).await
    }
}

fn format_failure(error: &StageError) -> String {
    format!("[ERROR] {}", error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{stubs, Reply as Stub, Stubs};
    use crate::TrashLensError;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        replies: std::sync::Mutex<Vec<Reply>>,
        fail_download: bool,
    }

    impl Recorder {
        fn texts(&self) -> Vec<String> {
            self.replies.lock().unwrap().iter().map(|r| r.to_plain_text()).collect()
        }
    }

    #[async_trait]
    impl Conversation for Recorder {
        async fn reply(&self, reply: Reply) -> Result<()> {
            self.replies.lock().unwrap().push(reply);
            Ok(())
        }

        async fn download(&self, _attachment: &Attachment) -> Result<Vec<u8>> {
            if self.fail_download {
                Err(TrashLensError::Gateway("cdn unreachable".into()))
            } else {
                Ok(b"\x89PNG".to_vec())
            }
        }
    }

    fn handler(s: &Stubs) -> CommandHandler {
        CommandHandler::new(s.pipeline.clone(), SessionStore::new(100, Duration::from_secs(3600)), "!")
    }

    fn msg(author: u64, content: &str, with_image: bool) -> IncomingMessage {
        IncomingMessage {
            author_id: author,
            author_is_bot: false,
            content: content.to_string(),
            attachments: if with_image {
                vec![Attachment {
                    filename: "can.png".into(),
                    url: "https://cdn.example/can.png".into(),
                    content_type: Some("image/png".into()),
                }]
            } else {
                Vec::new()
            },
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("!help", "!"), Some(Command::Help));
        assert_eq!(Command::parse("  !workspaces  ", "!"), Some(Command::Workspaces));
        assert_eq!(Command::parse("!use  taipei ", "!"), Some(Command::Use(Some("taipei".into()))));
        assert_eq!(Command::parse("!use", "!"), Some(Command::Use(None)));
        assert_eq!(Command::parse("!describe please", "!"), Some(Command::Describe));
        assert_eq!(Command::parse("!描述圖片", "!"), Some(Command::Describe));
        assert_eq!(Command::parse("!usex", "!"), None);
        assert_eq!(Command::parse("hello", "!"), None);
    }

    #[tokio::test]
    async fn test_use_is_last_write_wins() {
        let s = stubs(Stub::Text("d"), Stub::Text("l"), None);
        let h = handler(&s);
        let rec = Recorder::default();

        h.handle(&msg(1, "!use a", false), &rec).await.unwrap();
        h.handle(&msg(1, "!use b", false), &rec).await.unwrap();
        h.handle(&msg(1, "!use b", false), &rec).await.unwrap();
        assert_eq!(h.workspace_of(1).await.as_deref(), Some("b"));

        h.handle(&msg(1, "!whereami", false), &rec).await.unwrap();
        assert_eq!(rec.texts().last().unwrap(), "Your current workspace: **b**");
    }

    #[tokio::test]
    async fn test_use_without_argument() {
        let s = stubs(Stub::Text("d"), Stub::Text("l"), None);
        let h = handler(&s);
        let rec = Recorder::default();
        h.handle(&msg(1, "!use", false), &rec).await.unwrap();
        assert_eq!(rec.texts(), vec!["Usage: `!use <workspace>`"]);
        assert_eq!(h.workspace_of(1).await, None);
    }

    #[tokio::test]
    async fn test_describe_without_workspace() {
        let s = stubs(Stub::Text("d"), Stub::Text("l"), None);
        let h = handler(&s);
        let rec = Recorder::default();

        h.handle(&msg(9, "!describe", true), &rec).await.unwrap();
        assert_eq!(rec.texts(), vec!["Select a workspace first with `!use <workspace>`"]);
        assert_eq!(s.describe_calls(), 0);
    }

    #[tokio::test]
    async fn test_describe_without_attachment() {
        let s = stubs(Stub::Text("d"), Stub::Text("l"), None);
        let h = handler(&s);
        let rec = Recorder::default();

        h.handle(&msg(9, "!use ws", false), &rec).await.unwrap();
        h.handle(&msg(9, "!describe", false), &rec).await.unwrap();
        assert_eq!(rec.texts().last().unwrap(), "Please attach the image to analyse");
        assert_eq!(s.describe_calls(), 0);
    }

    #[tokio::test]
    async fn test_describe_end_to_end() {
        let s = stubs(Stub::Text("A dented aluminium can."), Stub::Text("資源回收"), None);
        let h = handler(&s);
        let rec = Recorder::default();

        h.handle(&msg(3, "!use taipei", false), &rec).await.unwrap();
        h.handle(&msg(3, "!describe", true), &rec).await.unwrap();

        let texts = rec.texts();
        assert_eq!(texts[1], "[Workspace: taipei] analysing can.png ...");
        assert!(texts[2].contains("A dented aluminium can."));
        assert!(texts[2].contains("**資源回收**"));
    }

    #[tokio::test]
    async fn test_describe_failure_skips_classification() {
        let s = stubs(Stub::Status(502), Stub::Text("l"), None);
        let h = handler(&s);
        let rec = Recorder::default();

        h.handle(&msg(3, "!use taipei", false), &rec).await.unwrap();
        h.handle(&msg(3, "!describe", true), &rec).await.unwrap();

        let last = rec.texts().pop().unwrap();
        assert!(last.starts_with("[ERROR] image description failed"));
        assert!(last.contains("502"));
        assert_eq!(s.classify_calls(), 0);
    }

    #[tokio::test]
    async fn test_download_failure() {
        let s = stubs(Stub::Text("d"), Stub::Text("l"), None);
        let h = handler(&s);
        let rec = Recorder {
            fail_download: true,
            ..Default::default()
        };

        h.handle(&msg(3, "!use taipei", false), &rec).await.unwrap();
        h.handle(&msg(3, "!describe", true), &rec).await.unwrap();
        assert!(rec.texts().last().unwrap().contains("cdn unreachable"));
        assert_eq!(s.describe_calls(), 0);
    }

    #[tokio::test]
    async fn test_workspaces_listing() {
        let ok = stubs(Stub::Text("d"), Stub::Text("l"), Some(vec!["a", "b"]));
        let rec = Recorder::default();
        handler(&ok).handle(&msg(1, "!workspaces", false), &rec).await.unwrap();
        assert_eq!(rec.texts(), vec!["Available workspaces:\na\nb"]);

        let empty = stubs(Stub::Text("d"), Stub::Text("l"), Some(vec![]));
        let rec = Recorder::default();
        handler(&empty).handle(&msg(1, "!workspaces", false), &rec).await.unwrap();
        assert_eq!(rec.texts(), vec!["No workspaces available"]);

        let failing = stubs(Stub::Text("d"), Stub::Text("l"), None);
        let rec = Recorder::default();
        handler(&failing).handle(&msg(1, "!workspaces", false), &rec).await.unwrap();
        assert!(rec.texts()[0].contains("401"));
    }

    #[tokio::test]
    async fn test_bots_and_chatter_are_ignored() {
        let s = stubs(Stub::Text("d"), Stub::Text("l"), None);
        let h = handler(&s);
        let rec = Recorder::default();

        let mut from_bot = msg(1, "!help", false);
        from_bot.author_is_bot = true;
        h.handle(&from_bot, &rec).await.unwrap();
        h.handle(&msg(1, "just chatting", false), &rec).await.unwrap();
        assert!(rec.texts().is_empty());
    }

    #[tokio::test]
    async fn test_help_is_an_embed() {
        let s = stubs(Stub::Text("d"), Stub::Text("l"), None);
        let rec = Recorder::default();
        handler(&s).handle(&msg(1, "!help", false), &rec).await.unwrap();

        let replies = rec.replies.lock().unwrap();
        match &replies[0] {
            Reply::Embed { fields, .. } => {
                assert_eq!(fields.len(), 3);
                assert!(fields[0].value.contains("!use <workspace>"));
            }
            other => panic!("expected embed, got {:?}", other),
        }
    }
}
