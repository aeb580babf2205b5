use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::{Command, CommandAction, CommandContext, CommandRegistry, MatchPolicy};
use crate::config::Config;
use crate::error::BotError;
use crate::platform::{normalize_chat_id, OutboundPayload};
use crate::scheduler::{BroadcastJob, BroadcastScheduler};

pub const SPAM_TRIGGER: &str = "!spam";

/// Build the registry with every built-in command.
///
/// Registration order is the match order, so keep prefix-matched commands
/// after anything they could shadow.
pub fn builtin_registry(config: &Config) -> Result<CommandRegistry, BotError> {
    let mut registry = CommandRegistry::new();

    registry.register(Command::new(
        "PING",
        "!ping",
        MatchPolicy::Equals,
        "Reply 'pong' to sender's message",
        Arc::new(Ping),
    ))?;
    registry.register(Command::new(
        "QUOTE",
        "!quote",
        MatchPolicy::Equals,
        "Send a random quote from Quotable (https://github.com/lukePeavey/quotable)",
        Arc::new(Quote::new(config.quote.api_url.clone())),
    ))?;
    registry.register(Command::new(
        "STICKER",
        "!sticker",
        MatchPolicy::Equals,
        "Create a sticker from the quoted message or the image sent with the command",
        Arc::new(Sticker),
    ))?;
    registry.register(Command::new(
        "DELETE",
        "!delete",
        MatchPolicy::Equals,
        "Delete the quoted message, or the whole chat when nothing is quoted",
        Arc::new(Delete),
    ))?;
    registry.register(Command::new(
        "CLEAR",
        "!clear",
        MatchPolicy::Equals,
        "Clear message history of the current chat",
        Arc::new(Clear),
    ))?;
    registry.register(Command::new(
        "HELP",
        "!help",
        MatchPolicy::Equals,
        "Send the list of available commands",
        Arc::new(Help),
    ))?;
    registry.register(Command::new(
        "SPAM",
        SPAM_TRIGGER,
        MatchPolicy::StartsWith,
        "Send a message repeatedly: !spam <count> <target> <message>",
        Arc::new(Spam {
            interval: Duration::from_millis(config.broadcast.interval_ms),
            contact_suffix: config.bridge.contact_suffix.clone(),
        }),
    ))?;

    Ok(registry)
}

pub struct Ping;

#[async_trait]
impl CommandAction for Ping {
    async fn run(&self, ctx: &CommandContext) -> Result<()> {
        ctx.transport
            .reply(&ctx.message, OutboundPayload::text("pong"))
            .await
    }
}

#[derive(Debug, Deserialize)]
struct QuotableQuote {
    content: String,
    author: String,
}

/// Fetches a random quote over HTTP
pub struct Quote {
    client: reqwest::Client,
    api_url: String,
}

impl Quote {
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    async fn fetch(&self) -> Result<QuotableQuote> {
        let response = self
            .client
            .get(&self.api_url)
            .send()
            .await
            .context("Failed to reach the quote service")?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            anyhow::bail!("Quote service error ({})", status);
        }

        let quotes: Vec<QuotableQuote> = response
            .json()
            .await
            .context("Failed to parse quote response")?;
        quotes
            .into_iter()
            .next()
            .context("Quote service returned no quotes")
    }
}

#[async_trait]
impl CommandAction for Quote {
    async fn run(&self, ctx: &CommandContext) -> Result<()> {
        let quote = self.fetch().await?;
        ctx.transport
            .reply(
                &ctx.message,
                OutboundPayload::text(format!("\"{}\"\n- {}", quote.content, quote.author)),
            )
            .await
    }
}

pub struct Sticker;

#[async_trait]
impl CommandAction for Sticker {
    async fn run(&self, ctx: &CommandContext) -> Result<()> {
        let source = match ctx.transport.quoted_message(&ctx.message).await? {
            Some(quoted) => quoted,
            None => ctx.message.clone(),
        };
        if !source.has_image() {
            anyhow::bail!("Message media should be an image");
        }

        let media = ctx.transport.download_media(&source).await?;
        ctx.transport
            .reply(&ctx.message, OutboundPayload::sticker(media))
            .await
    }
}

pub struct Delete;

#[async_trait]
impl CommandAction for Delete {
    async fn run(&self, ctx: &CommandContext) -> Result<()> {
        match ctx.transport.quoted_message(&ctx.message).await? {
            // Only the bot's own messages can be deleted for everyone
            Some(quoted) => {
                ctx.transport
                    .delete_message(&quoted, quoted.from_me)
                    .await
            }
            None => ctx.transport.delete_chat(&ctx.message.chat_id).await,
        }
    }
}

pub struct Clear;

#[async_trait]
impl CommandAction for Clear {
    async fn run(&self, ctx: &CommandContext) -> Result<()> {
        ctx.transport.clear_chat(&ctx.message.chat_id).await
    }
}

pub struct Help;

#[async_trait]
impl CommandAction for Help {
    async fn run(&self, ctx: &CommandContext) -> Result<()> {
        ctx.transport
            .reply(&ctx.message, OutboundPayload::text(ctx.registry.help_text()))
            .await
    }
}

/// Parsed `!spam <count> <target> <message>` arguments
#[derive(Debug, PartialEq)]
pub struct SpamArgs {
    pub count: u32,
    pub target: String,
    pub message: String,
}

fn next_token(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    if input.is_empty() {
        return None;
    }
    match input.find(char::is_whitespace) {
        Some(end) => Some((&input[..end], &input[end..])),
        None => Some((input, "")),
    }
}

/// Parse the text that follows the trigger. The message is everything after the
/// target token, inner whitespace included.
pub fn parse_spam_args(arguments: &str) -> Result<SpamArgs> {
    let usage = "usage: !spam <count> <target> <message>";

    let (count, rest) = next_token(arguments).with_context(|| format!("missing count ({})", usage))?;
    let count: u32 = count
        .parse()
        .with_context(|| format!("invalid count '{}' ({})", count, usage))?;
    if count == 0 {
        anyhow::bail!("count must be positive ({})", usage);
    }

    let (target, rest) = next_token(rest).with_context(|| format!("missing target ({})", usage))?;
    let message = rest.trim_start();
    if message.trim().is_empty() {
        anyhow::bail!("missing message ({})", usage);
    }

    Ok(SpamArgs {
        count,
        target: target.to_string(),
        message: message.to_string(),
    })
}

pub struct Spam {
    interval: Duration,
    contact_suffix: String,
}

#[async_trait]
impl CommandAction for Spam {
    async fn run(&self, ctx: &CommandContext) -> Result<()> {
        let arguments = ctx
            .message
            .text
            .strip_prefix(SPAM_TRIGGER)
            .unwrap_or_default();
        let args = parse_spam_args(arguments)?;
        let target = normalize_chat_id(&args.target, &self.contact_suffix);

        let handle = BroadcastScheduler::new(Arc::clone(&ctx.transport)).schedule(BroadcastJob {
            target: target.clone(),
            message: args.message,
            repeat_count: args.count,
            interval: self.interval,
        });
        let job_id = handle.job_id;
        let scheduled = handle.len();
        info!(
            "Broadcast {} requested by {}: {} message(s) to {}",
            job_id, ctx.message.author, scheduled, target
        );
        tokio::spawn(async move {
            let delivered = handle.join().await;
            info!(
                "Broadcast {} finished: {}/{} message(s) delivered",
                job_id, delivered, scheduled
            );
        });

        ctx.transport
            .reply(
                &ctx.message,
                OutboundPayload::text(format!(
                    "Scheduled {} message(s) to {}",
                    args.count, target
                )),
            )
            .await
    }
}
