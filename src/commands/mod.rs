pub mod builtin;

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::error::BotError;
use crate::platform::{IncomingMessage, Transport};

/// How a command's trigger is compared against message text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Text must equal the trigger
    Equals,
    /// Text must begin with the trigger (commands with trailing arguments)
    StartsWith,
}

impl MatchPolicy {
    pub fn matches(self, trigger: &str, text: &str) -> bool {
        match self {
            MatchPolicy::Equals => text == trigger,
            MatchPolicy::StartsWith => text.starts_with(trigger),
        }
    }
}

/// Everything a command action can reach
#[derive(Clone)]
pub struct CommandContext {
    pub message: IncomingMessage,
    pub transport: Arc<dyn Transport>,
    pub registry: Arc<CommandRegistry>,
}

/// Side effect run when a command matches
#[async_trait]
pub trait CommandAction: Send + Sync {
    async fn run(&self, ctx: &CommandContext) -> Result<()>;
}

/// A named command definition
#[derive(Clone)]
pub struct Command {
    id: Uuid,
    name: String,
    trigger: String,
    match_policy: MatchPolicy,
    description: String,
    action: Arc<dyn CommandAction>,
}

impl Command {
    pub fn new(
        name: impl Into<String>,
        trigger: impl Into<String>,
        match_policy: MatchPolicy,
        description: impl Into<String>,
        action: Arc<dyn CommandAction>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            trigger: trigger.into(),
            match_policy,
            description: description.into(),
            action,
        }
    }

    #[allow(dead_code)]
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    #[allow(dead_code)]
    pub fn match_policy(&self) -> MatchPolicy {
        self.match_policy
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn matches(&self, text: &str) -> bool {
        self.match_policy.matches(&self.trigger, text)
    }

    pub async fn run(&self, ctx: &CommandContext) -> Result<()> {
        self.action.run(ctx).await
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("trigger", &self.trigger)
            .field("match_policy", &self.match_policy)
            .finish_non_exhaustive()
    }
}

/// Ordered registry of commands.
///
/// Matching walks the commands in registration order and the first hit wins, so
/// a broad `StartsWith` trigger registered early shadows later commands that
/// share its prefix.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: Vec<Command>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command
    pub fn register(&mut self, command: Command) -> Result<(), BotError> {
        if self.commands.iter().any(|c| c.name == command.name) {
            return Err(BotError::DuplicateName(command.name));
        }
        info!(
            "Registered command: {} ({}): {}",
            command.name, command.trigger, command.description
        );
        self.commands.push(command);
        Ok(())
    }

    /// First command, in registration order, whose trigger matches `text`
    pub fn find_match(&self, text: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.matches(text))
    }

    /// All commands in registration order
    pub fn list(&self) -> &[Command] {
        &self.commands
    }

    /// Help text: one line per command, in registration order
    pub fn help_text(&self) -> String {
        let mut text = String::from("List of commands:");
        for command in &self.commands {
            text.push_str(&format!(
                "\n - {} ({}): {}",
                command.trigger(),
                command.name(),
                command.description()
            ));
        }
        text
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl CommandAction for Noop {
        async fn run(&self, _ctx: &CommandContext) -> Result<()> {
            Ok(())
        }
    }

    fn command(name: &str, trigger: &str, policy: MatchPolicy) -> Command {
        Command::new(name, trigger, policy, format!("{} description", name), Arc::new(Noop))
    }

    #[test]
    fn test_equals_matches_exact_text_only() {
        let mut registry = CommandRegistry::new();
        registry
            .register(command("PING", "!ping", MatchPolicy::Equals))
            .unwrap();

        assert_eq!(registry.find_match("!ping").unwrap().name(), "PING");
        assert!(registry.find_match("!ping now").is_none());
        assert!(registry.find_match(" !ping").is_none());
        assert!(registry.find_match("!PING").is_none());
    }

    #[test]
    fn test_starts_with_matches_trigger_and_suffix() {
        let mut registry = CommandRegistry::new();
        registry
            .register(command("SPAM", "!spam", MatchPolicy::StartsWith))
            .unwrap();

        assert_eq!(registry.find_match("!spam").unwrap().name(), "SPAM");
        assert_eq!(
            registry.find_match("!spam 3 123 hello").unwrap().name(),
            "SPAM"
        );
        assert!(registry.find_match("spam").is_none());
    }

    #[test]
    fn test_registration_order_decides_shadowing() {
        let mut registry = CommandRegistry::new();
        registry
            .register(command("A", "!h", MatchPolicy::StartsWith))
            .unwrap();
        registry
            .register(command("B", "!help", MatchPolicy::Equals))
            .unwrap();

        assert_eq!(registry.find_match("!help").unwrap().name(), "A");

        let mut reversed = CommandRegistry::new();
        reversed
            .register(command("B", "!help", MatchPolicy::Equals))
            .unwrap();
        reversed
            .register(command("A", "!h", MatchPolicy::StartsWith))
            .unwrap();

        assert_eq!(reversed.find_match("!help").unwrap().name(), "B");
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = CommandRegistry::new();
        registry
            .register(command("PING", "!ping", MatchPolicy::Equals))
            .unwrap();

        let err = registry
            .register(command("PING", "!pong", MatchPolicy::Equals))
            .unwrap_err();
        assert!(matches!(err, BotError::DuplicateName(ref name) if name == "PING"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = command("A", "!a", MatchPolicy::Equals);
        let b = command("B", "!b", MatchPolicy::Equals);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_help_text_lists_commands_in_order() {
        let mut registry = CommandRegistry::new();
        registry
            .register(command("PING", "!ping", MatchPolicy::Equals))
            .unwrap();
        registry
            .register(command("HELP", "!help", MatchPolicy::Equals))
            .unwrap();

        let help = registry.help_text();
        let lines: Vec<&str> = help.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "List of commands:");
        assert_eq!(lines[1], " - !ping (PING): PING description");
        assert_eq!(lines[2], " - !help (HELP): HELP description");
    }

    #[test]
    fn test_list_preserves_order() {
        let mut registry = CommandRegistry::new();
        for (name, trigger) in [("C", "!c"), ("A", "!a"), ("B", "!b")] {
            registry
                .register(command(name, trigger, MatchPolicy::Equals))
                .unwrap();
        }
        let names: Vec<&str> = registry.list().iter().map(Command::name).collect();
        assert_eq!(names, vec!["C", "A", "B"]);
    }
}
