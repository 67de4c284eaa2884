use std::sync::Arc;
use tracing::{debug, info, warn};

use super::help::UsageText;
use crate::{
    audio::{
        player::{PlaybackController, RequestContext},
        playlist::RepeatMode,
    },
    error::CommandError,
};

/// Subcommands of `p`.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaylistAction {
    Next,
    Back,
    Clear,
    Repeat(RepeatMode),
    Delete(i64),
    Goto(i64),
    List,
    Save(String),
    Load(String),
    /// Names of the guild's saved playlists.
    Saved,
}

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `y <url | search words>`
    YouTube(String),
    Playlist(PlaylistAction),
    Play,
    Pause,
    Next,
    Prev,
    Stop,
    Leave,
    Volume(f32),
    Help {
        command: Option<String>,
        arg: Option<String>,
    },
}

fn invalid(command: &str, arg: Option<&str>) -> CommandError {
    CommandError::InvalidArguments {
        command: command.to_string(),
        arg: arg.map(str::to_string),
    }
}

fn parse_index(command: &str, sub: &str, raw: Option<&&str>) -> Result<i64, CommandError> {
    raw.and_then(|raw| raw.parse().ok())
        .ok_or_else(|| invalid(command, Some(sub)))
}

impl Command {
    /// Parses a command name (without prefix) and its whitespace-split args.
    pub fn parse(prefix: &str, name: &str, args: &[&str]) -> Result<Self, CommandError> {
        let command = match name {
            "y" => {
                if args.is_empty() {
                    return Err(invalid(name, None));
                }
                Command::YouTube(args.join(" "))
            }
            "p" => Command::Playlist(Self::parse_playlist(args)?),
            "play" | "resume" => Command::Play,
            "pause" => Command::Pause,
            "next" => Command::Next,
            "prev" | "back" => Command::Prev,
            "stop" => Command::Stop,
            "leave" => Command::Leave,
            "v" => {
                let volume = args
                    .first()
                    .and_then(|raw| raw.parse::<f32>().ok())
                    .filter(|v| (0.0..=2.0).contains(v))
                    .ok_or_else(|| invalid(name, None))?;
                Command::Volume(volume)
            }
            "help" => Command::Help {
                command: args.first().map(|s| s.to_string()),
                arg: args.get(1).map(|s| s.to_string()),
            },
            _ => {
                return Err(CommandError::UnknownCommand {
                    prefix: prefix.to_string(),
                    command: name.to_string(),
                })
            }
        };
        Ok(command)
    }

    fn parse_playlist(args: &[&str]) -> Result<PlaylistAction, CommandError> {
        let Some((&sub, rest)) = args.split_first() else {
            return Err(invalid("p", None));
        };

        let action = match sub {
            "next" => PlaylistAction::Next,
            "back" | "prev" => PlaylistAction::Back,
            "clear" => PlaylistAction::Clear,
            "repeat" => {
                let mode = rest
                    .first()
                    .ok_or_else(|| invalid("p", Some("repeat")))?
                    .parse::<RepeatMode>()?;
                PlaylistAction::Repeat(mode)
            }
            "del" => PlaylistAction::Delete(parse_index("p", "del", rest.first())?),
            "goto" => PlaylistAction::Goto(parse_index("p", "goto", rest.first())?),
            "list" => match rest {
                [] => PlaylistAction::List,
                ["save", name] => PlaylistAction::Save(name.to_string()),
                ["load", name] => PlaylistAction::Load(name.to_string()),
                ["saved"] => PlaylistAction::Saved,
                _ => return Err(invalid("p", Some("list"))),
            },
            _ => return Err(invalid("p", None)),
        };
        Ok(action)
    }
}

/// Turns chat commands into controller calls.
///
/// Every failed command is reported to the requester exactly once, through
/// the request's sink; malformed arguments are followed by the usage text.
pub struct CommandRouter {
    controller: PlaybackController,
    usage: Arc<dyn UsageText>,
    prefix: String,
}

impl CommandRouter {
    pub fn new(controller: PlaybackController, usage: Arc<dyn UsageText>, prefix: impl Into<String>) -> Self {
        Self {
            controller,
            usage,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    /// Parses and runs one command, reporting any failure to `ctx.sink`.
    pub async fn dispatch(&self, ctx: &RequestContext, name: &str, args: &[&str]) -> Result<(), CommandError> {
        info!("📨 Command in guild {}: {}{} {}", ctx.guild_id, self.prefix, name, args.join(" "));

        let result = match Command::parse(&self.prefix, name, args) {
            Ok(command) => self.execute(ctx, command).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            self.report(ctx, e);
        }
        result
    }

    async fn execute(&self, ctx: &RequestContext, command: Command) -> Result<(), CommandError> {
        debug!("Executing {:?} in guild {}", command, ctx.guild_id);
        let controller = &self.controller;

        match command {
            Command::YouTube(query) => {
                controller.request_query(ctx, &query).await?;
            }
            Command::Playlist(action) => match action {
                PlaylistAction::Next => controller.next(ctx).await?,
                PlaylistAction::Back => controller.previous(ctx).await?,
                PlaylistAction::Clear => controller.clear(ctx).await?,
                PlaylistAction::Repeat(mode) => controller.set_repeat_mode(ctx, mode).await?,
                PlaylistAction::Delete(index) => {
                    controller.remove_at(ctx, index).await?;
                }
                PlaylistAction::Goto(index) => controller.goto(ctx, index).await?,
                PlaylistAction::List => controller.list(ctx).await?,
                PlaylistAction::Save(name) => controller.save_playlist(ctx, &name).await?,
                PlaylistAction::Load(name) => {
                    controller.load_playlist(ctx, &name).await?;
                }
                PlaylistAction::Saved => {
                    controller.saved_playlists(ctx).await?;
                }
            },
            Command::Play => controller.play_current_or_resume(ctx).await?,
            Command::Pause => controller.pause(ctx).await?,
            Command::Next => controller.next(ctx).await?,
            Command::Prev => controller.previous(ctx).await?,
            Command::Stop => controller.stop(ctx, true).await?,
            Command::Leave => controller.leave(ctx).await?,
            Command::Volume(volume) => controller.set_volume(ctx, volume).await?,
            Command::Help { command, arg } => match command {
                None => ctx.sink.status(&self.usage.overview()),
                Some(command) => {
                    let usage = self
                        .usage
                        .usage(&command, arg.as_deref())
                        .ok_or_else(|| CommandError::UnknownCommand {
                            prefix: self.prefix.clone(),
                            command,
                        })?;
                    ctx.sink.status(&usage);
                }
            },
        }
        Ok(())
    }

    fn report(&self, ctx: &RequestContext, error: &CommandError) {
        warn!("Command failed in guild {}: {}", ctx.guild_id, error);
        ctx.sink.error(&error.to_string());

        if let CommandError::InvalidArguments { command, arg } = error {
            if let Some(usage) = self.usage.usage(command, arg.as_deref()) {
                ctx.sink.status(&usage);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            registry::GuildRegistry,
            testing::{FakeBackend, Level, RecordingSink},
        },
        bot::help::CommandCatalog,
        error::{PlaybackError, PlaylistError},
    };
    use pretty_assertions::assert_eq;
    use serenity::model::id::{ChannelId, GuildId};

    fn router() -> (CommandRouter, FakeBackend, Arc<RecordingSink>, RequestContext) {
        let backend = FakeBackend::default();
        let registry = Arc::new(GuildRegistry::new(1.0, 100));
        let controller = PlaybackController::new(registry, Arc::new(backend.clone()));
        let router = CommandRouter::new(controller, Arc::new(CommandCatalog::new("!")), "!");
        let sink = Arc::new(RecordingSink::default());
        let ctx = RequestContext::new(GuildId::new(5), sink.clone()).in_voice(ChannelId::new(6));
        (router, backend, sink, ctx)
    }

    #[test]
    fn test_parses_playlist_subcommands() {
        assert_eq!(
            Command::parse("!", "p", &["repeat", "all"]).unwrap(),
            Command::Playlist(PlaylistAction::Repeat(RepeatMode::All))
        );
        assert_eq!(
            Command::parse("!", "p", &["del", "-1"]).unwrap(),
            Command::Playlist(PlaylistAction::Delete(-1))
        );
        assert_eq!(
            Command::parse("!", "p", &["list", "save", "party"]).unwrap(),
            Command::Playlist(PlaylistAction::Save("party".into()))
        );
        assert_eq!(
            Command::parse("!", "p", &["list", "saved"]).unwrap(),
            Command::Playlist(PlaylistAction::Saved)
        );
        assert_eq!(Command::parse("!", "back", &[]).unwrap(), Command::Prev);
        assert_eq!(
            Command::parse("!", "y", &["never", "gonna"]).unwrap(),
            Command::YouTube("never gonna".into())
        );
    }

    #[test]
    fn test_rejects_malformed_arguments() {
        assert!(matches!(
            Command::parse("!", "p", &["repeat", "sometimes"]),
            Err(CommandError::Playback(PlaybackError::Playlist(PlaylistError::InvalidMode(_))))
        ));
        assert!(matches!(
            Command::parse("!", "p", &["goto", "x"]),
            Err(CommandError::InvalidArguments { .. })
        ));
        assert!(matches!(
            Command::parse("!", "v", &["3"]),
            Err(CommandError::InvalidArguments { .. })
        ));
        assert!(matches!(
            Command::parse("!", "dance", &[]),
            Err(CommandError::UnknownCommand { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_command_reports_once() {
        let (router, _backend, sink, ctx) = router();

        assert!(router.dispatch(&ctx, "dance", &[]).await.is_err());

        assert_eq!(sink.count(Level::Error), 1);
        assert!(sink.contains("There is no command `!dance`!"));
    }

    #[tokio::test]
    async fn test_invalid_arguments_show_usage() {
        let (router, _backend, sink, ctx) = router();

        assert!(router.dispatch(&ctx, "p", &["goto"]).await.is_err());

        assert_eq!(sink.count(Level::Error), 1);
        assert!(sink.contains("!p <goto <index>>"));
    }

    #[tokio::test]
    async fn test_controller_errors_report_once() {
        let (router, _backend, sink, ctx) = router();

        assert!(router.dispatch(&ctx, "p", &["del", "3"]).await.is_err());
        assert!(router.dispatch(&ctx, "p", &["list"]).await.is_err());

        assert_eq!(sink.count(Level::Error), 2);
        assert!(sink.contains("out of range"));
        assert!(sink.contains("There's no playlist here."));
    }

    #[tokio::test]
    async fn test_saved_listing_needs_storage() {
        let (router, _backend, sink, ctx) = router();

        assert!(router.dispatch(&ctx, "p", &["list", "saved"]).await.is_err());

        assert_eq!(sink.count(Level::Error), 1);
        assert!(sink.contains("Playlist storage isn't configured."));
    }

    #[tokio::test]
    async fn test_youtube_link_starts_playback() {
        let (router, backend, _sink, ctx) = router();

        router
            .dispatch(&ctx, "y", &["https://www.youtube.com/watch?v=dQw4w9WgXcQ"])
            .await
            .unwrap();

        assert_eq!(
            backend.played_urls(),
            vec!["https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string()]
        );
    }

    #[tokio::test]
    async fn test_help_lists_commands() {
        let (router, _backend, sink, ctx) = router();

        router.dispatch(&ctx, "help", &[]).await.unwrap();
        router.dispatch(&ctx, "help", &["v"]).await.unwrap();

        assert!(sink.contains("Here are the commands I support right now"));
        assert!(sink.contains("!v: Sets the volume"));
        assert_eq!(sink.count(Level::Error), 0);
    }
}
