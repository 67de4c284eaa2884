//! Usage text for the `help` command and for malformed arguments.

/// Source of the usage text shown to users. The router only knows command
/// names; the wording lives with the implementation.
pub trait UsageText: Send + Sync {
    /// Usage of one command, optionally narrowed to the argument forms that
    /// mention `arg`. `None` when the command is unknown.
    fn usage(&self, command: &str, arg: Option<&str>) -> Option<String>;

    /// Listing of every command.
    fn overview(&self) -> String;
}

struct ArgCombo {
    args: &'static str,
    description: &'static str,
}

struct CommandHelp {
    name: &'static str,
    description: &'static str,
    arg_combos: &'static [ArgCombo],
}

const COMMANDS: &[CommandHelp] = &[
    CommandHelp {
        name: "y",
        description: "Plays YouTube Audio.",
        arg_combos: &[
            ArgCombo {
                args: "Link to YouTube video",
                description: "Add a YouTube video directly to the Sounds Playlist by URL.",
            },
            ArgCombo {
                args: "YouTube search query",
                description: "Add a YouTube video to the Sounds Playlist by supplying a search query to the command. The first search result of the YouTube search will be added to the Sounds Playlist.",
            },
        ],
    },
    CommandHelp {
        name: "p",
        description: "Gets or modifies the Sounds Playlist.",
        arg_combos: &[
            ArgCombo {
                args: "next",
                description: "Skip to the next Sound in the Sounds Playlist.",
            },
            ArgCombo {
                args: "back | prev",
                description: "Go to the previous Sound in the Sounds Playlist.",
            },
            ArgCombo {
                args: "clear",
                description: "Clear all of the Sounds from the Sounds Playlist and stop playback.",
            },
            ArgCombo {
                args: "repeat none",
                description: "Change the Repeat Mode of the Sounds Playlist to \"None\". This is the default Repeat Mode.",
            },
            ArgCombo {
                args: "repeat one",
                description: "Change the Repeat Mode of the Sounds Playlist to \"Repeat One\". This will cause the currently-playing Sound to repeat from the beginning once it ends.",
            },
            ArgCombo {
                args: "repeat all",
                description: "Change the Repeat Mode of the Sounds Playlist to \"Repeat All\". In this mode, once the final Sound in the Sounds Playlist finishes, the playlist will start playing from the beginning.",
            },
            ArgCombo {
                args: "del <index to delete>",
                description: "Deletes the Sound at the supplied index. If that Sound is currently playing, the next Sound will start playing automatically.",
            },
            ArgCombo {
                args: "goto <index>",
                description: "Plays the Sound at the supplied index.",
            },
            ArgCombo {
                args: "list",
                description: "List all of the Sounds currently in the Sounds Playlist.",
            },
            ArgCombo {
                args: "list save <name of playlist>",
                description: "Saves the current Sounds Playlist for easy retrieval later.",
            },
            ArgCombo {
                args: "list load <name of playlist>",
                description: "Replaces the Sounds Playlist with a saved one.",
            },
            ArgCombo {
                args: "list saved",
                description: "Lists the names of the playlists saved in this server.",
            },
        ],
    },
    CommandHelp {
        name: "pause",
        description: "Pauses the currently-playing Sound.",
        arg_combos: &[],
    },
    CommandHelp {
        name: "play",
        description: "Resumes a paused Sound, or plays the Sound in the Sounds Playlist corresponding to the Current Playlist Index.",
        arg_combos: &[],
    },
    CommandHelp {
        name: "next",
        description: "Increments the Current Playlist Index, then plays the Sound in the Sounds Playlist corresponding to the Current Playlist Index.",
        arg_combos: &[],
    },
    CommandHelp {
        name: "prev",
        description: "Decrements the Current Playlist Index, then plays the Sound in the Sounds Playlist corresponding to the Current Playlist Index.",
        arg_combos: &[],
    },
    CommandHelp {
        name: "stop",
        description: "Resets the Current Playlist Index, then stops Sound playback.",
        arg_combos: &[],
    },
    CommandHelp {
        name: "leave",
        description: "Forces the bot to leave its current Voice Channel, if it's in one.",
        arg_combos: &[],
    },
    CommandHelp {
        name: "v",
        description: "Sets the volume of the current or future Sound that plays from the Sound Playlist.",
        arg_combos: &[ArgCombo {
            args: "volume",
            description: "The desired volume, from 0.0 to 2.0.",
        }],
    },
    CommandHelp {
        name: "help",
        description: "Displays usage for all commands.",
        arg_combos: &[ArgCombo {
            args: "Optional. Command Argument",
            description: "Optional. Command argument to get help with.",
        }],
    },
];

/// The built-in command catalog.
pub struct CommandCatalog {
    prefix: String,
}

impl CommandCatalog {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn find(name: &str) -> Option<&'static CommandHelp> {
        let name = match name {
            "resume" => "play",
            "back" => "prev",
            other => other,
        };
        COMMANDS.iter().find(|c| c.name == name)
    }
}

impl UsageText for CommandCatalog {
    fn usage(&self, command: &str, arg: Option<&str>) -> Option<String> {
        let help = Self::find(command)?;

        let mut text = String::from("```\n");
        text.push_str(&format!("{}{}: {}", self.prefix, help.name, help.description));

        let combos: Vec<&ArgCombo> = help
            .arg_combos
            .iter()
            .filter(|combo| arg.map_or(true, |a| combo.args.contains(a)))
            .collect();
        if !combos.is_empty() {
            text.push_str("\n\n");
            for combo in combos {
                text.push_str(&format!(
                    "{}{} <{}>:\n{}\n\n",
                    self.prefix, help.name, combo.args, combo.description
                ));
            }
        }

        text.push_str("\n```");
        Some(text)
    }

    fn overview(&self) -> String {
        let mut text = String::from("Here are the commands I support right now:\n```");
        for help in COMMANDS {
            text.push_str(help.name);
            text.push('\n');
        }
        text.push_str("```\n");
        text.push_str(&format!(
            "You can get usage help with each individual command by typing `{}help <command>`.",
            self.prefix
        ));
        text
    }
}
