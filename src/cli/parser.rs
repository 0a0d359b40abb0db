//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// assist-router: per-turn routing for a tool-using assistant.
///
/// Classifies a user turn, plans and runs tools against a JSON fixture,
/// and synthesizes the answer. Intended for manual exercise of the engine.
#[derive(Parser, Debug)]
#[command(name = "assist-router")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Route one user turn end to end.
    ///
    /// Requires an OpenAI-compatible API key. Tools are served from a
    /// JSON fixture (see `tools --help` for the format).
    #[command(after_help = r#"Examples:
  assist-router ask "What is the capital of France?"
  assist-router ask "find emails about project deadline" --tools tools.json
  assist-router ask "what about Jubilo?" --history chat.json --tools tools.json
  assist-router --format json ask "show my meetings" --tools tools.json --no-evaluate
"#)]
    Ask {
        /// The user's message.
        message: String,

        /// JSON file with prior turns (`[{"role": "user", "content": "..."}]`).
        #[arg(long)]
        history: Option<PathBuf>,

        /// User identifier passed to settings and analytics.
        #[arg(short, long, default_value = "cli-user")]
        user: String,

        /// JSON tool fixture (catalogue and canned responses).
        #[arg(short, long)]
        tools: Option<PathBuf>,

        /// JSON file with tool preferences (per user or a single default).
        #[arg(short, long)]
        preferences: Option<PathBuf>,

        /// Skip the post-answer evaluation.
        #[arg(long)]
        no_evaluate: bool,

        /// Directory containing prompt template files.
        #[arg(long, env = "ASSIST_PROMPT_DIR")]
        prompt_dir: Option<PathBuf>,
    },

    /// Classify a message without answering it.
    ///
    /// Uses keyword heuristics only unless `--llm` is given.
    #[command(after_help = r#"Examples:
  assist-router classify "What is the capital of France?"
  assist-router classify "find emails about project deadline" --tools tools.json
  assist-router classify "and the other one?" --history chat.json --llm
"#)]
    Classify {
        /// The user's message.
        message: String,

        /// JSON file with prior turns.
        #[arg(long)]
        history: Option<PathBuf>,

        /// JSON tool fixture used to suggest tools.
        #[arg(short, long)]
        tools: Option<PathBuf>,

        /// Escalate to the classifier model below the confidence threshold.
        #[arg(long)]
        llm: bool,
    },

    /// Print the search query extracted from a message.
    #[command(after_help = r#"Examples:
  assist-router extract-query "find emails about project deadline"
  assist-router extract-query "any news from Jubilo this week?" --entities Jubilo,Iwata
"#)]
    ExtractQuery {
        /// The user's message.
        message: String,

        /// Proper nouns recognised verbatim (comma-separated).
        #[arg(long, env = "ASSIST_KNOWN_ENTITIES", value_delimiter = ',')]
        entities: Vec<String>,
    },

    /// List the tool catalogue of a fixture.
    #[command(after_help = r#"Fixture format:
  {
    "tools": [{"name": "gmail_search", "description": "Search mail", "category": "email"}],
    "responses": {"gmail_search": {"success": true, "response": "Message ID: abc123def456"}}
  }
"#)]
    Tools {
        /// JSON tool fixture.
        #[arg(short, long)]
        tools: PathBuf,
    },

    /// Write default prompt templates to a directory.
    ///
    /// Creates one file per agent role. Existing files are not
    /// overwritten. Edit the files to customize agent system prompts.
    InitPrompts {
        /// Target directory for prompt templates.
        ///
        /// Defaults to `~/.config/assist-router/prompts/`.
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}
