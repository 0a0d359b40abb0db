//! CLI command implementations.
//!
//! Contains the business logic for each CLI command. Every command returns
//! its rendered output; `main` does the printing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::agent::client::create_provider;
use crate::agent::{
    AgentConfig, ChatMessage, Orchestrator, PromptSet, RequestClassifier, StaticSettings,
    StaticToolProvider, ToolProvider, ToolRegistry, UserToolPreferences, classify_heuristic,
};
use crate::cli::output::{
    OutputFormat, format_classification, format_request_result, format_tool_list,
};
use crate::cli::parser::{Cli, Commands};
use crate::core::{DEFAULT_KNOWN_ENTITIES, extract_search_query};
use crate::error::{CommandError, Result};

/// Parameters for the ask command.
#[derive(Debug, Clone)]
pub struct AskParams<'a> {
    /// The user's message.
    pub message: &'a str,
    /// Prior turns file.
    pub history: Option<&'a Path>,
    /// User identifier.
    pub user: &'a str,
    /// Tool fixture file.
    pub tools: Option<&'a Path>,
    /// Preferences file.
    pub preferences: Option<&'a Path>,
    /// Run the evaluation after answering.
    pub evaluate: bool,
    /// Directory containing prompt template files.
    pub prompt_dir: Option<&'a Path>,
    /// Show diagnostics.
    pub verbose: bool,
}

/// Executes the CLI command.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Ask {
            message,
            history,
            user,
            tools,
            preferences,
            no_evaluate,
            prompt_dir,
        } => {
            let params = AskParams {
                message,
                history: history.as_deref(),
                user,
                tools: tools.as_deref(),
                preferences: preferences.as_deref(),
                evaluate: !no_evaluate,
                prompt_dir: prompt_dir.as_deref(),
                verbose: cli.verbose,
            };
            cmd_ask(&params, format)
        }
        Commands::Classify {
            message,
            history,
            tools,
            llm,
        } => cmd_classify(message, history.as_deref(), tools.as_deref(), *llm, format),
        Commands::ExtractQuery { message, entities } => {
            Ok(cmd_extract_query(message, entities, format))
        }
        Commands::Tools { tools } => cmd_tools(tools, format),
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format),
    }
}

fn cmd_ask(params: &AskParams<'_>, format: OutputFormat) -> Result<String> {
    let history = load_history(params.history)?;
    let tools = load_tools(params.tools)?;
    let settings = match params.preferences {
        Some(path) => StaticSettings::from_file(path).map_err(|e| invalid_input(path, &e))?,
        None => StaticSettings::uniform(UserToolPreferences::default()),
    };

    // Evaluation is awaited below rather than spawned, so the runtime
    // is not torn down underneath it.
    let mut builder = AgentConfig::builder().from_env().evaluate(false);
    if let Some(dir) = params.prompt_dir {
        builder = builder.prompt_dir(dir);
    }
    let config = builder.build().map_err(|e| {
        CommandError::ExecutionFailed(format!("Agent configuration error: {e}"))
    })?;
    let provider = create_provider(&config)
        .map_err(|e| CommandError::ExecutionFailed(format!("Provider creation failed: {e}")))?;
    let orchestrator = Orchestrator::new(Arc::from(provider), config).with_settings(Arc::new(settings));

    let rt = runtime()?;
    let (result, assessment) = rt.block_on(async {
        let result = orchestrator
            .process_user_request(params.message, &history, params.user, &tools)
            .await;
        let assessment = if params.evaluate {
            orchestrator
                .evaluate(&result, params.message, params.user)
                .await
        } else {
            None
        };
        (result, assessment)
    });

    if !result.success {
        return Err(CommandError::ExecutionFailed(result.response));
    }

    let mut output = format_request_result(&result, format, params.verbose);
    if format == OutputFormat::Text
        && params.verbose
        && let Some(assessment) = assessment
    {
        output.push_str(&format!(
            "Quality: {:.2} ({})\n",
            assessment.quality_score, assessment.reasoning
        ));
    }
    Ok(output)
}

fn cmd_classify(
    message: &str,
    history: Option<&Path>,
    tools: Option<&Path>,
    llm: bool,
    format: OutputFormat,
) -> Result<String> {
    let history = load_history(history)?;
    let tools = load_tools(tools)?;
    let rt = runtime()?;

    let classification = if llm {
        let config = AgentConfig::from_env().map_err(|e| {
            CommandError::ExecutionFailed(format!("Agent configuration error: {e}"))
        })?;
        let provider = create_provider(&config).map_err(|e| {
            CommandError::ExecutionFailed(format!("Provider creation failed: {e}"))
        })?;
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        let classifier = RequestClassifier::new(&config, prompts.classifier);
        rt.block_on(async {
            let registry = ToolRegistry::discover(&tools, config.discovery_timeout).await;
            classifier
                .classify(
                    provider.as_ref(),
                    message,
                    &history,
                    &UserToolPreferences::default(),
                    &registry,
                )
                .await
        })
    } else {
        let registry = rt.block_on(registry_of(&tools))?;
        classify_heuristic(message, &history, &registry)
    };

    Ok(format_classification(&classification, format))
}

fn cmd_extract_query(message: &str, entities: &[String], format: OutputFormat) -> String {
    let query = if entities.is_empty() {
        extract_search_query(message, DEFAULT_KNOWN_ENTITIES)
    } else {
        extract_search_query(message, entities)
    };
    match format {
        OutputFormat::Text => format!("{query}\n"),
        OutputFormat::Json => format.to_json(&serde_json::json!({
            "message": message,
            "query": query,
        })),
    }
}

fn cmd_tools(path: &Path, format: OutputFormat) -> Result<String> {
    let tools = load_tools(Some(path))?;
    let registry = runtime()?.block_on(registry_of(&tools))?;
    Ok(format_tool_list(registry.descriptors(), format))
}

fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(PathBuf::from)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed(
                "Could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write prompt templates: {e}"))
    })?;

    match format {
        OutputFormat::Text => {
            if written.is_empty() {
                return Ok(format!(
                    "All prompt templates already exist in: {}\n",
                    target_dir.display()
                ));
            }
            let mut output = format!(
                "Wrote {} prompt template(s) to: {}\n",
                written.len(),
                target_dir.display()
            );
            for path in &written {
                output.push_str("  ");
                output.push_str(
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("unknown"),
                );
                output.push('\n');
            }
            output.push_str("\nEdit these files to customize agent system prompts.\n");
            Ok(output)
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "directory": target_dir.to_string_lossy(),
                "written": written.iter().map(|p| p.to_string_lossy().into_owned()).collect::<Vec<_>>(),
                "count": written.len()
            });
            Ok(format.to_json(&json))
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}"))
    })
}

/// Lists a fixture's catalogue, surfacing discovery errors the router would swallow.
async fn registry_of(tools: &StaticToolProvider) -> Result<ToolRegistry> {
    let descriptors = tools
        .list_tools()
        .await
        .map_err(|e| CommandError::ExecutionFailed(format!("Tool discovery failed: {e}")))?;
    Ok(ToolRegistry::new(descriptors))
}

fn load_history(path: Option<&Path>) -> Result<Vec<ChatMessage>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let json = std::fs::read_to_string(path).map_err(|e| invalid_input(path, &e))?;
    serde_json::from_str(&json).map_err(|e| invalid_input(path, &e))
}

fn load_tools(path: Option<&Path>) -> Result<StaticToolProvider> {
    match path {
        Some(path) => StaticToolProvider::from_file(path).map_err(|e| invalid_input(path, &e)),
        None => Ok(StaticToolProvider::default()),
    }
}

fn invalid_input(path: &Path, error: &dyn std::fmt::Display) -> CommandError {
    CommandError::InvalidInput {
        path: path.display().to_string(),
        message: error.to_string(),
    }
}
