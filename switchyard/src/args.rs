use std::path::PathBuf;

use clap::{Parser, Subcommand};
use switchyard_core::{InferenceRequest, Message, RequestConstraints};

/// Switchyard inference router
#[derive(Debug, Parser)]
#[command(name = "switchyard", version, about = "Route LLM requests between local and cloud providers")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "switchyard.toml", env = "SWITCHYARD_CONFIG", global = true)]
    pub config: PathBuf,

    /// Log filter directive (e.g. "info,switchyard::transition=debug")
    #[arg(long, default_value = "info", env = "SWITCHYARD_LOG", global = true)]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate the configuration and list providers
    Check,
    /// Print the routing decision for a prompt without calling a provider
    Route(PromptArgs),
    /// Serve one prompt and print the result as JSON
    Complete(PromptArgs),
    /// Serve prompts from stdin, one per line, reloading providers on config changes
    Watch(RequestFlags),
}

#[derive(Debug, clap::Args)]
pub struct PromptArgs {
    /// User prompt
    pub prompt: String,

    #[command(flatten)]
    pub flags: RequestFlags,
}

#[derive(Debug, Clone, clap::Args)]
pub struct RequestFlags {
    /// Keep the request on local providers
    #[arg(long)]
    pub private: bool,

    /// Session id used for provider affinity
    #[arg(long)]
    pub session: Option<String>,

    /// Domain tag, repeatable (e.g. --tag code)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// System prompt
    #[arg(long)]
    pub system: Option<String>,

    /// End-to-end latency budget in milliseconds
    #[arg(long)]
    pub max_latency_ms: Option<u64>,

    /// Maximum tokens to generate
    #[arg(long)]
    pub max_output_tokens: Option<u32>,
}

impl RequestFlags {
    pub fn request(&self, prompt: &str) -> InferenceRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system {
            messages.push(Message::system(system.clone()));
        }
        messages.push(Message::user(prompt));

        let mut request = InferenceRequest::new(messages).with_constraints(RequestConstraints {
            max_latency_ms: self.max_latency_ms,
            privacy_sensitive: self.private,
            context_tokens: None,
            max_output_tokens: self.max_output_tokens,
        });
        request.session_id.clone_from(&self.session);
        request.domain_tags.clone_from(&self.tags);
        request
    }
}
