use clap::Parser;

/// Local-inference gateway - presents the Anthropic Messages API over a
/// local Ollama server.
#[derive(Parser, Debug)]
#[clap(name = "gatewayd")]
#[clap(about = "Anthropic Messages API gateway backed by Ollama", long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    pub config: Option<String>,

    /// Port to listen on.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Base URL of the Ollama server to forward requests to.
    #[arg(long)]
    pub ollama_url: Option<String>,

    /// Model to use when a client asks for a `claude-*` model with no
    /// matching entry in `model_map`.
    #[arg(long)]
    pub default_model: Option<String>,

    /// Reject requests that ask for extended thinking on a model this
    /// gateway doesn't recognize as thinking-capable, instead of silently
    /// stripping the request.
    #[arg(long)]
    pub strict_thinking: bool,

    /// Rewrite parallel tool-call rounds into sequential ones before
    /// forwarding to Ollama.
    #[arg(long)]
    pub sequential_tool_calls: Option<bool>,

    /// Log verbosity: error, warn, info, or debug.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Also write logs to this file (truncated at startup).
    #[arg(long)]
    pub log_file: Option<String>,
}

impl Cli {
    /// Lifts the flags this CLI actually sets into a `CliOverrides` layer.
    /// `strict_thinking` is a plain boolean flag rather than `Option<bool>`
    /// since clap has no ergonomic "unset" state for it; passing it at all
    /// means "on".
    pub fn into_overrides(self) -> crate::config::CliOverrides {
        crate::config::CliOverrides {
            port: self.port,
            ollama_url: self.ollama_url,
            default_model: self.default_model,
            strict_thinking: if self.strict_thinking { Some(true) } else { None },
            sequential_tool_calls: self.sequential_tool_calls,
            log_level: self.log_level,
            log_file: self.log_file,
        }
    }
}
