//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::compiler::SpecKind;

/// Compile OpenAPI/Swagger documents into invokable tools
#[derive(Parser, Debug)]
#[command(name = "api-tool-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "API_TOOLS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "warn",
        env = "API_TOOLS_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "API_TOOLS_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a spec and print its operation descriptors
    Compile {
        /// Spec URL, `file://` URL or local path
        #[arg(required = true)]
        spec: String,

        /// Document kind
        #[arg(short = 't', long = "type", default_value = "openapi")]
        kind: SpecKind,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Register every configured spec and list the resulting tools
    List {
        /// Only list tools of this spec URL
        #[arg(long)]
        spec: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Register every configured spec and invoke one operation
    Invoke {
        /// Operation id
        #[arg(required = true)]
        operation: String,

        /// JSON arguments to pass to the operation
        #[arg(short, long, default_value = "{}")]
        args: String,
    },
}

/// Output format for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One line per tool
    Text,
    /// Pretty-printed JSON descriptors
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compile_with_type() {
        let cli = Cli::parse_from([
            "api-tool-gateway",
            "compile",
            "petstore.json",
            "--type",
            "swagger",
            "--format",
            "json",
        ]);
        match cli.command {
            Command::Compile { spec, kind, format } => {
                assert_eq!(spec, "petstore.json");
                assert_eq!(kind, SpecKind::Swagger);
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_invoke_with_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "api-tool-gateway",
            "invoke",
            "getWidget",
            "--args",
            r#"{"id":"w1"}"#,
            "--config",
            "tools.yaml",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("tools.yaml")));
        assert!(matches!(cli.command, Command::Invoke { ref operation, .. } if operation == "getWidget"));
    }

    #[test]
    fn rejects_unknown_spec_type() {
        assert!(
            Cli::try_parse_from(["api-tool-gateway", "compile", "x.json", "--type", "raml"]).is_err()
        );
    }
}
