//! api-tool-gateway - compile API descriptions into invokable tools

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use serde_json::Value;
use tracing::info;

use api_tool_gateway::{
    cli::{Cli, Command, OutputFormat},
    compiler::{CompileContext, OperationDescriptor, SpecKind, compile_spec},
    config::Config,
    failsafe::RetryPolicy,
    fetch::SpecFetcher,
    provider::ToolProvider,
    setup_tracing,
    transport::build_client,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Compile { spec, kind, format } => run_compile(&config, &spec, kind, format).await,
        Command::List { spec, format } => run_list(&config, spec.as_deref(), format).await,
        Command::Invoke { operation, args } => run_invoke(&config, &operation, &args).await,
    }
}

/// Compile one spec without registering it
async fn run_compile(config: &Config, spec: &str, kind: SpecKind, format: OutputFormat) -> ExitCode {
    match compile_one(config, spec, kind).await {
        Ok(operations) => print_operations(operations.iter(), format),
        Err(e) => {
            eprintln!("❌ {} ({})", e, e.kind());
            ExitCode::FAILURE
        }
    }
}

async fn compile_one(
    config: &Config,
    spec: &str,
    kind: SpecKind,
) -> api_tool_gateway::Result<Vec<OperationDescriptor>> {
    let client = build_client(&config.http)?;
    let fetcher = SpecFetcher::new(client, config.http.timeout, RetryPolicy::new(&config.retry));
    let document = fetcher.fetch(spec).await?;
    compile_spec(&document, kind, &CompileContext::new(spec))
}

/// Register configured specs and list their tools
async fn run_list(config: &Config, spec: Option<&str>, format: OutputFormat) -> ExitCode {
    let Some(provider) = register_all(config).await else {
        return ExitCode::FAILURE;
    };
    let tools = provider.get_registered_tools(spec);
    print_operations(tools.iter().map(|op| &**op), format)
}

/// Register configured specs and invoke one operation
async fn run_invoke(config: &Config, operation: &str, args: &str) -> ExitCode {
    let arguments: Value = match serde_json::from_str(args) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("❌ Invalid JSON arguments: {e}");
            return ExitCode::FAILURE;
        }
    };

    let Some(provider) = register_all(config).await else {
        return ExitCode::FAILURE;
    };

    let start = std::time::Instant::now();
    match provider.invoke(operation, arguments).await {
        Ok(result) => {
            info!(operation, elapsed = ?round_ms(start.elapsed()), "Invocation succeeded");
            match serde_json::to_string_pretty(&result) {
                Ok(json) => println!("{json}"),
                Err(_) => println!("{result}"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ {} ({})", e, e.kind());
            ExitCode::FAILURE
        }
    }
}

async fn register_all(config: &Config) -> Option<ToolProvider> {
    if config.apis.specs.is_empty() {
        eprintln!("❌ No APIs configured (apis.specs is empty)");
        return None;
    }

    let provider = match ToolProvider::new(config) {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("❌ {e}");
            return None;
        }
    };

    for registration in provider.register_configured(&config.apis).await {
        if let Err(e) = registration.result {
            eprintln!("⚠️  {} ({}): {e}", registration.name, registration.url);
        }
    }
    Some(provider)
}

fn print_operations<'a>(
    operations: impl Iterator<Item = &'a OperationDescriptor>,
    format: OutputFormat,
) -> ExitCode {
    let operations: Vec<&OperationDescriptor> = operations.collect();
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(&operations) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("❌ Failed to serialize to JSON: {e}");
                ExitCode::FAILURE
            }
        },
        OutputFormat::Text => {
            println!("{} tool(s):\n", operations.len());
            for op in operations {
                println!("  {} {} {}", op.id, op.method, op.path_template);
                if !op.description.is_empty() {
                    println!("     {}", op.description);
                }
                let params: Vec<String> = op
                    .parameters
                    .iter()
                    .map(|p| {
                        let marker = if p.required { "" } else { "?" };
                        format!("{}{marker}: {} ({})", p.name, p.shape, p.location)
                    })
                    .collect();
                if !params.is_empty() {
                    println!("     params: {}", params.join(", "));
                }
                println!("     returns: {}", op.response);
            }
            ExitCode::SUCCESS
        }
    }
}

fn round_ms(elapsed: Duration) -> Duration {
    Duration::from_millis(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}
