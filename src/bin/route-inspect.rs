use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use coap_dispatch::config::{load_config, DispatcherConfig, LoggingConfig};
use coap_dispatch::error::BoxError;
use coap_dispatch::handler::{Target, TargetProvider};
use coap_dispatch::message::MediaType;
use coap_dispatch::observability::logging;
use coap_dispatch::routing::{HandlerMapping, MappingRegistry};
use coap_dispatch::{ContentFormat, DispatchError, HandlerError, HandlerMethod, HandlerRef, Method, Request};

#[derive(Parser)]
#[command(name = "route-inspect")]
#[command(about = "Inspect dispatcher routes and test which handler a request reaches", long_about = None)]
struct Cli {
    /// Dispatcher configuration with [[routes]] records
    #[arg(short, long, default_value = "dispatcher.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured routes
    List,
    /// Show the handler a request would be dispatched to
    Match {
        #[arg(short, long, default_value = "GET")]
        method: Method,

        #[arg(short, long)]
        path: String,

        /// Request content-format (media type or numeric code)
        #[arg(long)]
        content_format: Option<String>,

        /// Accepted content-format, repeatable
        #[arg(long)]
        accept: Vec<String>,

        /// Request option as name=value, repeatable
        #[arg(long = "header", value_name = "NAME=VALUE")]
        headers: Vec<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(&LoggingConfig {
        level: "warn".to_string(),
        ..LoggingConfig::default()
    });

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::List => {
            for route in &config.routes {
                let built = route.to_spec()?.build()?;
                println!("{:<24} {}", route.handler, built);
            }
        }
        Commands::Match {
            method,
            path,
            content_format,
            accept,
            headers,
        } => {
            let mapping = build_mapping(&config)?;

            let mut builder = Request::builder(method, path);
            if let Some(format) = content_format {
                builder = builder.content_format(parse_format(&format)?);
            }
            for format in &accept {
                builder = builder.accept(parse_format(format)?);
            }
            for header in &headers {
                let (name, value) = header
                    .split_once('=')
                    .ok_or_else(|| format!("expected NAME=VALUE, got `{header}`"))?;
                builder = builder.header(name, value);
            }
            let request = builder.build();

            match mapping.lookup(&request) {
                Ok(Some(matched)) => {
                    println!("handler: {}", matched.handler.name());
                    println!("route:   {}", matched.route);
                    for (name, value) in matched.path_variables.iter() {
                        println!("  {name} = {value}");
                    }
                }
                Ok(None) => {
                    let reason = mapping.diagnose(&request);
                    println!("no handler ({}): {}", reason.response_code(), reason);
                }
                Err(error @ DispatchError::AmbiguousRoute { .. }) => {
                    println!("{} ({})", error, error.response_code());
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    Ok(())
}

/// Mapping over placeholder handlers; only the routing decision is inspected.
fn build_mapping(config: &DispatcherConfig) -> Result<HandlerMapping, Box<dyn std::error::Error>> {
    let target: TargetProvider = Arc::new(|| -> Result<Target, BoxError> { Ok(Arc::new(())) });
    let mut registry = MappingRegistry::new();
    for route in &config.routes {
        let (owner, method) = route
            .handler
            .split_once('#')
            .unwrap_or((route.handler.as_str(), "handle"));
        let handler_method = HandlerMethod::value(method, [], |_: Arc<()>, _| async {
            Err::<(), _>(HandlerError::new("placeholder handler"))
        });
        let handler = HandlerRef::new(owner, Arc::clone(&target), handler_method);
        registry.register(route.to_spec()?.build()?, handler)?;
    }
    Ok(HandlerMapping::new(registry))
}

fn parse_format(raw: &str) -> Result<ContentFormat, Box<dyn std::error::Error>> {
    if let Ok(code) = raw.parse::<u16>() {
        return Ok(ContentFormat(code));
    }
    let media: MediaType = raw.parse()?;
    media
        .content_format()
        .ok_or_else(|| format!("no content-format registered for `{media}`").into())
}
