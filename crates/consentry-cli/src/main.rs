//! Consentry: render wrapped fragments and evaluate a visitor's consent
//! situation from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::EnvFilter;

use consentry_core::{ConsentryConfig, CookieStore, Document};
use consentry_protocol::{EventBus, VisitorProfile};
use consentry_runtime::{codec, FragmentAttributes, Page, WrappedFragment};

const DEFAULT_HOST: &str = "localhost";

/// Options of the `evaluate` command.
#[derive(Debug, Default)]
struct EvaluateArgs {
    config: Option<PathBuf>,
    time_zone: String,
    user_agent: String,
    cookie_header: String,
    host: Option<String>,
    content_types: Vec<String>,
}

impl EvaluateArgs {
    fn parse(args: &[String]) -> anyhow::Result<Self> {
        let mut parsed = Self::default();
        let mut iter = args.iter();
        while let Some(flag) = iter.next() {
            let mut value = || {
                iter.next()
                    .cloned()
                    .with_context(|| format!("{} needs a value", flag))
            };
            match flag.as_str() {
                "--config" => parsed.config = Some(PathBuf::from(value()?)),
                "--tz" => parsed.time_zone = value()?,
                "--ua" => parsed.user_agent = value()?,
                "--cookie" => parsed.cookie_header = value()?,
                "--host" => parsed.host = Some(value()?),
                "--mount" => parsed.content_types.push(value()?),
                other => bail!("Unknown option for evaluate: {}", other),
            }
        }
        Ok(parsed)
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ConsentryConfig> {
    let config = match path {
        Some(path) => ConsentryConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ConsentryConfig::default(),
    };
    Ok(config.apply_env()?)
}

fn render(content_type: &str, file: &str) -> anyhow::Result<()> {
    let inner = std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file))?;
    let attributes = FragmentAttributes {
        content_identifier: Some(content_type.to_string()),
        ..Default::default()
    };
    let fragment = WrappedFragment::wrap(&attributes, &inner);
    info!("Rendered {} as {}", file, fragment.wrapper_id);
    print!("{}", fragment.to_html());
    Ok(())
}

fn decode(payload: &str) -> anyhow::Result<()> {
    let html = codec::decode_html(payload)?;
    println!("{}", html);
    Ok(())
}

fn evaluate(args: EvaluateArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_ref())?;
    let host = args.host.as_deref().unwrap_or(DEFAULT_HOST);
    let cookies = Arc::new(CookieStore::from_header(host, &args.cookie_header)?);
    let visitor = VisitorProfile::new(&args.time_zone, &args.user_agent);

    let page = Page::init(
        config,
        Arc::new(Document::new()),
        cookies,
        visitor,
        None,
        Arc::new(EventBus::new()),
    )?;
    page.window_loaded();
    for content_type in &args.content_types {
        let attributes = FragmentAttributes {
            content_identifier: Some(content_type.clone()),
            ..Default::default()
        };
        page.mount(WrappedFragment::wrap(&attributes, ""));
    }

    println!("{}", serde_json::to_string_pretty(&page.report())?);
    Ok(())
}

fn print_help() {
    println!("Consentry: consent-gated loading of analytics and embedded content");
    println!();
    println!("Usage: consentry <command>");
    println!();
    println!("Commands:");
    println!("  render <content-type> <file>   Wrap an HTML fragment behind a consent gate");
    println!("  decode <payload>               Decode a wrapped fragment's payload");
    println!("  evaluate [options]             Print the consent report for a visitor");
    println!("      --config <file>            JSON configuration file");
    println!("      --tz <zone>                Visitor time zone, e.g. Europe/Berlin");
    println!("      --ua <agent>               Visitor user agent");
    println!("      --cookie <header>          Cookie request header");
    println!("      --host <host>              Page host name");
    println!("      --mount <content-type>     Mount a gate of this type (repeatable)");
    println!("  help                           Show this help message");
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_help();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "render" => {
            if args.len() < 4 {
                eprintln!("Usage: consentry render <content-type> <file>");
                std::process::exit(1);
            }
            render(&args[2], &args[3])
        }
        "decode" => {
            if args.len() < 3 {
                eprintln!("Usage: consentry decode <payload>");
                std::process::exit(1);
            }
            decode(&args[2])
        }
        "evaluate" => evaluate(EvaluateArgs::parse(&args[2..])?),
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}. Use 'consentry help' for usage.", other);
            std::process::exit(1);
        }
    }
}
