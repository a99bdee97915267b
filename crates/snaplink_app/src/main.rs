//! Thin CLI consumer of the resolution engine: provider id plus free-form
//! text in, one canonical JSON result out. The HTTP serving layer proper
//! lives elsewhere; this binary is the minimal in-tree caller.

mod logging;

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use snaplink_core::{ProviderId, ResolveStatus};
use snaplink_engine::{EngineSettings, Resolver};

#[derive(Parser)]
#[command(
    name = "snaplink",
    about = "Resolve shareable media links into direct download URLs"
)]
struct Args {
    /// Provider to resolve against (youtube, twitter, tiktok, douyin,
    /// qishui, spotify, easylink). Detected from the text when omitted.
    #[arg(long)]
    provider: Option<ProviderId>,

    /// Overall deadline in seconds for the resolution.
    #[arg(long)]
    deadline: Option<u64>,

    /// Log at debug level.
    #[arg(long, short)]
    verbose: bool,

    /// Free-form text containing the media link.
    text: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::initialize(args.verbose);

    let text = args.text.join(" ");
    if text.trim().is_empty() {
        eprintln!("no input text; pass a message containing a media link");
        return ExitCode::from(2);
    }

    let resolver = Resolver::new(EngineSettings::default());
    let result = match (args.provider, args.deadline) {
        (Some(provider), Some(seconds)) => {
            resolver
                .resolve_with_deadline(provider, &text, Duration::from_secs(seconds))
                .await
        }
        (Some(provider), None) => resolver.resolve(provider, &text).await,
        (None, _) => resolver.resolve_any(&text).await,
    };

    let rendered = serde_json::to_string_pretty(&result).expect("result serializes");
    println!("{rendered}");
    engine_logging::engine_info!("resolution finished: {}", result.message);

    match result.status {
        ResolveStatus::Success => ExitCode::SUCCESS,
        ResolveStatus::Error => ExitCode::FAILURE,
    }
}
