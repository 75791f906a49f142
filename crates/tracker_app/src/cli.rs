use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracker_engine::TransportKind;

use crate::logging::LogDestination;

/// Submit image/video generations and follow them to completion.
#[derive(Debug, Parser)]
#[command(name = "tracker", version, about)]
pub struct Cli {
    /// RON file with tracker settings.
    #[arg(long, global = true, env = "TRACKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Backend origin, overrides the config file.
    #[arg(long, global = true, env = "TRACKER_BASE_URL")]
    pub base_url: Option<String>,

    #[arg(long, global = true, value_enum)]
    pub transport: Option<TransportArg>,

    /// Where in-flight jobs and generated media are remembered.
    #[arg(
        long,
        global = true,
        env = "TRACKER_STATE_FILE",
        default_value = ".tracker_state.ron"
    )]
    pub state_file: PathBuf,

    #[arg(long, global = true, value_enum, default_value_t = LogDestination::Terminal)]
    pub log: LogDestination,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    Sse,
    Websocket,
}

impl From<TransportArg> for TransportKind {
    fn from(value: TransportArg) -> Self {
        match value {
            TransportArg::Sse => TransportKind::Sse,
            TransportArg::Websocket => TransportKind::WebSocket,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum KindArg {
    #[default]
    Image,
    Video,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a generation and wait for its result.
    Submit(SubmitArgs),
    /// Follow a job that was started elsewhere.
    Track {
        job_id: String,
        #[arg(long, value_enum, default_value_t = KindArg::Image)]
        kind: KindArg,
        /// The id names a project rather than a file.
        #[arg(long)]
        project: bool,
    },
    /// Run one immediate status check for a remembered job.
    Check { job_id: String },
    /// Resume every job left in flight by an earlier run.
    Recover,
    /// Show remembered jobs and media.
    List,
    /// Forget a job.
    Clear { job_id: String },
}

#[derive(Debug, Args)]
pub struct SubmitArgs {
    pub prompt: String,
    #[arg(long, value_enum, default_value_t = KindArg::Image)]
    pub kind: KindArg,
    /// Source image for image-to-image or image-to-video.
    #[arg(long)]
    pub image: Option<PathBuf>,
    #[arg(long)]
    pub model: Option<String>,
    #[arg(long)]
    pub style: Option<String>,
    #[arg(long)]
    pub resolution: Option<String>,
    /// Return once the job is accepted; `recover` picks it up later.
    #[arg(long)]
    pub no_wait: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn submit_parses_kind_and_image() {
        let cli = Cli::try_parse_from([
            "tracker",
            "--transport",
            "websocket",
            "submit",
            "a fox",
            "--kind",
            "video",
            "--image",
            "still.png",
        ])
        .unwrap();
        assert_eq!(cli.transport, Some(TransportArg::Websocket));
        match cli.command {
            Command::Submit(args) => {
                assert_eq!(args.prompt, "a fox");
                assert_eq!(args.kind, KindArg::Video);
                assert_eq!(args.image, Some(PathBuf::from("still.png")));
                assert!(!args.no_wait);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
