use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download a video and cut it into short clips
    Ingest {
        /// Source video URL (YouTube, Twitch, Kick or a direct media link)
        url: String,

        /// Target clip length in seconds (minimum 5)
        #[arg(short = 'l', long, default_value = "30")]
        clip_length: f64,
    },

    /// Consume queued ingest jobs one at a time until interrupted
    Worker,

    /// Show the status of a job
    Status {
        /// Job identifier
        job_id: String,
    },

    /// List the clips generated for a job
    Clips {
        /// Job identifier
        job_id: String,
    },

    /// Locate or install yt-dlp and check ffmpeg/ffprobe
    Setup,

    /// Write the default configuration to a file
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_defaults_to_thirty_second_clips() {
        let args = Args::parse_from(["shorts-cutter", "ingest", "https://youtu.be/abc"]);
        match args.command {
            Commands::Ingest { url, clip_length } => {
                assert_eq!(url, "https://youtu.be/abc");
                assert_eq!(clip_length, 30.0);
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn global_flags_parse() {
        let args = Args::parse_from(["shorts-cutter", "-v", "-c", "cutter.toml", "status", "abc123"]);
        assert!(args.verbose);
        assert_eq!(args.config, Some(PathBuf::from("cutter.toml")));
        assert!(matches!(args.command, Commands::Status { job_id } if job_id == "abc123"));
    }
}
