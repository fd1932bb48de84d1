use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

pub const DEFAULT_OUTPUT_DIR: &str = "tts_audio_output";
pub const DEFAULT_TTS_URL: &str = "http://localhost:5002/api/tts";

/// Command line options for `tts-converter`.
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Convert text files to speech in resumable chunks",
    after_help = "While a job runs, type `h` and Enter for the list of commands."
)]
pub struct Cli {
    /// Text file to convert. Asked for when omitted.
    pub file: Option<PathBuf>,

    /// Job name, used for the output folder. Defaults to the file name.
    #[arg(short = 'n', long)]
    pub name: Option<String>,

    /// Prefix for audio file names. Defaults to the job name.
    #[arg(short = 'p', long)]
    pub prefix: Option<String>,

    /// Folder holding one sub-folder per job.
    #[arg(short = 'd', long, env = "TTS_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    #[arg(short = 'l', long, env = "TTS_LANGUAGE", default_value = "en")]
    pub language: String,

    /// Ask the service for slower speech.
    #[arg(short = 's', long)]
    pub slow: bool,

    #[arg(long, env = "TTS_VOICE")]
    pub voice: Option<String>,

    /// Maximum characters per chunk.
    #[arg(long, default_value_t = 5000, value_parser = clap::value_parser!(u64).range(1..))]
    pub chunk_size: u64,

    /// Attempts per chunk before it is marked as failed.
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: u32,

    /// Initial delay between attempts, in seconds. Doubles each time.
    #[arg(long, default_value_t = 2.0)]
    pub retry_delay: f64,

    #[arg(long, env = "TTS_URL", default_value = DEFAULT_TTS_URL)]
    pub tts_url: String,

    #[arg(long, env = "TTS_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Request timeout in seconds.
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,

    /// Throw away earlier progress for this job and start over.
    #[arg(long, conflicts_with = "yes")]
    pub fresh: bool,

    /// Resume earlier progress without asking.
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Remove the job's progress and audio files, then exit.
    #[arg(long)]
    pub clean: bool,

    /// Remove the saved progress and chunk audio of every job in the
    /// output folder, then exit. Finished audio is kept.
    #[arg(long, conflicts_with_all = ["clean", "info"])]
    pub cleanup: bool,

    /// Print statistics about the file, then exit.
    #[arg(long)]
    pub info: bool,

    /// Debug logging on stderr.
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Cli {
    pub fn retry_policy(&self) -> RetryPolicy {
        let base_delay = Duration::try_from_secs_f64(self.retry_delay).unwrap_or_default();
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay,
            max_delay: RetryPolicy::default().max_delay.max(base_delay),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.max(1))
    }

    pub fn max_chars(&self) -> usize {
        usize::try_from(self.chunk_size).unwrap_or(usize::MAX)
    }
}
