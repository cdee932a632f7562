use std::path::PathBuf;

use clap::{Parser, Subcommand};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "tickmix", version = VERSION)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Mix one or more files and play them on an output device
    Play {
        /// Audio files to mix together (WAV, FLAC, Ogg/Vorbis, MP3)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Use a specific output device by substring match
        #[arg(long)]
        device: Option<String>,

        /// Times to play each file; -1 loops forever
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        loops: i32,

        /// Linear gain applied to every file
        #[arg(long, default_value_t = 1.0)]
        gain: f32,

        /// Frames mixed per tick (one period)
        #[arg(long, default_value_t = 1024)]
        period_frames: u32,
    },

    /// Mix files offline into a WAV file, as fast as they decode
    Render {
        /// Audio files to mix together (WAV, FLAC, Ogg/Vorbis, MP3)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output WAV path
        #[arg(short, long)]
        output: PathBuf,

        /// Times to play each file (must be positive when rendering)
        #[arg(long, default_value_t = 1)]
        loops: i32,

        /// Linear gain applied to every file
        #[arg(long, default_value_t = 1.0)]
        gain: f32,

        /// Frames mixed per tick (one period)
        #[arg(long, default_value_t = 1024)]
        period_frames: u32,
    },

    /// List output devices and exit
    Devices,
}
