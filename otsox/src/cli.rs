use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, Command};

pub const DEFAULT_AUDIO_EXT: &str = "wav";

pub fn build_cli() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .about("Generate sox command lines that chop samples along Octatrack slices")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("audio-ext")
                .short('e')
                .long("audio-ext")
                .value_name("EXT")
                .help("Extension of the companion audio files")
                .default_value(DEFAULT_AUDIO_EXT),
        )
        .arg(
            Arg::new("strict")
                .long("strict")
                .help("Verify the header, slice count and checksum before emitting commands")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("files")
                .value_name("OT_FILE")
                .help("Slice settings files to process")
                .required(true)
                .num_args(1..)
                .value_parser(value_parser!(PathBuf)),
        )
}
