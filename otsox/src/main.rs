mod cli;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use log::{debug, error, info, warn};
use otsox_core::load;

use crate::cli::build_cli;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = build_cli().get_matches();
    let audio_ext = matches
        .get_one::<String>("audio-ext")
        .expect("defaulted argument");
    let strict = matches.get_flag("strict");
    let files = matches
        .get_many::<PathBuf>("files")
        .expect("required argument");

    let mut failures = 0usize;
    for path in files {
        if path.extension().and_then(|ext| ext.to_str()) != Some("ot") {
            warn!("skipping {}: only .ot files are supported", path.display());
            continue;
        }

        if let Err(err) = process_file(path, audio_ext, strict) {
            error!("{}: {err:#}", path.display());
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{failures} file(s) could not be processed");
    }
    Ok(())
}

/// Print one sox `trim` command line per slice of a single settings file.
///
/// A failure here only skips this file; the caller keeps going with the
/// rest of the batch.
fn process_file(path: &Path, audio_ext: &str, strict: bool) -> anyhow::Result<()> {
    let data = load(path)?;
    if strict {
        data.validate().context("strict validation failed")?;
    }

    info!("{}: {} slice(s)", path.display(), data.valid_slices());
    debug!(
        "{}: {:.2} bpm, gain {:+.1} dB",
        path.display(),
        data.bpm(),
        data.gain_db()
    );

    // The companion audio file shares the base name, as do the per-slice
    // outputs: name.ot -> name.wav, name00.wav, name01.wav, ...
    let input = path.with_extension(audio_ext);
    let base = path.with_extension("");
    for slice in data.slices() {
        println!(
            "{} {}{:02}.{} trim {}s ={}s",
            input.display(),
            base.display(),
            slice.index,
            audio_ext,
            slice.start_point,
            slice.end_point
        );
    }

    Ok(())
}
