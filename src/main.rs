use bitreel::{extract_options, spawn_job, CliData, Error, JobEvent, JobOutcome, JobStage};
use clap::Parser;
use indicatif::ProgressBar;
use pretty_bytes_rust::pretty_bytes;
use tracing::{error, info, warn};

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = CliData::parse();
    let show_progress = !args.no_progress && atty::is(atty::Stream::Stderr);
    let job = match extract_options(&args) {
        Ok(job) => job,
        Err(err) => {
            error!("{}", err);
            std::process::exit(2);
        }
    };

    let handle = spawn_job(job);
    let token = handle.cancel_token();
    if let Err(err) = ctrlc::set_handler(move || token.cancel()) {
        warn!("Ctrl-C will not stop the job cleanly: {}", err);
    }

    let mut pb: Option<ProgressBar> = None;
    let mut warnings = 0;
    for event in handle.events().iter() {
        match event {
            JobEvent::Stage(stage) => {
                if let Some(bar) = pb.take() {
                    bar.finish_and_clear();
                }
                if matches!(stage, JobStage::Encoding | JobStage::Decoding) && show_progress {
                    pb = Some(ProgressBar::new(0));
                }
            }
            JobEvent::Packed {
                original,
                padded,
                frames,
            } => {
                info!(
                    "Payload {} padded to {} over {} frame(s)",
                    pretty_bytes(original as u64, None),
                    pretty_bytes(padded as u64, None),
                    frames
                );
            }
            JobEvent::Frame { done, total } => {
                if let Some(bar) = &pb {
                    if let Some(total) = total {
                        bar.set_length(total as u64);
                    }
                    bar.set_position(done as u64);
                }
            }
            JobEvent::Warning(_) => warnings += 1,
            JobEvent::Started { .. } => {}
        }
    }
    if let Some(bar) = pb.take() {
        bar.finish_and_clear();
    }

    match handle.join() {
        Ok(JobOutcome::Encoded { video, frames, .. }) => {
            info!("Encoded {} frame(s) into {}", frames, video.display());
        }
        Ok(JobOutcome::Decoded { files, frames, .. }) => {
            info!("Decoded {} frame(s) into {} file(s)", frames, files.len());
            if warnings > 0 {
                warn!("Finished with {} warning(s)", warnings);
            }
            for file in files {
                println!("{}", file.display());
            }
        }
        Err(Error::Cancelled) => {
            warn!("Cancelled, partial output removed");
            std::process::exit(130);
        }
        Err(err) => {
            error!("{}", err);
            std::process::exit(1);
        }
    }
    std::process::exit(0);
}
