//! Framed stream server command.

use std::path::PathBuf;

use clap::Args;
use cadenza_config::CadenzaConfig;
use cadenza_stream::{FrameData, FramedStream, StreamError};

#[derive(Args)]
pub struct ServeArgs {
    /// Directory to create the FIFOs in
    #[arg(value_name = "DIR")]
    dir: PathBuf,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,
}

/// Decode a payload as audio frame data, if it is one.
fn as_frame_data(payload: &[u8]) -> Option<FrameData> {
    FrameData::decode(payload)
        .ok()
        .filter(|data| !data.entities.is_empty() && data.entities.iter().all(|e| e.is_consistent()))
}

pub fn run(args: ServeArgs, config: &CadenzaConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&args.dir)?;
    println!("Serving in {} (Ctrl+C to stop)", args.dir.display());

    let mut stream = FramedStream::server(&args.dir, &config.stream)?;
    let close = stream.close_handle();
    ctrlc::set_handler(move || close.close())?;

    let mut received = 0u64;
    let mut bytes = 0usize;
    loop {
        if args.frames.is_some_and(|max| received >= max) {
            stream.close()?;
            break;
        }
        let payload = match stream.receive_frame() {
            Ok(payload) => payload,
            Err(StreamError::Closed) => break,
            Err(StreamError::HungUp) => {
                tracing::info!("client hung up");
                break;
            }
            Err(e) => return Err(e.into()),
        };
        received += 1;
        bytes += payload.len();

        match as_frame_data(&payload) {
            Some(data) => {
                let ids: Vec<&str> = data.entities.iter().map(|e| e.id.as_str()).collect();
                tracing::debug!(
                    sample_pos = data.sample_pos,
                    frame_size = data.frame_size,
                    entities = ?ids,
                    "frame data"
                );
            }
            None => {
                tracing::debug!(len = payload.len(), "raw frame, echoing");
                stream.send_frame(&payload)?;
            }
        }
    }

    println!("Received {received} frames ({bytes} bytes)");
    Ok(())
}
