use std::sync::Arc;

use tracing::info;
use vfuse_peer::{connect_with_timeout, serve, PacketWriter, PeerError, ServerConfig};
use vfuse_proto::MessageRegistry;
use vfuse_volume::{Volume, VolumeConfig, VolumeError};

use crate::cmd::{parse_duration, ShareArgs};
use crate::exit::{io_error, peer_error, CliError, CliResult, INTERNAL, SUCCESS, TIMEOUT, USAGE};

pub fn run(args: ShareArgs) -> CliResult<i32> {
    let timeout = parse_duration(&args.connect_timeout)?;
    let volume = Volume::new(VolumeConfig {
        root: args.root,
        writable: !args.read_only,
    })
    .map_err(volume_error)?;

    let registry = MessageRegistry::standard()
        .map_err(|err| CliError::new(INTERNAL, format!("registry setup failed: {err}")))?;
    let (mut reader, writer) = connect_with_timeout(
        &args.endpoint,
        Arc::new(registry),
        &ServerConfig::default(),
        timeout,
    )
    .map_err(|err| match err {
        PeerError::Transport(ref transport) if transport.is_not_listening() => {
            CliError::new(TIMEOUT, format!("connect timed out after {timeout:?}: {err}"))
        }
        other => peer_error("connect failed", other),
    })?;

    install_ctrlc_handler(writer.clone())?;

    let served = serve(&mut reader, &writer, &volume).map_err(|err| peer_error("serve failed", err))?;
    info!(served, open_handles = volume.open_handles(), "share finished");
    Ok(SUCCESS)
}

fn volume_error(err: VolumeError) -> CliError {
    match err {
        VolumeError::Root { path, source } => {
            io_error(&format!("cannot share {}", path.display()), source)
        }
        VolumeError::NotADirectory(path) => {
            CliError::new(USAGE, format!("not a directory: {}", path.display()))
        }
    }
}

/// Ctrl-C shuts the stream down so `serve` sees a clean end of input.
fn install_ctrlc_handler(writer: PacketWriter) -> CliResult<()> {
    ctrlc::set_handler(move || {
        let _ = writer.shutdown();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
