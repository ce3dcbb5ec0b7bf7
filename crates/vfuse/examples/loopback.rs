//! Both vfuse peers in one process, talking over a Unix socket pair.
//!
//! Run with:
//!   cargo run --example loopback -- /some/dir

#[cfg(unix)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::os::unix::net::UnixStream;
    use std::sync::Arc;

    use vfuse::frame::FrameConfig;
    use vfuse::peer::{serve, split, Client, ClientConfig};
    use vfuse::proto::{AttrRequest, MessageRegistry, ReaddirRequest};
    use vfuse::transport::Stream;
    use vfuse::volume::{Volume, VolumeConfig};

    let root = std::env::args().nth(1).unwrap_or_else(|| ".".to_string());
    let volume = Volume::new(VolumeConfig {
        root: root.into(),
        writable: false,
    })?;

    let registry = Arc::new(MessageRegistry::standard()?);
    let (initiator, responder) = UnixStream::pair()?;

    let (mut reader, writer) = split(
        Stream::from(responder),
        Arc::clone(&registry),
        &FrameConfig::default(),
    )?;
    let server = std::thread::spawn(move || serve(&mut reader, &writer, &volume));

    let client = Client::new(Stream::from(initiator), registry, ClientConfig::default())?;
    let listing = client.invoke(ReaddirRequest { name: ".".into() })?;
    if let Some(err) = listing.err {
        return Err(err.into());
    }

    for entry in &listing.entries {
        let attr = client.invoke(AttrRequest {
            name: entry.name.clone(),
            handle: 0,
        })?;
        match attr.attr {
            Some(attr) => println!("{:>7o} {:>10} {}", attr.mode, attr.size, entry.name),
            None => println!("{:>7} {:>10} {}", "?", "?", entry.name),
        }
    }

    client.shutdown()?;
    let served = server
        .join()
        .map_err(|_| "responder thread panicked")??;
    eprintln!("served {served} requests");
    Ok(())
}

#[cfg(not(unix))]
fn main() {
    eprintln!("the loopback example needs Unix domain sockets");
}
