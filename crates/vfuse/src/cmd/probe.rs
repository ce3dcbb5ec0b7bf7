use std::sync::Arc;

use tracing::info;
use vfuse_peer::{Client, ClientConfig, PeerListener};
use vfuse_proto::{
    AttrRequest, CloseRequest, FsError, MessageRegistry, OpenFlags, OpenRequest, ReadRequest,
    ReaddirRequest, ReadlinkRequest,
};

use crate::cmd::{parse_duration, ProbeArgs, ProbeOp};
use crate::exit::{fs_error, peer_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_attr, print_data, print_entries, print_link, OutputFormat};

/// Bytes requested per read while fetching a file.
const READ_CHUNK: u32 = 64 * 1024;

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let registry = MessageRegistry::standard()
        .map_err(|err| CliError::new(INTERNAL, format!("registry setup failed: {err}")))?;

    let listener = PeerListener::bind(&args.endpoint, Arc::new(registry))
        .map_err(|err| peer_error("bind failed", err))?
        .with_client_config(ClientConfig {
            call_timeout: Some(timeout),
            ..ClientConfig::default()
        });
    info!(endpoint = %listener.local_endpoint(), "waiting for responder");

    let client = listener
        .accept()
        .map_err(|err| peer_error("accept failed", err))?;
    let outcome = run_op(&client, args.op, &args.path, format);
    client
        .shutdown()
        .map_err(|err| peer_error("shutdown failed", err))?;
    outcome
}

fn run_op(client: &Client, op: ProbeOp, path: &str, format: OutputFormat) -> CliResult<i32> {
    match op {
        ProbeOp::Stat => {
            let reply = client
                .invoke(AttrRequest {
                    name: path.to_string(),
                    handle: 0,
                })
                .map_err(|err| peer_error("stat failed", err))?;
            check("stat", reply.err)?;
            let attr = reply
                .attr
                .ok_or_else(|| CliError::new(INTERNAL, "stat: responder sent no attributes"))?;
            print_attr(path, &attr, format);
        }
        ProbeOp::Ls => {
            let reply = client
                .invoke(ReaddirRequest {
                    name: path.to_string(),
                })
                .map_err(|err| peer_error("ls failed", err))?;
            check("ls", reply.err)?;
            print_entries(path, &reply.entries, format);
        }
        ProbeOp::Readlink => {
            let reply = client
                .invoke(ReadlinkRequest {
                    name: path.to_string(),
                })
                .map_err(|err| peer_error("readlink failed", err))?;
            check("readlink", reply.err)?;
            print_link(path, &reply.target, format);
        }
        ProbeOp::Cat => {
            let data = fetch(client, path)?;
            print_data(path, &data, format);
        }
    }
    Ok(SUCCESS)
}

/// Read a whole file through a handle, closing it even when a read fails.
fn fetch(client: &Client, path: &str) -> CliResult<Vec<u8>> {
    let opened = client
        .invoke(OpenRequest {
            name: path.to_string(),
            flags: OpenFlags::read_only(),
        })
        .map_err(|err| peer_error("open failed", err))?;
    check("open", opened.err)?;

    let data = read_all(client, opened.handle);
    let closed = client
        .invoke(CloseRequest {
            handle: opened.handle,
        })
        .map_err(|err| peer_error("close failed", err));
    let data = data?;
    check("close", closed?.err)?;
    Ok(data)
}

fn read_all(client: &Client, handle: u64) -> CliResult<Vec<u8>> {
    let mut data = Vec::new();
    loop {
        let reply = client
            .invoke(ReadRequest {
                handle,
                offset: data.len() as u64,
                size: READ_CHUNK,
            })
            .map_err(|err| peer_error("read failed", err))?;
        check("read", reply.err)?;
        if reply.data.is_empty() {
            return Ok(data);
        }
        data.extend_from_slice(&reply.data);
    }
}

fn check(context: &str, err: Option<FsError>) -> CliResult<()> {
    match err {
        Some(err) => Err(fs_error(context, &err)),
        None => Ok(()),
    }
}
