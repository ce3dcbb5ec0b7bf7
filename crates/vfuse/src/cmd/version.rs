use vfuse_proto::MessageRegistry;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("vfuse {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: vfuse");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("VFUSE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("max_frame_size: {}", vfuse_frame::MAX_FRAME_SIZE);
    match MessageRegistry::standard() {
        Ok(registry) => println!("message_tags: {}", registry.tag_count()),
        Err(err) => println!("message_tags: unavailable ({err})"),
    }
    println!(
        "features: volume={}, cli=true",
        cfg!(all(unix, feature = "volume"))
    );

    Ok(SUCCESS)
}
