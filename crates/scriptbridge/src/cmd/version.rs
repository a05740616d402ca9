use scriptbridge_session::MAGIC_NUMBER;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("scriptbridge {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: scriptbridge");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("protocol_magic: 0x{MAGIC_NUMBER:08x}");
    println!(
        "target: {}",
        option_env!("SCRIPTBRIDGE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("pointer_width: {}", usize::BITS);
    println!(
        "features: calc={}, cli=true",
        cfg!(feature = "calc")
    );

    Ok(SUCCESS)
}
