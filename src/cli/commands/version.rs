//! Version command - show version information

use crate::cli::args::VersionArgs;

/// Print version information
pub fn execute(args: VersionArgs) {
    println!("{} {}", crate::NAME, crate::VERSION);

    if args.verbose {
        println!();
        println!("Features:");
        println!("  - Local site dials, direct or through a recording forwarder");
        println!("  - Peer proxy dials over SSH proxy subsystems");
        println!("  - Freshest-heartbeat peer selection");
        println!();
        println!("Build info:");
        println!("  Target:    {}", env!("BUILD_TARGET"));
        println!("  Rust:      {}", env!("RUSTC_VERSION"));
        if let Ok(exe) = std::env::current_exe() {
            println!("  Executable: {}", exe.display());
        }
    }
}
