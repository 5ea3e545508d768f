use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

use clap::CommandFactory;

fn main() -> io::Result<()> {
    println!("cargo:rerun-if-changed=crates/sdfview-cli/src/lib.rs");

    let cmd = sdfview_cli::Args::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buffer: Vec<u8> = Default::default();
    man.render(&mut buffer)?;

    let out_dir = PathBuf::from(
        env::var("OUT_DIR").map_err(|e| io::Error::new(io::ErrorKind::NotFound, e))?,
    );
    fs::write(out_dir.join("sdfview.1"), &buffer)?;

    // Release builds also drop the manpage next to the binary (OUT_DIR is
    // target/<profile>/build/<pkg>/out).
    if env::var("PROFILE").unwrap_or_default() == "release" {
        if let Some(release_dir) = out_dir.ancestors().nth(3) {
            fs::write(release_dir.join("sdfview.1"), &buffer)?;
        }
    }

    Ok(())
}
