//! Renders the `ipfrag(1)` man page from the clap definition in `src/cli.rs`.

use std::{env, fs, io, path::Path};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli.rs"]
mod cli;

/// Directory, relative to the package root, receiving the rendered page.
const MAN_DIR: &str = "target/generated-man";

fn render_man_page(dir: &Path) -> io::Result<()> {
    let name = env::var("CARGO_PKG_NAME").unwrap_or_else(|_| "ipfrag".to_owned());
    let command = cli::Cli::command().version(env!("CARGO_PKG_VERSION"));
    let mut page = Vec::new();
    Man::new(command).section("1").render(&mut page)?;
    fs::create_dir_all(dir)?;
    fs::write(dir.join(format!("{name}.1")), page)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");
    println!("cargo:rerun-if-env-changed=IPFRAG_SKIP_MAN");

    if env::var_os("IPFRAG_SKIP_MAN").is_some() {
        return Ok(());
    }
    render_man_page(Path::new(MAN_DIR))?;
    Ok(())
}
