//! Version command implementation

use crate::cli::Output;
use anyhow::Result;

/// Execute the version command
pub fn execute(output: &Output) -> Result<()> {
    let version = crate::VERSION;
    let name = crate::PKG_NAME;
    let description = env!("CARGO_PKG_DESCRIPTION");
    let authors = env!("CARGO_PKG_AUTHORS");

    output.header(&format!("{} v{}", name, version));

    output.key_value("Description:", description, false);
    output.key_value("Authors:", authors, false);
    output.key_value("CPU cores:", &num_cpus::get().to_string(), false);
    output.key_value("Target:", std::env::consts::ARCH, false);
    output.key_value(
        "Profile:",
        if cfg!(debug_assertions) { "debug" } else { "release" },
        false,
    );

    output.blank_line();
    output.success(&format!("Run '{} --help' for usage information", name));

    Ok(())
}
