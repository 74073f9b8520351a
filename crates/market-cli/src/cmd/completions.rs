use anyhow::Result;
use clap::Args;
use clap_complete::{Shell, generate};

/// Arguments for `mkt completions`.
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell for completion script generation.
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Print the completion script for `shell`, named after the root command.
///
/// # Errors
///
/// Does not fail; script generation writes straight to stdout.
pub fn run_completions(args: &CompletionsArgs, command: &mut clap::Command) -> Result<()> {
    let name = command.get_name().to_string();
    generate(args.shell, command, name, &mut std::io::stdout().lock());
    Ok(())
}
