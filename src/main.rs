use clap::Parser;
use dataloader::cli::commands::{boundary, completions, load, rollback, schema, validate};
use dataloader::cli::{Cli, Commands};
use miette::Result;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Reset SIGPIPE so piping to `head` terminates quietly instead of panicking.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;

    let default_level = if global.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Validate(args) => validate::run(args, &global),
        Commands::Load(cmd) => load::run(cmd, &global),
        Commands::Boundary(cmd) => boundary::run(cmd, &global),
        Commands::Rollback(cmd) => rollback::run(cmd, &global),
        Commands::Schema(cmd) => schema::run(cmd, &global),
        Commands::Completions(args) => completions::run(args),
    }
}
