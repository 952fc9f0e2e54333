use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};

/// Top-level CLI entry point.
#[derive(Debug, Parser)]
#[command(
    name = "folio",
    version,
    author,
    about = "Folio document chat service"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(global = true, short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            command: None,
            verbose: 0,
        }
    }
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn print_help() {
        let mut cmd = Cli::command();
        let _ = cmd.print_help();
        println!();
    }
}

/// Supported subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the Folio HTTP server.
    Serve(ServeArgs),
    /// Re-run the processing pipeline for one already uploaded file.
    ///
    /// Runs against this process's own document store. The default store is
    /// in-memory, so files uploaded to a separate server are not visible
    /// here until a persistent store backend is configured.
    Process(ProcessArgs),
    /// Print the status of a context and its files.
    ///
    /// Reads this process's own document store; see `process` for the
    /// in-memory store caveat.
    Status(StatusArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs;

/// Re-process a single file in place.
#[derive(Debug, Args)]
pub struct ProcessArgs {
    /// Identifier of the file to process.
    #[arg(value_name = "FILE_ID")]
    pub file_id: String,
    /// Context the file belongs to.
    #[arg(long = "context", value_name = "CONTEXT_ID")]
    pub context_id: String,
}

/// Inspect a context.
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Context to inspect.
    #[arg(value_name = "CONTEXT_ID")]
    pub context_id: String,
}
