use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "quorum-server", about = "Quorum live Q&A server")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/quorum.toml")]
    pub config: String,
}
