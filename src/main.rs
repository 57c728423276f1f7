// src/main.rs

use agentflow::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        // Exit explicitly: the stdin reader may still be parked in a
        // blocking read, which would stall runtime shutdown.
        Ok(()) => std::process::exit(0),
        Err(err) => {
            eprintln!("agentflow error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level, args.log_format)?;
    run(args).await
}
