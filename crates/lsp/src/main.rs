use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tower_lsp::{LspService, Server};

use nixcomp_lsp::evaluator::{AttrSetChannel, AttrSetClient};
use nixcomp_lsp::server::CompletionServer;

#[derive(Parser, Debug)]
#[command(author, version, about = "Nix completion language server")]
struct Cli {
    /// Command that starts the attribute-set evaluator. Without it only
    /// local names are completed.
    #[arg(long, value_name = "CMD")]
    evaluator: Option<PathBuf>,

    /// Argument passed to the evaluator command (repeatable)
    #[arg(long = "evaluator-arg", value_name = "ARG", allow_hyphen_values = true)]
    evaluator_args: Vec<String>,

    /// Give up on an evaluator query after this many milliseconds
    #[arg(long, value_name = "MS")]
    evaluator_timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let args = Cli::parse();
    let timeout = args.evaluator_timeout_ms.map(Duration::from_millis);

    let evaluator: Option<Arc<dyn AttrSetChannel>> = match &args.evaluator {
        Some(program) => match AttrSetClient::spawn(program, &args.evaluator_args, timeout) {
            Ok(client) => {
                log::info!(
                    "started evaluator {} (pid {:?}, timeout {timeout:?})",
                    program.display(),
                    client.pid()
                );
                Some(Arc::new(client))
            }
            Err(e) => {
                log::warn!(
                    "failed to start evaluator {}: {e}; completing local names only",
                    program.display()
                );
                None
            }
        },
        None => None,
    };

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(|client| CompletionServer::new(client, evaluator));

    Server::new(stdin, stdout, socket).serve(service).await;
}
