//! CLI command implementations.

pub mod batch;
pub mod parse;
pub mod scrape;

pub use batch::BatchCommand;
pub use parse::ParseCommand;
pub use scrape::ScrapeCommand;

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Returns a token that is cancelled on the first Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling outstanding extractions");
            trigger.cancel();
        }
    });

    token
}
