//! Serve Command
//!
//! Run the HTTP surface with the configured actors.

use tracing::warn;

use crate::cli::util::{CommandContext, Output};
use crate::server::{ServerState, router, serve};
use crate::types::Result;

pub async fn run(cmd: &CommandContext, bind: Option<String>) -> Result<()> {
    let actors = cmd.actors();
    if actors.is_empty() {
        warn!("No [actors] configured; every request will be anonymous");
    }

    let namespace = cmd.config.server.namespace.clone();
    let bind = bind.unwrap_or_else(|| cmd.config.server.bind.clone());
    Output::new().info(&format!(
        "Serving /{} on {} ({} actors)",
        namespace.trim_matches('/'),
        bind,
        actors.len()
    ));

    let app = router(ServerState::new(cmd.dispatcher(), actors), &namespace);
    serve(app, &bind).await
}
