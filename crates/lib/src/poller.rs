//! Poller: consume an adapter's update stream, resolve each command against
//! the configured table, execute it, and route the reply back through the
//! same adapter.

use crate::command::{self, CommandDefinition};
use crate::exec::CommandExecutor;
use crate::messaging::{MessageClient, MessageKind};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Consume updates until the adapter's stream closes (clean shutdown or
/// transport loss). Every Command message produces exactly one reply
/// attempt; non-command messages are skipped, and a failed send is logged
/// but never stops the loop.
pub async fn run_poller(
    client: Arc<dyn MessageClient>,
    commands: Arc<HashMap<String, CommandDefinition>>,
    executor: Arc<dyn CommandExecutor>,
    cancel: CancellationToken,
) {
    let mut updates = client.clone().updates(cancel);

    while let Some(update) = updates.recv().await {
        if update.kind != MessageKind::Command {
            continue;
        }

        let reply = match commands.get(&update.command) {
            None => "Command not supported".to_string(),
            Some(def) => match command::render(def, &update.args) {
                Err(e) => format!("Command formatting failed: {}", e),
                Ok(rendered) => match executor.execute(&rendered).await {
                    Err(e) => format!("Command {} failed: {}", rendered, e),
                    Ok(output) => output,
                },
            },
        };

        if let Err(e) = client.send(&reply, &update).await {
            log::error!("Error sending a message: {}", e);
        }
    }

    log::info!("poller: update stream closed, exiting");
}
