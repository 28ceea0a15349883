use crate::api;
use crate::cli::{actions::Action, globals::GlobalArgs};
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    let Action::Server { port, dsn } = action else {
        return Ok(());
    };

    api::new(port, dsn, globals).await
}
