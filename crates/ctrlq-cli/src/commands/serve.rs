//! Serve the task network for the visualization front-end.

use anyhow::Result;
use clap::Args;

use super::ConnectionArgs;

#[derive(Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, default_value_t = 3000)]
    pub port: u16,
}

pub async fn execute(args: ServeArgs, connection: &ConnectionArgs) -> Result<()> {
    let qrs = connection.qrs_client()?;
    let graph = super::load_task_graph(&qrs).await?;
    ctrlq_viz::run_server(&graph, args.port).await
}
