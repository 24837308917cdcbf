use clap::Args;

pub mod create;
pub mod inspect;
pub mod list;
pub mod mount;
pub mod remove;
pub mod unmount;

use crate::cli::op::Op;

crate::command_enum! {
    (Create, create::Create),
    (Rm, remove::Remove),
    (Ls, list::List),
    (Inspect, inspect::Inspect),
    (Mount, mount::Mount),
    (Unmount, unmount::Unmount),
}

// Rename the generated Command to VolumeCommand for clarity
pub type VolumeCommand = Command;

/// Manage volumes on a running daemon
#[derive(Args, Debug, Clone)]
pub struct Volume {
    #[command(subcommand)]
    pub command: VolumeCommand,
}

#[async_trait::async_trait]
impl Op for Volume {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
