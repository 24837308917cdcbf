use std::path::PathBuf;

use clap::Parser;
use url::Url;

use super::ops;

crate::command_enum! {
    (Daemon, ops::Daemon),
    (Health, ops::Health),
    (Volume, ops::Volume),
}

/// Docker volume plugin mounting ZooKeeper trees through zookeeperfuse
#[derive(Parser, Debug)]
#[command(name = "zkvol", version, about)]
pub struct Args {
    /// Address of a running daemon
    #[arg(
        long,
        global = true,
        env = "ZKVOL_REMOTE",
        default_value = "http://127.0.0.1:8095"
    )]
    pub remote: Url,

    /// Daemon config file (TOML)
    #[arg(long, global = true, env = "ZKVOL_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_volume_create() {
        let args = Args::try_parse_from([
            "zkvol", "volume", "create", "v1", "--host", "zk1", "--host", "zk2", "--path", "/data",
        ])
        .unwrap();
        assert_eq!(args.remote.as_str(), "http://127.0.0.1:8095/");
        assert!(matches!(args.command, Command::Volume(_)));
    }
}
