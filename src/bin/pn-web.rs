//! `pn-web`：可达图 HTTP 服务。
//!
//! 配置文件依次取第一个命令行参数、`PN_CONFIG`、`pn.toml`。
use std::path::PathBuf;

use anyhow::Result;

use pn_reach::config::{DEFAULT_CONFIG_FILE, PnConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let env = env_logger::Env::new()
        .filter_or("PN_LOG", "info")
        .write_style("PN_LOG_STYLE");
    env_logger::init_from_env(env);

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PN_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = PnConfig::load_from_file(&config_path)?;
    log::debug!("configuration from {:?}: {:?}", config_path, config);

    pn_reach::web::serve(config).await
}
