use std::net::SocketAddr;

use structopt::StructOpt;

#[derive(StructOpt, Debug, Clone, Default)]
#[structopt(name = "mqstored", about = "Multi-tenant MQTT persistence and history query service")]
pub struct Options {
    /// Config filename
    #[structopt(name = "config", short = "f", long)]
    pub cfg_name: Option<String>,

    /// HTTP data API listen address, overrides `http.laddr`
    #[structopt(name = "http-laddr", long)]
    pub http_laddr: Option<SocketAddr>,

    /// Directory holding users.json, clients.json and storeTopics.json, overrides `registry.dir`
    #[structopt(name = "registry-dir", long)]
    pub registry_dir: Option<String>,

    /// SQLite database file, overrides `store.path`
    #[structopt(name = "store-path", long)]
    pub store_path: Option<String>,
}
