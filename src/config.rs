use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_GEOAPIFY_URL: &str = "https://api.geoapify.com";
pub const DEFAULT_GEOAPIFY_TIMEOUT_SECS: u64 = 30;

/// Server settings, from flags or the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "retrotrack", version, about = "Delivery inefficiency reports from uploaded spreadsheets")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "RETROTRACK_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Directory holding users, file records and parsed datasets
    #[arg(long, env = "RETROTRACK_DATA_DIR", default_value = "database")]
    pub data_dir: PathBuf,

    /// Directory served under /static
    #[arg(long, env = "RETROTRACK_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Geoapify key; route optimisation is skipped without one
    #[arg(long, env = "GEOAPIFY_API_KEY")]
    pub geoapify_api_key: Option<String>,

    #[arg(long, env = "GEOAPIFY_URL", default_value = DEFAULT_GEOAPIFY_URL)]
    pub geoapify_url: String,

    /// Seconds before a geocoding or routing request is abandoned
    #[arg(long, env = "GEOAPIFY_TIMEOUT_SECS", default_value_t = DEFAULT_GEOAPIFY_TIMEOUT_SECS)]
    pub geoapify_timeout_secs: u64,

    /// Largest accepted upload
    #[arg(long, env = "RETROTRACK_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,
}

impl Config {
    /// Defaults with the database under `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Config {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            data_dir: data_dir.into(),
            static_dir: PathBuf::from("static"),
            geoapify_api_key: None,
            geoapify_url: DEFAULT_GEOAPIFY_URL.to_string(),
            geoapify_timeout_secs: DEFAULT_GEOAPIFY_TIMEOUT_SECS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "retrotrack",
            "--bind",
            "0.0.0.0:8080",
            "--data-dir",
            "/tmp/rt",
            "--max-upload-bytes",
            "2048",
            "--geoapify-timeout-secs",
            "5",
        ])
        .unwrap();
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/rt"));
        assert_eq!(config.max_upload_bytes, 2048);
        assert_eq!(config.geoapify_timeout_secs, 5);
        assert_eq!(
            Config::try_parse_from(["retrotrack"]).unwrap().geoapify_timeout_secs,
            DEFAULT_GEOAPIFY_TIMEOUT_SECS
        );
    }

    #[test]
    fn debug_assert_command() {
        use clap::CommandFactory;
        Config::command().debug_assert();
    }
}
