//! Engine configuration: output/temp directories and the two tunable constants.

use std::path::PathBuf;

/// Number of byte-range chunks a download is split into.
pub const NUM_CHUNKS: u8 = 8;

/// Maximum number of downloads allowed in the `downloading` state at once.
pub const MAX_CONCURRENT_DOWNLOADS: usize = 3;

/// Resolved filesystem locations for the engine's persistent state.
#[derive(Debug, Clone)]
pub struct Config {
    /// Output directory for completed files; also where `downloads.json` lives.
    pub download_folder: PathBuf,
    /// Parent directory of each entry's `temp_<id>` directory.
    pub temp_folder: PathBuf,
}

impl Config {
    /// Name of the persistent store file inside `download_folder`.
    pub const STORE_FILE: &'static str = "downloads.json";

    /// Loads configuration from `DOWNLOAD_FOLDER`/`TEMP_FOLDER` env vars, falling
    /// back to the documented defaults, and creates both directories.
    pub async fn load() -> std::io::Result<Self> {
        let download_folder = std::env::var("DOWNLOAD_FOLDER")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./downloads"));

        let temp_folder = std::env::var("TEMP_FOLDER").map(PathBuf::from).unwrap_or_else(|_| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("node-downloader-temp")
        });

        tokio::fs::create_dir_all(&download_folder).await?;
        tokio::fs::create_dir_all(&temp_folder).await?;

        Ok(Self { download_folder, temp_folder })
    }

    /// Path of the persistent store file.
    pub fn store_path(&self) -> PathBuf {
        self.download_folder.join(Self::STORE_FILE)
    }

    /// Directory a given entry's chunk part files live in.
    pub fn temp_dir_for(&self, id: &str) -> PathBuf {
        self.temp_folder.join(format!("temp_{id}"))
    }
}
