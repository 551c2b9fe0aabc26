use thiserror::Error;

/// Main error type for the downloader service and its client
#[derive(Error, Debug)]
pub enum DownloaderError {
    #[error("Service unavailable: {0}\n\nTroubleshooting:\n- Check catalog file: ~/.config/hal-downloader/model_config.json\n- Check that the state directory is writable: ~/.local/share/hal-downloader\n- Run with RUST_LOG=debug for more details")]
    ServiceUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authentication required: {0}")]
    AuthRequired(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Hub error: {0}")]
    Hub(#[from] HubError),

    #[error("Config error: {0}\n\nTroubleshooting:\n- Check config file: ~/.config/hal-downloader/config.toml\n- Run with RUST_LOG=debug for more details")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Model hub errors
#[derive(Error, Debug)]
pub enum HubError {
    #[error("Invalid or expired hub token\n\nTroubleshooting:\n- Create a read token at: https://huggingface.co/settings/tokens\n- Make sure the model's license was accepted on its hub page")]
    InvalidToken,

    #[error("Network error: {0}\n\nTroubleshooting:\n- Check internet connection\n- Try increasing hub.timeout_secs in config")]
    Network(String),

    #[error("Hub API error: {0}")]
    Api(String),

    #[error("Download failed: {0}")]
    Fetch(String),
}

pub type Result<T> = std::result::Result<T, DownloaderError>;
