use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Invalid stream URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("No symbols to subscribe to")]
    NoSymbols,
}
