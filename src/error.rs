use thiserror::Error;

/// Crate-wide error type.
///
/// The streaming path treats almost every condition as non-fatal — stale
/// nonces and ADS under-specification simply leave the watch parked and are
/// never surfaced as an `Error`. This type exists for the conditions that do
/// need to fail outright: unary fetches that can't be answered, a watch
/// whose source disappeared out from under a stream, and ADS streams opened
/// without a type URL.
#[derive(Debug, Error)]
pub enum Error {
    /// No snapshot exists yet for the request's node group.
    #[error("no snapshot for node group")]
    NotFound,

    /// The caller's `version_info` already matches the current snapshot;
    /// there is nothing new to fetch.
    #[error("version up to date")]
    UpToDate,

    /// The watch's responder was dropped before it could deliver a
    /// response (the consuming stream is gone).
    #[error("watch closed before responding")]
    WatchClosed,

    /// An ADS stream's first request carried no type URL.
    #[error("type URL is required for ADS")]
    MissingAdsTypeUrl,

    /// Any other transport-level failure, wrapped verbatim.
    #[error(transparent)]
    Transport(#[from] tonic::Status),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for tonic::Status {
    fn from(err: Error) -> Self {
        match err {
            Error::MissingAdsTypeUrl => tonic::Status::unknown(err.to_string()),
            Error::WatchClosed => tonic::Status::unavailable(err.to_string()),
            Error::NotFound | Error::UpToDate => tonic::Status::not_found(err.to_string()),
            Error::Transport(status) => status,
        }
    }
}
